//! Invalidation rules: what fires them, what must hold, what they clear.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CacheError, Result};

// == Triggers ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TriggerType {
    /// Domain event raised by the application
    Event,
    /// Inbound webhook from another system
    Webhook,
    /// Change notification published by the store
    StoreChange,
    /// Operator or API initiated
    Manual,
}

/// Where a firing came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerSource {
    pub kind: TriggerType,
    pub name: String,
}

impl TriggerSource {
    pub fn new(kind: TriggerType, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }

    pub fn event(name: impl Into<String>) -> Self {
        Self::new(TriggerType::Event, name)
    }

    pub fn describe(&self) -> String {
        let kind = match self.kind {
            TriggerType::Event => "event",
            TriggerType::Webhook => "webhook",
            TriggerType::StoreChange => "store-change",
            TriggerType::Manual => "manual",
        };
        format!("{kind}:{}", self.name)
    }
}

// == Compiled regexes ==
/// A regex compiled on first use and kept with its owner. Skipped by serde
/// and ignored by equality.
#[derive(Debug, Clone, Default)]
struct CompiledRegex(OnceLock<std::result::Result<Regex, regex::Error>>);

impl CompiledRegex {
    fn get(&self, source: &str) -> std::result::Result<&Regex, &regex::Error> {
        self.0.get_or_init(|| Regex::new(source)).as_ref()
    }
}

impl PartialEq for CompiledRegex {
    fn eq(&self, _: &Self) -> bool {
        true
    }
}

/// A rule's subscription to one source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trigger {
    #[serde(rename = "type")]
    pub kind: TriggerType,
    /// Source identifier, or a regex over it when `pattern` is set
    pub source: String,
    /// Only honoured for event triggers
    #[serde(default)]
    pub pattern: bool,
    #[serde(skip)]
    regex: CompiledRegex,
}

impl Trigger {
    pub fn new(kind: TriggerType, source: impl Into<String>) -> Self {
        Self {
            kind,
            source: source.into(),
            pattern: false,
            regex: CompiledRegex::default(),
        }
    }

    pub fn event(source: impl Into<String>) -> Self {
        Self::new(TriggerType::Event, source)
    }

    pub fn event_pattern(pattern: impl Into<String>) -> Self {
        Self {
            pattern: true,
            ..Self::event(pattern)
        }
    }

    pub fn matches(&self, fired: &TriggerSource) -> bool {
        if self.kind != fired.kind {
            return false;
        }
        if self.pattern && self.kind == TriggerType::Event {
            return self.regex.get(&self.source).is_ok_and(|re| re.is_match(&fired.name));
        }
        self.source == fired.name
    }
}

// == Conditions ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConditionOp {
    Equals,
    Contains,
    StartsWith,
    Regex,
}

/// A test against one payload field, addressed by a dotted path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub field: String,
    pub op: ConditionOp,
    pub value: String,
    #[serde(skip)]
    regex: CompiledRegex,
}

impl Condition {
    pub fn new(field: impl Into<String>, op: ConditionOp, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            op,
            value: value.into(),
            regex: CompiledRegex::default(),
        }
    }

    /// Missing fields never satisfy a condition.
    pub fn holds(&self, payload: &Value) -> bool {
        let Some(actual) = lookup(payload, &self.field) else {
            return false;
        };
        if let Value::Array(items) = actual {
            return match self.op {
                ConditionOp::Contains => items.iter().filter_map(value_text).any(|t| t == self.value),
                _ => false,
            };
        }
        let Some(text) = value_text(actual) else {
            return false;
        };
        match self.op {
            ConditionOp::Equals => text == self.value,
            ConditionOp::Contains => text.contains(&self.value),
            ConditionOp::StartsWith => text.starts_with(&self.value),
            ConditionOp::Regex => self.regex.get(&self.value).is_ok_and(|re| re.is_match(&text)),
        }
    }
}

// == Targets ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    /// A single entry, written `namespace:key`
    Key,
    /// Glob relative to the key prefix
    Pattern,
    Tag,
    /// Every entry whose key starts with the value
    Prefix,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    #[serde(rename = "type")]
    pub kind: TargetKind,
    /// May contain `{field}` placeholders filled from the payload
    pub value: String,
    #[serde(default)]
    pub cascade: bool,
}

impl Target {
    pub fn new(kind: TargetKind, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
            cascade: false,
        }
    }

    pub fn tag(value: impl Into<String>) -> Self {
        Self::new(TargetKind::Tag, value)
    }

    pub fn pattern(value: impl Into<String>) -> Self {
        Self::new(TargetKind::Pattern, value)
    }

    pub fn cascading(mut self) -> Self {
        self.cascade = true;
        self
    }

    pub fn describe(&self) -> String {
        let kind = match self.kind {
            TargetKind::Key => "key",
            TargetKind::Pattern => "pattern",
            TargetKind::Tag => "tag",
            TargetKind::Prefix => "prefix",
        };
        format!("{kind}:{}", self.value)
    }

    /// Copy of this target with placeholders substituted. Values landing in
    /// a pattern are escaped so they only ever match themselves.
    pub fn resolve(&self, payload: &Value) -> Result<Target> {
        let value = match self.kind {
            TargetKind::Pattern => fill_with(&self.value, payload, escape_glob)?,
            _ => fill_placeholders(&self.value, payload)?,
        };
        Ok(Target {
            value,
            ..self.clone()
        })
    }
}

// == Rule ==
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidationRule {
    pub id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    pub triggers: Vec<Trigger>,
    pub targets: Vec<Target>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub delay_ms: u64,
    /// Run targets concurrently rather than one after another
    #[serde(default)]
    pub batch: bool,
    /// Coalescing window; falls back to the engine default when absent
    #[serde(default)]
    pub debounce_ms: Option<u64>,
}

fn enabled_by_default() -> bool {
    true
}

impl InvalidationRule {
    pub fn new(id: impl Into<String>, triggers: Vec<Trigger>, targets: Vec<Target>) -> Self {
        Self {
            id: id.into(),
            description: String::new(),
            enabled: true,
            triggers,
            targets,
            conditions: Vec::new(),
            delay_ms: 0,
            batch: false,
            debounce_ms: None,
        }
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn with_delay(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }

    pub fn with_debounce(mut self, debounce_ms: u64) -> Self {
        self.debounce_ms = Some(debounce_ms);
        self
    }

    pub fn batched(mut self) -> Self {
        self.batch = true;
        self
    }

    /// Rejects rules that could never fire or could never run. Compiles
    /// and keeps every regex the rule matches with.
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| Err(CacheError::Validation(format!("rule `{}`: {reason}", self.id)));

        if self.id.trim().is_empty() {
            return Err(CacheError::Validation("rule id must be non-empty".to_string()));
        }
        if self.triggers.is_empty() {
            return invalid("at least one trigger is required".to_string());
        }
        if self.targets.is_empty() {
            return invalid("at least one target is required".to_string());
        }
        for trigger in self.triggers.iter().filter(|t| t.pattern) {
            if let Err(err) = trigger.regex.get(&trigger.source) {
                return invalid(format!("bad trigger pattern `{}`: {err}", trigger.source));
            }
        }
        for condition in self.conditions.iter().filter(|c| c.op == ConditionOp::Regex) {
            if let Err(err) = condition.regex.get(&condition.value) {
                return invalid(format!("bad condition regex `{}`: {err}", condition.value));
            }
        }
        for target in &self.targets {
            if target.value.is_empty() {
                return invalid("target values must be non-empty".to_string());
            }
            if target.kind == TargetKind::Key && !target.value.contains(':') {
                return invalid(format!("key target `{}` must read namespace:key", target.value));
            }
        }
        Ok(())
    }

    /// True when the rule is enabled, one trigger matches and every
    /// condition holds.
    pub fn matches(&self, fired: &TriggerSource, payload: &Value) -> bool {
        self.enabled
            && self.triggers.iter().any(|t| t.matches(fired))
            && self.conditions.iter().all(|c| c.holds(payload))
    }
}

// == Payload helpers ==
/// Follows a dotted path through objects and array indices.
pub fn lookup<'a>(payload: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(payload, |current, segment| match current {
        Value::Object(fields) => fields.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Replaces `{path}` placeholders with payload values.
pub fn fill_placeholders(template: &str, payload: &Value) -> Result<String> {
    fill_with(template, payload, |value| value.to_string())
}

fn fill_with(template: &str, payload: &Value, render: impl Fn(&str) -> String) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let Some(end) = after.find('}') else {
            out.push_str(&rest[start..]);
            return Ok(out);
        };
        let path = &after[..end];
        let value = lookup(payload, path)
            .and_then(value_text)
            .ok_or_else(|| CacheError::Validation(format!("payload has no value for `{{{path}}}`")))?;
        out.push_str(&render(&value));
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

/// Escapes glob metacharacters so `raw` matches only itself.
pub fn escape_glob(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
