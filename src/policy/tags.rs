//! Tag extraction.
//!
//! Tags are the only handle invalidation has on a cached response, so the
//! output is a sorted set: the same request and response always produce the
//! same tags in the same order.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::policy::MAX_WALK_DEPTH;

/// Request parameters promoted to tags, with the tag prefix they map to.
const PARAM_TAGS: &[(&str, &str)] = &[("id", "id"), ("userId", "user"), ("categoryId", "category")];

// == Request Descriptor ==
/// What a caller knows about the request being cached.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestDescriptor {
    /// Route or GraphQL operation name
    pub operation: String,
    /// Request parameters or GraphQL variables, sorted by name
    #[serde(default)]
    pub params: BTreeMap<String, Value>,
}

impl RequestDescriptor {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            params: BTreeMap::new(),
        }
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Canonical cache key: the operation followed by its parameters.
    pub fn cache_key(&self) -> String {
        if self.params.is_empty() {
            return self.operation.clone();
        }
        let params: Vec<String> = self
            .params
            .iter()
            .map(|(name, value)| format!("{name}={}", scalar_text(value).unwrap_or_else(|| value.to_string())))
            .collect();
        format!("{}?{}", self.operation, params.join("&"))
    }
}

// == Extract Tags ==
/// Derives invalidation tags for a response.
///
/// - `op:{operation}` for the route or operation name
/// - `{Type}:{id}` for every object carrying both `__typename` and `id`
/// - `{Type}:list` when such an object sits inside an array
/// - `id:{v}`, `user:{v}`, `category:{v}` from request parameters
pub fn extract_tags(request: &RequestDescriptor, response: &Value) -> BTreeSet<String> {
    let mut tags = BTreeSet::new();
    if !request.operation.is_empty() {
        tags.insert(format!("op:{}", request.operation));
    }

    collect_entities(response, 0, false, &mut tags);

    for (param, prefix) in PARAM_TAGS {
        if let Some(value) = request.params.get(*param).and_then(scalar_text) {
            tags.insert(format!("{prefix}:{value}"));
        }
    }
    tags
}

fn collect_entities(value: &Value, depth: usize, in_list: bool, tags: &mut BTreeSet<String>) {
    if depth >= MAX_WALK_DEPTH {
        return;
    }
    match value {
        Value::Object(fields) => {
            if let Some(Value::String(typename)) = fields.get("__typename") {
                if let Some(id) = fields.get("id").and_then(scalar_text) {
                    tags.insert(format!("{typename}:{id}"));
                }
                if in_list {
                    tags.insert(format!("{typename}:list"));
                }
            }
            for field in fields.values() {
                collect_entities(field, depth + 1, false, tags);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_entities(item, depth + 1, true, tags);
            }
        }
        _ => {}
    }
}

/// Strings and numbers as bare text; anything else has no tag form.
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
