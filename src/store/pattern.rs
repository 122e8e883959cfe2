//! Glob patterns as understood by `SCAN MATCH`.
//!
//! Supports `*`, `?`, `[abc]` / `[^abc]` / `[a-z]` classes and `\` escapes.

use regex::Regex;

/// Compiled glob pattern.
#[derive(Debug, Clone)]
pub struct GlobPattern {
    regex: Option<Regex>,
    literal: String,
}

impl GlobPattern {
    /// Compiles a glob; an unterminated class is matched literally.
    pub fn new(glob: &str) -> Self {
        let mut out = String::with_capacity(glob.len() * 2 + 2);
        out.push('^');

        let chars: Vec<char> = glob.chars().collect();
        let mut i = 0;
        while i < chars.len() {
            match chars[i] {
                '*' => out.push_str(".*"),
                '?' => out.push('.'),
                '\\' if i + 1 < chars.len() => {
                    i += 1;
                    out.push_str(&regex::escape(&chars[i].to_string()));
                }
                '[' => match chars[i + 1..].iter().position(|&c| c == ']') {
                    Some(offset) if offset > 0 => {
                        let body: String = chars[i + 1..i + 1 + offset].iter().collect();
                        out.push('[');
                        let body = match body.strip_prefix('^') {
                            Some(rest) => {
                                out.push('^');
                                rest.to_string()
                            }
                            None => body,
                        };
                        for c in body.chars() {
                            if matches!(c, '\\' | '[' | ']' | '&' | '~') {
                                out.push('\\');
                            }
                            out.push(c);
                        }
                        out.push(']');
                        i += offset + 1;
                    }
                    _ => out.push_str(r"\["),
                },
                c => out.push_str(&regex::escape(&c.to_string())),
            }
            i += 1;
        }
        out.push('$');

        // Literals are escaped, so only a malformed class (e.g. `[z-a]`) fails
        // here; such a glob falls back to exact comparison.
        Self {
            regex: Regex::new(&out).ok(),
            literal: glob.to_string(),
        }
    }

    pub fn matches(&self, key: &str) -> bool {
        match &self.regex {
            Some(regex) => regex.is_match(key),
            None => key == self.literal,
        }
    }
}
