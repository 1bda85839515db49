//! Sanitization pass applied to every validated payload.
//!
//! Walks the JSON tree and, for each string: normalizes to NFC, strips
//! script markup, inline handlers and unsafe URI schemes, then truncates
//! to the configured length. Object keys get the same stripping; a key
//! left empty, or clashing with another key, is dropped. Known list
//! fields are capped.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use unicode_normalization::UnicodeNormalization;

static RE_SCRIPT_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<script\b[^>]*>.*?</script\s*>").expect("script block pattern")
});
static RE_SCRIPT_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)</?script\b[^>]*>?").expect("script tag pattern"));
static RE_EVENT_HANDLER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\bon[a-z]+\s*=\s*("[^"]*"|'[^']*'|[^\s>]+)"#).expect("handler pattern")
});
static RE_UNSAFE_SCHEME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(?:javascript|vbscript|data)\s*:").expect("scheme pattern"));

pub const ELLIPSIS: &str = "...";

#[derive(Debug, Clone)]
pub struct SanitizeLimits {
    pub max_string_length: usize,
    pub max_scenes: usize,
    pub max_questions: usize,
    pub max_options: usize,
}

impl Default for SanitizeLimits {
    fn default() -> Self {
        Self {
            max_string_length: 10_000,
            max_scenes: 100,
            max_questions: 50,
            max_options: 10,
        }
    }
}

impl SanitizeLimits {
    fn cap_for(&self, field: &str) -> Option<usize> {
        match field {
            "scenes" => Some(self.max_scenes),
            "questions" => Some(self.max_questions),
            "options" => Some(self.max_options),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sanitized {
    pub content: Value,
    pub warnings: Vec<String>,
}

pub fn sanitize(content: &Value, limits: &SanitizeLimits) -> Sanitized {
    let mut warnings = Vec::new();
    let content = sanitize_value(content, "$", limits, &mut warnings);
    Sanitized { content, warnings }
}

fn sanitize_value(
    value: &Value,
    path: &str,
    limits: &SanitizeLimits,
    warnings: &mut Vec<String>,
) -> Value {
    match value {
        Value::String(text) => Value::String(sanitize_text(text, path, limits, warnings)),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .enumerate()
                .map(|(i, item)| sanitize_value(item, &format!("{}[{}]", path, i), limits, warnings))
                .collect(),
        ),
        Value::Object(object) => {
            let mut cleaned = Map::with_capacity(object.len());
            for (raw_field, child) in object {
                let field = match clean_key(raw_field) {
                    Some(field) if field == *raw_field => field,
                    Some(field) if !object.contains_key(&field) && !cleaned.contains_key(&field) => {
                        warnings.push(format!("{}.{}: field name had unsafe markup", path, field));
                        field
                    }
                    _ => {
                        warnings.push(format!("{}: dropped field with unsafe name", path));
                        continue;
                    }
                };
                let child_path = format!("{}.{}", path, field);
                let child = match (child, limits.cap_for(&field)) {
                    (Value::Array(items), Some(cap)) if items.len() > cap => {
                        warnings.push(format!(
                            "{} capped at {} entries (had {})",
                            child_path,
                            cap,
                            items.len()
                        ));
                        Value::Array(items[..cap].to_vec())
                    }
                    _ => child.clone(),
                };
                let child = sanitize_value(&child, &child_path, limits, warnings);
                cleaned.insert(field, child);
            }
            Value::Object(cleaned)
        }
        other => other.clone(),
    }
}

/// NFC plus markup stripping; `None` when nothing is left.
fn clean_key(key: &str) -> Option<String> {
    let normalized: String = key.nfc().collect();
    let stripped = strip_unsafe(&normalized);
    (!stripped.trim().is_empty()).then_some(stripped)
}

fn sanitize_text(
    text: &str,
    path: &str,
    limits: &SanitizeLimits,
    warnings: &mut Vec<String>,
) -> String {
    let normalized: String = text.nfc().collect();
    let stripped = strip_unsafe(&normalized);
    if stripped != normalized {
        warnings.push(format!("{}: removed unsafe markup", path));
    }

    if stripped.chars().count() > limits.max_string_length {
        warnings.push(format!(
            "{}: truncated to {} characters",
            path, limits.max_string_length
        ));
        let mut truncated: String = stripped.chars().take(limits.max_string_length).collect();
        truncated.push_str(ELLIPSIS);
        truncated
    } else {
        stripped
    }
}

/// Removes script markup until none is left; removal can splice together
/// a new match (`javajavascript:script:`), so one pass is not enough.
pub fn strip_unsafe(text: &str) -> String {
    let mut current = text.to_string();
    loop {
        let next = RE_SCRIPT_BLOCK.replace_all(&current, "");
        let next = RE_SCRIPT_TAG.replace_all(&next, "");
        let next = RE_EVENT_HANDLER.replace_all(&next, "");
        let next = RE_UNSAFE_SCHEME.replace_all(&next, "").into_owned();
        if next == current {
            return current;
        }
        current = next;
    }
}
