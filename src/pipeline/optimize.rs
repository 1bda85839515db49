//! Optimization stage: splits scripts into their own assets, minifies
//! them and collapses whitespace in text fields.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

static RE_BLOCK_COMMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)/\*.*?\*/").expect("block comment pattern"));
static RE_LINE_COMMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)(^|[^:])//[^\n]*$").expect("line comment pattern"));
static RE_WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("whitespace pattern"));

/// Path of the main content document inside a package.
pub const CONTENT_ASSET: &str = "content.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub path: String,
    pub body: String,
    pub size: u64,
}

impl Asset {
    fn new(path: impl Into<String>, body: String) -> Self {
        Self {
            path: path.into(),
            size: body.len() as u64,
            body,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizedAssets {
    pub assets: Vec<Asset>,
    pub original_size: u64,
    pub optimized_size: u64,
    /// `optimized_size / original_size`; below 1.0 means smaller
    pub compression_ratio: f64,
}

fn is_script_field(field: &str) -> bool {
    let field = field.to_ascii_lowercase();
    field == "code" || field.ends_with("script")
}

pub fn minify_script(source: &str) -> String {
    let without_blocks = RE_BLOCK_COMMENT.replace_all(source, "");
    let without_lines = RE_LINE_COMMENT.replace_all(&without_blocks, "$1");
    RE_WHITESPACE
        .replace_all(&without_lines, " ")
        .trim()
        .to_string()
}

pub fn collapse_whitespace(text: &str) -> String {
    RE_WHITESPACE.replace_all(text, " ").trim().to_string()
}

/// Optimizes sanitized content into deployable assets.
pub fn optimize(content: &Value) -> OptimizedAssets {
    let original_size = content.to_string().len() as u64;
    let mut scripts = Vec::new();
    let document = rewrite(content, &mut scripts);

    let mut assets = vec![Asset::new(CONTENT_ASSET, document.to_string())];
    assets.extend(scripts);

    let optimized_size = assets.iter().map(|a| a.size).sum();
    let compression_ratio = if original_size == 0 {
        1.0
    } else {
        optimized_size as f64 / original_size as f64
    };

    OptimizedAssets {
        assets,
        original_size,
        optimized_size,
        compression_ratio,
    }
}

fn rewrite(value: &Value, scripts: &mut Vec<Asset>) -> Value {
    match value {
        Value::String(text) => Value::String(collapse_whitespace(text)),
        Value::Array(items) => Value::Array(items.iter().map(|v| rewrite(v, scripts)).collect()),
        Value::Object(object) => {
            let mut out = Map::with_capacity(object.len());
            for (field, child) in object {
                let child = match child {
                    Value::String(source) if is_script_field(field) => {
                        let path = format!("scripts/{}.js", scripts.len());
                        scripts.push(Asset::new(path.clone(), minify_script(source)));
                        Value::String(path)
                    }
                    other => rewrite(other, scripts),
                };
                out.insert(field.clone(), child);
            }
            Value::Object(out)
        }
        other => other.clone(),
    }
}
