//! Claimed and actual values.
//!
//! Claims arrive loosely typed from the submitting client, metadata values
//! arrive as JSON. Both are reduced to [`ClaimValue`] with explicit coercion
//! rules before any comparison happens.

use std::collections::BTreeMap;
use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

static NUMBER_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[-+]?\d+(?:\.\d+)?(?:[eE][-+]?\d+)?").expect("valid regex"));

/// A scalar claim or resolved metadata value.
///
/// Untagged so claim files can say `"max": 2500`, `"datum": "ED50"` or
/// `"signed": true` without wrappers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClaimValue {
    Boolean(bool),
    Number(f64),
    Text(String),
}

impl ClaimValue {
    /// Convert a metadata value. `null` counts as absent.
    ///
    /// Arrays of scalars become a canonical `AxBxC` text so that shapes
    /// written as `[100, 200]` and `"100 x 200"` compare equal.
    pub fn from_json(value: &Value) -> Option<ClaimValue> {
        match value {
            Value::Null => None,
            Value::Bool(b) => Some(ClaimValue::Boolean(*b)),
            Value::Number(n) => n.as_f64().map(ClaimValue::Number),
            Value::String(s) => Some(ClaimValue::Text(s.clone())),
            Value::Array(items) => {
                let scalars: Option<Vec<String>> = items
                    .iter()
                    .map(|item| match item {
                        Value::Number(n) => n.as_f64().map(format_number),
                        Value::String(s) => Some(s.trim().to_string()),
                        Value::Bool(b) => Some(b.to_string()),
                        _ => None,
                    })
                    .collect();
                match scalars {
                    Some(parts) if !parts.is_empty() => Some(ClaimValue::Text(parts.join("x"))),
                    _ => Some(ClaimValue::Text(canonical_json(value))),
                }
            }
            Value::Object(_) => Some(ClaimValue::Text(canonical_json(value))),
        }
    }

    /// Numeric reading: numbers, or text that parses as a finite number.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            ClaimValue::Number(n) if n.is_finite() => Some(*n),
            ClaimValue::Number(_) => None,
            ClaimValue::Text(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
            ClaimValue::Boolean(_) => None,
        }
    }

    /// Boolean reading: booleans, or `true/false/yes/no` text.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ClaimValue::Boolean(b) => Some(*b),
            ClaimValue::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" => Some(true),
                "false" | "no" => Some(false),
                _ => None,
            },
            ClaimValue::Number(_) => None,
        }
    }

    /// Text rendering used by the string tiers of the matcher.
    pub fn as_text(&self) -> String {
        match self {
            ClaimValue::Boolean(b) => b.to_string(),
            ClaimValue::Number(n) => format_number(*n),
            ClaimValue::Text(s) => s.clone(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ClaimValue::Boolean(_) => "boolean",
            ClaimValue::Number(_) => "number",
            ClaimValue::Text(_) => "text",
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            ClaimValue::Boolean(b) => Value::Bool(*b),
            ClaimValue::Number(n) => serde_json::Number::from_f64(*n)
                .map(Value::Number)
                .unwrap_or_else(|| Value::String(n.to_string())),
            ClaimValue::Text(s) => Value::String(s.clone()),
        }
    }
}

impl fmt::Display for ClaimValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_text())
    }
}

impl From<f64> for ClaimValue {
    fn from(n: f64) -> Self {
        ClaimValue::Number(n)
    }
}

impl From<i64> for ClaimValue {
    fn from(n: i64) -> Self {
        ClaimValue::Number(n as f64)
    }
}

impl From<&str> for ClaimValue {
    fn from(s: &str) -> Self {
        ClaimValue::Text(s.to_string())
    }
}

impl From<String> for ClaimValue {
    fn from(s: String) -> Self {
        ClaimValue::Text(s)
    }
}

impl From<bool> for ClaimValue {
    fn from(b: bool) -> Self {
        ClaimValue::Boolean(b)
    }
}

/// Render a number for messages: integers without a fraction, everything
/// else with at most six decimals and no trailing zeros.
pub fn format_number(n: f64) -> String {
    if !n.is_finite() {
        return n.to_string();
    }
    if n.fract() == 0.0 && n.abs() < 1e15 {
        return format!("{n:.0}");
    }
    if n.abs() < 1e-6 {
        return format!("{n:e}");
    }
    let fixed = format!("{n:.6}");
    let trimmed = fixed.trim_end_matches('0').trim_end_matches('.');
    trimmed.to_string()
}

/// Canonical form of a text that is really a numeric sequence
/// (`"[100, 200, 300]"`, `"100 x 200 x 300"`), or `None` when the text
/// holds anything other than numbers and separators.
pub fn normalize_sequence(text: &str) -> Option<String> {
    let numbers = parse_sequence(text)?;
    Some(numbers.into_iter().map(format_number).collect::<Vec<_>>().join("x"))
}

/// Elements of a numeric sequence text, under the same rules as
/// [`normalize_sequence`].
pub fn parse_sequence(text: &str) -> Option<Vec<f64>> {
    let numbers: Vec<f64> = NUMBER_TOKEN
        .find_iter(text)
        .filter_map(|m| m.as_str().parse::<f64>().ok())
        .collect();
    if numbers.len() < 2 {
        return None;
    }
    let rest = NUMBER_TOKEN.replace_all(text, "");
    let only_separators = rest
        .chars()
        .all(|c| c.is_whitespace() || matches!(c, ',' | 'x' | 'X' | '×' | '*' | '(' | ')' | '[' | ']' | ';'));
    if !only_separators {
        return None;
    }
    Some(numbers)
}

/// Compact JSON with object keys sorted at every level.
pub fn canonical_json(value: &Value) -> String {
    serde_json::to_string(&sorted(value)).unwrap_or_default()
}

fn sorted(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let ordered: BTreeMap<&String, Value> =
                map.iter().map(|(k, v)| (k, sorted(v))).collect();
            let mut out = serde_json::Map::new();
            for (k, v) in ordered {
                out.insert(k.clone(), v);
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
        other => other.clone(),
    }
}
