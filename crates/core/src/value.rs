//! Document values shared by codecs, the expression evaluator and the executor.

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Object storage. Insertion order is preserved so codecs round-trip
/// key order.
pub type Map = IndexMap<String, Value>;

/// A parsed document or a fragment of one.
///
/// Numbers are always `f64`. Integral numbers are written back as
/// integers by the codecs; `NaN` and infinities serialize as JSON `null`.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<Value>),
    Object(Map),
}

impl Value {
    /// An empty object, the starting point of every conversion output.
    pub fn object() -> Self {
        Value::Object(Map::new())
    }

    /// Returns a human-readable type name for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Null or the empty string: the values a field default replaces.
    pub fn is_blank(&self) -> bool {
        match self {
            Value::Null => true,
            Value::String(s) => s.is_empty(),
            _ => false,
        }
    }

    pub fn is_scalar(&self) -> bool {
        !matches!(self, Value::Array(_) | Value::Object(_))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Vec<Value>> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Map> {
        match self {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Look up a key on an object value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_object().and_then(|m| m.get(key))
    }

    /// Text form used for concatenation and query-string output.
    ///
    /// Null renders as the empty string; containers render as compact JSON.
    pub fn to_text(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => format_number(*n),
            Value::String(s) => s.clone(),
            Value::Array(_) | Value::Object(_) => self.to_json().to_string(),
        }
    }

    /// Convert into a `serde_json::Value`, normalizing numbers.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => number_to_json(*n),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Array(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Object(map) => {
                let mut out = serde_json::Map::new();
                for (k, v) in map {
                    out.insert(k.clone(), v.to_json());
                }
                serde_json::Value::Object(out)
            }
        }
    }
}

/// Render a number the way the codecs write it: integers without a
/// fractional part, `NaN` as `NaN`.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if let Some(i) = as_integer(n) {
        return i.to_string();
    }
    n.to_string()
}

fn as_integer(n: f64) -> Option<i64> {
    // 2^53: beyond this not every integer is representable.
    const MAX_EXACT: f64 = 9_007_199_254_740_992.0;
    if n.is_finite() && n.fract() == 0.0 && n.abs() <= MAX_EXACT {
        Some(n as i64)
    } else {
        None
    }
}

fn number_to_json(n: f64) -> serde_json::Value {
    if let Some(i) = as_integer(n) {
        return serde_json::Value::Number(i.into());
    }
    serde_json::Number::from_f64(n)
        .map(serde_json::Value::Number)
        .unwrap_or(serde_json::Value::Null)
}

/// Add `value` under `key`, turning repeated keys into lists.
///
/// The first occurrence is stored as-is, the second upgrades the entry to
/// a two-element list, later occurrences append. Shared by the XML and
/// query-string parsers.
pub fn accumulate(map: &mut Map, key: String, value: Value) {
    match map.get_mut(&key) {
        None => {
            map.insert(key, value);
        }
        Some(existing) => push_repeat(existing, value),
    }
}

/// Same accumulation rule applied to a slot that may still be empty.
pub fn accumulate_slot(slot: &mut Value, value: Value) {
    if slot.is_null() {
        *slot = value;
    } else {
        push_repeat(slot, value);
    }
}

fn push_repeat(existing: &mut Value, value: Value) {
    match existing {
        Value::Array(items) => items.push(value),
        other => {
            let first = std::mem::take(other);
            *other = Value::Array(vec![first, value]);
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => {
                Value::Object(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl From<&serde_json::Value> for Value {
    fn from(v: &serde_json::Value) -> Self {
        Value::from(v.clone())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl FromIterator<(String, Value)> for Value {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Value::Object(iter.into_iter().collect())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Value::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn integral_numbers_serialize_as_integers() {
        assert_eq!(Value::Number(3.0).to_json(), json!(3));
        assert_eq!(Value::Number(2.5).to_json(), json!(2.5));
    }

    #[test]
    fn nan_serializes_as_null() {
        assert_eq!(Value::Number(f64::NAN).to_json(), json!(null));
        assert_eq!(Value::Number(f64::INFINITY).to_json(), json!(null));
    }

    #[test]
    fn from_json_preserves_key_order() {
        let v = Value::from(json!({"b": 1, "a": 2}));
        let keys: Vec<&String> = v.as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["b", "a"]);
    }

    #[test]
    fn accumulate_upgrades_then_appends() {
        let mut map = Map::new();
        accumulate(&mut map, "x".into(), Value::from(1.0));
        assert_eq!(map["x"], Value::from(1.0));
        accumulate(&mut map, "x".into(), Value::from(2.0));
        accumulate(&mut map, "x".into(), Value::from(3.0));
        assert_eq!(
            map["x"],
            Value::Array(vec![1.0.into(), 2.0.into(), 3.0.into()])
        );
    }

    #[test]
    fn blank_covers_null_and_empty_string_only() {
        assert!(Value::Null.is_blank());
        assert!(Value::from("").is_blank());
        assert!(!Value::from(" ").is_blank());
        assert!(!Value::Number(0.0).is_blank());
        assert!(!Value::Bool(false).is_blank());
    }

    #[test]
    fn text_form_of_scalars() {
        assert_eq!(Value::Null.to_text(), "");
        assert_eq!(Value::Number(42.0).to_text(), "42");
        assert_eq!(Value::Number(0.5).to_text(), "0.5");
        assert_eq!(Value::Bool(true).to_text(), "true");
    }
}
