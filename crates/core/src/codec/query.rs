//! URL query strings <-> [`Value`].
//!
//! Keys are paths (`user.name`, `items[0]`, `filter[status]`); repeated
//! keys at the same path accumulate into lists. Output is deterministic:
//! object keys are sorted at every level.

use crate::coerce::parse_scalar;
use crate::error::CodecError;
use crate::path::{parse_path, Segment, MAX_CREATED_INDEX};
use crate::value::{accumulate_slot, Map, Value};

pub fn parse(text: &str) -> Value {
    let text = text.trim();
    let text = text.strip_prefix('?').unwrap_or(text);
    let mut root = Value::object();
    for (key, value) in form_urlencoded::parse(text.as_bytes()) {
        let segments = parse_path(&key);
        if segments.is_empty() {
            continue;
        }
        insert(&mut root, &segments, parse_scalar(&value));
    }
    root
}

/// Walk `segments` from `slot`, creating containers, and accumulate
/// `value` at the end. A scalar standing where a container is needed is
/// replaced by the container.
fn insert(slot: &mut Value, segments: &[Segment], value: Value) {
    let Some((first, rest)) = segments.split_first() else {
        accumulate_slot(slot, value);
        return;
    };
    let index = match first {
        Segment::Index(i) if *i <= MAX_CREATED_INDEX => Some(*i),
        _ => None,
    };
    match index {
        Some(_) => {
            if !matches!(slot, Value::Array(_) | Value::Object(_)) {
                *slot = Value::Array(Vec::new());
            }
        }
        None => {
            if !matches!(slot, Value::Object(_)) {
                *slot = into_object(std::mem::take(slot));
            }
        }
    }
    let child = match (slot, index) {
        (Value::Array(items), Some(i)) => {
            if items.len() <= i {
                items.resize(i + 1, Value::Null);
            }
            &mut items[i]
        }
        (Value::Object(map), _) => {
            let key = match first {
                Segment::Key(k) => k.clone(),
                Segment::Index(i) => i.to_string(),
            };
            map.entry(key).or_insert(Value::Null)
        }
        _ => return,
    };
    insert(child, rest, value);
}

/// Arrays keep their elements under index keys; scalars are dropped.
fn into_object(value: Value) -> Value {
    match value {
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .filter(|(_, v)| !v.is_null())
            .map(|(i, v)| (i.to_string(), v))
            .collect(),
        Value::Object(map) => Value::Object(map),
        _ => Value::object(),
    }
}

pub fn format(value: &Value) -> Result<String, CodecError> {
    let Value::Object(map) = value else {
        return Err(CodecError::format(
            "query",
            format!("top-level value must be an object, found {}", value.type_name()),
        ));
    };
    let mut pairs = Vec::new();
    flatten("", map, &mut pairs);
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (k, v) in &pairs {
        serializer.append_pair(k, v);
    }
    Ok(serializer.finish())
}

fn flatten(prefix: &str, map: &Map, pairs: &mut Vec<(String, String)>) {
    let mut keys: Vec<&String> = map.keys().collect();
    keys.sort();
    for key in keys {
        let full = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match &map[key] {
            Value::Object(inner) => flatten(&full, inner, pairs),
            Value::Array(items) => {
                for item in items {
                    pairs.push((full.clone(), item_text(item)));
                }
            }
            scalar => pairs.push((full, scalar_text(scalar))),
        }
    }
}

fn item_text(item: &Value) -> String {
    match item {
        Value::Object(_) | Value::Array(_) => item.to_json().to_string(),
        scalar => scalar_text(scalar),
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::Number(n) if !n.is_finite() => String::new(),
        other => other.to_text(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn repeated_index_accumulates() {
        let v = parse("items[0]=a&items[0]=b&items[0]=c");
        assert_eq!(v.to_json(), json!({"items": [["a", "b", "c"]]}));
    }

    #[test]
    fn nested_keys_and_decoding() {
        let v = parse("?user.name=Ada+L&user[age]=36&note=a%26b&zip=007");
        assert_eq!(
            v.to_json(),
            json!({"user": {"name": "Ada L", "age": 36}, "note": "a&b", "zip": "007"})
        );
    }

    #[test]
    fn empty_brackets_append() {
        let v = parse("tag[]=x&tag[]=y");
        assert_eq!(v.to_json(), json!({"tag": ["x", "y"]}));
    }

    #[test]
    fn huge_index_becomes_a_key() {
        let v = parse("a[99999]=1");
        assert_eq!(v.to_json(), json!({"a": {"99999": 1}}));
    }

    #[test]
    fn format_sorts_and_flattens() {
        let v = Value::from(json!({"b": {"y": 2, "x": 1}, "a": [1, {"k": "v"}], "n": null}));
        assert_eq!(
            format(&v).unwrap(),
            "a=1&a=%7B%22k%22%3A%22v%22%7D&b.x=1&b.y=2&n="
        );
    }

    #[test]
    fn format_rejects_non_objects() {
        let err = format(&Value::Array(vec![])).unwrap_err();
        assert!(err.to_string().contains("must be an object"));
    }

    #[test]
    fn spaces_encode_as_plus() {
        let v = Value::from(json!({"q": "a b"}));
        assert_eq!(format(&v).unwrap(), "q=a+b");
    }
}
