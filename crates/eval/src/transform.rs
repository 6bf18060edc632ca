//! Built-in transforms and the caller-supplied custom transform registry.
//!
//! `concat` is not here: its tokens are paths, so it lives with source
//! resolution in [`crate::resolve`].

use crate::types::ExecError;
use mapwright_core::coerce::parse_number_text;
use mapwright_core::{TransformKind, Value};
use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// Signature of a custom transform handler.
pub type TransformFn = dyn Fn(&Value) -> Result<Value, String> + Send + Sync;

/// Named custom transforms, referenced from rules as `custom:<name>`.
#[derive(Clone, Default)]
pub struct TransformRegistry {
    handlers: HashMap<String, Arc<TransformFn>>,
}

impl TransformRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `name`, replacing any earlier handler.
    pub fn register<F>(&mut self, name: impl Into<String>, handler: F)
    where
        F: Fn(&Value) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.handlers.insert(name.into(), Arc::new(handler));
    }

    pub fn with<F>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&Value) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.register(name, handler);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Arc<TransformFn>> {
        self.handlers.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl fmt::Debug for TransformRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformRegistry")
            .field("names", &self.names())
            .finish()
    }
}

/// Run the custom transform `name`. A missing handler, a returned error
/// and a panic inside the handler all become [`ExecError`]s.
pub fn run_custom(registry: &TransformRegistry, name: &str, input: &Value) -> Result<Value, ExecError> {
    let handler = registry.get(name).ok_or_else(|| ExecError::UnknownTransform {
        name: name.to_string(),
    })?;
    match catch_unwind(AssertUnwindSafe(|| handler(input))) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(message)) => Err(ExecError::TransformFailed {
            name: name.to_string(),
            message,
        }),
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "handler panicked".to_string());
            Err(ExecError::TransformFailed {
                name: name.to_string(),
                message,
            })
        }
    }
}

/// Apply a value-only built-in transform. `Concat` and `Custom` are
/// handled by the resolver and pass the value through here.
pub fn apply_builtin(kind: &TransformKind, value: Value) -> Value {
    match kind {
        TransformKind::Lowercase => match value {
            Value::String(s) => Value::String(s.to_lowercase()),
            other => other,
        },
        TransformKind::Uppercase => match value {
            Value::String(s) => Value::String(s.to_uppercase()),
            other => other,
        },
        TransformKind::Number => to_number(value),
        TransformKind::Boolean => Value::Bool(to_boolean(&value)),
        TransformKind::Split {
            separator,
            token_index,
            trim,
        } => split(value, separator, *token_index, *trim),
        TransformKind::Concat { .. } | TransformKind::Custom(_) => value,
    }
}

/// `""` and null pass through; anything unparseable becomes NaN.
fn to_number(value: Value) -> Value {
    match value {
        Value::Null => Value::Null,
        Value::String(s) if s.is_empty() => Value::String(s),
        Value::Number(n) => Value::Number(n),
        Value::Bool(b) => Value::Number(if b { 1.0 } else { 0.0 }),
        Value::String(s) => Value::Number(parse_number_text(&s)),
        Value::Array(_) | Value::Object(_) => Value::Number(f64::NAN),
    }
}

const TRUE_WORDS: [&str; 4] = ["true", "1", "yes", "y"];

fn to_boolean(value: &Value) -> bool {
    match value {
        Value::String(s) => {
            let s = s.trim().to_ascii_lowercase();
            TRUE_WORDS.contains(&s.as_str())
        }
        Value::Bool(b) => *b,
        Value::Null => false,
        _ => true,
    }
}

fn split(value: Value, separator: &str, index: i64, trim: bool) -> Value {
    let text = match value {
        Value::Null => return Value::Null,
        Value::String(s) => s,
        other if other.is_scalar() => other.to_text(),
        _ => return Value::Null,
    };
    let tokens: Vec<&str> = if separator.is_empty() {
        text.char_indices()
            .map(|(i, c)| &text[i..i + c.len_utf8()])
            .collect()
    } else {
        text.split(separator).collect()
    };
    let tokens: Vec<&str> = if trim {
        tokens
            .into_iter()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .collect()
    } else {
        tokens
    };
    let len = tokens.len() as i64;
    let at = if index < 0 { len + index } else { index };
    if at < 0 || at >= len {
        return Value::Null;
    }
    Value::String(tokens[at as usize].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn split_kind(separator: &str, token_index: i64, trim: bool) -> TransformKind {
        TransformKind::Split {
            separator: separator.into(),
            token_index,
            trim,
        }
    }

    #[test]
    fn case_transforms_ignore_non_strings() {
        assert_eq!(
            apply_builtin(&TransformKind::Uppercase, Value::from("ada")),
            Value::from("ADA")
        );
        assert_eq!(
            apply_builtin(&TransformKind::Lowercase, Value::Number(3.0)),
            Value::Number(3.0)
        );
    }

    #[test]
    fn number_passes_empty_and_yields_nan() {
        assert_eq!(apply_builtin(&TransformKind::Number, Value::from("")), Value::from(""));
        assert_eq!(apply_builtin(&TransformKind::Number, Value::from(" 4.5 ")), Value::Number(4.5));
        match apply_builtin(&TransformKind::Number, Value::from("abc")) {
            Value::Number(n) => assert!(n.is_nan()),
            other => panic!("expected NaN, got {other:?}"),
        }
    }

    #[test]
    fn boolean_word_list() {
        for word in ["true", "YES", "y", "1"] {
            assert_eq!(apply_builtin(&TransformKind::Boolean, Value::from(word)), Value::Bool(true));
        }
        assert_eq!(apply_builtin(&TransformKind::Boolean, Value::from("no")), Value::Bool(false));
        assert_eq!(apply_builtin(&TransformKind::Boolean, Value::Number(0.0)), Value::Bool(true));
        assert_eq!(apply_builtin(&TransformKind::Boolean, Value::Null), Value::Bool(false));
    }

    #[test]
    fn split_picks_tokens() {
        let v = || Value::from("a, b,,c");
        assert_eq!(apply_builtin(&split_kind(",", 1, true), v()), Value::from("b"));
        assert_eq!(apply_builtin(&split_kind(",", 2, true), v()), Value::from("c"));
        assert_eq!(apply_builtin(&split_kind(",", 2, false), v()), Value::from(""));
        assert_eq!(apply_builtin(&split_kind(",", -1, true), v()), Value::from("c"));
        assert_eq!(apply_builtin(&split_kind(",", 9, true), v()), Value::Null);
        assert_eq!(apply_builtin(&split_kind(",", -9, true), v()), Value::Null);
    }

    #[test]
    fn custom_failures_are_errors() {
        let registry = TransformRegistry::new()
            .with("double", |v| Ok(Value::Number(mapwright_core::coerce::to_number(v) * 2.0)))
            .with("refuse", |_| Err("nope".into()))
            .with("boom", |_| panic!("exploded"));

        assert_eq!(run_custom(&registry, "double", &Value::Number(2.0)).unwrap(), Value::Number(4.0));
        assert!(matches!(
            run_custom(&registry, "missing", &Value::Null),
            Err(ExecError::UnknownTransform { .. })
        ));
        let err = run_custom(&registry, "refuse", &Value::Null).unwrap_err();
        assert_eq!(err.to_string(), "custom transform 'refuse' failed: nope");
        let err = run_custom(&registry, "boom", &Value::Null).unwrap_err();
        assert_eq!(err.to_string(), "custom transform 'boom' failed: exploded");
    }

    #[test]
    fn registry_debug_lists_names() {
        let registry = TransformRegistry::new().with("b", |v| Ok(v.clone())).with("a", |v| Ok(v.clone()));
        assert_eq!(format!("{registry:?}"), r#"TransformRegistry { names: ["a", "b"] }"#);
    }
}
