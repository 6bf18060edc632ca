use crate::error::CodecError;
use crate::value::Value;

pub fn parse(text: &str) -> Result<Value, CodecError> {
    let raw: serde_json::Value = serde_json::from_str(text)?;
    Ok(Value::from(raw))
}

/// Non-finite numbers are written as `null`.
pub fn format(value: &Value, pretty: bool) -> Result<String, CodecError> {
    let json = value.to_json();
    let text = if pretty {
        serde_json::to_string_pretty(&json)?
    } else {
        serde_json::to_string(&json)?
    };
    Ok(text)
}
