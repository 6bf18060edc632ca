//! Payload codecs: wire text <-> [`Value`].

pub mod json;
pub mod query;
pub mod xml;

use crate::error::CodecError;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadFormat {
    #[default]
    Json,
    Xml,
    Query,
}

impl PayloadFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            PayloadFormat::Json => "json",
            PayloadFormat::Xml => "xml",
            PayloadFormat::Query => "query",
        }
    }
}

impl fmt::Display for PayloadFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PayloadFormat {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(PayloadFormat::Json),
            "xml" => Ok(PayloadFormat::Xml),
            "query" => Ok(PayloadFormat::Query),
            _ => Err(CodecError::UnknownFormat(s.to_string())),
        }
    }
}

/// Parse payload text in the given format.
pub fn parse_payload(text: &str, format: PayloadFormat) -> Result<Value, CodecError> {
    match format {
        PayloadFormat::Json => json::parse(text),
        PayloadFormat::Xml => xml::parse(text),
        PayloadFormat::Query => Ok(query::parse(text)),
    }
}

/// Serialize a value in the given format. `pretty` indents JSON and XML;
/// query strings ignore it.
pub fn format_payload(value: &Value, format: PayloadFormat, pretty: bool) -> Result<String, CodecError> {
    match format {
        PayloadFormat::Json => json::format(value, pretty),
        PayloadFormat::Xml => xml::format(value, pretty),
        PayloadFormat::Query => query::format(value),
    }
}
