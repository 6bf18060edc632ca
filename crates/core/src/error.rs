//! Error types for the core crate.
//!
//! Only structural failures are errors here. Problems inside a rules
//! document are collected as strings on [`crate::ConversionRules`].

use std::fmt;
use std::path::PathBuf;

/// A payload could not be parsed or formatted as a whole.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid XML at byte {position}: {message}")]
    Xml { message: String, position: u64 },
    #[error("cannot format as {format}: {message}")]
    Format {
        format: &'static str,
        message: String,
    },
    #[error("unknown payload format '{0}' (expected json, xml or query)")]
    UnknownFormat(String),
}

impl CodecError {
    pub(crate) fn xml(message: impl Into<String>, position: u64) -> Self {
        CodecError::Xml {
            message: message.into(),
            position,
        }
    }

    pub(crate) fn format(format: &'static str, message: impl Into<String>) -> Self {
        CodecError::Format {
            format,
            message: message.into(),
        }
    }
}

/// Syntax diagnostic for a condition expression.
///
/// `offset` and `length` are character positions in `source`. The
/// `Display` form points at the faulting token:
///
/// ```text
/// unknown operator 'equals'. Did you mean 'eq' or '=='? (line 1, column 12)
///   path(name) equals 'Ada'
///              ^^^^^^
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ExprError {
    pub message: String,
    pub offset: usize,
    pub length: usize,
    pub source: String,
}

impl ExprError {
    pub fn new(message: impl Into<String>, offset: usize, length: usize, source: &str) -> Self {
        ExprError {
            message: message.into(),
            offset,
            length: length.max(1),
            source: source.to_string(),
        }
    }

    /// 1-based line and column of `offset`.
    pub fn line_col(&self) -> (usize, usize) {
        let mut line = 1;
        let mut col = 1;
        for c in self.source.chars().take(self.offset) {
            if c == '\n' {
                line += 1;
                col = 1;
            } else {
                col += 1;
            }
        }
        (line, col)
    }

    /// The source line containing `offset` and a caret line under the span.
    pub fn pointer(&self) -> (String, String) {
        let (line_no, col) = self.line_col();
        let text = self
            .source
            .lines()
            .nth(line_no - 1)
            .unwrap_or_default()
            .to_string();
        let caret = format!("{}{}", " ".repeat(col - 1), "^".repeat(self.length));
        (text, caret)
    }
}

impl fmt::Display for ExprError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (line, col) = self.line_col();
        let (text, caret) = self.pointer();
        write!(
            f,
            "{} (line {line}, column {col})\n  {text}\n  {caret}",
            self.message
        )
    }
}

impl std::error::Error for ExprError {}

/// Structural failure while resolving a rules document's `include` graph.
#[derive(Debug, thiserror::Error)]
pub enum BundleError {
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{} is not valid JSON: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{} must contain a JSON object", path.display())]
    NotAnObject { path: PathBuf },
    #[error("{}: {message}", path.display())]
    Invalid { path: PathBuf, message: String },
    #[error("include '{include}' in {} escapes the root document's directory", path.display())]
    OutsideRoot { path: PathBuf, include: String },
    #[error("circular include detected: {chain}")]
    Cycle { chain: String },
}
