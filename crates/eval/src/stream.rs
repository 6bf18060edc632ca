//! Streaming conversion: one [`ConversionResult`] per input item.
//!
//! NDJSON, query-lines and XML-element inputs are read lazily, one item at
//! a time. A JSON array has to be parsed whole before its first item is
//! available.

use crate::plan::CompiledPlan;
use crate::types::{ConversionResult, ExecOptions};
use mapwright_core::codec::{query, xml::XmlItemReader};
use mapwright_core::{CodecError, Value};
use serde::{Deserialize, Serialize};
use std::io::{self, BufRead, BufReader, Read};
use tracing::debug;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StreamInputKind {
    /// A single JSON array; every element is an item.
    #[default]
    JsonArray,
    /// One JSON document per line.
    Ndjson,
    /// One URL query string per line.
    QueryLines,
    /// Every XML element matching `xml_item_path`.
    XmlElements,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorMode {
    /// Stop at the first item that fails to parse or convert.
    #[default]
    FailFast,
    /// Yield a result for every item, failures included.
    ContinueWithReport,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamOptions {
    pub input_kind: StreamInputKind,
    pub error_mode: ErrorMode,
    pub encoding: String,
    /// Dotted element path, required for [`StreamInputKind::XmlElements`].
    pub xml_item_path: Option<String>,
}

impl Default for StreamOptions {
    fn default() -> Self {
        StreamOptions {
            input_kind: StreamInputKind::default(),
            error_mode: ErrorMode::default(),
            encoding: "utf-8".into(),
            xml_item_path: None,
        }
    }
}

impl StreamOptions {
    pub fn new(input_kind: StreamInputKind) -> Self {
        StreamOptions {
            input_kind,
            ..Self::default()
        }
    }

    pub fn error_mode(mut self, mode: ErrorMode) -> Self {
        self.error_mode = mode;
        self
    }

    pub fn xml_item_path(mut self, path: impl Into<String>) -> Self {
        self.xml_item_path = Some(path.into());
        self
    }

    fn validate(&self) -> Result<(), StreamError> {
        let encoding = self.encoding.trim().to_ascii_lowercase();
        if encoding != "utf-8" && encoding != "utf8" {
            return Err(StreamError::UnsupportedEncoding(self.encoding.clone()));
        }
        if self.input_kind == StreamInputKind::XmlElements
            && self.xml_item_path.as_deref().map_or(true, |p| p.trim().is_empty())
        {
            return Err(StreamError::MissingItemPath);
        }
        Ok(())
    }
}

// ──────────────────────────────────────────────
// Errors
// ──────────────────────────────────────────────

/// Fatal stream failures. Under [`ErrorMode::ContinueWithReport`] only
/// setup and I/O failures are fatal; item failures become results.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("unsupported encoding '{0}' (only utf-8 is supported)")]
    UnsupportedEncoding(String),
    #[error("xmlItemPath is required for XML element streams")]
    MissingItemPath,
    #[error("read failed: {0}")]
    Io(#[from] io::Error),
    #[error("JSON array stream must contain a top-level array, found {0}")]
    NotAnArray(&'static str),
    #[error("item {index}: {source}")]
    Parse {
        index: usize,
        #[source]
        source: CodecError,
    },
    #[error("item {index}: conversion failed: {}", errors.join("; "))]
    Conversion { index: usize, errors: Vec<String> },
}

// ──────────────────────────────────────────────
// Stream
// ──────────────────────────────────────────────

type Items<'a> = Box<dyn Iterator<Item = Result<Value, StreamError>> + 'a>;

/// Lazy sequence of per-item results.
pub struct ConversionStream<'a> {
    items: Items<'a>,
    plan: &'a CompiledPlan,
    options: &'a ExecOptions,
    error_mode: ErrorMode,
    index: usize,
    done: bool,
}

/// Start converting `reader` with `plan`. Setup failures (bad options, a
/// JSON array input that is not an array) are returned here; per-item
/// failures come out of the iterator.
pub fn convert_stream<'a, R: Read + 'a>(
    reader: R,
    plan: &'a CompiledPlan,
    stream: &StreamOptions,
    options: &'a ExecOptions,
) -> Result<ConversionStream<'a>, StreamError> {
    stream.validate()?;
    let mut reader = BufReader::new(reader);
    skip_bom(&mut reader)?;

    let items: Items<'a> = match stream.input_kind {
        StreamInputKind::JsonArray => {
            let mut text = String::new();
            reader.read_to_string(&mut text)?;
            let doc: serde_json::Value = serde_json::from_str(&text).map_err(|e| StreamError::Parse {
                index: 0,
                source: CodecError::Json(e),
            })?;
            match doc {
                serde_json::Value::Array(values) => Box::new(values.into_iter().map(|v| Ok::<_, StreamError>(Value::from(v)))),
                other => return Err(StreamError::NotAnArray(Value::from(other).type_name())),
            }
        }
        StreamInputKind::Ndjson => Box::new(lines(reader).enumerate().map(|(i, line)| {
            let line = line?;
            serde_json::from_str::<serde_json::Value>(&line)
                .map(Value::from)
                .map_err(|e| StreamError::Parse {
                    index: i,
                    source: CodecError::Json(e),
                })
        })),
        StreamInputKind::QueryLines => Box::new(lines(reader).map(|line| -> Result<Value, StreamError> { Ok(query::parse(&line?)) })),
        StreamInputKind::XmlElements => {
            let path = stream.xml_item_path.clone().unwrap_or_default();
            Box::new(
                XmlItemReader::new(reader, &path)
                    .enumerate()
                    .map(|(i, item)| item.map_err(|source| StreamError::Parse { index: i, source })),
            )
        }
    };
    debug!(kind = ?stream.input_kind, mode = ?stream.error_mode, "stream started");
    Ok(ConversionStream {
        items,
        plan,
        options,
        error_mode: stream.error_mode,
        index: 0,
        done: false,
    })
}

/// Non-blank lines, without their line terminators.
fn lines<R: BufRead>(reader: R) -> impl Iterator<Item = io::Result<String>> {
    reader.lines().filter(|line| match line {
        Ok(text) => !text.trim().is_empty(),
        Err(_) => true,
    })
}

fn skip_bom<R: BufRead>(reader: &mut R) -> io::Result<()> {
    const BOM: &[u8] = &[0xEF, 0xBB, 0xBF];
    if reader.fill_buf()?.starts_with(BOM) {
        reader.consume(BOM.len());
    }
    Ok(())
}

impl Iterator for ConversionStream<'_> {
    type Item = Result<ConversionResult, StreamError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let item = self.items.next()?;
        let index = self.index;
        self.index += 1;
        debug!(index, "stream item");

        let fail_fast = self.error_mode == ErrorMode::FailFast;
        let input = match item {
            Ok(v) => v,
            // I/O failures end the stream in either mode
            Err(e @ StreamError::Io(_)) => {
                self.done = true;
                return Some(Err(e));
            }
            Err(e) if fail_fast => {
                self.done = true;
                return Some(Err(e));
            }
            Err(e) => {
                return Some(Ok(ConversionResult {
                    output: Value::Null,
                    errors: vec![e.to_string()],
                    warnings: Vec::new(),
                }))
            }
        };
        let result = self.plan.execute(&input, self.options);
        if fail_fast && !result.is_ok() {
            self.done = true;
            return Some(Err(StreamError::Conversion {
                index,
                errors: result.errors,
            }));
        }
        Some(Ok(result))
    }
}
