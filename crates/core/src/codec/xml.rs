//! XML <-> [`Value`].
//!
//! Mapping rules:
//!
//! - the document becomes `{ <root-tag>: <content> }`
//! - a leaf element (no attributes, no children) collapses to its text,
//!   scalar-coerced (`<n>42</n>` is the number 42)
//! - attributes become `@_<name>` keys; text beside children becomes `#text`
//! - repeated sibling tags accumulate into a list
//!
//! Formatting is the inverse. A single top-level key names the root
//! element; anything else is wrapped in `<root>`.

use crate::coerce::parse_scalar;
use crate::error::CodecError;
use crate::value::{accumulate, Map, Value};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::io::BufRead;

pub const ATTRIBUTE_PREFIX: &str = "@_";
pub const TEXT_KEY: &str = "#text";
const WRAPPER_ROOT: &str = "root";
const ARRAY_ITEM: &str = "item";

// ──────────────────────────────────────────────
// Tree building
// ──────────────────────────────────────────────

struct Frame {
    name: String,
    attrs: Vec<(String, Value)>,
    children: Map,
    text: String,
}

/// Incremental element-to-value builder shared by the whole-document
/// parser and the streaming item reader.
#[derive(Default)]
struct TreeBuilder {
    stack: Vec<Frame>,
}

impl TreeBuilder {
    fn open(&mut self, name: String, attrs: Vec<(String, Value)>) {
        self.stack.push(Frame {
            name,
            attrs,
            children: Map::new(),
            text: String::new(),
        });
    }

    fn text(&mut self, text: &str) {
        if let Some(frame) = self.stack.last_mut() {
            frame.text.push_str(text);
        }
    }

    /// Close the innermost element. Returns the finished element when it
    /// was the outermost one.
    fn close(&mut self) -> Option<(String, Value)> {
        let frame = self.stack.pop()?;
        let value = if frame.attrs.is_empty() && frame.children.is_empty() {
            parse_scalar(&frame.text)
        } else {
            let mut map = Map::new();
            for (k, v) in frame.attrs {
                map.insert(format!("{ATTRIBUTE_PREFIX}{k}"), v);
            }
            for (k, v) in frame.children {
                map.insert(k, v);
            }
            if !frame.text.is_empty() {
                map.insert(TEXT_KEY.to_string(), parse_scalar(&frame.text));
            }
            Value::Object(map)
        };
        match self.stack.last_mut() {
            Some(parent) => {
                accumulate(&mut parent.children, frame.name, value);
                None
            }
            None => Some((frame.name, value)),
        }
    }

    fn depth(&self) -> usize {
        self.stack.len()
    }
}

/// Owned view of the reader events the builder cares about.
enum Step {
    Open(String, Vec<(String, Value)>),
    Leaf(String, Vec<(String, Value)>),
    Text(String),
    Close,
    Skip,
    Eof,
}

fn to_step<R>(event: Event<'_>, reader: &Reader<R>) -> Result<Step, CodecError> {
    let pos = reader.buffer_position() as u64;
    Ok(match event {
        Event::Start(e) => {
            let (name, attrs) = element_parts(&e, pos)?;
            Step::Open(name, attrs)
        }
        Event::Empty(e) => {
            let (name, attrs) = element_parts(&e, pos)?;
            Step::Leaf(name, attrs)
        }
        Event::Text(t) => {
            let text = t
                .unescape()
                .map_err(|e| CodecError::xml(e.to_string(), pos))?;
            Step::Text(text.into_owned())
        }
        Event::CData(c) => Step::Text(String::from_utf8_lossy(&c.into_inner()).into_owned()),
        Event::End(_) => Step::Close,
        Event::Eof => Step::Eof,
        _ => Step::Skip,
    })
}

fn element_parts(e: &BytesStart<'_>, pos: u64) -> Result<(String, Vec<(String, Value)>), CodecError> {
    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let mut attrs = Vec::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|err| CodecError::xml(err.to_string(), pos))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|err| CodecError::xml(err.to_string(), pos))?;
        attrs.push((key, parse_scalar(&value)));
    }
    Ok((name, attrs))
}

fn single_entry(name: String, value: Value) -> Value {
    let mut map = Map::new();
    map.insert(name, value);
    Value::Object(map)
}

// ──────────────────────────────────────────────
// Whole-document parse
// ──────────────────────────────────────────────

pub fn parse(text: &str) -> Result<Value, CodecError> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);
    let mut builder = TreeBuilder::default();
    let mut root: Option<(String, Value)> = None;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| CodecError::xml(e.to_string(), reader.buffer_position() as u64))?;
        let pos = reader.buffer_position() as u64;
        match to_step(event, &reader)? {
            Step::Open(name, _) | Step::Leaf(name, _) if builder.depth() == 0 && root.is_some() => {
                return Err(CodecError::xml(
                    format!("multiple root elements (second root is <{name}>)"),
                    pos,
                ));
            }
            Step::Open(name, attrs) => builder.open(name, attrs),
            Step::Leaf(name, attrs) => {
                builder.open(name, attrs);
                if let Some(done) = builder.close() {
                    root = Some(done);
                }
            }
            Step::Text(t) => {
                if builder.depth() == 0 {
                    if !t.trim().is_empty() {
                        return Err(CodecError::xml("text outside the root element", pos));
                    }
                } else {
                    builder.text(&t);
                }
            }
            Step::Close => {
                if let Some(done) = builder.close() {
                    root = Some(done);
                }
            }
            Step::Skip => {}
            Step::Eof => break,
        }
    }

    if builder.depth() > 0 {
        return Err(CodecError::xml(
            "unexpected end of document: unclosed element",
            reader.buffer_position() as u64,
        ));
    }
    match root {
        Some((name, value)) => Ok(single_entry(name, value)),
        None => Err(CodecError::xml("document has no root element", 0)),
    }
}

// ──────────────────────────────────────────────
// Streaming item reader
// ──────────────────────────────────────────────

/// Lazily yields every element whose tag path ends with `item_path`, as
/// `{ <tag>: <content> }`. Elements outside matches are never
/// materialized, so memory stays proportional to one item.
pub struct XmlItemReader<R: BufRead> {
    reader: Reader<R>,
    buf: Vec<u8>,
    item_path: Vec<String>,
    open_tags: Vec<String>,
    capture: Option<TreeBuilder>,
    done: bool,
}

impl<R: BufRead> XmlItemReader<R> {
    /// `item_path` is dotted (`orders.order`); a leading `$.` is ignored.
    pub fn new(source: R, item_path: &str) -> Self {
        let trimmed = item_path.trim();
        let trimmed = trimmed.strip_prefix("$.").unwrap_or(trimmed);
        let mut reader = Reader::from_reader(source);
        reader.config_mut().trim_text(true);
        XmlItemReader {
            reader,
            buf: Vec::new(),
            item_path: trimmed
                .split('.')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            open_tags: Vec::new(),
            capture: None,
            done: false,
        }
    }

    fn matches_item_path(&self) -> bool {
        !self.item_path.is_empty() && self.open_tags.ends_with(&self.item_path)
    }

    fn fail(&mut self, err: CodecError) -> Option<Result<Value, CodecError>> {
        self.done = true;
        Some(Err(err))
    }
}

impl<R: BufRead> Iterator for XmlItemReader<R> {
    type Item = Result<Value, CodecError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            self.buf.clear();
            let step = match self.reader.read_event_into(&mut self.buf) {
                Ok(event) => to_step(event, &self.reader),
                Err(e) => Err(CodecError::xml(
                    e.to_string(),
                    self.reader.buffer_position() as u64,
                )),
            };
            let step = match step {
                Ok(step) => step,
                Err(err) => return self.fail(err),
            };
            match step {
                Step::Open(name, attrs) => {
                    self.open_tags.push(name.clone());
                    if let Some(builder) = self.capture.as_mut() {
                        builder.open(name, attrs);
                    } else if self.matches_item_path() {
                        let mut builder = TreeBuilder::default();
                        builder.open(name, attrs);
                        self.capture = Some(builder);
                    }
                }
                Step::Leaf(name, attrs) => {
                    self.open_tags.push(name.clone());
                    let starts_item = self.capture.is_none() && self.matches_item_path();
                    self.open_tags.pop();
                    if let Some(builder) = self.capture.as_mut() {
                        builder.open(name, attrs);
                        builder.close();
                    } else if starts_item {
                        let mut builder = TreeBuilder::default();
                        builder.open(name, attrs);
                        if let Some((name, value)) = builder.close() {
                            return Some(Ok(single_entry(name, value)));
                        }
                    }
                }
                Step::Text(t) => {
                    if let Some(builder) = self.capture.as_mut() {
                        builder.text(&t);
                    }
                }
                Step::Close => {
                    self.open_tags.pop();
                    let finished = self.capture.as_mut().and_then(TreeBuilder::close);
                    if let Some((name, value)) = finished {
                        self.capture = None;
                        return Some(Ok(single_entry(name, value)));
                    }
                }
                Step::Skip => {}
                Step::Eof => {
                    self.done = true;
                    if !self.open_tags.is_empty() {
                        let pos = self.reader.buffer_position() as u64;
                        return Some(Err(CodecError::xml(
                            "unexpected end of document: unclosed element",
                            pos,
                        )));
                    }
                    return None;
                }
            }
        }
    }
}

// ──────────────────────────────────────────────
// Formatting
// ──────────────────────────────────────────────

pub fn format(value: &Value, pretty: bool) -> Result<String, CodecError> {
    let mut out = String::new();
    match value {
        Value::Object(map) if map.len() == 1 => {
            if let Some((name, content)) = map.iter().next() {
                write_element(&mut out, name, content, 0, pretty)?;
            }
        }
        other => write_element(&mut out, WRAPPER_ROOT, other, 0, pretty)?,
    }
    Ok(out)
}

fn write_element(
    out: &mut String,
    name: &str,
    value: &Value,
    level: usize,
    pretty: bool,
) -> Result<(), CodecError> {
    check_name(name)?;
    indent(out, level, pretty);
    match value {
        Value::Null => {
            out.push('<');
            out.push_str(name);
            out.push_str("/>");
        }
        Value::Array(items) => {
            open_tag(out, name, &[]);
            for item in items {
                newline(out, pretty);
                write_element(out, ARRAY_ITEM, item, level + 1, pretty)?;
            }
            if !items.is_empty() {
                newline(out, pretty);
                indent(out, level, pretty);
            }
            close_tag(out, name);
        }
        Value::Object(map) => {
            let mut attrs = Vec::new();
            let mut text = None;
            let mut children = Vec::new();
            for (k, v) in map {
                if let Some(attr) = k.strip_prefix(ATTRIBUTE_PREFIX) {
                    check_name(attr)?;
                    attrs.push((attr, v.to_text()));
                } else if k == TEXT_KEY {
                    text = Some(v.to_text());
                } else {
                    children.push((k.as_str(), v));
                }
            }
            if children.is_empty() && text.is_none() {
                out.push('<');
                out.push_str(name);
                push_attrs(out, &attrs);
                out.push_str("/>");
                return Ok(());
            }
            open_tag(out, name, &attrs);
            if let Some(text) = &text {
                out.push_str(&quick_xml::escape::escape(text.as_str()));
            }
            for (child, v) in &children {
                match v {
                    Value::Array(items) => {
                        for item in items {
                            newline(out, pretty);
                            write_element(out, child, item, level + 1, pretty)?;
                        }
                    }
                    other => {
                        newline(out, pretty);
                        write_element(out, child, other, level + 1, pretty)?;
                    }
                }
            }
            if !children.is_empty() {
                newline(out, pretty);
                indent(out, level, pretty);
            }
            close_tag(out, name);
        }
        scalar => {
            open_tag(out, name, &[]);
            out.push_str(&quick_xml::escape::escape(scalar.to_text().as_str()));
            close_tag(out, name);
        }
    }
    Ok(())
}

fn open_tag(out: &mut String, name: &str, attrs: &[(&str, String)]) {
    out.push('<');
    out.push_str(name);
    push_attrs(out, attrs);
    out.push('>');
}

fn push_attrs(out: &mut String, attrs: &[(&str, String)]) {
    for (k, v) in attrs {
        out.push(' ');
        out.push_str(k);
        out.push_str("=\"");
        out.push_str(&quick_xml::escape::escape(v.as_str()));
        out.push('"');
    }
}

fn close_tag(out: &mut String, name: &str) {
    out.push_str("</");
    out.push_str(name);
    out.push('>');
}

fn newline(out: &mut String, pretty: bool) {
    if pretty {
        out.push('\n');
    }
}

fn indent(out: &mut String, level: usize, pretty: bool) {
    if pretty {
        out.push_str(&"  ".repeat(level));
    }
}

fn check_name(name: &str) -> Result<(), CodecError> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_' || c == ':');
    let valid_rest = chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | ':'));
    if valid_start && valid_rest {
        Ok(())
    } else {
        Err(CodecError::format(
            "xml",
            format!("'{name}' is not a valid element or attribute name"),
        ))
    }
}
