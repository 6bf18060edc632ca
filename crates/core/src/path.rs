//! Dotted/indexed path reads and writes over [`Value`] trees.
//!
//! Path grammar: segments separated by `.`, with bracket suffixes
//! `[0]`, `['key']`, `["key"]` or `[key]`. A bare all-digit segment is an
//! array index. `[]` is accepted and ignored (query strings use it for
//! "append").

use crate::value::{Map, Value};
use serde::{Deserialize, Serialize};

/// Indices above this are treated as object keys when creating containers,
/// so a hostile `a[999999999]` cannot allocate a huge array.
pub const MAX_CREATED_INDEX: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Key(String),
    Index(usize),
}

/// Split path text into segments. Never fails; malformed brackets are
/// read as literal key text.
pub fn parse_path(path: &str) -> Vec<Segment> {
    let chars: Vec<char> = path.chars().collect();
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut pos = 0usize;

    while pos < chars.len() {
        let c = chars[pos];
        match c {
            '.' => {
                flush_bare(&mut current, &mut segments);
                pos += 1;
            }
            '[' => {
                let Some(close) = chars[pos + 1..].iter().position(|&ch| ch == ']') else {
                    current.push(c);
                    pos += 1;
                    continue;
                };
                flush_bare(&mut current, &mut segments);
                let inner: String = chars[pos + 1..pos + 1 + close].iter().collect();
                pos += close + 2;
                let inner = inner.trim();
                if inner.is_empty() {
                    continue;
                }
                let quoted = inner.len() >= 2
                    && ((inner.starts_with('\'') && inner.ends_with('\''))
                        || (inner.starts_with('"') && inner.ends_with('"')));
                if quoted {
                    segments.push(Segment::Key(inner[1..inner.len() - 1].to_string()));
                } else {
                    segments.push(bare_segment(inner));
                }
            }
            _ => {
                current.push(c);
                pos += 1;
            }
        }
    }
    flush_bare(&mut current, &mut segments);
    segments
}

fn flush_bare(current: &mut String, segments: &mut Vec<Segment>) {
    if !current.is_empty() {
        segments.push(bare_segment(current));
        current.clear();
    }
}

fn bare_segment(text: &str) -> Segment {
    if !text.is_empty() && text.bytes().all(|b| b.is_ascii_digit()) {
        if let Ok(i) = text.parse::<usize>() {
            return Segment::Index(i);
        }
    }
    Segment::Key(text.to_string())
}

/// Read `path` out of `doc`. An empty path yields the document itself.
pub fn get_path<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = doc;
    for segment in parse_path(path) {
        current = match (&segment, current) {
            (Segment::Key(k), Value::Object(map)) => map.get(k)?,
            (Segment::Index(i), Value::Array(items)) => items.get(*i)?,
            (Segment::Index(i), Value::Object(map)) => map.get(&i.to_string())?,
            _ => return None,
        };
    }
    Some(current)
}

/// Resolve a source or array path with root/item precedence.
///
/// `$` is the whole root; `$.x` and `$[..]` always read the root; any
/// other path reads the current item when one is set, else the root.
pub fn resolve_scoped<'a>(root: &'a Value, item: Option<&'a Value>, path: &str) -> Option<&'a Value> {
    let path = path.trim();
    if path.is_empty() {
        return None;
    }
    if path == "$" {
        return Some(root);
    }
    if let Some(rest) = path.strip_prefix("$.") {
        return get_path(root, rest);
    }
    if path.starts_with("$[") {
        return get_path(root, &path[1..]);
    }
    match item {
        Some(item) => get_path(item, path),
        None => get_path(root, path),
    }
}

/// What happens when an output write lands on a slot that already holds a
/// non-null value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CollisionPolicy {
    /// Later writes replace earlier ones.
    #[default]
    Overwrite,
    /// The first write wins; later writes are dropped silently.
    KeepFirst,
    /// A second write is reported as an error.
    Error,
}

impl std::str::FromStr for CollisionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "overwrite" => Ok(CollisionPolicy::Overwrite),
            "keep-first" | "keepfirst" => Ok(CollisionPolicy::KeepFirst),
            "error" => Ok(CollisionPolicy::Error),
            other => Err(format!(
                "unknown collision policy '{other}' (expected overwrite, keep-first or error)"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum WriteError {
    #[error("output path is empty")]
    Empty,
    #[error("output path '{path}' is already written")]
    Occupied { path: String },
    #[error("cannot write '{path}': a {found} value is in the way")]
    Conflict { path: String, found: &'static str },
}

/// Write `value` at `path` inside `target`, creating intermediate objects
/// and arrays. `$` addresses the root: objects merge key by key, anything
/// else replaces the root.
pub fn set_path(
    target: &mut Value,
    path: &str,
    value: Value,
    policy: CollisionPolicy,
) -> Result<(), WriteError> {
    let path = path.trim();
    if path == "$" {
        return write_root(target, value, policy);
    }
    let path = path.strip_prefix("$.").unwrap_or(path);
    let segments = parse_path(path);
    if segments.is_empty() {
        return Err(WriteError::Empty);
    }

    let mut current = target;
    let last = segments.len() - 1;
    for (i, segment) in segments.iter().enumerate() {
        let next_is_index = matches!(segments.get(i + 1), Some(Segment::Index(n)) if *n <= MAX_CREATED_INDEX);
        let slot = step_into(current, segment, path, policy)?;
        if i == last {
            return write_slot(slot, value, path, policy);
        }
        let needs_container = match &*slot {
            Value::Object(_) | Value::Array(_) => false,
            Value::Null => true,
            other => {
                if policy != CollisionPolicy::Overwrite {
                    return Err(WriteError::Conflict {
                        path: path.to_string(),
                        found: other.type_name(),
                    });
                }
                true
            }
        };
        if needs_container {
            *slot = if next_is_index {
                Value::Array(Vec::new())
            } else {
                Value::object()
            };
        }
        current = slot;
    }
    Ok(())
}

/// Return the child slot for `segment`, creating it as `Null` if absent.
fn step_into<'a>(
    container: &'a mut Value,
    segment: &Segment,
    path: &str,
    policy: CollisionPolicy,
) -> Result<&'a mut Value, WriteError> {
    let array_slot = matches!(
        (&*container, segment),
        (Value::Array(_), Segment::Index(i)) if *i <= MAX_CREATED_INDEX
    );
    if !array_slot && matches!(container, Value::Array(_)) {
        if policy != CollisionPolicy::Overwrite {
            return Err(WriteError::Conflict {
                path: path.to_string(),
                found: "array",
            });
        }
        *container = Value::object();
    }
    let found = container.type_name();
    let conflict = || WriteError::Conflict {
        path: path.to_string(),
        found,
    };
    match container {
        Value::Array(items) => match segment {
            Segment::Index(i) if *i <= MAX_CREATED_INDEX => {
                if items.len() <= *i {
                    items.resize(*i + 1, Value::Null);
                }
                Ok(&mut items[*i])
            }
            _ => Err(conflict()),
        },
        Value::Object(map) => {
            let key = match segment {
                Segment::Key(k) => k.clone(),
                Segment::Index(i) => i.to_string(),
            };
            Ok(map.entry(key).or_insert(Value::Null))
        }
        _ => Err(conflict()),
    }
}

fn write_slot(
    slot: &mut Value,
    value: Value,
    path: &str,
    policy: CollisionPolicy,
) -> Result<(), WriteError> {
    if slot.is_null() {
        *slot = value;
        return Ok(());
    }
    match policy {
        CollisionPolicy::Overwrite => {
            *slot = value;
            Ok(())
        }
        CollisionPolicy::KeepFirst => Ok(()),
        CollisionPolicy::Error => Err(WriteError::Occupied {
            path: path.to_string(),
        }),
    }
}

fn write_root(target: &mut Value, value: Value, policy: CollisionPolicy) -> Result<(), WriteError> {
    match (target, value) {
        (Value::Object(existing), Value::Object(incoming)) => {
            merge_into(existing, incoming, policy)
        }
        (target, value) => {
            let occupied = match &*target {
                Value::Null => false,
                Value::Object(map) => !map.is_empty(),
                _ => true,
            };
            if occupied {
                match policy {
                    CollisionPolicy::KeepFirst => return Ok(()),
                    CollisionPolicy::Error => {
                        return Err(WriteError::Occupied {
                            path: "$".to_string(),
                        })
                    }
                    CollisionPolicy::Overwrite => {}
                }
            }
            *target = value;
            Ok(())
        }
    }
}

fn merge_into(existing: &mut Map, incoming: Map, policy: CollisionPolicy) -> Result<(), WriteError> {
    for (key, value) in incoming {
        let slot = existing.entry(key.clone()).or_insert(Value::Null);
        write_slot(slot, value, &key, policy)?;
    }
    Ok(())
}
