//! File access for the include bundler.
//!
//! [`RuleFiles`] keeps the bundler independent of `std::fs` so include
//! graphs can be resolved from memory (tests, embedders that store rule
//! documents elsewhere).

use std::collections::HashMap;
use std::io;
use std::path::{Component, Path, PathBuf};

pub trait RuleFiles {
    /// Read a rules document as text.
    fn read(&self, path: &Path) -> io::Result<String>;

    /// Resolve an `include` entry relative to the including file's directory.
    fn join(&self, base: &Path, include: &str) -> io::Result<PathBuf>;

    /// Stable identity of a file, used for de-duplication and cycle checks.
    fn canonical(&self, path: &Path) -> io::Result<PathBuf>;
}

/// Reads rule documents from disk.
pub struct DiskFiles;

impl RuleFiles for DiskFiles {
    fn read(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn join(&self, base: &Path, include: &str) -> io::Result<PathBuf> {
        Ok(base.join(include))
    }

    fn canonical(&self, path: &Path) -> io::Result<PathBuf> {
        path.canonicalize()
    }
}

/// Rule documents held in memory, keyed by path. `.` and `..` are
/// resolved lexically.
#[derive(Debug, Default, Clone)]
pub struct MemoryFiles {
    files: HashMap<PathBuf, String>,
}

impl MemoryFiles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, path: impl AsRef<Path>, text: impl Into<String>) -> Self {
        self.insert(path, text);
        self
    }

    pub fn insert(&mut self, path: impl AsRef<Path>, text: impl Into<String>) {
        self.files.insert(lexical(path.as_ref()), text.into());
    }
}

fn lexical(path: &Path) -> PathBuf {
    let mut parts: Vec<Component<'_>> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if matches!(parts.last(), Some(Component::Normal(_))) {
                    parts.pop();
                }
            }
            other => parts.push(other),
        }
    }
    parts.iter().collect()
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("no rules document at {}", path.display()),
    )
}

impl RuleFiles for MemoryFiles {
    fn read(&self, path: &Path) -> io::Result<String> {
        let key = lexical(path);
        self.files.get(&key).cloned().ok_or_else(|| not_found(&key))
    }

    fn join(&self, base: &Path, include: &str) -> io::Result<PathBuf> {
        Ok(lexical(&base.join(include)))
    }

    fn canonical(&self, path: &Path) -> io::Result<PathBuf> {
        let key = lexical(path);
        let known = self.files.contains_key(&key) || self.files.keys().any(|k| k.starts_with(&key));
        if known {
            Ok(key)
        } else {
            Err(not_found(&key))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lexical_resolves_dot_segments() {
        assert_eq!(lexical(Path::new("/a/b/../c/./d.json")), PathBuf::from("/a/c/d.json"));
    }

    #[test]
    fn memory_read_and_missing() {
        let files = MemoryFiles::new().with("/rules/main.json", "{}");
        assert_eq!(files.read(Path::new("/rules/./main.json")).unwrap(), "{}");
        let err = files.read(Path::new("/rules/other.json")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn memory_canonical_accepts_directories() {
        let files = MemoryFiles::new().with("/rules/common/a.json", "{}");
        assert_eq!(files.canonical(Path::new("/rules/common/../common")).unwrap(), PathBuf::from("/rules/common"));
        assert!(files.canonical(Path::new("/elsewhere")).is_err());
    }
}
