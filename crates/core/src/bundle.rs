//! Include bundling: resolve a rules document's `include` list into one
//! self-contained document.
//!
//! - included rules come before the including file's own rules, in
//!   include order, depth first
//! - a file reached twice (same canonical path) contributes once
//! - fragments merge; the including file's definitions win
//! - `schemaVersion` and formats come from the root document only
//! - an include may not leave the root document's directory
//!
//! The result is raw JSON: feed it to [`crate::normalize_rules`].

use crate::error::BundleError;
use crate::source::{DiskFiles, RuleFiles};
use serde_json::{Map as JsonMap, Value as Json};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Load `root` and every transitive include from disk.
pub fn load_bundle(root: &Path) -> Result<Json, BundleError> {
    load_bundle_with_provider(root, &DiskFiles)
}

/// Load `root` and every transitive include through `files`.
pub fn load_bundle_with_provider(root: &Path, files: &dyn RuleFiles) -> Result<Json, BundleError> {
    let canon_root = files.canonical(root).map_err(|source| BundleError::Io {
        path: root.to_owned(),
        source,
    })?;
    let root_dir = canon_root.parent().unwrap_or(Path::new(".")).to_owned();

    let mut walk = Walk {
        files,
        sandbox: root_dir,
        visited: HashSet::new(),
        stack: Vec::new(),
        stack_set: HashSet::new(),
    };

    let mut top = walk.read_object(root)?;
    walk.enter(&canon_root);
    let mut rules = Vec::new();
    let mut fragments = JsonMap::new();
    walk.includes(root, &canon_root, &top, &mut rules, &mut fragments)?;
    walk.stack.pop();
    walk.stack_set.remove(&canon_root);

    if let Some(Json::Object(local)) = top.get("fragments") {
        for (name, node) in local {
            fragments.insert(name.clone(), node.clone());
        }
    }
    let local_rules = match top.get("rules") {
        Some(Json::Array(local)) => Some(local.clone()),
        None => Some(Vec::new()),
        // left in place for the normalizer to report
        Some(_) => None,
    };
    top.shift_remove("include");
    if let Some(local) = local_rules {
        rules.extend(local);
        top.insert("rules".into(), Json::Array(rules));
    }
    if !fragments.is_empty() {
        top.insert("fragments".into(), Json::Object(fragments));
    }
    debug!(
        root = %root.display(),
        files = walk.visited.len() + 1,
        "bundled rules document"
    );
    Ok(Json::Object(top))
}

struct Walk<'a> {
    files: &'a dyn RuleFiles,
    sandbox: PathBuf,
    visited: HashSet<PathBuf>,
    /// Files being loaded, outermost first, for cycle messages.
    stack: Vec<PathBuf>,
    stack_set: HashSet<PathBuf>,
}

impl Walk<'_> {
    fn enter(&mut self, canon: &Path) {
        self.stack.push(canon.to_owned());
        self.stack_set.insert(canon.to_owned());
    }

    fn read_object(&self, path: &Path) -> Result<JsonMap<String, Json>, BundleError> {
        let text = self.files.read(path).map_err(|source| BundleError::Io {
            path: path.to_owned(),
            source,
        })?;
        let doc: Json = serde_json::from_str(&text).map_err(|source| BundleError::Parse {
            path: path.to_owned(),
            source,
        })?;
        match doc {
            Json::Object(map) => Ok(map),
            _ => Err(BundleError::NotAnObject {
                path: path.to_owned(),
            }),
        }
    }

    /// Load every include of the file whose parsed top level is `top`.
    fn includes(
        &mut self,
        path: &Path,
        canon: &Path,
        top: &JsonMap<String, Json>,
        rules: &mut Vec<Json>,
        fragments: &mut JsonMap<String, Json>,
    ) -> Result<(), BundleError> {
        let entries = match top.get("include") {
            None | Some(Json::Null) => return Ok(()),
            Some(Json::Array(entries)) => entries,
            Some(_) => {
                return Err(BundleError::Invalid {
                    path: path.to_owned(),
                    message: "'include' must be an array of relative paths".into(),
                })
            }
        };
        let base = canon.parent().unwrap_or(Path::new(".")).to_owned();

        for entry in entries {
            let Some(include) = entry.as_str().map(str::trim).filter(|s| !s.is_empty()) else {
                return Err(BundleError::Invalid {
                    path: path.to_owned(),
                    message: "'include' entries must be non-empty strings".into(),
                });
            };
            let resolved = self.files.join(&base, include).map_err(|source| BundleError::Io {
                path: base.join(include),
                source,
            })?;
            let canon_include = self.files.canonical(&resolved).map_err(|source| BundleError::Io {
                path: resolved.clone(),
                source,
            })?;
            if !canon_include.starts_with(&self.sandbox) {
                return Err(BundleError::OutsideRoot {
                    path: path.to_owned(),
                    include: include.to_string(),
                });
            }
            if self.stack_set.contains(&canon_include) {
                let mut chain: Vec<String> = self.stack.iter().map(|p| file_name(p)).collect();
                chain.push(file_name(&canon_include));
                return Err(BundleError::Cycle {
                    chain: chain.join(" \u{2192} "),
                });
            }
            if !self.visited.insert(canon_include.clone()) {
                continue;
            }

            debug!(include = %resolved.display(), "loading included rules");
            let included = self.read_object(&resolved)?;
            self.enter(&canon_include);
            self.includes(&resolved, &canon_include, &included, rules, fragments)?;
            self.stack.pop();
            self.stack_set.remove(&canon_include);

            match included.get("rules") {
                None | Some(Json::Null) => {}
                Some(Json::Array(local)) => rules.extend(local.iter().cloned()),
                Some(_) => {
                    return Err(BundleError::Invalid {
                        path: resolved,
                        message: "'rules' must be an array".into(),
                    })
                }
            }
            match included.get("fragments") {
                None | Some(Json::Null) => {}
                Some(Json::Object(local)) => {
                    for (name, node) in local {
                        fragments.insert(name.clone(), node.clone());
                    }
                }
                Some(_) => {
                    return Err(BundleError::Invalid {
                        path: resolved,
                        message: "'fragments' must be an object".into(),
                    })
                }
            }
        }
        Ok(())
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .unwrap_or_default()
        .to_string_lossy()
        .to_string()
}
