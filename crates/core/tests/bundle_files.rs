//! Bundling from real files on disk.

use mapwright_core::{load_bundle, normalize_rules, BundleError};
use serde_json::json;
use std::fs;

fn field(out: &str) -> serde_json::Value {
    json!({"kind": "field", "outputPaths": [out], "source": {"type": "path", "path": out}})
}

#[test]
fn bundle_from_disk_normalizes_cleanly() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir(dir.path().join("common")).unwrap();
    fs::write(
        dir.path().join("main.json"),
        json!({"outputFormat": "xml", "include": ["common/address.json"], "rules": [field("name"), {"use": "city"}]})
            .to_string(),
    )
    .unwrap();
    fs::write(
        dir.path().join("common/address.json"),
        json!({"fragments": {"city": field("city")}, "rules": [field("street")]}).to_string(),
    )
    .unwrap();

    let doc = load_bundle(&dir.path().join("main.json")).unwrap();
    assert!(doc.get("include").is_none());

    let rules = normalize_rules(&doc);
    assert!(rules.validation_errors.is_empty(), "{:?}", rules.validation_errors);
    assert_eq!(rules.rules.len(), 3);
    assert_eq!(rules.output_format.as_str(), "xml");
}

#[test]
fn missing_root_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = load_bundle(&dir.path().join("absent.json")).unwrap_err();
    assert!(matches!(err, BundleError::Io { .. }));
}

#[test]
fn circular_include_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("a.json"), json!({"include": ["b.json"], "rules": []}).to_string()).unwrap();
    fs::write(dir.path().join("b.json"), json!({"include": ["a.json"], "rules": []}).to_string()).unwrap();
    let err = load_bundle(&dir.path().join("a.json")).unwrap_err();
    assert_eq!(
        err.to_string(),
        "circular include detected: a.json \u{2192} b.json \u{2192} a.json"
    );
}
