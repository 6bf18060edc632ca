//! CLI integration tests for every subcommand.
//!
//! Uses `assert_cmd` to spawn the `mapwright` binary and verify
//! exit codes, stdout content, and stderr content.
//!
//! Each test runs inside its own temporary directory so that no stray
//! `mapwright.toml` is picked up.

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::json;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Helper: create a Command for the `mapwright` binary, rooted at `dir`.
fn mapwright(dir: &Path) -> Command {
    let mut cmd = cargo_bin_cmd!("mapwright");
    cmd.current_dir(dir);
    cmd.env_remove("RUST_LOG");
    cmd
}

fn write(dir: &Path, name: &str, contents: &str) {
    fs::write(dir.join(name), contents).expect("write fixture");
}

fn write_json(dir: &Path, name: &str, value: serde_json::Value) {
    write(dir, name, &serde_json::to_string_pretty(&value).expect("serialize fixture"));
}

fn name_rules() -> serde_json::Value {
    json!({
        "schemaVersion": "2.0.0",
        "rules": [
            {"kind": "field", "outputPaths": ["person.name"], "source": {"type": "path", "path": "name"}, "defaultValue": "unknown"},
            {"kind": "field", "outputPaths": ["person.upper"], "source": {"type": "transform", "path": "name", "transform": "toUpperCase"}, "defaultValue": ""}
        ]
    })
}

// ──────────────────────────────────────────────
// 1. Help and version
// ──────────────────────────────────────────────

#[test]
fn help_exits_0_with_description() {
    let dir = TempDir::new().unwrap();
    mapwright(dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Rule-driven JSON, XML and query-string conversion"));
}

#[test]
fn version_exits_0() {
    let dir = TempDir::new().unwrap();
    mapwright(dir.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("mapwright"));
}

#[test]
fn missing_subcommand_fails() {
    let dir = TempDir::new().unwrap();
    mapwright(dir.path()).assert().failure();
}

// ──────────────────────────────────────────────
// 2. convert
// ──────────────────────────────────────────────

#[test]
fn convert_file_to_stdout() {
    let dir = TempDir::new().unwrap();
    write_json(dir.path(), "rules.json", name_rules());
    write(dir.path(), "in.json", r#"{"name": "Ada"}"#);

    mapwright(dir.path())
        .args(["convert", "rules.json", "in.json"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#"{"person":{"name":"Ada","upper":"ADA"}}"#));
}

#[test]
fn convert_reads_stdin() {
    let dir = TempDir::new().unwrap();
    write_json(dir.path(), "rules.json", name_rules());

    mapwright(dir.path())
        .args(["convert", "rules.json"])
        .write_stdin("{}")
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""name":"unknown""#));
}

#[test]
fn convert_json_output_reports_errors_and_exits_1() {
    let dir = TempDir::new().unwrap();
    write_json(
        dir.path(),
        "rules.json",
        json!({"rules": [
            {"kind": "array", "inputPath": "items", "outputPaths": ["items"], "itemRules": []},
            {"kind": "field", "outputPaths": ["ok"], "source": {"type": "constant", "value": "yes"}}
        ]}),
    );
    write(dir.path(), "in.json", r#"{"items": "not a list"}"#);

    let out = mapwright(dir.path())
        .args(["--output", "json", "convert", "rules.json", "in.json"])
        .assert()
        .failure()
        .get_output()
        .stdout
        .clone();
    let result: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(result["output"], json!({"ok": "yes"}));
    assert_eq!(result["errors"].as_array().unwrap().len(), 1);
    assert!(result["errors"][0].as_str().unwrap().starts_with("rules[0]"));
}

#[test]
fn convert_collision_policy_flag() {
    let dir = TempDir::new().unwrap();
    write_json(
        dir.path(),
        "rules.json",
        json!({"rules": [
            {"kind": "field", "outputPaths": ["x"], "source": {"type": "constant", "value": "first"}},
            {"kind": "field", "outputPaths": ["x"], "source": {"type": "constant", "value": "second"}}
        ]}),
    );
    write(dir.path(), "in.json", "{}");

    mapwright(dir.path())
        .args(["convert", "rules.json", "in.json"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#"{"x":"second"}"#));

    mapwright(dir.path())
        .args(["convert", "rules.json", "in.json", "--collision-policy", "keep-first"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#"{"x":"first"}"#));

    mapwright(dir.path())
        .args(["convert", "rules.json", "in.json", "--collision-policy", "error"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error: rules[1]"));
}

#[test]
fn convert_unparseable_input_fails() {
    let dir = TempDir::new().unwrap();
    write_json(dir.path(), "rules.json", name_rules());
    write(dir.path(), "in.json", "{ not json");

    mapwright(dir.path())
        .args(["convert", "rules.json", "in.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("conversion error"));
}

#[test]
fn convert_missing_rules_file_fails() {
    let dir = TempDir::new().unwrap();
    mapwright(dir.path())
        .args(["--output", "json", "convert", "nope.json", "in.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains(r#""error""#))
        .stderr(predicate::str::contains("error loading rules"));
}

// ──────────────────────────────────────────────
// 3. Config file
// ──────────────────────────────────────────────

#[test]
fn config_file_sets_defaults_and_flags_override() {
    let dir = TempDir::new().unwrap();
    write_json(
        dir.path(),
        "rules.json",
        json!({"rules": [
            {"kind": "field", "outputPaths": ["x"], "source": {"type": "constant", "value": "first"}},
            {"kind": "field", "outputPaths": ["x"], "source": {"type": "constant", "value": "second"}}
        ]}),
    );
    write(dir.path(), "in.json", "{}");
    write(
        dir.path(),
        "mapwright.toml",
        "[engine]\ncollision_policy = \"keep-first\"\n",
    );

    mapwright(dir.path())
        .args(["convert", "rules.json", "in.json"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#"{"x":"first"}"#));

    mapwright(dir.path())
        .args(["convert", "rules.json", "in.json", "--collision-policy", "overwrite"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#"{"x":"second"}"#));
}

#[test]
fn explicit_config_must_exist() {
    let dir = TempDir::new().unwrap();
    write_json(dir.path(), "rules.json", name_rules());
    mapwright(dir.path())
        .args(["--config", "missing.toml", "lint", "rules.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing.toml"));
}

#[test]
fn invalid_config_is_reported() {
    let dir = TempDir::new().unwrap();
    write_json(dir.path(), "rules.json", name_rules());
    write(dir.path(), "mapwright.toml", "[engine]\nbogus = 1\n");
    mapwright(dir.path())
        .args(["lint", "rules.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid config"));
}

// ──────────────────────────────────────────────
// 4. lint and doctor
// ──────────────────────────────────────────────

#[test]
fn lint_clean_rules_exit_0() {
    let dir = TempDir::new().unwrap();
    write_json(dir.path(), "rules.json", name_rules());
    mapwright(dir.path())
        .args(["lint", "rules.json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("0 error(s), 0 warning(s)"));
}

#[test]
fn lint_invalid_expression_exits_1() {
    let dir = TempDir::new().unwrap();
    write_json(
        dir.path(),
        "rules.json",
        json!({"rules": [
            {"kind": "branch", "expression": "path(a) equals 1", "then": []}
        ]}),
    );
    mapwright(dir.path())
        .args(["lint", "rules.json"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("[invalid-expression]"))
        .stdout(predicate::str::contains("rules[0]"));
}

#[test]
fn lint_json_output_is_an_array() {
    let dir = TempDir::new().unwrap();
    write_json(
        dir.path(),
        "rules.json",
        json!({"rules": [{"kind": "field", "outputPaths": ["a"], "source": {"type": "path", "path": "a"}}]}),
    );
    let out = mapwright(dir.path())
        .args(["--output", "json", "lint", "rules.json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let diags: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(diags[0]["code"], "missing-default");
    assert_eq!(diags[0]["severity"], "warning");
    assert_eq!(diags[0]["rulePath"], "rules[0]");
}

#[test]
fn doctor_without_sample_skips_runtime_checks() {
    let dir = TempDir::new().unwrap();
    write_json(dir.path(), "rules.json", name_rules());
    mapwright(dir.path())
        .args(["doctor", "rules.json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("runtime-checks-skipped"));
}

#[test]
fn doctor_with_sample_reports_runtime_errors() {
    let dir = TempDir::new().unwrap();
    write_json(
        dir.path(),
        "rules.json",
        json!({"rules": [
            {"kind": "array", "inputPath": "items", "outputPaths": ["items"], "itemRules": []}
        ]}),
    );
    write(dir.path(), "sample.json", r#"{"items": 3}"#);

    let out = mapwright(dir.path())
        .args(["--output", "json", "doctor", "rules.json", "--sample", "sample.json"])
        .assert()
        .failure()
        .get_output()
        .stdout
        .clone();
    let report: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(report["hasErrors"], true);
    assert_eq!(report["diagnostics"][0]["code"], "runtime-error");
    assert!(report["safeFixes"][0].as_str().unwrap().starts_with("rules[0]: "));
}

// ──────────────────────────────────────────────
// 5. compat
// ──────────────────────────────────────────────

#[test]
fn compat_defaults_to_runtime_schema() {
    let dir = TempDir::new().unwrap();
    write_json(dir.path(), "rules.json", name_rules());
    mapwright(dir.path())
        .args(["compat", "rules.json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("compatible with schema 2.0.0"));
}

#[test]
fn compat_newer_rules_exit_1() {
    let dir = TempDir::new().unwrap();
    write_json(dir.path(), "rules.json", name_rules());
    mapwright(dir.path())
        .args(["compat", "rules.json", "--target", "1.9.0"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("schema-too-new"));
}

#[test]
fn compat_target_from_config() {
    let dir = TempDir::new().unwrap();
    write_json(dir.path(), "rules.json", name_rules());
    write(dir.path(), "mapwright.toml", "[engine]\ntarget_schema_version = \"1.0.0\"\n");
    mapwright(dir.path())
        .args(["--output", "json", "compat", "rules.json"])
        .assert()
        .failure()
        .stdout(predicate::str::contains(r#""isCompatible": false"#));
}

// ──────────────────────────────────────────────
// 6. bundle
// ──────────────────────────────────────────────

#[test]
fn bundle_inlines_includes() {
    let dir = TempDir::new().unwrap();
    write_json(
        dir.path(),
        "shared.json",
        json!({"rules": [{"kind": "field", "outputPaths": ["a"], "source": {"type": "constant", "value": "1"}}]}),
    );
    write_json(
        dir.path(),
        "main.json",
        json!({
            "schemaVersion": "2.0.0",
            "include": ["shared.json"],
            "rules": [{"kind": "field", "outputPaths": ["b"], "source": {"type": "constant", "value": "2"}}]
        }),
    );

    let out = mapwright(dir.path())
        .args(["bundle", "main.json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let doc: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert!(doc.get("include").is_none());
    let outputs: Vec<&str> = doc["rules"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["outputPaths"][0].as_str().unwrap())
        .collect();
    assert_eq!(outputs, vec!["a", "b"]);

    mapwright(dir.path())
        .args(["convert", "main.json"])
        .write_stdin("{}")
        .assert()
        .success()
        .stdout(predicate::str::contains(r#"{"a":1,"b":2}"#));
}

#[test]
fn bundle_cycle_fails() {
    let dir = TempDir::new().unwrap();
    write_json(dir.path(), "a.json", json!({"include": ["b.json"], "rules": []}));
    write_json(dir.path(), "b.json", json!({"include": ["a.json"], "rules": []}));
    mapwright(dir.path())
        .args(["bundle", "a.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("circular include detected"));
}

// ──────────────────────────────────────────────
// 7. stream
// ──────────────────────────────────────────────

fn item_rules() -> serde_json::Value {
    json!({"rules": [
        {"kind": "field", "outputPaths": ["id"], "source": {"type": "path", "path": "id"}, "defaultValue": "0"}
    ]})
}

#[test]
fn stream_ndjson_one_line_per_item() {
    let dir = TempDir::new().unwrap();
    write_json(dir.path(), "rules.json", item_rules());
    write(dir.path(), "in.ndjson", "{\"id\": 1}\n\n{\"id\": 2}\n");

    mapwright(dir.path())
        .args(["stream", "rules.json", "in.ndjson", "--kind", "ndjson"])
        .assert()
        .success()
        .stdout(predicate::eq("{\"id\":1}\n{\"id\":2}\n"));
}

#[test]
fn stream_json_array_from_stdin() {
    let dir = TempDir::new().unwrap();
    write_json(dir.path(), "rules.json", item_rules());

    mapwright(dir.path())
        .args(["stream", "rules.json"])
        .write_stdin(r#"[{"id": 7}, {}]"#)
        .assert()
        .success()
        .stdout(predicate::eq("{\"id\":7}\n{\"id\":0}\n"));
}

#[test]
fn stream_fail_fast_stops_at_bad_item() {
    let dir = TempDir::new().unwrap();
    write_json(dir.path(), "rules.json", item_rules());
    write(dir.path(), "in.ndjson", "{\"id\": 1}\nnot json\n{\"id\": 3}\n");

    mapwright(dir.path())
        .args(["stream", "rules.json", "in.ndjson", "--kind", "ndjson"])
        .assert()
        .failure()
        .stdout(predicate::eq("{\"id\":1}\n"))
        .stderr(predicate::str::contains("item 1"));
}

#[test]
fn stream_continue_reports_and_keeps_going() {
    let dir = TempDir::new().unwrap();
    write_json(dir.path(), "rules.json", item_rules());
    write(dir.path(), "in.ndjson", "{\"id\": 1}\nnot json\n{\"id\": 3}\n");

    mapwright(dir.path())
        .args(["stream", "rules.json", "in.ndjson", "--kind", "ndjson", "--error-mode", "continue"])
        .assert()
        .failure()
        .stdout(predicate::eq("{\"id\":1}\n{\"id\":3}\n"))
        .stderr(predicate::str::contains("item 1: error"))
        .stderr(predicate::str::contains("1 item(s) failed"));
}

#[test]
fn stream_xml_elements_need_item_path() {
    let dir = TempDir::new().unwrap();
    write_json(
        dir.path(),
        "rules.json",
        json!({"inputFormat": "xml", "rules": [
            {"kind": "field", "outputPaths": ["id"], "source": {"type": "path", "path": "order.@_id"}, "defaultValue": ""}
        ]}),
    );
    write(
        dir.path(),
        "orders.xml",
        r#"<orders><order id="1"/><order id="2"/></orders>"#,
    );

    mapwright(dir.path())
        .args(["stream", "rules.json", "orders.xml", "--kind", "xml-elements"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("xmlItemPath is required"));

    mapwright(dir.path())
        .args([
            "stream",
            "rules.json",
            "orders.xml",
            "--kind",
            "xml-elements",
            "--item-path",
            "orders.order",
        ])
        .assert()
        .success()
        .stdout(predicate::eq("{\"id\":1}\n{\"id\":2}\n"));
}

#[test]
fn stream_xml_fail_fast_stops_at_truncated_document() {
    let dir = TempDir::new().unwrap();
    write_json(
        dir.path(),
        "rules.json",
        json!({"inputFormat": "xml", "rules": [
            {"kind": "field", "outputPaths": ["id"], "source": {"type": "path", "path": "order.@_id"}}
        ]}),
    );
    write(dir.path(), "orders.xml", r#"<orders><order id="1"/><order id="2">"#);

    let args = ["stream", "rules.json", "orders.xml", "--kind", "xml-elements", "--item-path", "orders.order"];
    mapwright(dir.path())
        .args(args)
        .assert()
        .failure()
        .stdout(predicate::eq("{\"id\":1}\n"))
        .stderr(predicate::str::contains("item 1: invalid XML"));

    mapwright(dir.path())
        .args(args)
        .args(["--error-mode", "continue"])
        .assert()
        .failure()
        .stdout(predicate::eq("{\"id\":1}\n"))
        .stderr(predicate::str::contains("item 1: error: item 1: invalid XML"))
        .stderr(predicate::str::contains("1 item(s) failed"));
}

#[test]
fn stream_rejects_unknown_encoding() {
    let dir = TempDir::new().unwrap();
    write_json(dir.path(), "rules.json", item_rules());
    mapwright(dir.path())
        .args(["stream", "rules.json", "--encoding", "latin-1"])
        .write_stdin("[]")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unsupported encoding"));
}

// ──────────────────────────────────────────────
// 8. profile
// ──────────────────────────────────────────────

#[test]
fn profile_json_report() {
    let dir = TempDir::new().unwrap();
    write_json(dir.path(), "rules.json", name_rules());
    write(dir.path(), "in.json", r#"{"name": "Ada"}"#);

    let out = mapwright(dir.path())
        .args(["--output", "json", "profile", "rules.json", "in.json", "--iterations", "5"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let report: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(report["iterations"], 5);
    assert_eq!(report["errors"], 0);
    assert!(report["p95Us"].as_f64().unwrap() >= report["p50Us"].as_f64().unwrap());
}

#[test]
fn profile_text_report() {
    let dir = TempDir::new().unwrap();
    write_json(dir.path(), "rules.json", name_rules());
    write(dir.path(), "in.json", r#"{"name": "Ada"}"#);

    mapwright(dir.path())
        .args(["profile", "rules.json", "in.json", "--iterations", "3"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Profile (3 iterations"))
        .stdout(predicate::str::contains("p95"));
}
