//! End-to-end conversions through compiled plans.

use mapwright_core::{normalize_rules, parse_expression, Value};
use mapwright_eval::{evaluate, execute, CompiledPlan, ExecOptions, Scope, TransformRegistry};
use proptest::prelude::*;
use serde_json::json;
use std::sync::Arc;
use std::thread;

fn run(rules: serde_json::Value, input: serde_json::Value) -> mapwright_eval::ConversionResult {
    let plan = CompiledPlan::compile(&rules);
    plan.execute(&Value::from(input), &ExecOptions::default())
}

#[test]
fn field_into_nested_output() {
    let result = run(
        json!({"rules": [{"kind": "field", "outputPaths": ["user.name"], "source": {"type": "path", "path": "name"}}]}),
        json!({"name": "Ada"}),
    );
    assert!(result.errors.is_empty());
    assert_eq!(result.output.to_json(), json!({"user": {"name": "Ada"}}));
}

#[test]
fn single_object_promoted_to_list() {
    let result = run(
        json!({"rules": [{
            "kind": "array", "inputPath": "items", "outputPaths": ["users"], "coerceSingle": true,
            "itemRules": [{"kind": "field", "outputPaths": ["name"], "source": {"type": "path", "path": "name"}}]
        }]}),
        json!({"items": {"name": "Ada"}}),
    );
    assert!(result.errors.is_empty());
    assert_eq!(result.output.to_json(), json!({"users": [{"name": "Ada"}]}));
}

#[test]
fn equals_suggests_eq() {
    let err = parse_expression("path(name) equals 'Ada'").unwrap_err();
    assert!(err.to_string().contains("Did you mean 'eq' or '=='?"));
}

#[test]
fn self_referencing_fragment_is_rejected_not_recursed() {
    let rules = normalize_rules(&json!({
        "fragments": {"loop": {"kind": "branch", "expression": "true", "then": [{"use": "loop"}]}},
        "rules": [{"use": "loop"}]
    }));
    assert!(rules
        .validation_errors
        .iter()
        .any(|e| e.contains("fragment cycle detected")));
    let result = execute(&rules, &Value::object(), &ExecOptions::default());
    assert!(!result.errors.is_empty());
}

#[test]
fn deeply_nested_conditions_report_an_error() {
    let mut source = json!({"type": "path", "path": "x"});
    for _ in 0..40 {
        source = json!({"type": "condition", "expression": "true", "trueSource": source});
    }
    let result = run(
        json!({"rules": [
            {"kind": "field", "outputPaths": ["deep"], "source": source},
            {"kind": "field", "outputPaths": ["ok"], "source": {"type": "constant", "value": "1"}}
        ]}),
        json!({"x": 1}),
    );
    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].contains("source nesting exceeds 32 levels"));
    assert_eq!(result.output.to_json(), json!({"ok": 1}));
}

#[test]
fn custom_transforms_come_from_the_caller() {
    let plan = CompiledPlan::compile(&json!({"rules": [
        {"kind": "field", "outputPaths": ["slug"], "source": {"type": "transform", "path": "title", "transform": "custom:slug"}}
    ]}));
    let input = Value::from(json!({"title": "Hello World"}));

    let bare = plan.execute(&input, &ExecOptions::default());
    assert_eq!(bare.errors, vec!["rules[0]: no custom transform registered as 'slug'"]);

    let transforms = TransformRegistry::new().with("slug", |v| {
        Ok(Value::from(v.to_text().to_lowercase().replace(' ', "-")))
    });
    let options = ExecOptions::default().with_transforms(transforms);
    let result = plan.execute(&input, &options);
    assert!(result.errors.is_empty());
    assert_eq!(result.output.to_json(), json!({"slug": "hello-world"}));
}

#[test]
fn nan_numbers_serialize_quietly() {
    let plan = CompiledPlan::compile(&json!({"rules": [
        {"kind": "field", "outputPaths": ["n"], "source": {"type": "transform", "path": "v", "transform": "number"}}
    ]}));
    let conversion = plan.convert(r#"{"v": "abc"}"#, &ExecOptions::default(), false).unwrap();
    assert_eq!(conversion.body, r#"{"n":null}"#);
}

#[test]
fn long_boolean_chains_evaluate_iteratively() {
    let chain = vec!["path(ok) == 1"; 100_000].join(" && ");
    let expr = parse_expression(&chain).unwrap();
    let yes = Value::from(json!({"ok": 1}));
    let no = Value::from(json!({"ok": 2}));
    assert_eq!(evaluate(&expr, &Scope::root(&yes)), Value::Bool(true));
    assert_eq!(evaluate(&expr, &Scope::root(&no)), Value::Bool(false));

    let any = format!("{} || true", vec!["false"; 200_000].join(" || "));
    let expr = parse_expression(&any).unwrap();
    assert!(expr.is_constant());
    assert_eq!(evaluate(&expr, &Scope::root(&Value::Null)), Value::Bool(true));

    let plan = CompiledPlan::compile(&json!({"rules": [
        {"kind": "branch", "expression": chain,
         "then": [{"kind": "field", "outputPaths": ["branch"], "source": {"type": "constant", "value": "hit"}}],
         "else": [{"kind": "field", "outputPaths": ["branch"], "source": {"type": "constant", "value": "miss"}}]},
        {"kind": "field", "outputPaths": ["matched"],
         "source": {"type": "condition", "expression": chain, "outputMode": "match"}}
    ]}));
    let result = plan.execute(&yes, &ExecOptions::default());
    assert!(result.errors.is_empty(), "{:?}", result.errors);
    assert_eq!(result.output.to_json(), json!({"branch": "hit", "matched": true}));
    let result = plan.execute(&no, &ExecOptions::default());
    assert_eq!(result.output.to_json(), json!({"branch": "miss", "matched": false}));
}

#[test]
fn deeply_grouped_expressions_are_rejected_cleanly() {
    let nested = format!("{}true{}", "(".repeat(100_000), ")".repeat(100_000));
    let err = parse_expression(&nested).unwrap_err();
    assert!(err.message.contains("nests too deeply"));

    let plan = CompiledPlan::compile(&json!({"rules": [
        {"kind": "branch", "expression": nested,
         "then": [{"kind": "field", "outputPaths": ["never"], "source": {"type": "constant", "value": "x"}}]},
        {"kind": "field", "outputPaths": ["ok"], "source": {"type": "constant", "value": "1"}}
    ]}));
    let result = plan.execute(&Value::object(), &ExecOptions::default());
    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].starts_with("rules[0]"));
    assert!(result.errors[0].contains("nests too deeply"));
    assert_eq!(result.output.to_json(), json!({"ok": 1}));
}

#[test]
fn plans_are_shared_across_threads() {
    let plan = Arc::new(CompiledPlan::compile(&json!({"rules": [
        {"kind": "field", "outputPaths": ["double"], "source": {"type": "path", "path": "n"}}
    ]})));
    let handles: Vec<_> = (0..4)
        .map(|i| {
            let plan = Arc::clone(&plan);
            thread::spawn(move || {
                let result = plan.execute(&Value::from(json!({"n": i})), &ExecOptions::default());
                result.output.to_json()
            })
        })
        .collect();
    for (i, handle) in handles.into_iter().enumerate() {
        assert_eq!(handle.join().unwrap(), json!({"double": i}));
    }
}

fn arm(value: &str) -> serde_json::Value {
    json!([{"kind": "field", "outputPaths": [format!("arm_{value}")], "source": {"type": "constant", "value": "x"}}])
}

proptest! {
    #[test]
    fn at_most_one_branch_arm_writes(n in -50i32..50, has_else in any::<bool>()) {
        let mut branch = json!({
            "kind": "branch",
            "expression": "path(n) > 20",
            "then": arm("then"),
            "elseIf": [
                {"expression": "path(n) > 0", "then": arm("a")},
                {"expression": "path(n) > -20", "then": arm("b")}
            ]
        });
        if has_else {
            branch["else"] = arm("else");
        }
        let result = run(json!({"rules": [branch]}), json!({"n": n}));
        let written = result.output.as_object().map(|m| m.len()).unwrap_or(0);
        let expected = if n > -20 || has_else { 1 } else { 0 };
        prop_assert_eq!(written, expected);
    }
}
