//! Property tests for codec round-trips, query determinism and idempotent
//! normalization.

use mapwright_core::codec::{json, query};
use mapwright_core::{normalize_rules, Map, Value};
use proptest::prelude::*;

fn scalar() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i32>().prop_map(|n| Value::Number(f64::from(n))),
        (-100_000i32..100_000, 0u8..4).prop_map(|(n, q)| Value::Number(f64::from(n) + f64::from(q) * 0.25)),
        "[a-zA-Z0-9 _&=%+-]{0,12}".prop_map(Value::String),
    ]
}

fn document() -> impl Strategy<Value = Value> {
    scalar().prop_recursive(4, 48, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..5).prop_map(Value::Array),
            prop::collection::vec(("[a-z]{1,6}", inner), 0..5)
                .prop_map(|pairs| Value::Object(pairs.into_iter().collect::<Map>())),
        ]
    })
}

fn flat_object() -> impl Strategy<Value = Vec<(String, Value)>> {
    prop::collection::btree_map("[a-z]{1,5}", scalar(), 1..8).prop_map(|m| m.into_iter().collect())
}

fn rule_node() -> impl Strategy<Value = serde_json::Value> {
    let field = ("[a-z]{1,4}(\\.[a-z]{1,4})?", "[a-z]{1,4}", proptest::option::of("[a-z0-9]{0,3}"))
        .prop_map(|(out, path, default)| {
            let mut node = serde_json::json!({
                "kind": "field",
                "outputPaths": [format!(" $.{out} "), out],
                "source": {"type": "path", "path": path}
            });
            if let Some(d) = default {
                node["defaultValue"] = serde_json::json!(d);
            }
            node
        });
    field.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            ("[a-z]{1,4}", prop::collection::vec(inner.clone(), 0..3)).prop_map(|(p, items)| {
                serde_json::json!({"kind": "array", "inputPath": p, "outputPaths": [p], "itemRules": items})
            }),
            (prop::collection::vec(inner.clone(), 0..3), prop::collection::vec(inner, 0..3))
                .prop_map(|(then, otherwise)| {
                    serde_json::json!({"kind": "branch", "expression": " exists(a) ", "then": then, "else": otherwise})
                }),
        ]
    })
}

proptest! {
    #[test]
    fn json_round_trip(v in document()) {
        let text = json::format(&v, false).unwrap();
        let back = json::parse(&text).unwrap();
        prop_assert_eq!(back, v);
    }

    #[test]
    fn query_output_ignores_insertion_order(pairs in flat_object()) {
        let forward: Map = pairs.iter().cloned().collect();
        let backward: Map = pairs.iter().rev().cloned().collect();
        let a = query::format(&Value::Object(forward)).unwrap();
        let b = query::format(&Value::Object(backward)).unwrap();
        prop_assert_eq!(a, b);
    }

    #[test]
    fn normalization_is_idempotent(rules in prop::collection::vec(rule_node(), 0..5)) {
        let doc = serde_json::json!({"rules": rules});
        let once = normalize_rules(&doc);
        let twice = normalize_rules(once.clone());
        prop_assert_eq!(once, twice);
    }
}
