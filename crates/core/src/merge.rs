// crates/core/src/merge.rs
//! Structured patch merge for nested JSON payloads.

use serde_json::{Map, Value};

/// Merge `patch` into `target`, key by key.
///
/// - array values replace wholesale
/// - object values merge recursively (a missing or non-object existing value
///   counts as an empty object)
/// - scalars and `null` overwrite
///
/// A non-object `patch` leaves `target` untouched; a non-object `target`
/// is replaced by `patch`. `target`'s storage is reused.
pub fn merge(target: Value, patch: &Value) -> Value {
    let Value::Object(patch_map) = patch else {
        return target;
    };
    let Value::Object(mut target_map) = target else {
        return patch.clone();
    };

    for (key, value) in patch_map {
        let merged = match value {
            Value::Object(_) => {
                let existing = match target_map.remove(key) {
                    Some(obj @ Value::Object(_)) => obj,
                    _ => Value::Object(Map::new()),
                };
                merge(existing, value)
            }
            other => other.clone(),
        };
        target_map.insert(key.clone(), merged);
    }
    Value::Object(target_map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_arrays_replace_wholesale() {
        let out = merge(json!({"tags": [1, 2, 3]}), &json!({"tags": [9]}));
        assert_eq!(out, json!({"tags": [9]}));
    }

    #[test]
    fn test_objects_merge_recursively() {
        let out = merge(
            json!({"a": {"x": 1, "y": {"deep": true}}, "keep": "me"}),
            &json!({"a": {"y": {"more": 2}, "z": 3}}),
        );
        assert_eq!(
            out,
            json!({"a": {"x": 1, "y": {"deep": true, "more": 2}, "z": 3}, "keep": "me"})
        );
    }

    #[test]
    fn test_scalars_and_null_overwrite() {
        let out = merge(json!({"a": 1, "b": {"c": 2}}), &json!({"a": "s", "b": null}));
        assert_eq!(out, json!({"a": "s", "b": null}));
    }

    #[test]
    fn test_object_over_scalar_starts_fresh() {
        let out = merge(json!({"a": 5}), &json!({"a": {"b": 1}}));
        assert_eq!(out, json!({"a": {"b": 1}}));
    }

    #[test]
    fn test_non_object_patch_returns_target() {
        let target = json!({"a": 1});
        assert_eq!(merge(target.clone(), &json!([1, 2])), target);
        assert_eq!(merge(target.clone(), &json!("x")), target);
        assert_eq!(merge(target.clone(), &Value::Null), target);
    }

    #[test]
    fn test_non_object_target_returns_patch() {
        assert_eq!(merge(Value::Null, &json!({"a": 1})), json!({"a": 1}));
        assert_eq!(merge(json!([1]), &json!({"a": 1})), json!({"a": 1}));
    }

    #[test]
    fn test_disjoint_patches_compose() {
        let t = json!({"base": 0});
        let p1 = json!({"one": {"x": 1}});
        let p2 = json!({"two": [1, 2]});
        let stepwise = merge(merge(t.clone(), &p1), &p2);
        let combined = merge(t, &json!({"one": {"x": 1}, "two": [1, 2]}));
        assert_eq!(stepwise, combined);
    }

    #[test]
    fn test_scalar_patch_is_idempotent() {
        let p = json!({"a": 1, "b": [1, 2], "c": {"d": "e"}});
        let once = merge(json!({"z": true}), &p);
        let twice = merge(once.clone(), &p);
        assert_eq!(once, twice);
    }
}
