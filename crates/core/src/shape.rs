//! Helpers for reading shape-polymorphic JSON responses.
//!
//! Backends report the same concept under several field names and wrap
//! lists differently between versions. These helpers are used only at the
//! client boundary; orchestration code sees canonical types.

use serde_json::Value;

/// Look up a dotted path such as `"config.destination_port"`.
pub fn at_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(value, |current, key| current.get(key))
        .filter(|v| !v.is_null())
}

/// First path that holds a string (numbers are stringified).
pub fn first_string(value: &Value, paths: &[&str]) -> Option<String> {
    paths.iter().find_map(|path| match at_path(value, path)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// First path that holds an integer (numeric strings are parsed).
pub fn first_i64(value: &Value, paths: &[&str]) -> Option<i64> {
    paths.iter().find_map(|path| as_i64(at_path(value, path)?))
}

/// First path that holds a boolean.
pub fn first_bool(value: &Value, paths: &[&str]) -> Option<bool> {
    paths.iter().find_map(|path| at_path(value, path)?.as_bool())
}

/// Interpret a number or numeric string as `i64`.
pub fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Extract a list that may be a bare array or wrapped under one of `keys`.
///
/// A single object that is not a wrapper is treated as a one-element list,
/// which covers endpoints that answer a lookup with the entity itself.
pub fn extract_list(value: &Value, keys: &[&str]) -> Vec<Value> {
    match value {
        Value::Array(items) => items.clone(),
        Value::Object(map) => {
            for key in keys {
                match map.get(*key) {
                    Some(Value::Array(items)) => return items.clone(),
                    Some(inner @ Value::Object(_)) => return extract_list(inner, keys),
                    _ => {}
                }
            }
            if map.is_empty() {
                Vec::new()
            } else {
                vec![value.clone()]
            }
        }
        _ => Vec::new(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn path_lookup() {
        let v = json!({ "config": { "destination_port": 10001 } });
        assert_eq!(first_i64(&v, &["port", "config.destination_port"]), Some(10001));
        assert!(at_path(&v, "config.missing").is_none());
    }

    #[test]
    fn numeric_strings_accepted() {
        let v = json!({ "id": "42" });
        assert_eq!(first_i64(&v, &["id"]), Some(42));
        assert_eq!(first_string(&json!({ "id": 7 }), &["id"]), Some("7".into()));
    }

    #[test]
    fn null_fields_are_skipped() {
        let v = json!({ "name": null, "label": "studio" });
        assert_eq!(first_string(&v, &["name", "label"]), Some("studio".into()));
    }

    #[test]
    fn list_shapes() {
        let keys = ["data", "items"];
        assert_eq!(extract_list(&json!([{ "id": 1 }]), &keys).len(), 1);
        assert_eq!(extract_list(&json!({ "data": [{ "id": 1 }, { "id": 2 }] }), &keys).len(), 2);
        assert_eq!(
            extract_list(&json!({ "data": { "items": [{ "id": 1 }] } }), &keys).len(),
            1
        );
        assert_eq!(extract_list(&json!({ "id": 1 }), &keys).len(), 1);
        assert!(extract_list(&json!({}), &keys).is_empty());
        assert!(extract_list(&json!(null), &keys).is_empty());
    }
}
