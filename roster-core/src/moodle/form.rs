//! Flattening of nested parameters into Moodle's bracketed form keys

use serde_json::{Map, Value};

/// Flatten `params` into `(key, value)` pairs.
///
/// Nested objects become `prefix[key]`, arrays `prefix[index]`. Booleans are
/// sent as `1`/`0` and nulls as the empty string.
pub fn flatten_params(params: &Map<String, Value>) -> Vec<(String, String)> {
    let mut flattened = Vec::new();
    for (key, value) in params {
        flatten_into(key.clone(), value, &mut flattened);
    }
    flattened
}

fn flatten_into(prefix: String, value: &Value, out: &mut Vec<(String, String)>) {
    match value {
        Value::Object(entries) => {
            for (key, nested) in entries {
                flatten_into(format!("{prefix}[{key}]"), nested, out);
            }
        }
        Value::Array(items) => {
            for (index, nested) in items.iter().enumerate() {
                flatten_into(format!("{prefix}[{index}]"), nested, out);
            }
        }
        Value::Bool(flag) => out.push((prefix, if *flag { "1" } else { "0" }.to_string())),
        Value::Null => out.push((prefix, String::new())),
        Value::Number(n) => out.push((prefix, n.to_string())),
        Value::String(s) => out.push((prefix, s.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pairs(value: Value) -> Vec<(String, String)> {
        match value {
            Value::Object(map) => flatten_params(&map),
            _ => panic!("test params must be an object"),
        }
    }

    #[test]
    fn test_flatten_nested_list_of_objects() {
        let flattened = pairs(json!({
            "criteria": [{"key": "idnumber", "value": "42"}]
        }));

        assert_eq!(
            flattened,
            vec![
                ("criteria[0][key]".to_string(), "idnumber".to_string()),
                ("criteria[0][value]".to_string(), "42".to_string()),
            ]
        );
    }

    #[test]
    fn test_flatten_scalars() {
        let flattened = pairs(json!({
            "users": [{"id": 7, "suspended": true, "department": null, "auth": "oidc"}]
        }));

        assert!(flattened.contains(&("users[0][id]".to_string(), "7".to_string())));
        assert!(flattened.contains(&("users[0][suspended]".to_string(), "1".to_string())));
        assert!(flattened.contains(&("users[0][department]".to_string(), String::new())));
        assert!(flattened.contains(&("users[0][auth]".to_string(), "oidc".to_string())));
        assert_eq!(flattened.len(), 4);
    }

    #[test]
    fn test_flatten_false_and_empty_collections() {
        let flattened = pairs(json!({"flag": false, "values": [], "extra": {}}));

        assert_eq!(flattened, vec![("flag".to_string(), "0".to_string())]);
    }
}
