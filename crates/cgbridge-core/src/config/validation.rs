//! Config validation - warns about unknown fields

use serde_json::Value;
use std::collections::{HashMap, HashSet};
use tracing::warn;

/// Validate settings JSON and warn about unknown fields.
pub fn warn_unknown_fields(content: &str, config_name: &str) {
    let Ok(value) = serde_json::from_str::<Value>(content) else {
        return;
    };

    let expected = expected_settings_keys();
    for path in find_unknown_keys(&value, &expected, "") {
        warn!("Unknown config field in {config_name}: {path}");
    }
}

/// Find unknown keys in JSON value compared to expected keys.
/// Returns paths like "transport.unknownField" for unknown fields.
fn find_unknown_keys(value: &Value, expected: &ExpectedKeys, prefix: &str) -> Vec<String> {
    let mut unknowns = Vec::new();

    let Value::Object(obj) = value else {
        return unknowns;
    };

    for (key, child) in obj {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };

        if let Some(nested) = expected.nested.get(key.as_str()) {
            unknowns.extend(find_unknown_keys(child, nested, &path));
        } else if !expected.fields.contains(key.as_str()) {
            unknowns.push(path);
        }
    }

    unknowns
}

/// `fields` are leaf fields, `nested` are nested objects with their own expected keys.
struct ExpectedKeys {
    fields: HashSet<&'static str>,
    nested: HashMap<&'static str, ExpectedKeys>,
}

impl ExpectedKeys {
    fn new(fields: &[&'static str]) -> Self {
        Self {
            fields: fields.iter().copied().collect(),
            nested: HashMap::new(),
        }
    }

    fn with_nested(mut self, key: &'static str, nested: ExpectedKeys) -> Self {
        self.nested.insert(key, nested);
        self
    }
}

/// Expected keys for `Settings` (settings.rs)
fn expected_settings_keys() -> ExpectedKeys {
    let transport_keys = ExpectedKeys::new(&[
        "reconnection",
        "reconnectionAttempts",
        "reconnectionDelayMs",
        "reconnectionDelayMaxMs",
        "randomizationFactor",
        "connectTimeoutMs",
        "ackTimeoutMs",
    ]);

    ExpectedKeys::new(&["url", "token"]).with_nested("transport", transport_keys)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unknowns_of(json: &str) -> Vec<String> {
        let value: Value = serde_json::from_str(json).unwrap();
        find_unknown_keys(&value, &expected_settings_keys(), "")
    }

    #[test]
    fn test_valid_settings_no_warnings() {
        let unknowns = unknowns_of(
            r#"{
                "url": "http://localhost:9090",
                "token": "abc",
                "transport": {
                    "reconnectionAttempts": 5,
                    "ackTimeoutMs": 1000
                }
            }"#,
        );
        assert!(
            unknowns.is_empty(),
            "Expected no unknowns, got: {unknowns:?}"
        );
    }

    #[test]
    fn test_unknown_top_level_field() {
        assert_eq!(
            unknowns_of(r#"{"url": "http://x", "port": 9000}"#),
            vec!["port"]
        );
    }

    #[test]
    fn test_unknown_nested_field() {
        assert_eq!(
            unknowns_of(r#"{"transport": {"reconnectDelay": 100}}"#),
            vec!["transport.reconnectDelay"]
        );
    }

    #[test]
    fn test_multiple_unknown_fields() {
        let unknowns = unknowns_of(r#"{"transport": {"typo1": 1, "typo2": 2}, "bad": {}}"#);
        assert!(unknowns.contains(&"transport.typo1".to_string()));
        assert!(unknowns.contains(&"transport.typo2".to_string()));
        assert!(unknowns.contains(&"bad".to_string()));
    }

    #[test]
    fn test_warn_unknown_fields_does_not_panic_on_invalid_json() {
        warn_unknown_fields("not valid json", "test");
    }

    #[test]
    fn test_empty_config_no_warnings() {
        assert!(unknowns_of("{}").is_empty());
    }
}
