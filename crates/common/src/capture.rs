//! Variable capture from JSON documents and URLs
//!
//! Only names in the capture allow-list are ever written to the store.
//! Traversal is depth-first in document order: array elements by index,
//! object entries in insertion order, with a key match recorded before the
//! entry's value is descended into. The last write for a name wins.

use serde_json::Value;
use url::Url;

use crate::types::Variables;

/// Capture allow-listed query parameters from an absolute URL
///
/// Strings that do not parse as URLs yield nothing. Empty parameter values
/// are not captured.
pub fn capture_from_url(raw: &str, capture_vars: &[String], store: &mut Variables) {
    let Ok(parsed) = Url::parse(raw) else {
        return;
    };
    for name in capture_vars {
        let value = parsed
            .query_pairs()
            .find(|(key, _)| key == name.as_str())
            .map(|(_, value)| value.into_owned());
        if let Some(value) = value.filter(|v| !v.is_empty()) {
            store.insert(name.clone(), value);
        }
    }
}

/// Capture allow-listed values from any JSON value
pub fn capture_from_value(value: &Value, capture_vars: &[String], store: &mut Variables) {
    if capture_vars.is_empty() {
        return;
    }
    match value {
        Value::String(s) => capture_from_url(s, capture_vars, store),
        Value::Array(items) => {
            for item in items {
                capture_from_value(item, capture_vars, store);
            }
        }
        Value::Object(map) => {
            for (key, entry) in map {
                if let Value::String(s) = entry {
                    if capture_vars.iter().any(|name| name == key) {
                        store.insert(key.clone(), s.clone());
                    }
                }
                capture_from_value(entry, capture_vars, store);
            }
        }
        _ => {}
    }
}
