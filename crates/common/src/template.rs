//! `{{var}}` template rendering over JSON values
//!
//! Placeholders whose variable is not defined are left in place so that
//! unresolved markers stay visible in requests and logs.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::Value;

use crate::types::Variables;

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{([A-Za-z0-9_]+)\}\}").expect("placeholder pattern is valid"));

/// Render every placeholder in a string
pub fn apply_str(input: &str, variables: &Variables) -> String {
    PLACEHOLDER
        .replace_all(input, |caps: &Captures| match variables.get(&caps[1]) {
            Some(value) => value.clone(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Render a JSON value recursively
///
/// Strings are rendered, arrays element-wise, objects value-wise (keys are
/// never templated). Other values pass through unchanged.
pub fn apply(value: &Value, variables: &Variables) -> Value {
    match value {
        Value::String(s) => Value::String(apply_str(s, variables)),
        Value::Array(items) => Value::Array(items.iter().map(|item| apply(item, variables)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, entry)| (key.clone(), apply(entry, variables)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Merge variable layers; later layers take precedence
///
/// Callers pass `[global, module, captured]`.
pub fn merge_layers(layers: &[&Variables]) -> Variables {
    let mut merged = Variables::new();
    for layer in layers {
        merged.extend(layer.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vars(pairs: &[(&str, &str)]) -> Variables {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_replaces_known_placeholders() {
        let v = vars(&[("client_id", "abc"), ("port", "8443")]);
        assert_eq!(
            apply_str("https://host:{{port}}/auth?client_id={{client_id}}", &v),
            "https://host:8443/auth?client_id=abc"
        );
    }

    #[test]
    fn test_leaves_missing_placeholders_untouched() {
        assert_eq!(apply_str("{{missing}}", &Variables::new()), "{{missing}}");
        let v = vars(&[("a", "1")]);
        assert_eq!(apply_str("{{a}}-{{b}}", &v), "1-{{b}}");
    }

    #[test]
    fn test_ignores_non_identifier_braces() {
        let v = vars(&[("a", "1")]);
        assert_eq!(apply_str("{{ a }} {{a-b}} {a}", &v), "{{ a }} {{a-b}} {a}");
    }

    #[test]
    fn test_idempotent_on_resolved_input() {
        let v = vars(&[("code", "xyz"), ("state", "s1")]);
        let input = json!({"url": "cb?code={{code}}&state={{state}}", "list": ["{{code}}"]});
        let once = apply(&input, &v);
        assert_eq!(apply(&once, &v), once);
    }

    #[test]
    fn test_renders_nested_values_but_not_keys() {
        let v = vars(&[("token", "t-1"), ("key", "renamed")]);
        let input = json!({
            "{{key}}": "{{token}}",
            "nested": { "list": ["{{token}}", 3, true, null] }
        });
        let rendered = apply(&input, &v);
        assert_eq!(
            rendered,
            json!({
                "{{key}}": "t-1",
                "nested": { "list": ["t-1", 3, true, null] }
            })
        );
    }

    #[test]
    fn test_passes_scalars_through() {
        let v = vars(&[("a", "1")]);
        assert_eq!(apply(&json!(42), &v), json!(42));
        assert_eq!(apply(&json!(false), &v), json!(false));
        assert_eq!(apply(&Value::Null, &v), Value::Null);
    }

    #[test]
    fn test_merge_layer_precedence() {
        let global = vars(&[("a", "g")]);
        let module = vars(&[("a", "m"), ("b", "m")]);
        let captured = vars(&[("a", "c")]);
        let merged = merge_layers(&[&global, &module, &captured]);
        assert_eq!(merged["a"], "c");
        assert_eq!(merged["b"], "m");
        assert_eq!(merged.len(), 2);
    }
}
