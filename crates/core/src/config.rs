//! Installation configuration values.
//!
//! Configuration is an opaque JSON object owned by the integration that
//! declared it; the core only stores, merges and matches it.

use serde_json::Value;

use crate::error::DomainError;

/// JSON object holding an installation's configuration.
pub type ConfigMap = serde_json::Map<String, Value>;

/// True when every key in `expected` is present in `config` with an equal value.
pub fn contains_all(config: &ConfigMap, expected: &ConfigMap) -> bool {
    expected
        .iter()
        .all(|(key, value)| config.get(key) == Some(value))
}

/// Deep copy of `base` with `overrides` applied on top (top-level keys only).
pub fn merged(base: &ConfigMap, overrides: ConfigMap) -> ConfigMap {
    let mut out = base.clone();
    for (key, value) in overrides {
        out.insert(key, value);
    }
    out
}

/// Interpret an arbitrary JSON value as a config object.
///
/// `null` is accepted as "no config".
pub fn from_value(value: Value) -> Result<ConfigMap, DomainError> {
    match value {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(ConfigMap::new()),
        other => Err(DomainError::InvalidConfig(json_kind(&other))),
    }
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn map(value: Value) -> ConfigMap {
        from_value(value).unwrap()
    }

    #[test]
    fn contains_all_matches_subsets() {
        let config = map(json!({"shop": "a.myshopify.com", "secret": "s"}));
        assert!(contains_all(&config, &map(json!({"shop": "a.myshopify.com"}))));
        assert!(contains_all(&config, &ConfigMap::new()));
        assert!(!contains_all(&config, &map(json!({"shop": "b.myshopify.com"}))));
        assert!(!contains_all(&config, &map(json!({"missing": null}))));
    }

    #[test]
    fn merged_overrides_without_touching_base() {
        let base = map(json!({"token": "a", "region": "eu"}));
        let out = merged(&base, map(json!({"token": "b"})));
        assert_eq!(out, map(json!({"token": "b", "region": "eu"})));
        assert_eq!(base["token"], "a");
    }

    proptest! {
        #[test]
        fn merged_contains_overrides_and_keeps_other_keys(
            base in prop::collection::btree_map("[a-z]{1,4}", any::<i64>(), 0..6),
            overrides in prop::collection::btree_map("[a-z]{1,4}", any::<i64>(), 0..6),
        ) {
            let to_map = |m: &std::collections::BTreeMap<String, i64>| -> ConfigMap {
                m.iter().map(|(k, v)| (k.clone(), Value::from(*v))).collect()
            };
            let base = to_map(&base);
            let overrides = to_map(&overrides);
            let out = merged(&base, overrides.clone());

            prop_assert!(contains_all(&out, &overrides));
            for (key, value) in &base {
                if !overrides.contains_key(key) {
                    prop_assert_eq!(out.get(key), Some(value));
                }
            }
        }
    }

    #[test]
    fn from_value_rejects_non_objects() {
        assert!(from_value(json!([1, 2])).is_err());
        assert!(from_value(Value::Null).unwrap().is_empty());
    }
}
