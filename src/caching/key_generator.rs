//! # Cache Key Generator
//!
//! Builds the canonical fingerprint that identifies a logically equivalent
//! partner request. The key is the canonical JSON text of
//! `{"method", "url", "body", "partner"}`: top-level fields in that fixed order,
//! object keys sorted at every depth, ignored body fields replaced by `null`.
//! Keys are not hashed so maintenance operations can decode them again.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fmt;

use crate::core::types::HttpMethod;

/// Canonical fingerprint of a proxied request
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

/// Fields recovered from a stored key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyFields {
    pub method: String,
    pub url: String,
    pub body: Value,
    pub partner: String,
}

impl CacheKey {
    /// Build the key for a request to `partner`.
    ///
    /// Any object field named in `ignore_fields` is nulled wherever it appears in
    /// the body, so requests that differ only by nonces or salts share a key.
    pub fn build(
        method: HttpMethod,
        url: &str,
        body: &Value,
        partner: &str,
        ignore_fields: &BTreeSet<String>,
    ) -> Self {
        let body = null_ignored_fields(body, ignore_fields);

        // Value's Display is compact JSON and cannot fail
        let key = format!(
            "{{\"method\":{},\"url\":{},\"body\":{},\"partner\":{}}}",
            Value::String(method.as_str().to_string()),
            Value::String(url.to_string()),
            body,
            Value::String(partner.to_string()),
        );

        Self(key)
    }

    /// Wrap a raw key string received from a client or read from the store
    pub fn from_raw<S: Into<String>>(raw: S) -> Self {
        Self(raw.into())
    }

    /// Decode a key string back into its fields
    pub fn parse(raw: &str) -> Result<KeyFields, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// Decode this key back into its fields
    pub fn fields(&self) -> Result<KeyFields, serde_json::Error> {
        Self::parse(&self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Return a canonical copy of `value` with every field in `ignore` set to null.
///
/// Objects are rebuilt with keys inserted in sorted order, so the result
/// serializes identically regardless of the incoming field order. Sequences are
/// walked element by element; scalars pass through unchanged.
pub fn null_ignored_fields(value: &Value, ignore: &BTreeSet<String>) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();

            let mut canonical = Map::with_capacity(map.len());
            for key in keys {
                let field = if ignore.contains(key) {
                    Value::Null
                } else {
                    null_ignored_fields(&map[key.as_str()], ignore)
                };
                canonical.insert(key.clone(), field);
            }
            Value::Object(canonical)
        }
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| null_ignored_fields(item, ignore))
                .collect(),
        ),
        leaf => leaf.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ignore(fields: &[&str]) -> BTreeSet<String> {
        fields.iter().map(|f| f.to_string()).collect()
    }

    #[test]
    fn test_ignored_field_does_not_change_key() {
        let fields = ignore(&["salt"]);
        let a = CacheKey::build(
            HttpMethod::Post,
            "https://visa.test/pay",
            &json!({"amount": 10, "salt": "abc"}),
            "visa",
            &fields,
        );
        let b = CacheKey::build(
            HttpMethod::Post,
            "https://visa.test/pay",
            &json!({"amount": 10, "salt": "xyz"}),
            "visa",
            &fields,
        );
        assert_eq!(a, b);
    }

    #[test]
    fn test_non_ignored_field_changes_key() {
        let fields = ignore(&["salt"]);
        let a = CacheKey::build(
            HttpMethod::Post,
            "https://visa.test/pay",
            &json!({"amount": 10}),
            "visa",
            &fields,
        );
        let b = CacheKey::build(
            HttpMethod::Post,
            "https://visa.test/pay",
            &json!({"amount": 11}),
            "visa",
            &fields,
        );
        assert_ne!(a, b);
    }

    #[test]
    fn test_nested_and_sequence_fields_are_nulled() {
        let body = json!({
            "order": {"id": 7, "nonce": "n-1"},
            "items": [{"sku": "a", "nonce": "n-2"}, {"sku": "b", "nonce": "n-3"}],
            "nonce": "top"
        });

        let normalized = null_ignored_fields(&body, &ignore(&["nonce"]));
        assert_eq!(
            normalized,
            json!({
                "order": {"id": 7, "nonce": null},
                "items": [{"sku": "a", "nonce": null}, {"sku": "b", "nonce": null}],
                "nonce": null
            })
        );
    }

    #[test]
    fn test_ignored_container_is_nulled_not_walked() {
        let normalized = null_ignored_fields(
            &json!({"meta": {"trace": [1, 2, 3]}, "x": 1}),
            &ignore(&["meta"]),
        );
        assert_eq!(normalized, json!({"meta": null, "x": 1}));
    }

    #[test]
    fn test_field_order_does_not_change_key() {
        let a: Value = serde_json::from_str(r#"{"b": 1, "a": {"d": 2, "c": 3}}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"a": {"c": 3, "d": 2}, "b": 1}"#).unwrap();

        let ka = CacheKey::build(HttpMethod::Put, "https://x.test", &a, "p", &BTreeSet::new());
        let kb = CacheKey::build(HttpMethod::Put, "https://x.test", &b, "p", &BTreeSet::new());
        assert_eq!(ka, kb);
        assert!(ka.as_str().contains(r#""body":{"a":{"c":3,"d":2},"b":1}"#));
    }

    #[test]
    fn test_partners_never_collide() {
        let body = json!({"amount": 10});
        let a = CacheKey::build(HttpMethod::Post, "https://x.test", &body, "visa", &BTreeSet::new());
        let b = CacheKey::build(
            HttpMethod::Post,
            "https://x.test",
            &body,
            "mastercard",
            &BTreeSet::new(),
        );
        assert_ne!(a, b);
    }

    #[test]
    fn test_empty_ignore_set_and_null_body() {
        let key = CacheKey::build(
            HttpMethod::Get,
            "https://x.test/items?page=2",
            &Value::Null,
            "shop",
            &BTreeSet::new(),
        );
        assert_eq!(
            key.as_str(),
            r#"{"method":"GET","url":"https://x.test/items?page=2","body":null,"partner":"shop"}"#
        );
    }

    #[test]
    fn test_key_parses_back_into_fields() {
        let key = CacheKey::build(
            HttpMethod::Delete,
            "https://x.test/r/1",
            &json!({"reason": "dup", "salt": 4}),
            "visa",
            &ignore(&["salt"]),
        );

        let fields = key.fields().unwrap();
        assert_eq!(fields.method, "DELETE");
        assert_eq!(fields.url, "https://x.test/r/1");
        assert_eq!(fields.partner, "visa");
        assert_eq!(fields.body, json!({"reason": "dup", "salt": null}));
    }

    #[test]
    fn test_foreign_key_does_not_parse() {
        assert!(CacheKey::parse("session:1234").is_err());
        assert!(CacheKey::parse(r#"{"method":"GET"}"#).is_err());
    }
}
