//! Digest identity for normalized entities
//!
//! Content-addressed ids are SHA-256 digests over a canonical serialization of
//! the fields that define an entity. Canonical fields are kept in a sorted map,
//! so the same logical entity always yields the same id regardless of the order
//! in which an adapter assembled its fields.

use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use crate::types::EntityType;

/// Deterministically ordered set of fields used to derive an entity id
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CanonicalFields {
    fields: BTreeMap<String, Value>,
}

impl CanonicalFields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Compact JSON object with keys in sorted order.
    pub fn canonical_json(&self) -> String {
        let body = self
            .fields
            .iter()
            .map(|(k, v)| format!("{}:{}", Value::String(k.clone()), v))
            .collect::<Vec<_>>()
            .join(",");
        format!("{{{}}}", body)
    }
}

impl From<BTreeMap<String, Value>> for CanonicalFields {
    fn from(fields: BTreeMap<String, Value>) -> Self {
        Self { fields }
    }
}

impl FromIterator<(String, Value)> for CanonicalFields {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

/// Derive the content-addressed id of an entity.
///
/// Pure: equal inputs always produce equal ids. The entity type is part of the
/// digest input, so equal fields under different types never share an id.
pub fn identify(entity_type: EntityType, fields: &CanonicalFields) -> String {
    let mut hasher = Sha256::new();
    hasher.update(entity_type.as_str().as_bytes());
    hasher.update(b"\n");
    hasher.update(fields.canonical_json().as_bytes());
    hex::encode(hasher.finalize())
}

/// Natural keys are used verbatim when the source already guarantees uniqueness
/// (CVE ids, commit SHAs).
pub fn natural_key(key: impl AsRef<str>) -> String {
    key.as_ref().trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_identify_is_hex_sha256() {
        let id = identify(
            EntityType::Reference,
            &CanonicalFields::new().field("url", "https://nvd.nist.gov"),
        );
        assert_eq!(id.len(), 64);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_field_order_does_not_matter() {
        let a = CanonicalFields::new().field("owner", "torvalds").field("name", "linux");
        let b = CanonicalFields::new().field("name", "linux").field("owner", "torvalds");
        assert_eq!(identify(EntityType::Repository, &a), identify(EntityType::Repository, &b));
    }

    #[test]
    fn test_type_namespaces_ids() {
        let fields = CanonicalFields::new().field("name", "openssl");
        assert_ne!(identify(EntityType::Vendor, &fields), identify(EntityType::Product, &fields));
    }

    #[test]
    fn test_canonical_json_escapes_keys() {
        let fields = CanonicalFields::new().field("a\"b", 1).field("a", Value::Null);
        assert_eq!(fields.canonical_json(), r#"{"a":null,"a\"b":1}"#);
    }

    #[test]
    fn test_natural_key_is_verbatim() {
        assert_eq!(natural_key(" CVE-2021-44228 "), "CVE-2021-44228");
    }

    proptest! {
        #[test]
        fn prop_identify_is_deterministic(url in ".*", version in any::<u32>()) {
            let fields = CanonicalFields::new().field("url", url.clone()).field("version", version);
            let again = CanonicalFields::new().field("version", version).field("url", url);
            prop_assert_eq!(identify(EntityType::Cvss, &fields), identify(EntityType::Cvss, &again));
        }

        #[test]
        fn prop_distinct_urls_get_distinct_ids(a in "[a-z]{1,16}", b in "[a-z]{1,16}") {
            prop_assume!(a != b);
            let id_a = identify(EntityType::Reference, &CanonicalFields::new().field("url", a));
            let id_b = identify(EntityType::Reference, &CanonicalFields::new().field("url", b));
            prop_assert_ne!(id_a, id_b);
        }
    }
}
