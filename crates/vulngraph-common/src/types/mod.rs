//! Entity model shared across VulnGraph
//!
//! Every source record is normalized into a graph of [`NormalizedEntity`] values.
//! An entity is identified by its `(type, id)` pair; two entities with the same
//! pair are interchangeable. Attributes may carry the id of another entity, which
//! is how dependency edges between entity types are expressed.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::VulnGraphError;

/// Closed set of entity types known to the ingestion engine.
///
/// Each variant maps to one storage table. The static reference structure
/// returned by [`EntityType::references`] is what dependency layers are
/// validated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Vulnerability,
    Reference,
    Cvss,
    Repository,
    Vendor,
    VulnerabilityCwe,
    ReferenceAssociation,
    CvssAssociation,
    RepositoryAssociation,
    Commit,
    Configuration,
    Product,
    CommitAssociation,
    Node,
    Cpe,
    CpeMatch,
}

/// A reference from one entity type to another, carried in an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityReference {
    /// Attribute key holding the referenced id
    pub attribute: &'static str,
    /// Type of the referenced entity
    pub target: EntityType,
}

const fn reference(attribute: &'static str, target: EntityType) -> EntityReference {
    EntityReference { attribute, target }
}

impl EntityType {
    /// Every entity type, in declaration order.
    pub const ALL: [EntityType; 16] = [
        EntityType::Vulnerability,
        EntityType::Reference,
        EntityType::Cvss,
        EntityType::Repository,
        EntityType::Vendor,
        EntityType::VulnerabilityCwe,
        EntityType::ReferenceAssociation,
        EntityType::CvssAssociation,
        EntityType::RepositoryAssociation,
        EntityType::Commit,
        EntityType::Configuration,
        EntityType::Product,
        EntityType::CommitAssociation,
        EntityType::Node,
        EntityType::Cpe,
        EntityType::CpeMatch,
    ];

    /// Number of entity types.
    pub const COUNT: usize = Self::ALL.len();

    /// Dense index usable for per-type arrays.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Storage table name
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Vulnerability => "vulnerability",
            EntityType::Reference => "reference",
            EntityType::Cvss => "cvss",
            EntityType::Repository => "repository",
            EntityType::Vendor => "vendor",
            EntityType::VulnerabilityCwe => "vulnerability_cwe",
            EntityType::ReferenceAssociation => "reference_association",
            EntityType::CvssAssociation => "cvss_association",
            EntityType::RepositoryAssociation => "repository_association",
            EntityType::Commit => "commit",
            EntityType::Configuration => "configuration",
            EntityType::Product => "product",
            EntityType::CommitAssociation => "commit_association",
            EntityType::Node => "node",
            EntityType::Cpe => "cpe",
            EntityType::CpeMatch => "cpe_match",
        }
    }

    /// Static references this type holds to other types.
    pub fn references(&self) -> &'static [EntityReference] {
        use EntityType::*;

        const VULNERABILITY_CWE: &[EntityReference] = &[reference("vulnerability_id", Vulnerability)];
        const REFERENCE_ASSOCIATION: &[EntityReference] = &[
            reference("reference_id", Reference),
            reference("vulnerability_id", Vulnerability),
        ];
        const CVSS_ASSOCIATION: &[EntityReference] = &[
            reference("cvss_id", Cvss),
            reference("vulnerability_id", Vulnerability),
        ];
        const REPOSITORY_ASSOCIATION: &[EntityReference] = &[
            reference("repository_id", Repository),
            reference("vulnerability_id", Vulnerability),
        ];
        const COMMIT: &[EntityReference] = &[reference("repository_id", Repository)];
        const CONFIGURATION: &[EntityReference] = &[reference("vulnerability_id", Vulnerability)];
        const PRODUCT: &[EntityReference] = &[reference("vendor_id", Vendor)];
        const COMMIT_ASSOCIATION: &[EntityReference] = &[
            reference("commit_id", Commit),
            reference("vulnerability_id", Vulnerability),
        ];
        const NODE: &[EntityReference] = &[reference("configuration_id", Configuration)];
        const CPE: &[EntityReference] = &[reference("product_id", Product)];
        const CPE_MATCH: &[EntityReference] = &[reference("cpe_id", Cpe), reference("node_id", Node)];

        match self {
            Vulnerability | Reference | Cvss | Repository | Vendor => &[],
            VulnerabilityCwe => VULNERABILITY_CWE,
            ReferenceAssociation => REFERENCE_ASSOCIATION,
            CvssAssociation => CVSS_ASSOCIATION,
            RepositoryAssociation => REPOSITORY_ASSOCIATION,
            Commit => COMMIT,
            Configuration => CONFIGURATION,
            Product => PRODUCT,
            CommitAssociation => COMMIT_ASSOCIATION,
            Node => NODE,
            Cpe => CPE,
            CpeMatch => CPE_MATCH,
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EntityType {
    type Err = VulnGraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| VulnGraphError::UnknownEntityType(s.to_string()))
    }
}

/// Normalized entity ready for persistence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedEntity {
    pub entity_type: EntityType,
    /// Natural key or content digest
    pub id: String,
    /// Attributes, sorted by key
    pub attributes: BTreeMap<String, Value>,
}

impl NormalizedEntity {
    pub fn new(entity_type: EntityType, id: impl Into<String>) -> Self {
        Self {
            entity_type,
            id: id.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// Builder-style attribute setter
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Identity key of this entity
    pub fn key(&self) -> (EntityType, &str) {
        (self.entity_type, &self.id)
    }

    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// Id held in a reference attribute, if present and a string
    pub fn reference_id(&self, reference: &EntityReference) -> Option<&str> {
        self.attributes.get(reference.attribute).and_then(Value::as_str)
    }

    /// Referenced `(type, id)` pairs carried by this entity.
    ///
    /// Absent reference attributes are skipped; they surface as constraint
    /// violations at write time.
    pub fn referenced(&self) -> impl Iterator<Item = (EntityType, &str)> + '_ {
        self.entity_type
            .references()
            .iter()
            .filter_map(move |r| self.reference_id(r).map(|id| (r.target, id)))
    }
}

/// Ordered group of entities produced together from one group of source records
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityBatch {
    entities: Vec<NormalizedEntity>,
}

impl EntityBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entity: NormalizedEntity) {
        self.entities.push(entity);
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, NormalizedEntity> {
        self.entities.iter()
    }

    pub fn entities(&self) -> &[NormalizedEntity] {
        &self.entities
    }

    pub fn into_entities(self) -> Vec<NormalizedEntity> {
        self.entities
    }
}

impl From<Vec<NormalizedEntity>> for EntityBatch {
    fn from(entities: Vec<NormalizedEntity>) -> Self {
        Self { entities }
    }
}

impl FromIterator<NormalizedEntity> for EntityBatch {
    fn from_iter<I: IntoIterator<Item = NormalizedEntity>>(iter: I) -> Self {
        Self {
            entities: iter.into_iter().collect(),
        }
    }
}

impl Extend<NormalizedEntity> for EntityBatch {
    fn extend<I: IntoIterator<Item = NormalizedEntity>>(&mut self, iter: I) {
        self.entities.extend(iter);
    }
}

impl IntoIterator for EntityBatch {
    type Item = NormalizedEntity;
    type IntoIter = std::vec::IntoIter<NormalizedEntity>;

    fn into_iter(self) -> Self::IntoIter {
        self.entities.into_iter()
    }
}

impl<'a> IntoIterator for &'a EntityBatch {
    type Item = &'a NormalizedEntity;
    type IntoIter = std::slice::Iter<'a, NormalizedEntity>;

    fn into_iter(self) -> Self::IntoIter {
        self.entities.iter()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_index_matches_all_order() {
        for (i, t) in EntityType::ALL.iter().enumerate() {
            assert_eq!(t.index(), i);
        }
    }

    #[test]
    fn test_entity_type_round_trips_through_table_name() {
        for t in EntityType::ALL {
            assert_eq!(t.as_str().parse::<EntityType>().unwrap(), t);
        }
        assert!("nvd_tables".parse::<EntityType>().is_err());
    }

    #[test]
    fn test_root_types_have_no_references() {
        for t in [
            EntityType::Vulnerability,
            EntityType::Reference,
            EntityType::Cvss,
            EntityType::Repository,
            EntityType::Vendor,
        ] {
            assert!(t.references().is_empty(), "{t} should be a root type");
        }
    }

    #[test]
    fn test_references_point_at_earlier_declared_types() {
        for t in EntityType::ALL {
            for r in t.references() {
                assert!(r.target < t, "{t} references later type {}", r.target);
            }
        }
    }

    #[test]
    fn test_referenced_skips_missing_attributes() {
        let commit = NormalizedEntity::new(EntityType::Commit, "c1").with("sha", "abc");
        assert_eq!(commit.referenced().count(), 0);

        let commit = commit.with("repository_id", "r1");
        let refs: Vec<_> = commit.referenced().collect();
        assert_eq!(refs, vec![(EntityType::Repository, "r1")]);
    }

    #[test]
    fn test_batch_preserves_order() {
        let batch: EntityBatch = ["a", "b", "c"]
            .into_iter()
            .map(|id| NormalizedEntity::new(EntityType::Vendor, id))
            .collect();
        let ids: Vec<_> = batch.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }
}
