//! Storage backend interface
//!
//! Backends persist normalized entities into one table per entity type. A
//! `bulk_write` is all-or-nothing: either every row of the batch is applied,
//! or the batch is rolled back and a [`StorageError`] describes why.

use async_trait::async_trait;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use vulngraph_common::{EntityType, NormalizedEntity};

use crate::error::StorageError;

/// Rows written, by entity type
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WriteSummary {
    written: BTreeMap<EntityType, usize>,
}

impl WriteSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, entity_type: EntityType, rows: usize) {
        if rows > 0 {
            *self.written.entry(entity_type).or_default() += rows;
        }
    }

    pub fn merge(&mut self, other: &WriteSummary) {
        for (entity_type, rows) in &other.written {
            self.record(*entity_type, *rows);
        }
    }

    pub fn get(&self, entity_type: EntityType) -> usize {
        self.written.get(&entity_type).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.written.values().sum()
    }

    pub fn by_type(&self) -> &BTreeMap<EntityType, usize> {
        &self.written
    }
}

/// Persistent store for normalized entities
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Backend name used in logs
    fn name(&self) -> &str;

    /// Every id currently stored for `entity_type`
    async fn load_known_ids(&self, entity_type: EntityType) -> Result<HashSet<String>, StorageError>;

    /// Atomically write a batch of entities, possibly of several types.
    ///
    /// Rows whose `(type, id)` is already stored are left untouched and not
    /// counted as written. A missing referenced entity is a
    /// [`StorageError::ConstraintViolation`] and rolls back the whole batch.
    async fn bulk_write(&self, batch: &[NormalizedEntity]) -> Result<WriteSummary, StorageError>;
}
