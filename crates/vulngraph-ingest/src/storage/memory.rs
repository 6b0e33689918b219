//! In-memory storage backend
//!
//! Same contract as the PostgreSQL backend: each batch is applied atomically,
//! references are checked like foreign keys, and rows that already exist are
//! left alone. Used for dry runs and tests.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use vulngraph_common::{EntityType, NormalizedEntity};

use crate::error::{ConstraintKind, StorageError};
use crate::framework::storage::{StorageBackend, WriteSummary};

/// One committed batch, in commit order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedBatch {
    pub sequence: usize,
    /// Keys actually inserted by this batch
    pub inserted: Vec<(EntityType, String)>,
}

#[derive(Debug, Default)]
struct Tables {
    rows: HashMap<EntityType, BTreeMap<String, NormalizedEntity>>,
    commits: Vec<CommittedBatch>,
    rejected: usize,
}

impl Tables {
    fn contains(&self, entity_type: EntityType, id: &str) -> bool {
        self.rows
            .get(&entity_type)
            .is_some_and(|table| table.contains_key(id))
    }
}

/// Thread-safe in-memory store
#[derive(Debug, Default)]
pub struct MemoryStorage {
    tables: Mutex<Tables>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-existing rows without reference checks
    pub fn with_existing(entities: impl IntoIterator<Item = NormalizedEntity>) -> Self {
        let storage = Self::new();
        {
            let mut tables = storage.lock();
            for entity in entities {
                tables
                    .rows
                    .entry(entity.entity_type)
                    .or_default()
                    .insert(entity.id.clone(), entity);
            }
        }
        storage
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, entity_type: EntityType, id: &str) -> Option<NormalizedEntity> {
        self.lock()
            .rows
            .get(&entity_type)
            .and_then(|table| table.get(id))
            .cloned()
    }

    pub fn contains(&self, entity_type: EntityType, id: &str) -> bool {
        self.lock().contains(entity_type, id)
    }

    pub fn count(&self, entity_type: EntityType) -> usize {
        self.lock().rows.get(&entity_type).map_or(0, BTreeMap::len)
    }

    pub fn total(&self) -> usize {
        self.lock().rows.values().map(BTreeMap::len).sum()
    }

    /// Committed batches in commit order
    pub fn commits(&self) -> Vec<CommittedBatch> {
        self.lock().commits.clone()
    }

    /// Number of batches rolled back
    pub fn rejected_batches(&self) -> usize {
        self.lock().rejected
    }
}

fn check_references(
    tables: &Tables,
    pending: &HashSet<(EntityType, &str)>,
    entity: &NormalizedEntity,
) -> Result<(), StorageError> {
    for reference in entity.entity_type.references() {
        let Some(target_id) = entity.reference_id(reference) else {
            return Err(StorageError::constraint(
                ConstraintKind::NotNull,
                format!("{}.{} is null for {}", entity.entity_type, reference.attribute, entity.id),
            ));
        };

        let present = tables.contains(reference.target, target_id)
            || pending.contains(&(reference.target, target_id));
        if !present {
            return Err(StorageError::constraint(
                ConstraintKind::ForeignKey,
                format!(
                    "{}.{} = {} has no matching {}",
                    entity.entity_type, reference.attribute, target_id, reference.target
                ),
            ));
        }
    }
    Ok(())
}

#[async_trait]
impl StorageBackend for MemoryStorage {
    fn name(&self) -> &str {
        "memory"
    }

    async fn load_known_ids(&self, entity_type: EntityType) -> Result<HashSet<String>, StorageError> {
        Ok(self
            .lock()
            .rows
            .get(&entity_type)
            .map(|table| table.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn bulk_write(&self, batch: &[NormalizedEntity]) -> Result<WriteSummary, StorageError> {
        let mut tables = self.lock();

        let pending: HashSet<(EntityType, &str)> =
            batch.iter().map(|e| (e.entity_type, e.id.as_str())).collect();
        for entity in batch {
            if let Err(err) = check_references(&tables, &pending, entity) {
                tables.rejected += 1;
                return Err(err);
            }
        }

        let mut summary = WriteSummary::new();
        let mut inserted = Vec::new();
        for entity in batch {
            let table = tables.rows.entry(entity.entity_type).or_default();
            if table.contains_key(&entity.id) {
                continue;
            }
            table.insert(entity.id.clone(), entity.clone());
            summary.record(entity.entity_type, 1);
            inserted.push((entity.entity_type, entity.id.clone()));
        }

        let sequence = tables.commits.len();
        tables.commits.push(CommittedBatch { sequence, inserted });
        Ok(summary)
    }
}
