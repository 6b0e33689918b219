//! Seen-ID cache
//!
//! [`IdentityStore`] holds, per entity type, every id known to exist either in
//! storage or already accepted during the current run. It is created per run,
//! hydrated from storage, and handed to adapters by reference. Each entity type
//! has its own lock, and the check-then-mark step happens under that lock, so
//! when two workers race on the same `(type, id)` exactly one of them wins.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, info};
use vulngraph_common::{EntityType, NormalizedEntity};

use super::storage::StorageBackend;
use crate::error::Result;

/// Per-type set of known entity ids
#[derive(Debug)]
pub struct IdentityStore {
    shards: Vec<Mutex<HashSet<String>>>,
    skipped: Vec<AtomicU64>,
}

impl Default for IdentityStore {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityStore {
    pub fn new() -> Self {
        Self {
            shards: (0..EntityType::COUNT).map(|_| Mutex::new(HashSet::new())).collect(),
            skipped: (0..EntityType::COUNT).map(|_| AtomicU64::new(0)).collect(),
        }
    }

    /// Build a store holding every id already present in `storage`.
    ///
    /// All types are loaded concurrently; any failure aborts hydration.
    pub async fn hydrate(storage: &dyn StorageBackend) -> Result<Self> {
        let loads = EntityType::ALL.map(|entity_type| async move {
            storage
                .load_known_ids(entity_type)
                .await
                .map(|ids| (entity_type, ids))
        });
        let loaded = futures::future::try_join_all(loads).await?;

        let store = Self::new();
        for (entity_type, ids) in loaded {
            debug!(entity_type = %entity_type, known = ids.len(), "Loaded known ids");
            store.seed(entity_type, ids);
        }
        info!(
            backend = storage.name(),
            known = store.total_known(),
            "Seen-ID cache hydrated"
        );
        Ok(store)
    }

    fn shard(&self, entity_type: EntityType) -> std::sync::MutexGuard<'_, HashSet<String>> {
        self.shards[entity_type.index()]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Record ids as known without counting them as skipped
    pub fn seed(&self, entity_type: EntityType, ids: impl IntoIterator<Item = String>) {
        self.shard(entity_type).extend(ids);
    }

    /// Atomically mark `(entity_type, id)` as seen.
    ///
    /// Returns `true` for the first caller only. Later callers get `false`
    /// and are counted as skipped for that type.
    pub fn mark_seen(&self, entity_type: EntityType, id: &str) -> bool {
        let mut shard = self.shard(entity_type);
        if shard.contains(id) {
            drop(shard);
            self.skipped[entity_type.index()].fetch_add(1, Ordering::Relaxed);
            false
        } else {
            shard.insert(id.to_owned())
        }
    }

    pub fn contains(&self, entity_type: EntityType, id: &str) -> bool {
        self.shard(entity_type).contains(id)
    }

    pub fn known(&self, entity_type: EntityType) -> usize {
        self.shard(entity_type).len()
    }

    pub fn total_known(&self) -> usize {
        EntityType::ALL.into_iter().map(|t| self.known(t)).sum()
    }

    /// Entities suppressed because their id was already seen
    pub fn skipped(&self, entity_type: EntityType) -> u64 {
        self.skipped[entity_type.index()].load(Ordering::Relaxed)
    }

    /// Non-zero skipped counts by type
    pub fn skipped_counts(&self) -> BTreeMap<EntityType, u64> {
        EntityType::ALL
            .into_iter()
            .map(|t| (t, self.skipped(t)))
            .filter(|(_, n)| *n > 0)
            .collect()
    }

    /// Lazily drop entities that were already seen, marking the rest.
    pub fn filter_new<I>(&self, entities: I) -> Deduplicated<'_, I::IntoIter>
    where
        I: IntoIterator<Item = NormalizedEntity>,
    {
        Deduplicated {
            store: self,
            inner: entities.into_iter(),
        }
    }
}

/// Iterator yielding only entities seen for the first time
///
/// Each entity is marked before the next one is pulled from the inner
/// iterator, so duplicates within the same sequence are suppressed too.
pub struct Deduplicated<'a, I> {
    store: &'a IdentityStore,
    inner: I,
}

impl<I> Iterator for Deduplicated<'_, I>
where
    I: Iterator<Item = NormalizedEntity>,
{
    type Item = NormalizedEntity;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entity = self.inner.next()?;
            if self.store.mark_seen(entity.entity_type, &entity.id) {
                return Some(entity);
            }
        }
    }
}
