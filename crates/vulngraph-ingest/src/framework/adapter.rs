//! Entity adapter trait
//!
//! Implement this trait for any source record type (NVD CVEs, advisories, ...).

use vulngraph_common::{EntityBatch, NormalizedEntity};

use super::identity::{Deduplicated, IdentityStore};

/// Boxed candidate sequence produced for one record
pub type Candidates<'a> = Box<dyn Iterator<Item = NormalizedEntity> + 'a>;

/// Pure mapping from a source record to normalized entities
pub trait EntityAdapter: Send + Sync {
    /// Source record consumed by this adapter
    type Record: Send + Sync;

    /// Adapter name used in logs
    fn name(&self) -> &str;

    /// Every entity the record maps to, before deduplication.
    ///
    /// Must be pure: calling it twice on the same record yields the same
    /// entities in the same order. Referenced entities are expected before
    /// the entities that reference them, but nothing here checks references.
    fn candidates<'a>(&'a self, record: &'a Self::Record) -> Candidates<'a>;

    /// Candidates not yet present in `store`, marking each as seen when it is
    /// yielded.
    fn adapt<'a>(
        &'a self,
        record: &'a Self::Record,
        store: &'a IdentityStore,
    ) -> Deduplicated<'a, Candidates<'a>> {
        store.filter_new(self.candidates(record))
    }

    /// Adapt a group of records into one batch, in record order.
    fn adapt_all(&self, records: &[Self::Record], store: &IdentityStore) -> EntityBatch {
        records
            .iter()
            .flat_map(|record| self.adapt(record, store))
            .collect()
    }
}
