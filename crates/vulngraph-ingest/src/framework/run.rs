//! Ingestion run coordinator
//!
//! One [`IngestionRun`] is one pass over a set of source records:
//! 1. Hydrate: load known ids from storage into a fresh [`IdentityStore`]
//! 2. Adapt: fan record groups out to a worker pool, each producing one batch
//! 3. Persist: write the batches layer by layer
//!
//! The identity store lives only for the duration of the run.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;
use vulngraph_common::{EntityBatch, EntityType};

use super::adapter::EntityAdapter;
use super::identity::IdentityStore;
use super::layers::DependencyLayers;
use super::persister::{DependencyOrderedPersister, FailedBatch, LayerReport};
use super::scheduler::TaskScheduler;
use super::storage::StorageBackend;
use crate::config::IngestConfig;
use crate::error::{IngestError, Result};

/// Sizing for a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    pub workers: usize,
    pub record_batch_size: usize,
    pub persist_batch_size: usize,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self::from(&IngestConfig::default())
    }
}

impl From<&IngestConfig> for RunOptions {
    fn from(config: &IngestConfig) -> Self {
        Self {
            workers: config.workers,
            record_batch_size: config.record_batch_size,
            persist_batch_size: config.persist_batch_size,
        }
    }
}

/// Caller-visible summary of a run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub records: usize,
    /// Rows written, by type
    pub written: BTreeMap<EntityType, usize>,
    /// Entities suppressed as already seen, by type
    pub skipped: BTreeMap<EntityType, u64>,
    pub failed_batches: Vec<FailedBatch>,
    /// Entities not submitted because an ancestor batch failed, by type
    pub excluded: BTreeMap<EntityType, usize>,
    pub layers: Vec<LayerReport>,
    pub cancelled: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    pub fn total_written(&self) -> usize {
        self.written.values().sum()
    }

    pub fn total_skipped(&self) -> u64 {
        self.skipped.values().sum()
    }

    pub fn total_excluded(&self) -> usize {
        self.excluded.values().sum()
    }

    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

/// State for one ingestion pass
pub struct IngestionRun<A: EntityAdapter> {
    id: Uuid,
    adapter: Arc<A>,
    storage: Arc<dyn StorageBackend>,
    layers: Arc<DependencyLayers>,
    options: RunOptions,
    cancel: CancellationToken,
}

impl<A> IngestionRun<A>
where
    A: EntityAdapter + 'static,
    A::Record: 'static,
{
    pub fn new(
        adapter: A,
        storage: Arc<dyn StorageBackend>,
        layers: DependencyLayers,
        options: RunOptions,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            adapter: Arc::new(adapter),
            storage,
            layers: Arc::new(layers),
            options,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Token that aborts this run between stages and layers
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run the full pass over `records`.
    ///
    /// Cancellation during hydration or adaptation aborts with
    /// [`IngestError::Cancelled`] before anything is written. Once persistence
    /// has begun, cancellation stops before the next layer and the report is
    /// returned with `cancelled` set.
    pub async fn execute<I>(&self, records: I) -> Result<RunReport>
    where
        I: IntoIterator<Item = A::Record>,
    {
        let started_at = Utc::now();
        info!(
            run_id = %self.id,
            adapter = self.adapter.name(),
            backend = self.storage.name(),
            workers = self.options.workers,
            "Ingestion run started"
        );

        let store = Arc::new(IdentityStore::hydrate(self.storage.as_ref()).await?);
        if self.cancel.is_cancelled() {
            return Err(IngestError::Cancelled);
        }

        let (record_count, batches) = self.adapt(records, store.clone()).await?;
        let entity_count: usize = batches.iter().map(EntityBatch::len).sum();
        info!(
            run_id = %self.id,
            records = record_count,
            batches = batches.len(),
            entities = entity_count,
            skipped = store.skipped_counts().values().sum::<u64>(),
            "Adaptation complete"
        );

        let persisted = DependencyOrderedPersister::new(
            self.storage.clone(),
            self.layers.clone(),
            self.options.persist_batch_size,
            self.options.workers,
        )
        .with_cancellation(self.cancel.clone())
        .persist(batches)
        .await?;

        let report = RunReport {
            run_id: self.id,
            records: record_count,
            written: persisted.written.by_type().clone(),
            skipped: store.skipped_counts(),
            excluded: persisted.excluded.clone(),
            cancelled: !persisted.is_complete(),
            failed_batches: persisted.failed_batches,
            layers: persisted.layers,
            started_at,
            finished_at: Utc::now(),
        };

        if report.failed_batches.is_empty() {
            info!(
                run_id = %self.id,
                written = report.total_written(),
                skipped = report.total_skipped(),
                duration_ms = report.duration().num_milliseconds(),
                "Ingestion run complete"
            );
        } else {
            warn!(
                run_id = %self.id,
                written = report.total_written(),
                skipped = report.total_skipped(),
                failed_batches = report.failed_batches.len(),
                excluded = report.total_excluded(),
                duration_ms = report.duration().num_milliseconds(),
                "Ingestion run complete with failed batches"
            );
        }

        Ok(report)
    }

    async fn adapt<I>(&self, records: I, store: Arc<IdentityStore>) -> Result<(usize, Vec<EntityBatch>)>
    where
        I: IntoIterator<Item = A::Record>,
    {
        let adapter = self.adapter.clone();
        let mut scheduler = TaskScheduler::start(
            "adapt",
            self.options.workers,
            self.cancel.clone(),
            move |group: Vec<A::Record>| {
                let adapter = adapter.clone();
                let store = store.clone();
                async move { Ok(adapter.adapt_all(&group, &store)) }
            },
        );

        let mut record_count = 0;
        let mut records = records.into_iter();
        loop {
            let group: Vec<A::Record> = records
                .by_ref()
                .take(self.options.record_batch_size.max(1))
                .collect();
            if group.is_empty() {
                break;
            }
            record_count += group.len();
            scheduler.submit(group).await?;
        }

        let outcome = scheduler.join().await;
        if self.cancel.is_cancelled() || outcome.failed_count() > 0 {
            return Err(IngestError::Cancelled);
        }

        Ok((record_count, outcome.into_results()))
    }
}
