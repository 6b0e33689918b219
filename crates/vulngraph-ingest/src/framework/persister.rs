//! Dependency-ordered, failure-isolated bulk persistence
//!
//! Entities are partitioned by dependency layer and written one layer at a
//! time. Within a layer, entities are cut into fixed-size batches that are
//! written concurrently through a [`TaskScheduler`], one atomic
//! [`StorageBackend::bulk_write`] per batch. The next layer starts only after
//! every batch of the current one is terminal.
//!
//! A failed batch is reported and never retried. Entities in deeper layers
//! that reference anything from a failed batch are not submitted at all; they
//! are counted as excluded instead.

use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use vulngraph_common::{EntityBatch, EntityType, NormalizedEntity};

use super::layers::DependencyLayers;
use super::scheduler::TaskScheduler;
use super::storage::{StorageBackend, WriteSummary};
use crate::error::{Result, TaskError};

/// A persistence batch that was rolled back
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedBatch {
    pub layer: usize,
    /// Position of the batch within its layer
    pub batch: usize,
    pub entity_count: usize,
    /// Entity counts by type
    pub entity_types: BTreeMap<EntityType, usize>,
    pub cause: String,
}

/// Outcome of one layer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LayerReport {
    pub layer: usize,
    pub batches: usize,
    pub written: usize,
    pub failed_batches: usize,
    pub excluded: usize,
}

/// Outcome of a persistence pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PersistReport {
    pub written: WriteSummary,
    pub failed_batches: Vec<FailedBatch>,
    /// Entities not submitted because an ancestor's batch failed, by type
    pub excluded: BTreeMap<EntityType, usize>,
    pub layers: Vec<LayerReport>,
    /// Set when cancellation stopped the pass before this layer
    pub cancelled_before_layer: Option<usize>,
}

impl PersistReport {
    pub fn total_excluded(&self) -> usize {
        self.excluded.values().sum()
    }

    pub fn is_complete(&self) -> bool {
        self.cancelled_before_layer.is_none()
    }
}

/// Layer-by-layer writer
pub struct DependencyOrderedPersister {
    storage: Arc<dyn StorageBackend>,
    layers: Arc<DependencyLayers>,
    batch_size: usize,
    workers: usize,
    cancel: CancellationToken,
}

impl DependencyOrderedPersister {
    pub fn new(
        storage: Arc<dyn StorageBackend>,
        layers: Arc<DependencyLayers>,
        batch_size: usize,
        workers: usize,
    ) -> Self {
        Self {
            storage,
            layers,
            batch_size: batch_size.max(1),
            workers: workers.max(1),
            cancel: CancellationToken::new(),
        }
    }

    /// Stop before the next layer once `cancel` fires. A layer that has
    /// started always runs to completion.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Persist every entity of `batches`.
    ///
    /// Only contract violations (an entity type outside every layer) and a
    /// dead worker pool are errors; failed batches are part of the report.
    pub async fn persist(&self, batches: Vec<EntityBatch>) -> Result<PersistReport> {
        let partitioned = self
            .layers
            .partition(batches.into_iter().flat_map(EntityBatch::into_entities))?;

        let mut report = PersistReport::default();
        let mut failed_keys: HashSet<(EntityType, String)> = HashSet::new();

        for (layer, entities) in partitioned.into_iter().enumerate() {
            if self.cancel.is_cancelled() {
                warn!(layer, "Persistence cancelled before layer");
                report.cancelled_before_layer = Some(layer);
                break;
            }

            let mut layer_report = LayerReport {
                layer,
                ..LayerReport::default()
            };

            let mut eligible = Vec::with_capacity(entities.len());
            for entity in entities {
                let orphaned = entity
                    .referenced()
                    .any(|(t, id)| failed_keys.contains(&(t, id.to_string())));
                if orphaned {
                    *report.excluded.entry(entity.entity_type).or_default() += 1;
                    layer_report.excluded += 1;
                    failed_keys.insert((entity.entity_type, entity.id));
                } else {
                    eligible.push(entity);
                }
            }

            let chunks = chunk(eligible, self.batch_size);
            layer_report.batches = chunks.len();
            info!(
                layer,
                batches = chunks.len(),
                excluded = layer_report.excluded,
                "Persisting dependency layer"
            );

            let layer_summary = self
                .persist_layer(layer, chunks, &mut report.failed_batches, &mut failed_keys)
                .await?;

            layer_report.written = layer_summary.total();
            layer_report.failed_batches = report
                .failed_batches
                .iter()
                .filter(|f| f.layer == layer)
                .count();
            report.written.merge(&layer_summary);

            info!(
                layer,
                written = layer_report.written,
                failed_batches = layer_report.failed_batches,
                "Dependency layer complete"
            );
            report.layers.push(layer_report);
        }

        Ok(report)
    }

    async fn persist_layer(
        &self,
        layer: usize,
        chunks: Vec<Vec<NormalizedEntity>>,
        failed_batches: &mut Vec<FailedBatch>,
        failed_keys: &mut HashSet<(EntityType, String)>,
    ) -> Result<WriteSummary> {
        let storage = self.storage.clone();
        // A started layer is never interrupted; cancellation is checked between layers.
        let mut scheduler = TaskScheduler::start(
            "persist",
            self.workers,
            CancellationToken::new(),
            move |chunk: Arc<Vec<NormalizedEntity>>| {
                let storage = storage.clone();
                async move { storage.bulk_write(&chunk).await.map_err(TaskError::from) }
            },
        );

        let mut submitted = Vec::with_capacity(chunks.len());
        for entities in chunks {
            let entities = Arc::new(entities);
            scheduler.submit(entities.clone()).await?;
            submitted.push(entities);
        }

        let outcome = scheduler.join().await;
        let mut summary = WriteSummary::new();

        for task in outcome.tasks() {
            let batch = task.id.0 as usize;
            let entities = &submitted[batch];

            if let Some(written) = &task.result {
                summary.merge(written);
                continue;
            }

            let cause = task
                .error
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_else(|| "unknown failure".to_string());
            let mut entity_types = BTreeMap::new();
            for entity in entities.iter() {
                *entity_types.entry(entity.entity_type).or_default() += 1;
                failed_keys.insert((entity.entity_type, entity.id.clone()));
            }

            warn!(
                layer,
                batch,
                entities = entities.len(),
                cause = %cause,
                "Batch rolled back, excluding its descendants"
            );
            failed_batches.push(FailedBatch {
                layer,
                batch,
                entity_count: entities.len(),
                entity_types,
                cause,
            });
        }

        Ok(summary)
    }
}

fn chunk(entities: Vec<NormalizedEntity>, size: usize) -> Vec<Vec<NormalizedEntity>> {
    let mut chunks = Vec::with_capacity(entities.len().div_ceil(size));
    let mut iter = entities.into_iter().peekable();
    while iter.peek().is_some() {
        chunks.push(iter.by_ref().take(size).collect());
    }
    chunks
}
