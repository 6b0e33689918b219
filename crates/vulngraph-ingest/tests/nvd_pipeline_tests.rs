//! NVD feed → entity graph → storage, end to end on the in-memory backend

mod common;

use common::{init_tracing, nvd_fixtures};
use serde_json::Value;
use std::sync::Arc;
use vulngraph_common::EntityType;
use vulngraph_ingest::framework::{DependencyLayers, IngestionRun, RunOptions};
use vulngraph_ingest::nvd::{load_feed, NvdAdapter};
use vulngraph_ingest::storage::MemoryStorage;

fn nvd_run(storage: Arc<MemoryStorage>) -> IngestionRun<NvdAdapter> {
    IngestionRun::new(
        NvdAdapter::new().unwrap(),
        storage,
        DependencyLayers::standard().unwrap(),
        RunOptions {
            workers: 2,
            record_batch_size: 2,
            persist_batch_size: 8,
        },
    )
}

#[tokio::test]
async fn test_feed_ingests_full_graph() {
    init_tracing();

    let records = load_feed(&nvd_fixtures()).await.unwrap();
    assert_eq!(records.len(), 3);

    let storage = Arc::new(MemoryStorage::new());
    let report = nvd_run(storage.clone()).execute(records).await.unwrap();

    assert!(report.failed_batches.is_empty());
    assert_eq!(report.total_written(), 51);

    let written = |t: EntityType| report.written.get(&t).copied().unwrap_or(0);
    assert_eq!(written(EntityType::Vulnerability), 3);
    assert_eq!(written(EntityType::VulnerabilityCwe), 5);
    assert_eq!(written(EntityType::Reference), 4);
    assert_eq!(written(EntityType::Cvss), 3);
    assert_eq!(written(EntityType::Repository), 1);
    assert_eq!(written(EntityType::Commit), 1);
    assert_eq!(written(EntityType::CommitAssociation), 2);
    assert_eq!(written(EntityType::Vendor), 3);
    assert_eq!(written(EntityType::Product), 3);
    assert_eq!(written(EntityType::Cpe), 4);
    assert_eq!(written(EntityType::CpeMatch), 5);

    // Both log4j CVEs point at the same patch through different URL spellings
    assert_eq!(report.skipped.get(&EntityType::Commit), Some(&1));
    assert_eq!(report.skipped.get(&EntityType::Vendor), Some(&2));

    let vulnerability = storage.get(EntityType::Vulnerability, "CVE-2021-44228").unwrap();
    assert_eq!(
        vulnerability.attribute("vuln_status").and_then(Value::as_str),
        Some("Analyzed")
    );
}

#[tokio::test]
async fn test_feed_reingest_is_idempotent() {
    let records = load_feed(&nvd_fixtures()).await.unwrap();
    let storage = Arc::new(MemoryStorage::new());

    let first = nvd_run(storage.clone()).execute(records.clone()).await.unwrap();
    let second = nvd_run(storage.clone()).execute(records).await.unwrap();

    assert_eq!(second.total_written(), 0);
    assert_eq!(second.total_skipped(), first.total_written() as u64 + first.total_skipped());
    assert_eq!(storage.total(), first.total_written());
}
