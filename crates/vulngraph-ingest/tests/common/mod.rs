//! Shared helpers for ingestion integration tests

#![allow(dead_code)]

use std::path::PathBuf;
use vulngraph_common::{EntityType, NormalizedEntity};
use vulngraph_ingest::framework::{Candidates, EntityAdapter};

/// Initialize tracing for tests
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,vulngraph_ingest=debug")),
        )
        .with_test_writer()
        .try_init();
}

/// Directory holding NVD feed fixtures
pub fn nvd_fixtures() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/nvd")
}

/// Adapter whose records are already normalized entities
pub struct PassthroughAdapter;

impl EntityAdapter for PassthroughAdapter {
    type Record = Vec<NormalizedEntity>;

    fn name(&self) -> &str {
        "passthrough"
    }

    fn candidates<'a>(&'a self, record: &'a Self::Record) -> Candidates<'a> {
        Box::new(record.iter().cloned())
    }
}

pub fn vulnerability(id: &str) -> NormalizedEntity {
    NormalizedEntity::new(EntityType::Vulnerability, id).with("cve_id", id)
}

pub fn reference(id: &str) -> NormalizedEntity {
    NormalizedEntity::new(EntityType::Reference, id).with("url", format!("https://example.com/{id}"))
}

pub fn vendor(id: &str) -> NormalizedEntity {
    NormalizedEntity::new(EntityType::Vendor, id).with("name", id)
}

pub fn product(id: &str, vendor_id: &str) -> NormalizedEntity {
    NormalizedEntity::new(EntityType::Product, id)
        .with("vendor_id", vendor_id)
        .with("name", id)
}

pub fn configuration(id: &str, vulnerability_id: &str) -> NormalizedEntity {
    NormalizedEntity::new(EntityType::Configuration, id).with("vulnerability_id", vulnerability_id)
}

pub fn node(id: &str, configuration_id: &str) -> NormalizedEntity {
    NormalizedEntity::new(EntityType::Node, id).with("configuration_id", configuration_id)
}

pub fn cpe(id: &str, product_id: &str) -> NormalizedEntity {
    NormalizedEntity::new(EntityType::Cpe, id).with("product_id", product_id)
}

pub fn cpe_match(id: &str, cpe_id: &str, node_id: &str) -> NormalizedEntity {
    NormalizedEntity::new(EntityType::CpeMatch, id)
        .with("cpe_id", cpe_id)
        .with("node_id", node_id)
}

/// Eight entities spanning all four standard layers
pub fn advisory_graph(i: usize) -> Vec<NormalizedEntity> {
    vec![
        vulnerability(&format!("CVE-2024-{i:04}")),
        reference(&format!("ref-{i}")),
        vendor(&format!("vendor-{i}")),
        configuration(&format!("config-{i}"), &format!("CVE-2024-{i:04}")),
        product(&format!("product-{i}"), &format!("vendor-{i}")),
        node(&format!("node-{i}"), &format!("config-{i}")),
        cpe(&format!("cpe-{i}"), &format!("product-{i}")),
        cpe_match(&format!("match-{i}"), &format!("cpe-{i}"), &format!("node-{i}")),
    ]
}
