//! VulnGraph Ingestion Engine
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Turns vulnerability records into a typed entity graph and writes it to
//! storage without violating referential integrity.
//!
//! # Overview
//!
//! - **Framework**: source-agnostic machinery (seen-ID cache, adapter trait,
//!   task scheduler, rate limiter, dependency-ordered persister)
//! - **Storage**: PostgreSQL and in-memory backends
//! - **NVD**: the CVE adapter plus feed and API readers
//! - **Configuration**: environment-driven settings for the binary
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use vulngraph_ingest::framework::{DependencyLayers, IngestionRun, RunOptions};
//! use vulngraph_ingest::nvd::{load_feed, NvdAdapter};
//! use vulngraph_ingest::storage::MemoryStorage;
//!
//! # async fn example() -> vulngraph_ingest::Result<()> {
//! let records = load_feed("nvdcve-2.0-2024.json".as_ref()).await?;
//! let run = IngestionRun::new(
//!     NvdAdapter::new()?,
//!     Arc::new(MemoryStorage::new()),
//!     DependencyLayers::standard()?,
//!     RunOptions::default(),
//! );
//! let report = run.execute(records).await?;
//! println!("wrote {} entities", report.total_written());
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod framework;
pub mod nvd;
pub mod storage;

pub use error::{IngestError, Result};
