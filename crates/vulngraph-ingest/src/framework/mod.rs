//! Ingestion framework
//!
//! Source-agnostic machinery: the seen-ID cache, the adapter trait, the
//! bounded task scheduler with its rate limiter, and the dependency-ordered
//! persister that ties them together in an [`IngestionRun`].

pub mod adapter;
pub mod identity;
pub mod layers;
pub mod persister;
pub mod rate_limit;
pub mod retry;
pub mod run;
pub mod scheduler;
pub mod storage;
pub mod types;

// Re-export commonly used types
pub use adapter::{Candidates, EntityAdapter};
pub use identity::IdentityStore;
pub use layers::DependencyLayers;
pub use persister::{DependencyOrderedPersister, FailedBatch, LayerReport, PersistReport};
pub use rate_limit::{RateLimitConfig, RateLimiter};
pub use retry::{retry_transient, RetryPolicy};
pub use run::{IngestionRun, RunOptions, RunReport};
pub use scheduler::TaskScheduler;
pub use storage::{StorageBackend, WriteSummary};
pub use types::{Task, TaskHandle, TaskId, TaskReport, TaskStatus};
