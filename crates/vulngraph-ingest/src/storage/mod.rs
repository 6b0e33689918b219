//! Storage backends
//!
//! - [`PgStorage`]: PostgreSQL, one table per entity type
//! - [`MemoryStorage`]: in-process store with the same batch semantics, for dry runs

pub mod memory;
pub mod postgres;

pub use memory::{CommittedBatch, MemoryStorage};
pub use postgres::PgStorage;
