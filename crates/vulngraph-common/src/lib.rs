//! VulnGraph Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, content addressing and error handling for the VulnGraph workspace.
//!
//! # Overview
//!
//! - **Types**: the closed [`EntityType`] enum, [`NormalizedEntity`] and [`EntityBatch`]
//! - **Digest**: deterministic content-addressed identifiers for entities
//! - **Error Handling**: common error and result types
//! - **Logging**: tracing subscriber initialisation shared by all binaries
//!
//! # Example
//!
//! ```
//! use vulngraph_common::digest::{identify, CanonicalFields};
//! use vulngraph_common::types::{EntityType, NormalizedEntity};
//!
//! let url = "https://example.com/advisory";
//! let id = identify(EntityType::Reference, &CanonicalFields::new().field("url", url));
//! let reference = NormalizedEntity::new(EntityType::Reference, id).with("url", url);
//! assert_eq!(reference.entity_type, EntityType::Reference);
//! ```

pub mod digest;
pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{Result, VulnGraphError};
pub use types::{EntityBatch, EntityReference, EntityType, NormalizedEntity};
