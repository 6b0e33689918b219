//! National Vulnerability Database source
//!
//! - [`models`]: CVE API 2.0 / JSON feed records
//! - [`adapter`]: maps a CVE to the vulnerability graph
//! - [`loader`]: reads feed files from disk
//! - [`client`]: pages through the CVE API under the shared rate limit

pub mod adapter;
pub mod client;
pub mod commit;
pub mod cpe;
pub mod loader;
pub mod models;

pub use adapter::NvdAdapter;
pub use client::{year_windows, DateWindow, FetchReport, NvdClient};
pub use commit::{CommitMatcher, GithubCommit};
pub use cpe::{Cpe, CpeError};
pub use loader::{load_feed, parse_feed};
pub use models::{Cve, CveItem, CveResponse};
