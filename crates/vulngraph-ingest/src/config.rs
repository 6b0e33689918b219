//! Ingestion configuration
//!
//! Everything is read from the environment (a `.env` file is honoured) and
//! validated before a run starts.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::framework::rate_limit::RateLimitConfig;

/// Default worker count; the task queue holds as many pending tasks.
pub const DEFAULT_WORKERS: usize = 4;

/// Default number of source records adapted per task.
pub const DEFAULT_RECORD_BATCH_SIZE: usize = 500;

/// Default number of entities written per persistence batch.
pub const DEFAULT_PERSIST_BATCH_SIZE: usize = 500;

/// Default database URL for local development.
pub const DEFAULT_DATABASE_URL: &str = "postgresql://localhost/vulngraph";

/// Default maximum database connections in the pool.
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 10;

/// Public NVD quota per window.
pub const NVD_PUBLIC_MAX_CALLS: u32 = 5;

/// NVD quota per window with an API key.
pub const NVD_KEYED_MAX_CALLS: u32 = 50;

/// NVD rolling window length in seconds.
pub const NVD_WINDOW_SECS: u64 = 30;

/// Default transient retry attempts for one API request.
pub const DEFAULT_NVD_MAX_RETRIES: u32 = 3;

/// Main ingestion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Worker count for every scheduler in a run
    pub workers: usize,
    /// Source records per adapt task
    pub record_batch_size: usize,
    /// Entities per persistence batch
    pub persist_batch_size: usize,
    pub database: DatabaseConfig,
    pub nvd: NvdConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

/// NVD API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NvdConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub max_calls: u32,
    pub window_secs: u64,
    pub max_retries: u32,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl IngestConfig {
    /// Load ingestion configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            workers: env_or("INGEST_WORKERS", DEFAULT_WORKERS),
            record_batch_size: env_or("INGEST_RECORD_BATCH_SIZE", DEFAULT_RECORD_BATCH_SIZE),
            persist_batch_size: env_or("INGEST_PERSIST_BATCH_SIZE", DEFAULT_PERSIST_BATCH_SIZE),
            database: DatabaseConfig {
                url: std::env::var("DATABASE_URL")
                    .unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string()),
                max_connections: env_or(
                    "DATABASE_MAX_CONNECTIONS",
                    DEFAULT_DATABASE_MAX_CONNECTIONS,
                ),
            },
            nvd: NvdConfig::from_env(),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.workers == 0 {
            anyhow::bail!("INGEST_WORKERS must be greater than 0");
        }
        if self.record_batch_size == 0 {
            anyhow::bail!("INGEST_RECORD_BATCH_SIZE must be greater than 0");
        }
        if self.persist_batch_size == 0 {
            anyhow::bail!("INGEST_PERSIST_BATCH_SIZE must be greater than 0");
        }
        if self.database.url.is_empty() {
            anyhow::bail!("Database URL cannot be empty");
        }
        if self.database.max_connections == 0 {
            anyhow::bail!("DATABASE_MAX_CONNECTIONS must be greater than 0");
        }
        if (self.database.max_connections as usize) < self.workers {
            tracing::warn!(
                workers = self.workers,
                max_connections = self.database.max_connections,
                "Fewer database connections than workers; persistence tasks will queue on the pool"
            );
        }
        self.nvd.validate()
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            record_batch_size: DEFAULT_RECORD_BATCH_SIZE,
            persist_batch_size: DEFAULT_PERSIST_BATCH_SIZE,
            database: DatabaseConfig {
                url: DEFAULT_DATABASE_URL.to_string(),
                max_connections: DEFAULT_DATABASE_MAX_CONNECTIONS,
            },
            nvd: NvdConfig::default(),
        }
    }
}

impl NvdConfig {
    pub const DEFAULT_BASE_URL: &'static str = "https://services.nvd.nist.gov/rest/json/cves/2.0";

    /// Load NVD configuration from environment variables
    pub fn from_env() -> Self {
        let api_key = std::env::var("NVD_API_KEY").ok().filter(|k| !k.trim().is_empty());
        let default_calls = if api_key.is_some() {
            NVD_KEYED_MAX_CALLS
        } else {
            NVD_PUBLIC_MAX_CALLS
        };

        Self {
            base_url: std::env::var("NVD_API_URL")
                .unwrap_or_else(|_| Self::DEFAULT_BASE_URL.to_string()),
            api_key,
            max_calls: env_or("NVD_API_MAX_CALLS", default_calls),
            window_secs: env_or("NVD_API_WINDOW_SECS", NVD_WINDOW_SECS),
            max_retries: env_or("NVD_API_MAX_RETRIES", DEFAULT_NVD_MAX_RETRIES),
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.base_url.is_empty() {
            anyhow::bail!("NVD_API_URL cannot be empty");
        }
        if self.max_calls == 0 {
            anyhow::bail!("NVD_API_MAX_CALLS must be greater than 0");
        }
        if self.window_secs == 0 {
            anyhow::bail!("NVD_API_WINDOW_SECS must be greater than 0");
        }
        Ok(())
    }

    /// Admission window for API calls
    pub fn rate_limit(&self) -> RateLimitConfig {
        RateLimitConfig {
            max_calls: self.max_calls,
            window: Duration::from_secs(self.window_secs),
        }
    }
}

impl Default for NvdConfig {
    fn default() -> Self {
        Self {
            base_url: Self::DEFAULT_BASE_URL.to_string(),
            api_key: None,
            max_calls: NVD_PUBLIC_MAX_CALLS,
            window_secs: NVD_WINDOW_SECS,
            max_retries: DEFAULT_NVD_MAX_RETRIES,
        }
    }
}
