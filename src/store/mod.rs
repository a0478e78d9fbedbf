// src/store/mod.rs
mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use crate::health::HealthReport;
use async_trait::async_trait;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupted cache entry: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid cache key {0:?}")]
    InvalidKey(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Persisted cache of health reports, partitioned by instance.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn read(&self, module: &str, check: &str) -> Result<Option<HealthReport>, StoreError>;

    async fn write(&self, report: &HealthReport) -> Result<(), StoreError>;

    /// Returns the number of entries removed.
    async fn clean(&self, retention: Duration) -> Result<usize, StoreError>;
}
