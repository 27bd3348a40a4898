pub mod db_pool;
pub mod duck_store;
pub mod memory_store;

use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::config::DatabaseConfig;
use crate::model::{ExecutionRecord, Page};
use crate::search::RecordQuery;

pub use duck_store::DuckStore;
pub use memory_store::MemoryStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("collection '{0}' not found")]
    CollectionNotFound(String),

    #[error("record '{id}' not found in collection '{collection}'")]
    RecordNotFound { collection: String, id: String },

    #[error("invalid collection name '{0}': use letters, digits and underscores")]
    InvalidCollectionName(String),

    #[error("unsupported database backend '{0}'")]
    UnsupportedBackend(String),

    #[error("database error: {0}")]
    Database(#[from] duckdb::Error),

    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Read access to stored execution records, grouped into named collections.
///
/// Implementations are blocking; async callers go through `spawn_blocking`.
pub trait PlanStore: Send + Sync {
    fn list_collections(&self) -> Result<Vec<String>, StoreError>;

    /// One page of matching records, newest first (timestamp descending, then id).
    fn fetch_page(&self, collection: &str, query: &RecordQuery) -> Result<Page<ExecutionRecord>, StoreError>;

    fn fetch_by_id(&self, collection: &str, id: &str) -> Result<ExecutionRecord, StoreError>;

    /// Every record of a collection, in page order.
    fn fetch_all_for_stats(&self, collection: &str) -> Result<Vec<ExecutionRecord>, StoreError>;

    /// Inserts or replaces records by id, creating the collection on first use.
    fn insert_records(&self, collection: &str, records: &[ExecutionRecord]) -> Result<usize, StoreError>;
}

pub fn validate_collection_name(name: &str) -> Result<(), StoreError> {
    let valid = !name.is_empty()
        && name.len() <= 64
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidCollectionName(name.to_string()))
    }
}

pub fn open_store(config: &DatabaseConfig) -> Result<Arc<dyn PlanStore>, StoreError> {
    match config.backend.as_str() {
        "duckdb" => {
            info!(
                "Opening DuckDB store at {} (pool size {})",
                config.connection_string, config.pool_size
            );
            let store = DuckStore::open(&config.connection_string, config.pool_size)?;
            Ok(Arc::new(store))
        }
        "memory" => {
            info!("Using in-memory record store");
            Ok(Arc::new(MemoryStore::new()))
        }
        other => Err(StoreError::UnsupportedBackend(other.to_string())),
    }
}
