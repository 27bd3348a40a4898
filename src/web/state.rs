use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::analysis::stats::{BucketLayout, LayoutError};
use crate::config::AppConfig;
use crate::db::PlanStore;
use crate::web::error::ApiError;

/// Shared application state for the web server
pub struct AppState {
    pub config: AppConfig,
    pub store: Arc<dyn PlanStore>,
    pub buckets: BucketLayout,
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(config: AppConfig, store: Arc<dyn PlanStore>) -> Result<Self, LayoutError> {
        let buckets = config.analysis.bucket_layout()?;
        Ok(Self {
            config,
            store,
            buckets,
            startup_time: Utc::now(),
        })
    }

    /// Runs store access (and whatever analysis follows it) on the blocking pool.
    ///
    /// DuckDB connections block, so handlers never touch the store directly.
    pub async fn with_store<T, F>(&self, f: F) -> Result<T, ApiError>
    where
        T: Send + 'static,
        F: FnOnce(&dyn PlanStore) -> Result<T, ApiError> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        let started = std::time::Instant::now();
        let result = tokio::task::spawn_blocking(move || f(store.as_ref())).await?;
        debug!("Store task finished in {:?}", started.elapsed());
        result
    }

    pub fn uptime_seconds(&self) -> i64 {
        (Utc::now() - self.startup_time).num_seconds()
    }
}
