use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};

mod analysis;
mod config;
mod db;
mod ingest;
mod model;
mod plan;
mod search;
mod util;
mod web;

use crate::config::{AppConfig, CliArgs};
use crate::ingest::IngestManager;
use crate::util::logging::init_tracing;
use crate::web::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse command line arguments
    let args = CliArgs::parse();

    init_tracing(args.log_json);

    // Load configuration
    let config = match AppConfig::new(&args) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    let store = db::open_store(&config.database)?;

    if !args.import.is_empty() {
        let manager = IngestManager::new();
        for path in &args.import {
            let stored = import_file(&manager, path, &args.collection, Arc::clone(&store)).await?;
            info!("Loaded {} records from {}", stored, path.display());
        }
    }

    let app_state = Arc::new(AppState::new(config.clone(), store)?);

    info!("Starting plan-scope server on {}:{}", config.web.host, config.web.port);
    match web::run_server(config.web, app_state).await {
        Ok(_) => info!("Server stopped gracefully"),
        Err(e) => {
            error!("Server error: {}", e);
            return Err(e.into());
        }
    }

    Ok(())
}

async fn import_file(
    manager: &IngestManager,
    path: &Path,
    collection: &str,
    store: Arc<dyn db::PlanStore>,
) -> Result<usize, ingest::IngestError> {
    let path = path.to_path_buf();
    let collection = collection.to_string();
    let manager = *manager;
    tokio::task::spawn_blocking(move || manager.ingest_file(&path, &collection, store.as_ref()))
        .await
        .map_err(|e| ingest::IngestError::Io(std::io::Error::other(e)))?
}
