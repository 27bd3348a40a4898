// HTTP surface: JSON endpoints under /api plus a health probe. Store access
// and analysis run on the blocking pool; handlers only shape requests and
// responses.
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

#[cfg(test)]
mod tests;

use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::config::WebConfig;
use state::AppState;

pub async fn run_server(config: WebConfig, state: Arc<AppState>) -> std::io::Result<()> {
    let listener = TcpListener::bind((config.host.as_str(), config.port)).await?;
    info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, routes::create_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => error!("Failed to listen for shutdown signal: {}", e),
    }
}
