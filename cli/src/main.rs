//! girder - service scaffold binary entry point.
//!
//! Owns the outbound client lifecycle: construct at startup (no network
//! I/O happens until the first dispatch), hand a handle to the application
//! body, close exactly once at shutdown. Routing layers, pool managers, and
//! queue wiring are external collaborators; they would be built inside
//! [`run`] and share the handle.

use anyhow::{Context, Result};
use girder_client::{ApiClient, ClientConfig};
use girder_config::GirderConfig;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt().with_env_filter(env_filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let settings = GirderConfig::load()
        .context("loading configuration")?
        .unwrap_or_default()
        .resolve()
        .context("resolving configuration")?;

    tracing::info!(app = settings.app_name(), "starting up");

    let api = settings.api();
    let mut client_config = ClientConfig::new(api.base_url())
        .with_timeout(api.timeout())
        .with_max_attempts(api.max_attempts());
    if let Some(token) = api.auth_token() {
        client_config = client_config.with_auth_token(token);
    }

    ApiClient::new(client_config).scoped(run).await
}

/// Application body. Returns on the shutdown signal; the scope then releases
/// the client.
async fn run(client: ApiClient) -> Result<()> {
    tracing::info!(base_url = client.base_url(), "ready; waiting for shutdown signal");

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;

    tracing::info!("shutdown signal received");
    Ok(())
}
