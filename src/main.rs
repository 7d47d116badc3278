// ABOUTME: Main entry point for the project dossier service
// ABOUTME: Loads config, opens storage, bootstraps the first admin and serves the API

use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

mod access;
mod api;
mod archive;
mod blob;
mod config;
mod delete_requests;
mod dossier;
mod entities;
mod error;
mod identity;
mod ledger;
mod locks;
mod middleware;
mod migration;
mod progress;
mod registration;
mod schema;
mod storage;
mod tree;
mod types;

#[cfg(test)]
mod storage_tests;

use config::Config;
use schema::SchemaCatalog;
use storage::Storage;

#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<Storage>,
    pub schema: Arc<SchemaCatalog>,
    pub config: Arc<Config>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("project_dossier=info,tower_http=info")),
        )
        .init();

    let config = Config::from_env()?;
    let storage = Storage::connect(&config).await?;

    if let Some(username) = &config.bootstrap_admin {
        if let Some(admin) = storage.ensure_bootstrap_admin(username).await? {
            tracing::info!(user_id = %admin.id, "use this id in the x-user-id header to sign in as {}", admin.username);
        }
    }

    let bind_addr = config.bind_addr.clone();
    let app_state = AppState {
        storage: Arc::new(storage),
        schema: Arc::new(SchemaCatalog::builtin()),
        config: Arc::new(config),
    };
    let app = api::router(app_state);

    let listener = TcpListener::bind(&bind_addr).await?;
    tracing::info!("Server running on http://{}", bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}
