pub mod api;
pub mod config;
pub mod logic;
pub mod model;
pub mod seed;
pub mod store;

// Export API types
pub use api::handlers;
pub use api::routes;

// Export logic types
pub use logic::{
    AnnotationFixer, AnnotationStorageManager, ChangeDetector, ManagerError, ManagerResult, ValidityChecker,
};

// Export all model types
pub use model::*;

// Export store types
pub use store::{BaseStore, FileStore, MemoryStore, PostgresStore, SnapshotStore, Store};

use crate::config::{AppConfig, StorageBackend};
use std::sync::Arc;

/// Builds the HTTP application around a manager.
pub fn build_app<S: Store + 'static>(manager: Arc<AnnotationStorageManager<S>>, config: &AppConfig) -> axum::Router {
    crate::api::routes::create_router::<S>(config.request_timeout()).with_state(manager)
}

/// Serves the HTTP API on top of `store` until the listener fails.
pub async fn serve<S: Store + 'static>(store: S, config: &AppConfig) -> anyhow::Result<()> {
    use tokio::net::TcpListener;

    let manager = Arc::new(AnnotationStorageManager::with_ignored_changes(store, config.changes));

    // Load seed data for demonstration (optional)
    if std::env::var("LOAD_SEED_DATA").unwrap_or_default() == "true" {
        log::info!("Loading seed data...");
        seed::load_seed_data(&*manager).await?;
    }

    let bind_address = config.server_address();
    let listener = TcpListener::bind(&bind_address).await?;
    log::info!("Annotation server running on http://{}", bind_address);

    axum::serve(listener, build_app(manager, config)).await?;

    Ok(())
}

/// Opens the configured store backend and serves the API on it.
pub async fn run_server(config: AppConfig) -> anyhow::Result<()> {
    match config.storage.backend {
        StorageBackend::Memory => {
            log::warn!("Using the in-memory store, nothing will be persisted");
            serve(MemoryStore::new(), &config).await
        }
        StorageBackend::File => {
            log::info!("Using file store at {}", config.storage.path.display());
            let store = FileStore::new(config.storage.path.clone()).await?;
            serve(store, &config).await
        }
        StorageBackend::Postgres => {
            log::info!("Connecting to PostgreSQL...");
            let database_url = config.database_url()?;
            let store = PostgresStore::new(&database_url, config.storage.max_connections.unwrap_or(20)).await?;
            store.migrate().await?;
            serve(store, &config).await
        }
    }
}
