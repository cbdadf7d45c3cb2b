//! `hgroups-node` — HTTP node serving the hierarchical groups engine.
//!
//! # Quick start
//!
//! ```sh
//! # In-memory node on the default port:
//! hgroups-node
//!
//! # Persistent SQLite node with one site administrator:
//! HGROUPS_DB=./groups.db HGROUPS_SITE_ADMINS=1 hgroups-node
//!
//! # Let group admins aggregate activity across the hierarchy:
//! HGROUPS_ACTIVITY_ENFORCEMENT=group-admins hgroups-node
//! ```
//!
//! # Environment variables
//!
//! See [`hgroups_node::NodeConfig`] for the full list.

use std::sync::Arc;

use axum::Router;
use hgroups::{CacheStore, MemoryCacheStore, UserId};
use hgroups_node::{build_router, MemoryStorage, NodeConfig, SqliteStorage, Storage};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "hgroups_node=info,hgroups=info,tower_http=debug".into()
            }),
        )
        .init();

    let config = NodeConfig::from_env().unwrap_or_else(|e| panic!("invalid configuration: {e}"));
    tracing::info!(
        restrict_group_creation = config.engine.restrict_group_creation,
        activity_enforcement = %config.engine.activity_enforcement,
        directory_as_tree = config.engine.directory_as_tree,
        cache = config.engine.cache_enabled,
        "engine configured"
    );

    let app: Router = match &config.db_path {
        Some(path) => {
            tracing::info!("storage: SQLite at {path}");
            let storage = Arc::new(
                SqliteStorage::open(path)
                    .unwrap_or_else(|e| panic!("failed to open SQLite database at {path}: {e}")),
            );
            seed_site_admins(storage.as_ref(), &config.site_admins).await;
            // The database doubles as the cache so every process sharing
            // the file sees the same generation token.
            let cache: Arc<dyn CacheStore> = storage.clone();
            build_router(storage, cache, config.clone())
        }
        None => {
            tracing::info!("storage: in-memory (data will not survive restart)");
            let storage = Arc::new(MemoryStorage::new());
            seed_site_admins(storage.as_ref(), &config.site_admins).await;
            build_router(storage, Arc::new(MemoryCacheStore::new()), config.clone())
        }
    };

    tracing::info!("listening on {}", config.bind_addr);
    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .unwrap_or_else(|e| panic!("failed to bind {}: {e}", config.bind_addr));

    axum::serve(listener, app)
        .await
        .unwrap_or_else(|e| panic!("server error: {e}"));
}

async fn seed_site_admins(storage: &dyn Storage, admins: &[UserId]) {
    for &user in admins {
        storage
            .add_site_admin(user)
            .await
            .unwrap_or_else(|e| panic!("failed to seed site admin {user}: {e}"));
        tracing::info!(user, "site administrator");
    }
}
