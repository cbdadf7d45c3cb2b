//! Assembles the Axum [`Router`] from all handler modules.

use std::sync::Arc;

use axum::{
    routing::{get, post, put},
    Router,
};
use hgroups::{CacheStore, Engine, GroupStore, Membership};
use tower_http::trace::TraceLayer;

use crate::{
    config::NodeConfig,
    handlers::{groups, hierarchy, settings, AppState},
    storage::Storage,
};

/// Build the complete application router with shared state.
///
/// `storage` serves both the handlers (writes) and the engine (reads), so
/// the backend type must implement all three traits. `cache` backs the
/// engine's hierarchy cache.
pub fn build_router<S>(storage: Arc<S>, cache: Arc<dyn CacheStore>, config: NodeConfig) -> Router
where
    S: Storage + GroupStore + Membership,
{
    let groups: Arc<dyn GroupStore> = storage.clone();
    let members: Arc<dyn Membership> = storage.clone();
    let engine = Engine::new(config.engine.clone(), groups, members, cache);

    let state = AppState {
        storage,
        engine,
        config,
    };

    Router::new()
        // Groups and the directory
        .route("/v1/groups", post(groups::create).get(groups::list))
        .route(
            "/v1/groups/{id}",
            get(groups::get_by_id)
                .patch(groups::update)
                .delete(groups::delete),
        )
        .route("/v1/groups/{id}/subgroups", post(groups::create_subgroup))
        // Hierarchy and identifiers
        .route("/v1/groups/{id}/ancestors", get(hierarchy::ancestors))
        .route("/v1/groups/{id}/descendants", get(hierarchy::descendants))
        .route("/v1/groups/{id}/children", get(hierarchy::children))
        .route("/v1/groups/{id}/permalink", get(hierarchy::permalink))
        .route("/v1/groups/{id}/breadcrumbs", get(hierarchy::breadcrumbs))
        .route("/v1/resolve/{*path}", get(hierarchy::resolve))
        // Settings, permissions, activity, membership
        .route("/v1/groups/{id}/permissions", get(settings::permissions))
        .route(
            "/v1/groups/{id}/settings",
            get(settings::get_settings).put(settings::put_settings),
        )
        .route("/v1/groups/{id}/activity-scope", get(settings::activity_scope))
        .route("/v1/groups/{id}/members/{user}", put(settings::set_member))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
