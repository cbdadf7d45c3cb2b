//! HTTP request handlers for all groups node endpoints.
//!
//! Each submodule covers a logical group of endpoints. Handlers are async
//! functions that receive Axum extractors and return
//! `Result<impl IntoResponse, AppError>`.
//!
//! Engine calls block on storage, so handlers run them through
//! [`AppState::run`], which moves the work onto the blocking thread pool.
//! Every successful write reports a [`hgroups::GroupEvent`] to the engine.

pub mod groups;
pub mod hierarchy;
pub mod settings;

use std::sync::Arc;

use hgroups::{Engine, GroupEvent};

use crate::{config::NodeConfig, error::AppError, storage::Storage};

/// Shared application state threaded through all Axum handlers via [`axum::extract::State`].
#[derive(Clone)]
pub struct AppState {
    /// Write side of the backend.
    pub storage: Arc<dyn Storage>,
    /// Read side: hierarchy, permissions, identifiers. Cheap to clone.
    pub engine: Engine,
    pub config: NodeConfig,
}

impl AppState {
    /// Run `f` against the engine on the blocking thread pool.
    pub async fn run<T, F>(&self, f: F) -> Result<T, AppError>
    where
        T: Send + 'static,
        F: FnOnce(&Engine) -> Result<T, AppError> + Send + 'static,
    {
        let engine = self.engine.clone();
        tokio::task::spawn_blocking(move || f(&engine))
            .await
            .map_err(|e| AppError::Internal(format!("engine task failed: {e}")))?
    }

    /// Report a write to the engine so cached hierarchy results are dropped.
    pub async fn notify(&self, event: GroupEvent) -> Result<(), AppError> {
        self.run(move |engine| {
            engine.handle_event(event);
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use axum::{
        body::Body,
        http::{Request, StatusCode},
        Router,
    };
    use http_body_util::BodyExt;
    use hgroups::{EngineConfig, MemoryCacheStore, UserId};
    use hgroups_node_api::USER_HEADER;
    use tower::ServiceExt;

    use crate::{
        config::NodeConfig,
        router::build_router,
        storage::{memory::MemoryStorage, Storage},
    };

    /// Site administrator seeded into every test app.
    pub const ADMIN: UserId = 1;

    pub async fn app() -> (Router, Arc<MemoryStorage>) {
        app_with(EngineConfig::default()).await
    }

    pub async fn app_with(engine: EngineConfig) -> (Router, Arc<MemoryStorage>) {
        let storage = Arc::new(MemoryStorage::new());
        storage.add_site_admin(ADMIN).await.unwrap();
        let router = build_router(
            Arc::clone(&storage),
            Arc::new(MemoryCacheStore::new()),
            NodeConfig::for_tests(engine),
        );
        (router, storage)
    }

    /// Send one request and decode the JSON body (`Null` when empty).
    pub async fn send(
        app: &Router,
        method: &str,
        uri: &str,
        user: Option<UserId>,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            req = req.header(USER_HEADER, user.to_string());
        }
        let req = match body {
            Some(json) => req
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => req.body(Body::empty()).unwrap(),
        };

        let resp = app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }
}
