//! Shared helpers for the hierarchical groups conformance test suite.
//!
//! Provides [`spawn_node`], which binds a `TcpListener` on an ephemeral
//! port, wires up an in-process node backed by `MemoryStorage`, and returns
//! both the local URL and the underlying storage so tests can seed site
//! administrators without going through the HTTP layer.
//!
//! [`spawn_sqlite_node`] does the same over a SQLite file; two nodes on one
//! file share their hierarchy cache.

use std::sync::Arc;

use hgroups::{CacheStore, EngineConfig, MemoryCacheStore, UserId};
use hgroups_node::{build_router, NodeConfig, MemoryStorage, SqliteStorage, Storage};
use hgroups_node_api::USER_HEADER;
use serde_json::Value;

/// Site administrator seeded into every spawned node.
pub const SITE_ADMIN: UserId = 1;

async fn serve(router: axum::Router, listener: tokio::net::TcpListener) {
    tokio::spawn(async move {
        axum::serve(listener, router)
            .await
            .expect("conformance node error");
    });
}

async fn bind() -> (tokio::net::TcpListener, String) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("get local addr");
    (listener, format!("http://{addr}"))
}

/// Start an ephemeral in-process node and return `(base_url, storage)`.
///
/// The node runs in a background `tokio` task bound to an OS-assigned port
/// on `127.0.0.1`, e.g. `http://127.0.0.1:51234`. [`SITE_ADMIN`] is a site
/// administrator. Permalinks are built under `{base_url}/groups`.
///
/// # Panics
///
/// Panics if the TCP listener cannot be bound or the node fails to start.
pub async fn spawn_node(engine: EngineConfig) -> (String, Arc<MemoryStorage>) {
    let (listener, base_url) = bind().await;

    let storage = Arc::new(MemoryStorage::new());
    storage.add_site_admin(SITE_ADMIN).await.expect("seed site admin");

    let mut config = NodeConfig::for_tests(engine);
    config.directory_url = format!("{base_url}/groups");
    let router = build_router(
        Arc::clone(&storage),
        Arc::new(MemoryCacheStore::new()),
        config,
    );
    serve(router, listener).await;

    (base_url, storage)
}

/// Start a node over the SQLite database at `db_path`.
///
/// The database also backs the hierarchy cache, so invalidations made by
/// one node are seen by every other node opened on the same file.
pub async fn spawn_sqlite_node(engine: EngineConfig, db_path: &str) -> String {
    let (listener, base_url) = bind().await;

    let storage = Arc::new(SqliteStorage::open(db_path).expect("open sqlite database"));
    storage.add_site_admin(SITE_ADMIN).await.expect("seed site admin");

    let mut config = NodeConfig::for_tests(engine);
    config.directory_url = format!("{base_url}/groups");
    let cache: Arc<dyn CacheStore> = storage.clone();
    let router = build_router(storage, cache, config);
    serve(router, listener).await;

    base_url
}

/// A thin JSON client that sends the user header.
#[derive(Clone)]
pub struct Client {
    http: reqwest::Client,
    base_url: String,
}

impl Client {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(5))
                .build()
                .expect("build HTTP client"),
            base_url: base_url.into(),
        }
    }

    /// Send a request as `user` (`None` is anonymous) and return status and JSON body.
    pub async fn send(
        &self,
        method: reqwest::Method,
        path: &str,
        user: Option<UserId>,
        body: Option<Value>,
    ) -> (u16, Value) {
        let mut req = self.http.request(method, format!("{}{}", self.base_url, path));
        if let Some(user) = user {
            req = req.header(USER_HEADER, user.to_string());
        }
        if let Some(body) = body {
            req = req.json(&body);
        }
        let resp = req.send().await.expect("request failed");
        let status = resp.status().as_u16();
        let text = resp.text().await.expect("read body");
        let json = if text.is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).expect("JSON body")
        };
        (status, json)
    }

    pub async fn get(&self, path: &str, user: Option<UserId>) -> (u16, Value) {
        self.send(reqwest::Method::GET, path, user, None).await
    }

    pub async fn post(&self, path: &str, user: Option<UserId>, body: Value) -> (u16, Value) {
        self.send(reqwest::Method::POST, path, user, Some(body)).await
    }

    pub async fn put(&self, path: &str, user: Option<UserId>, body: Value) -> (u16, Value) {
        self.send(reqwest::Method::PUT, path, user, Some(body)).await
    }

    pub async fn patch(&self, path: &str, user: Option<UserId>, body: Value) -> (u16, Value) {
        self.send(reqwest::Method::PATCH, path, user, Some(body)).await
    }

    pub async fn delete(&self, path: &str, user: Option<UserId>) -> (u16, Value) {
        self.send(reqwest::Method::DELETE, path, user, None).await
    }

    /// Create a group as `user` under `parent` (`None` for top level) and return its id.
    pub async fn create_group(&self, user: UserId, parent: Option<u64>, slug: &str, name: &str) -> u64 {
        let path = match parent {
            Some(p) => format!("/v1/groups/{p}/subgroups"),
            None => "/v1/groups".to_string(),
        };
        let (status, body) = self
            .post(&path, Some(user), serde_json::json!({ "slug": slug, "name": name }))
            .await;
        assert_eq!(status, 201, "create {slug}: {body}");
        body["id"].as_u64().expect("group id")
    }
}
