//! Public surface for the `hgroups-node` crate.
//!
//! Exposes the router builder, storage backends and config types so that
//! external crates (e.g. the conformance test suite) can spin up an
//! in-process node without spawning a subprocess.

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod storage;

pub use config::NodeConfig;
pub use router::build_router;
pub use storage::{memory::MemoryStorage, sqlite::SqliteStorage, Storage};
