//! # lumen-adapter-storage-sqlite-sqlx
//!
//! `SQLite` persistence adapter using [sqlx](https://docs.rs/sqlx).
//!
//! ## Responsibilities
//! - Implement the `SnapshotStore` port defined in `lumen-app::ports::storage`
//! - Manage `SQLite` connection pool lifecycle
//! - Run database migrations (using sqlx embedded migrations)
//! - Encode the runtime snapshot as JSON under a per-installation key
//!
//! ## Dependency rule
//! Depends on `lumen-app` (for port traits) and `lumen-domain` (for domain types).
//! The `app` and `domain` crates must never reference this adapter.

pub mod error;
pub mod pool;
pub mod snapshot_store;

pub use error::StorageError;
pub use pool::{Config, Database};
pub use snapshot_store::SqliteSnapshotStore;
