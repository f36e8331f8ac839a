//! # homebase-store
//!
//! Local persistence for Homebase.
//!
//! Everything lives in one SQLite database (WAL mode) shared by two kinds of
//! storage:
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │  Archive<T>        one JSON document each   │  account, selected address
//! │  LocalCache<E>     rows keyed by            │  pastes, purls, statuses, ...
//! │                    (kind, address, id)      │
//! ├─────────────────────────────────────────────┤
//! │  Reconciler        set-diff of a server     │
//! │                    batch into a cache       │
//! ├─────────────────────────────────────────────┤
//! │  Database (rusqlite, spawn_blocking)        │
//! │  Migrations (versioned, transactional)      │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! Memory-backed [`MemoryArchive`] and [`MemoryEntityCache`] implement the
//! same traits for tests.
//!
//! ## Quick start
//!
//! ```ignore
//! use homebase_store::{Database, ReconcileBatch, Reconciler, SqliteEntityCache};
//!
//! let db = Database::open_and_migrate("data/homebase.db").await?;
//! let pastes: SqliteEntityCache<Paste> = SqliteEntityCache::new(db.clone());
//! Reconciler::apply(&pastes, ReconcileBatch::for_address("alice", fetched)).await;
//! ```

pub mod archive;
pub mod cache;
pub mod db;
pub mod entity;
pub mod error;
pub mod migration;
pub mod reconcile;

// ── re-exports ───────────────────────────────────────────────────────

pub use archive::{Archive, MemoryArchive, SqliteArchive};
pub use cache::{LocalCache, MemoryEntityCache, SqliteEntityCache};
pub use db::Database;
pub use entity::{Cached, Entity, EntityFilter, EntityKey, SortOrder};
pub use error::{StoreError, StoreResult};
pub use reconcile::{ReconcileBatch, ReconcileReport, Reconciler};
