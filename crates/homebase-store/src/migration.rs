//! Schema migration system.
//!
//! Migrations are static SQL strings keyed by version number.  The applied
//! version is tracked in a `_migrations` table so each migration runs once.

use rusqlite::Connection;
use tracing::{debug, info, warn};

use crate::error::{StoreError, StoreResult};

/// A single migration definition.
struct Migration {
    /// Monotonically increasing version number (1, 2, 3, ...).
    version: u32,
    description: &'static str,
    /// Raw SQL; may contain multiple statements.
    sql: &'static str,
}

/// All migrations in order.  Append new migrations to the end.
static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "archives: one JSON document per named archive",
        sql: r#"
            CREATE TABLE archives (
                name       TEXT PRIMARY KEY,
                payload    TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );
        "#,
    },
    Migration {
        version: 2,
        description: "entities: per-feature cached items keyed by (kind, address, local_id)",
        sql: r#"
            CREATE TABLE entities (
                kind       TEXT NOT NULL,
                address    TEXT NOT NULL,
                local_id   TEXT NOT NULL,
                payload    TEXT NOT NULL,
                sort_key   INTEGER NOT NULL DEFAULT 0,
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (kind, address, local_id)
            );
            CREATE INDEX idx_entities_kind_sort ON entities(kind, address, sort_key);
        "#,
    },
];

// ── public API ───────────────────────────────────────────────────────

/// Run all pending migrations against `conn`.
///
/// This is a **synchronous** function; call it from `spawn_blocking`.
pub fn run_all(conn: &Connection) -> StoreResult<()> {
    ensure_migrations_table(conn)?;

    let current = current_version(conn)?;
    let pending: Vec<&Migration> = MIGRATIONS.iter().filter(|m| m.version > current).collect();

    if pending.is_empty() {
        debug!(current_version = current, "database schema is up to date");
        return Ok(());
    }

    info!(
        current_version = current,
        pending = pending.len(),
        "running pending migrations"
    );

    for migration in pending {
        apply(conn, migration)?;
    }

    Ok(())
}

/// Latest applied migration version, or 0 if none.
pub fn current_version(conn: &Connection) -> StoreResult<u32> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM _migrations",
        [],
        |row| row.get(0),
    )
    .map_err(|e| StoreError::Migration {
        version: 0,
        message: format!("failed to read current version: {e}"),
    })
}

// ── internals ────────────────────────────────────────────────────────

fn ensure_migrations_table(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version     INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            applied_at  INTEGER NOT NULL
        );",
    )
    .map_err(|e| StoreError::Migration {
        version: 0,
        message: format!("failed to create _migrations table: {e}"),
    })
}

/// Apply one migration atomically: its SQL and its bookkeeping row commit
/// together or not at all.
fn apply(conn: &Connection, migration: &Migration) -> StoreResult<()> {
    let fail = |message: String| StoreError::Migration {
        version: migration.version,
        message,
    };

    info!(
        version = migration.version,
        description = migration.description,
        "applying migration"
    );

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| fail(format!("failed to begin transaction: {e}")))?;

    if let Err(e) = tx.execute_batch(migration.sql) {
        warn!(version = migration.version, error = %e, "migration failed, rolling back");
        return Err(fail(format!("SQL execution failed: {e}")));
    }

    tx.execute(
        "INSERT INTO _migrations (version, description, applied_at) VALUES (?1, ?2, ?3)",
        rusqlite::params![
            migration.version,
            migration.description,
            chrono::Utc::now().timestamp()
        ],
    )
    .map_err(|e| fail(format!("failed to record migration: {e}")))?;

    tx.commit().map_err(|e| fail(format!("failed to commit: {e}")))
}

// ── tests ────────────────────────────────────────────────────────────
