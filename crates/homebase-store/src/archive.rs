//! Single-document archives.
//!
//! An [`Archive`] persists exactly one value of type `T` (the current
//! account, the selected address) and hands it back on the next start.
//! [`SqliteArchive`] stores the value as JSON in the `archives` table, one
//! row per archive name; [`MemoryArchive`] keeps it in process memory and
//! can be told to reject writes.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};

use crate::db::Database;
use crate::error::{StoreError, StoreResult};

/// Persistence for one value of type `T`.
#[async_trait]
pub trait Archive<T>: Send + Sync {
    /// Replace the archived value.
    async fn save(&self, item: &T) -> StoreResult<()>;

    /// Load the archived value, `None` if nothing has been saved.
    async fn load(&self) -> StoreResult<Option<T>>;

    /// Remove the archived value.
    async fn clear(&self) -> StoreResult<()>;
}

// ── SQLite ───────────────────────────────────────────────────────────

/// [`Archive`] backed by a row of the `archives` table.
pub struct SqliteArchive<T> {
    db: Database,
    name: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T> SqliteArchive<T> {
    /// Create an archive stored under `name`.
    pub fn new(db: Database, name: impl Into<String>) -> Self {
        Self {
            db,
            name: name.into(),
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

#[async_trait]
impl<T> Archive<T> for SqliteArchive<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    #[instrument(skip(self, item), fields(archive = %self.name))]
    async fn save(&self, item: &T) -> StoreResult<()> {
        let payload = serde_json::to_string(item)?;
        let name = self.name.clone();
        self.db
            .execute(move |conn| {
                conn.execute(
                    "INSERT INTO archives (name, payload, updated_at) VALUES (?1, ?2, ?3) \
                     ON CONFLICT(name) DO UPDATE SET \
                        payload = excluded.payload, updated_at = excluded.updated_at",
                    rusqlite::params![name, payload, chrono::Utc::now().timestamp()],
                )?;
                debug!(archive = %name, "archive saved");
                Ok(())
            })
            .await
    }

    #[instrument(skip(self), fields(archive = %self.name))]
    async fn load(&self) -> StoreResult<Option<T>> {
        let name = self.name.clone();
        let payload: Option<String> = self
            .db
            .execute(move |conn| {
                let result = conn.query_row(
                    "SELECT payload FROM archives WHERE name = ?1",
                    rusqlite::params![name],
                    |row| row.get(0),
                );
                match result {
                    Ok(payload) => Ok(Some(payload)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await?;

        payload
            .map(|p| serde_json::from_str(&p).map_err(StoreError::from))
            .transpose()
    }

    #[instrument(skip(self), fields(archive = %self.name))]
    async fn clear(&self) -> StoreResult<()> {
        let name = self.name.clone();
        self.db
            .execute(move |conn| {
                conn.execute(
                    "DELETE FROM archives WHERE name = ?1",
                    rusqlite::params![name],
                )?;
                Ok(())
            })
            .await
    }
}

// ── memory ───────────────────────────────────────────────────────────

/// In-process [`Archive`].
#[derive(Debug)]
pub struct MemoryArchive<T> {
    slot: Mutex<Option<T>>,
    fail_writes: AtomicBool,
}

impl<T> Default for MemoryArchive<T> {
    fn default() -> Self {
        Self {
            slot: Mutex::new(None),
            fail_writes: AtomicBool::new(false),
        }
    }
}

impl<T: Clone> MemoryArchive<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Archive pre-populated with `item`.
    pub fn with_value(item: T) -> Self {
        Self {
            slot: Mutex::new(Some(item)),
            fail_writes: AtomicBool::new(false),
        }
    }

    /// When set, `save` returns [`StoreError::WriteFailed`].
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Current value without going through the async interface.
    pub fn snapshot(&self) -> Option<T> {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl<T> Archive<T> for MemoryArchive<T>
where
    T: Clone + Send + Sync + 'static,
{
    async fn save(&self, item: &T) -> StoreResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::WriteFailed {
                target: "memory archive".into(),
                reason: "writes disabled".into(),
            });
        }
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(item.clone());
        Ok(())
    }

    async fn load(&self) -> StoreResult<Option<T>> {
        Ok(self.snapshot())
    }

    async fn clear(&self) -> StoreResult<()> {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}

// ── tests ────────────────────────────────────────────────────────────
