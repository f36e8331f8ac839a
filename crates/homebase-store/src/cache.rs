//! Local queryable entity cache.
//!
//! [`LocalCache`] is the surface both the reconciler (writes) and the UI
//! (reads) use for a feature's cached items.  [`SqliteEntityCache`] keeps
//! every feature in the shared `entities` table, partitioned by
//! [`Entity::KIND`]; [`MemoryEntityCache`] is a sorted map for tests and
//! ephemeral sessions.
//!
//! [`LocalCache::replace`] applies a whole [`ReconcileBatch`] as one unit:
//! the SQLite cache inside a single transaction, the memory cache under a
//! single lock.

use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use rusqlite::Connection;
use tracing::{debug, instrument};

use crate::db::Database;
use crate::entity::{Cached, Entity, EntityFilter, EntityKey, SortOrder};
use crate::error::{StoreError, StoreResult};
use crate::reconcile::{BatchWriter, ReconcileBatch, ReconcileReport, write_batch};

/// Read/write access to one feature's cached items.
#[async_trait]
pub trait LocalCache<E: Entity>: Send + Sync {
    /// Insert the item, or overwrite the payload of the item with the same key.
    async fn upsert(&self, item: Cached<E>) -> StoreResult<()>;

    /// Delete every item selected by `filter`, returning how many were removed.
    async fn delete_where(&self, filter: EntityFilter) -> StoreResult<usize>;

    /// Items selected by `filter` in `sort` order.
    async fn query(&self, filter: EntityFilter, sort: SortOrder) -> StoreResult<Vec<Cached<E>>>;

    /// Upsert every item of `batch` and prune each covered address to the
    /// ids the batch mentions, atomically with respect to readers.
    ///
    /// Per-item failures are counted in the returned report; an address
    /// with a failed upsert is not pruned.  An `Err` means nothing was
    /// applied.
    async fn replace(&self, batch: ReconcileBatch<E>) -> StoreResult<ReconcileReport>;

    /// Number of items selected by `filter`.
    async fn count(&self, filter: EntityFilter) -> StoreResult<usize> {
        Ok(self.query(filter, SortOrder::ById).await?.len())
    }
}

// ── SQLite ───────────────────────────────────────────────────────────

/// [`LocalCache`] backed by the `entities` table.
pub struct SqliteEntityCache<E> {
    db: Database,
    _marker: PhantomData<fn() -> E>,
}

impl<E> Clone for SqliteEntityCache<E> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            _marker: PhantomData,
        }
    }
}

impl<E: Entity> SqliteEntityCache<E> {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            _marker: PhantomData,
        }
    }
}

/// Build the WHERE clause and its positional parameters for `filter`.
fn where_clause(kind: &str, filter: &EntityFilter) -> StoreResult<(&'static str, Vec<String>)> {
    Ok(match filter {
        EntityFilter::All => ("kind = ?1", vec![kind.to_string()]),
        EntityFilter::Address(address) => (
            "kind = ?1 AND address = ?2",
            vec![kind.to_string(), address.clone()],
        ),
        EntityFilter::Key(key) => (
            "kind = ?1 AND address = ?2 AND local_id = ?3",
            vec![kind.to_string(), key.address.clone(), key.local_id.clone()],
        ),
        EntityFilter::AddressExcept { address, keep } => (
            "kind = ?1 AND address = ?2 \
             AND local_id NOT IN (SELECT value FROM json_each(?3))",
            vec![kind.to_string(), address.clone(), serde_json::to_string(keep)?],
        ),
    })
}

fn upsert_row<E: Entity>(conn: &Connection, item: &Cached<E>, updated_at: i64) -> StoreResult<()> {
    let payload = serde_json::to_string(&item.entity)?;
    conn.execute(
        "INSERT INTO entities (kind, address, local_id, payload, sort_key, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
         ON CONFLICT(kind, address, local_id) DO UPDATE SET \
            payload = excluded.payload, \
            sort_key = excluded.sort_key, \
            updated_at = excluded.updated_at",
        rusqlite::params![
            E::KIND,
            item.address,
            item.entity.local_id(),
            payload,
            item.entity.sort_key(),
            updated_at
        ],
    )?;
    Ok(())
}

fn delete_rows(conn: &Connection, kind: &str, filter: &EntityFilter) -> StoreResult<usize> {
    let (clause, params) = where_clause(kind, filter)?;
    let deleted = conn.execute(
        &format!("DELETE FROM entities WHERE {clause}"),
        rusqlite::params_from_iter(params.iter()),
    )?;
    debug!(kind, deleted, "entities deleted");
    Ok(deleted)
}

/// Batch writes against an open transaction.
struct SqliteBatch<'a> {
    conn: &'a Connection,
    updated_at: i64,
}

impl<E: Entity> BatchWriter<E> for SqliteBatch<'_> {
    fn upsert(&mut self, item: &Cached<E>) -> StoreResult<()> {
        upsert_row(self.conn, item, self.updated_at)
    }

    fn prune(&mut self, address: &str, keep: Vec<String>) -> StoreResult<usize> {
        let filter = EntityFilter::AddressExcept {
            address: address.to_string(),
            keep,
        };
        delete_rows(self.conn, E::KIND, &filter)
    }
}

#[async_trait]
impl<E: Entity> LocalCache<E> for SqliteEntityCache<E> {
    #[instrument(skip(self, item), fields(kind = E::KIND, address = %item.address))]
    async fn upsert(&self, item: Cached<E>) -> StoreResult<()> {
        let updated_at = chrono::Utc::now().timestamp();
        self.db
            .execute(move |conn| upsert_row(conn, &item, updated_at))
            .await
    }

    #[instrument(skip(self), fields(kind = E::KIND))]
    async fn delete_where(&self, filter: EntityFilter) -> StoreResult<usize> {
        self.db
            .execute(move |conn| delete_rows(conn, E::KIND, &filter))
            .await
    }

    #[instrument(skip(self, batch), fields(kind = E::KIND, items = batch.items.len()))]
    async fn replace(&self, batch: ReconcileBatch<E>) -> StoreResult<ReconcileReport> {
        let updated_at = chrono::Utc::now().timestamp();
        self.db
            .execute_mut(move |conn| {
                let tx = conn.transaction()?;
                let report = write_batch(
                    &mut SqliteBatch {
                        conn: &*tx,
                        updated_at,
                    },
                    batch,
                );
                tx.commit()?;
                Ok(report)
            })
            .await
    }

    async fn query(&self, filter: EntityFilter, sort: SortOrder) -> StoreResult<Vec<Cached<E>>> {
        let (clause, params) = where_clause(E::KIND, &filter)?;
        let rows: Vec<(String, String)> = self
            .db
            .execute(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT address, payload FROM entities WHERE {clause} {}",
                    sort.sql()
                ))?;
                let rows = stmt
                    .query_map(rusqlite::params_from_iter(params.iter()), |row| {
                        Ok((row.get(0)?, row.get(1)?))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;

        rows.into_iter()
            .map(|(address, payload)| {
                let entity: E = serde_json::from_str(&payload)?;
                Ok(Cached { address, entity })
            })
            .collect()
    }

    async fn count(&self, filter: EntityFilter) -> StoreResult<usize> {
        let (clause, params) = where_clause(E::KIND, &filter)?;
        self.db
            .execute(move |conn| {
                let count: i64 = conn.query_row(
                    &format!("SELECT count(*) FROM entities WHERE {clause}"),
                    rusqlite::params_from_iter(params.iter()),
                    |row| row.get(0),
                )?;
                Ok(count as usize)
            })
            .await
    }
}

// ── memory ───────────────────────────────────────────────────────────

/// In-process [`LocalCache`].
pub struct MemoryEntityCache<E> {
    items: Mutex<BTreeMap<EntityKey, E>>,
    fail_upserts: AtomicBool,
}

impl<E> Default for MemoryEntityCache<E> {
    fn default() -> Self {
        Self {
            items: Mutex::new(BTreeMap::new()),
            fail_upserts: AtomicBool::new(false),
        }
    }
}

impl<E: Entity> MemoryEntityCache<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// When set, `upsert` returns [`StoreError::WriteFailed`].
    pub fn set_fail_upserts(&self, fail: bool) {
        self.fail_upserts.store(fail, Ordering::SeqCst);
    }

    /// Sorted keys currently cached.
    pub fn keys(&self) -> Vec<EntityKey> {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }
}

fn upserts_disabled<E: Entity>() -> StoreError {
    StoreError::WriteFailed {
        target: E::KIND.to_string(),
        reason: "upserts disabled".into(),
    }
}

/// Batch writes against a held map guard.
struct MemoryBatch<'a, E> {
    items: &'a mut BTreeMap<EntityKey, E>,
    fail_upserts: bool,
}

impl<E: Entity> BatchWriter<E> for MemoryBatch<'_, E> {
    fn upsert(&mut self, item: &Cached<E>) -> StoreResult<()> {
        if self.fail_upserts {
            return Err(upserts_disabled::<E>());
        }
        self.items.insert(item.key(), item.entity.clone());
        Ok(())
    }

    fn prune(&mut self, address: &str, keep: Vec<String>) -> StoreResult<usize> {
        let before = self.items.len();
        self.items
            .retain(|key, _| key.address != address || keep.contains(&key.local_id));
        Ok(before - self.items.len())
    }
}

#[async_trait]
impl<E: Entity> LocalCache<E> for MemoryEntityCache<E> {
    async fn upsert(&self, item: Cached<E>) -> StoreResult<()> {
        if self.fail_upserts.load(Ordering::SeqCst) {
            return Err(upserts_disabled::<E>());
        }
        let key = item.key();
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, item.entity);
        Ok(())
    }

    async fn delete_where(&self, filter: EntityFilter) -> StoreResult<usize> {
        let mut items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        let before = items.len();
        items.retain(|key, _| !filter.matches(&key.address, &key.local_id));
        Ok(before - items.len())
    }

    async fn replace(&self, batch: ReconcileBatch<E>) -> StoreResult<ReconcileReport> {
        let mut items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        let mut writer = MemoryBatch {
            items: &mut *items,
            fail_upserts: self.fail_upserts.load(Ordering::SeqCst),
        };
        Ok(write_batch(&mut writer, batch))
    }

    async fn query(&self, filter: EntityFilter, sort: SortOrder) -> StoreResult<Vec<Cached<E>>> {
        let mut selected: Vec<Cached<E>> = self
            .items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(key, _)| filter.matches(&key.address, &key.local_id))
            .map(|(key, entity)| Cached {
                address: key.address.clone(),
                entity: entity.clone(),
            })
            .collect();
        selected.sort_by(|a, b| sort.compare(a, b));
        Ok(selected)
    }
}

// ── tests ────────────────────────────────────────────────────────────
