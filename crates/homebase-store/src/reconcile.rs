//! Set-diff reconciliation of an authoritative batch into a [`LocalCache`].
//!
//! The server is authoritative for every address a batch reports: items in
//! the batch are upserted, and any cached item for one of those addresses
//! that the batch no longer mentions is deleted.  Addresses the batch does
//! not report are never touched.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, warn};

use crate::cache::LocalCache;
use crate::entity::{Cached, Entity};
use crate::error::StoreResult;

/// An authoritative snapshot for one or more addresses.
///
/// `addresses` is tracked separately from `items` so that an empty batch
/// still tells the reconciler which addresses to prune.
#[derive(Debug, Clone)]
pub struct ReconcileBatch<E> {
    pub addresses: BTreeSet<String>,
    pub items: Vec<Cached<E>>,
}

impl<E: Entity> ReconcileBatch<E> {
    /// A batch covering a single address.  Every entity is stamped with it.
    pub fn for_address(address: impl Into<String>, entities: Vec<E>) -> Self {
        let address = address.into();
        let items = entities
            .into_iter()
            .map(|entity| Cached::new(address.clone(), entity))
            .collect();
        Self {
            addresses: BTreeSet::from([address]),
            items,
        }
    }

    /// A batch over explicit addresses.  Addresses of `items` are added to
    /// the covered set.
    pub fn new(addresses: impl IntoIterator<Item = String>, items: Vec<Cached<E>>) -> Self {
        let mut addresses: BTreeSet<String> = addresses.into_iter().collect();
        addresses.extend(items.iter().map(|item| item.address.clone()));
        Self { addresses, items }
    }
}

/// Outcome of one [`Reconciler::apply`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub upserted: usize,
    pub deleted: usize,
    pub failed: usize,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }
}

/// Per-item write access a cache grants for the duration of one batch.
///
/// Implementations hold whatever keeps the batch atomic (a transaction, a
/// map guard) for as long as they live.
pub(crate) trait BatchWriter<E: Entity> {
    fn upsert(&mut self, item: &Cached<E>) -> StoreResult<()>;

    fn prune(&mut self, address: &str, keep: Vec<String>) -> StoreResult<usize>;
}

/// Upsert every item, then prune each covered address down to the ids the
/// batch mentions.  Pruning an address is skipped if any upsert for that
/// address failed.
pub(crate) fn write_batch<E, W>(writer: &mut W, batch: ReconcileBatch<E>) -> ReconcileReport
where
    E: Entity,
    W: BatchWriter<E>,
{
    let mut report = ReconcileReport::default();
    let mut keep: BTreeMap<String, Vec<String>> = batch
        .addresses
        .iter()
        .map(|address| (address.clone(), Vec::new()))
        .collect();
    let mut tainted: BTreeSet<String> = BTreeSet::new();

    for item in &batch.items {
        let key = item.key();
        keep.entry(key.address.clone())
            .or_default()
            .push(key.local_id.clone());

        match writer.upsert(item) {
            Ok(()) => report.upserted += 1,
            Err(e) => {
                warn!(kind = E::KIND, key = %key, error = %e, "failed to upsert cached item");
                report.failed += 1;
                tainted.insert(key.address);
            }
        }
    }

    for (address, keep) in keep {
        if tainted.contains(&address) {
            warn!(kind = E::KIND, address = %address, "skipping prune after failed upserts");
            continue;
        }
        match writer.prune(&address, keep) {
            Ok(n) => report.deleted += n,
            Err(e) => {
                warn!(kind = E::KIND, address = %address, error = %e, "failed to prune cached items");
                report.failed += 1;
            }
        }
    }

    report
}

/// Applies [`ReconcileBatch`]es to a cache.
#[derive(Debug, Clone, Copy, Default)]
pub struct Reconciler;

impl Reconciler {
    /// Apply `batch` through [`LocalCache::replace`], so readers see either
    /// the cache before the batch or after it.
    ///
    /// Cache failures are logged and counted, never returned: a bad item
    /// must not stop the rest of the batch, and the next fetch re-delivers
    /// the full snapshot anyway.  If the batch as a whole cannot be
    /// committed, nothing is applied and every item counts as failed.
    pub async fn apply<E, C>(cache: &C, batch: ReconcileBatch<E>) -> ReconcileReport
    where
        E: Entity,
        C: LocalCache<E> + ?Sized,
    {
        let attempted = batch.items.len().max(1);
        let report = match cache.replace(batch).await {
            Ok(report) => report,
            Err(e) => {
                warn!(kind = E::KIND, error = %e, "failed to commit reconcile batch");
                ReconcileReport {
                    failed: attempted,
                    ..ReconcileReport::default()
                }
            }
        };

        debug!(
            kind = E::KIND,
            upserted = report.upserted,
            deleted = report.deleted,
            failed = report.failed,
            "batch reconciled"
        );
        report
    }
}

// ── tests ────────────────────────────────────────────────────────────
