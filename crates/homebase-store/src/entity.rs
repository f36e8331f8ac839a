//! Cached entity model.
//!
//! Every feature (pastes, short links, statuses, ...) caches its items as
//! [`Cached<E>`]: the feature payload `E` stamped with the address it belongs
//! to.  The natural key of a cached item is `(address, local_id)`.

use std::cmp::Ordering;
use std::fmt;

use serde::Serialize;
use serde::de::DeserializeOwned;

/// A feature-specific cached payload.
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Stable feature tag, used to partition the shared entity table.
    const KIND: &'static str;

    /// Identifier unique within one address (paste title, purl name, ...).
    fn local_id(&self) -> String;

    /// Ordering hint for listings; larger is newer.
    fn sort_key(&self) -> i64 {
        0
    }
}

/// Natural key of a cached item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityKey {
    pub address: String,
    pub local_id: String,
}

impl EntityKey {
    pub fn new(address: impl Into<String>, local_id: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            local_id: local_id.into(),
        }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.address, self.local_id)
    }
}

/// An entity stamped with its owning address.
#[derive(Debug, Clone, PartialEq)]
pub struct Cached<E> {
    pub address: String,
    pub entity: E,
}

impl<E: Entity> Cached<E> {
    pub fn new(address: impl Into<String>, entity: E) -> Self {
        Self {
            address: address.into(),
            entity,
        }
    }

    pub fn key(&self) -> EntityKey {
        EntityKey::new(self.address.clone(), self.entity.local_id())
    }
}

/// Which cached items an operation applies to.
///
/// Filters are always scoped to one entity kind by the cache they are
/// passed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityFilter {
    /// Every item of the kind, across all addresses.
    All,
    /// Every item belonging to one address.
    Address(String),
    /// Exactly one item.
    Key(EntityKey),
    /// Items of `address` whose id is not in `keep`.
    AddressExcept { address: String, keep: Vec<String> },
}

impl EntityFilter {
    /// Whether an item with this key is selected.
    pub fn matches(&self, address: &str, local_id: &str) -> bool {
        match self {
            Self::All => true,
            Self::Address(a) => a == address,
            Self::Key(key) => key.address == address && key.local_id == local_id,
            Self::AddressExcept { address: a, keep } => {
                a == address && !keep.iter().any(|id| id == local_id)
            }
        }
    }
}

/// Listing order for [`LocalCache::query`](crate::LocalCache::query).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    /// Largest sort key first.
    #[default]
    Newest,
    /// Smallest sort key first.
    Oldest,
    /// By address, then id.
    ById,
}

impl SortOrder {
    /// Compare two cached items under this order.  Ties always fall back to
    /// the key so results are deterministic.
    pub fn compare<E: Entity>(self, a: &Cached<E>, b: &Cached<E>) -> Ordering {
        let by_key = || a.key().cmp(&b.key());
        match self {
            Self::Newest => b.entity.sort_key().cmp(&a.entity.sort_key()).then_with(by_key),
            Self::Oldest => a.entity.sort_key().cmp(&b.entity.sort_key()).then_with(by_key),
            Self::ById => by_key(),
        }
    }

    pub(crate) fn sql(self) -> &'static str {
        match self {
            Self::Newest => "ORDER BY sort_key DESC, address, local_id",
            Self::Oldest => "ORDER BY sort_key ASC, address, local_id",
            Self::ById => "ORDER BY address, local_id",
        }
    }
}
