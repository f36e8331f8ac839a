//! # homebase-sync
//!
//! Network-to-cache synchronization for Homebase features.
//!
//! ```text
//! UI ── fetch/create/update/delete ──▶ SyncRepository<A>
//!                                         │
//!                                         ▼
//!                                   RemoteSource<A> ── FeatureApi (HttpApi<F>)
//!                                         │
//!                       BroadcastChannel<Option<ResponseBatch>>
//!                                         │
//!                     background loop ◀───┘   gate: logged in AND
//!                                         │         batch.address == selected
//!                                         ▼
//!                             Reconciler ──▶ LocalCache<F::Entity>
//! ```
//!
//! One generic [`SyncRepository`] serves every feature in
//! [`features`]; a [`Feature`] impl is all a new collection needs.
//! [`AccountRepository`] keeps the session's account and address in step
//! with the server.

pub mod account;
pub mod error;
pub mod feature;
pub mod features;
pub mod http;
pub mod remote;
pub mod repository;

pub use account::{AccountApi, AccountRepository};
pub use error::{Result, SyncError};
pub use feature::{Feature, FeatureEndpoint, Route, Verb};
pub use http::{DEFAULT_BASE_URL, HttpAccountApi, HttpApi, HttpClient};
pub use remote::{DraftOf, EntityOf, FeatureApi, RemoteSource, ResponseBatch, ResponseOf};
pub use repository::{SharedCache, SyncRepository};
