//! Homebase kernel primitives.
//!
//! - **[`channel`]** -- [`BroadcastChannel`], a replay-one publish/subscribe
//!   primitive with a dynamic subscriber registry.  Every piece of shared
//!   session state and every network response stream in Homebase is fanned
//!   out through one of these.
//!
//! All public types are `Send` and designed for use within a multi-threaded
//! tokio runtime.

pub mod channel;

pub use channel::{BroadcastChannel, Subscription};
