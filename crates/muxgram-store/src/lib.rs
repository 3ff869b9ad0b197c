//! Durable session and approval state for the muxgram bridge daemon.
//!
//! A single SQLite file (`sessions.db`) holds two tables: `sessions` and
//! `approvals`. Transactions are short and serialized behind a mutex; the
//! store is the source of truth and the daemon's in-memory maps are caches
//! rebuilt from it.
//!
//! Opening the store runs idempotent migrations: missing columns are added
//! with NULL defaults, columns are never dropped or narrowed.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod approvals;
mod error;
mod schema;
mod sessions;
mod store;

pub use error::{StoreError, StoreResult};
pub use store::{SessionSeed, SessionStore};
