//! Cadence Versioning - commit log behind resource versions
//!
//! This crate provides:
//! - VersionStore, an append-only commit log on top of the KV store
//! - Commit operations for resource changes
//! - Per-resource history lookup
//!
//! Every write to the object store is recorded as a commit, and the commit
//! id becomes the object's new `resourceVersion`.

pub mod commit;
pub mod error;
pub mod store;

pub use commit::{Change, ChangeType, Commit, CommitBuilder};
pub use error::{Result, VersioningError};
pub use store::VersionStore;
