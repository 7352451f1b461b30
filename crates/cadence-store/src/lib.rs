//! Cadence Store - embedded cluster state for the controllers
//!
//! This crate provides:
//! - The `ClusterClient` trait reconcilers read and write through
//! - `ClusterStore`, a redb-backed implementation with commit-based
//!   resource versions and optimistic concurrency
//! - Owner-reference garbage collection on delete
//! - A broadcast bus of ADDED/MODIFIED/DELETED events

pub mod client;
pub mod error;
pub mod event_bus;
pub mod store;

pub use client::ClusterClient;
pub use error::{Result, StoreError};
pub use event_bus::{EventBusConfig, ResourceEvent, WatchEventType};
pub use store::ClusterStore;
