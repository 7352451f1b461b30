use crate::Result;
use async_trait::async_trait;
use cadence_core::{Resource, ResourceKey};

/// Read/write access to cluster state.
///
/// Writes are conditioned on `metadata.resourceVersion`: `update` requires
/// the version the caller last read, and `delete` checks it when present.
/// Every call is a suspension point; nothing is cached between calls.
#[async_trait]
pub trait ClusterClient: Send + Sync + 'static {
    /// Fetch an object, `NotFound` if absent
    async fn get<T: Resource>(&self, key: &ResourceKey) -> Result<T>;

    /// Create an object, `AlreadyExists` if the key is taken
    async fn create<T: Resource>(&self, resource: T) -> Result<T>;

    /// Replace an object, `Conflict` on a stale or missing resourceVersion
    async fn update<T: Resource>(&self, resource: T) -> Result<T>;

    /// Delete an object and everything it owns
    async fn delete<T: Resource>(&self, resource: &T) -> Result<()>;

    /// List objects of a kind, optionally within one namespace
    async fn list<T: Resource>(&self, namespace: Option<&str>) -> Result<Vec<T>>;
}
