use crate::event_bus::{EventBusConfig, ResourceEvent};
use crate::{ClusterClient, Result, StoreError};
use async_trait::async_trait;
use cadence_core::{GroupVersionKind, Resource, ResourceKey, ResourceVersion, Time};
use cadence_storage::{decode_key, IndexKey, KVStore, KeyEncoder, RedbBackend};
use cadence_versioning::{Change, CommitBuilder, VersionStore};
use chrono::{SubsecRound, Utc};
use serde_json::Value;
use std::collections::{HashSet, VecDeque};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Embedded cluster state: objects, their commit log and the event bus
#[derive(Clone)]
pub struct ClusterStore {
    storage: Arc<RedbBackend>,
    version_store: Arc<VersionStore>,
    event_tx: broadcast::Sender<ResourceEvent>,
    /// Serializes mutations so that the read-check-write of each one is atomic
    write_lock: Arc<parking_lot::Mutex<()>>,
}

impl ClusterStore {
    /// Open (or create) a store backed by the database at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let storage = Arc::new(RedbBackend::new(path)?);
        let version_store = Arc::new(VersionStore::new(storage.clone())?);
        Ok(Self::new(storage, version_store))
    }

    /// Create a store with the default event bus config
    pub fn new(storage: Arc<RedbBackend>, version_store: Arc<VersionStore>) -> Self {
        Self::with_event_bus_config(storage, version_store, EventBusConfig::default())
    }

    /// Create a store with a custom event bus config
    pub fn with_event_bus_config(
        storage: Arc<RedbBackend>,
        version_store: Arc<VersionStore>,
        config: EventBusConfig,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(config.capacity);
        Self {
            storage,
            version_store,
            event_tx,
            write_lock: Arc::new(parking_lot::Mutex::new(())),
        }
    }

    /// Subscribe to resource events
    pub fn subscribe(&self) -> broadcast::Receiver<ResourceEvent> {
        self.event_tx.subscribe()
    }

    /// The commit log behind resource versions
    pub fn version_store(&self) -> &VersionStore {
        &self.version_store
    }

    fn get_object<T: Resource>(&self, key: &ResourceKey) -> Result<T> {
        debug!("Getting resource: {}", key);

        let storage_key = KeyEncoder::encode_resource_key(key);
        let data = self
            .storage
            .get(storage_key.as_bytes())?
            .ok_or_else(|| StoreError::not_found(key))?;

        Ok(serde_json::from_slice(&data)?)
    }

    fn create_object<T: Resource>(&self, mut resource: T) -> Result<T> {
        let key = object_key(&resource)?;
        let storage_key = KeyEncoder::encode_resource_key(&key);

        let _guard = self.write_lock.lock();
        info!("Creating resource: {}", key);

        if self.storage.contains(storage_key.as_bytes())? {
            return Err(StoreError::already_exists(&key));
        }
        self.check_owners_exist(&key, &resource)?;

        let metadata = resource.metadata_mut();
        if key.is_namespaced() {
            metadata.namespace = Some(key.namespace.clone());
        }
        metadata.uid = Some(Uuid::new_v4().to_string());
        metadata.creation_timestamp = Some(Time(Utc::now().trunc_subsecs(0)));
        metadata.resource_version = None;

        let content = serde_json::to_string(&resource)?;
        let builder = CommitBuilder::new()
            .change(Change::create(storage_key.clone(), content))
            .message(format!("Create {}", key));
        let commit = self
            .version_store
            .commit_with(builder, |commit, txn| -> Result<()> {
                resource.set_resource_version(ResourceVersion::new(commit.id()));

                let data = serde_json::to_vec(&resource)?;
                let uid_key = IndexKey::Uid {
                    uid: resource.uid().unwrap_or_default(),
                };
                txn.put(storage_key.as_bytes(), &data)?;
                txn.put(uid_key.encode().as_bytes(), storage_key.as_bytes())?;
                for index_key in owner_index_keys(&resource, &storage_key) {
                    txn.put(index_key.encode().as_bytes(), storage_key.as_bytes())?;
                }
                Ok(())
            })?;

        info!("Created resource: {} with version {}", key, commit.id());

        // Publish ADDED event (best-effort)
        if let Ok(object) = serde_json::to_value(&resource) {
            let _ = self
                .event_tx
                .send(ResourceEvent::added(key, object, commit.id().to_string()));
        }

        Ok(resource)
    }

    fn update_object<T: Resource>(&self, mut resource: T) -> Result<T> {
        let key = object_key(&resource)?;
        let storage_key = KeyEncoder::encode_resource_key(&key);

        let _guard = self.write_lock.lock();
        info!("Updating resource: {}", key);

        let prev_data = self
            .storage
            .get(storage_key.as_bytes())?
            .ok_or_else(|| StoreError::not_found(&key))?;
        let prev: Value = serde_json::from_slice(&prev_data)?;

        let stored_version = metadata_str(&prev, "resourceVersion");
        match resource.resource_version() {
            None => {
                return Err(StoreError::conflict(
                    &key,
                    "update requires metadata.resourceVersion",
                ))
            }
            Some(version) if Some(version.as_str()) != stored_version => {
                return Err(StoreError::conflict(
                    &key,
                    format!(
                        "resourceVersion {} does not match stored version {}",
                        version,
                        stored_version.unwrap_or("<none>")
                    ),
                ));
            }
            Some(_) => {}
        }
        self.check_owners_exist(&key, &resource)?;

        // Identity fields are owned by the store
        let metadata = resource.metadata_mut();
        if key.is_namespaced() {
            metadata.namespace = Some(key.namespace.clone());
        }
        metadata.uid = metadata_str(&prev, "uid").map(str::to_string);
        metadata.creation_timestamp = prev
            .pointer("/metadata/creationTimestamp")
            .cloned()
            .and_then(|ts| serde_json::from_value(ts).ok());
        metadata.resource_version = None;

        let content = serde_json::to_string(&resource)?;
        let builder = CommitBuilder::new()
            .change(Change::update(
                storage_key.clone(),
                content,
                String::from_utf8_lossy(&prev_data).to_string(),
            ))
            .message(format!("Update {}", key));
        let commit = self
            .version_store
            .commit_with(builder, |commit, txn| -> Result<()> {
                resource.set_resource_version(ResourceVersion::new(commit.id()));

                let data = serde_json::to_vec(&resource)?;
                for owner_uid in owner_uids(&prev) {
                    let stale = IndexKey::Owner {
                        owner_uid,
                        dependent_key: storage_key.clone(),
                    };
                    txn.delete(stale.encode().as_bytes())?;
                }
                for index_key in owner_index_keys(&resource, &storage_key) {
                    txn.put(index_key.encode().as_bytes(), storage_key.as_bytes())?;
                }
                txn.put(storage_key.as_bytes(), &data)?;
                Ok(())
            })?;

        info!("Updated resource: {} with version {}", key, commit.id());

        // Publish MODIFIED event (best-effort)
        if let Ok(object) = serde_json::to_value(&resource) {
            let _ = self
                .event_tx
                .send(ResourceEvent::modified(key, object, commit.id().to_string()));
        }

        Ok(resource)
    }

    fn delete_object<T: Resource>(&self, resource: &T) -> Result<()> {
        let key = object_key(resource)?;
        let storage_key = KeyEncoder::encode_resource_key(&key);

        let _guard = self.write_lock.lock();
        info!("Deleting resource: {}", key);

        let prev_data = self
            .storage
            .get(storage_key.as_bytes())?
            .ok_or_else(|| StoreError::not_found(&key))?;
        let prev: Value = serde_json::from_slice(&prev_data)?;

        if let Some(version) = resource.resource_version() {
            let stored_version = metadata_str(&prev, "resourceVersion");
            if Some(version.as_str()) != stored_version {
                return Err(StoreError::conflict(
                    &key,
                    format!(
                        "resourceVersion {} does not match stored version {}",
                        version,
                        stored_version.unwrap_or("<none>")
                    ),
                ));
            }
        }

        let (doomed, stale_index) = self.collect_cascade(storage_key, prev)?;

        let changes = doomed
            .iter()
            .map(|(dependent_key, object)| {
                Change::delete(dependent_key.clone(), object.to_string())
            })
            .collect::<Vec<_>>();
        let builder = CommitBuilder::new()
            .changes(changes)
            .message(format!("Delete {}", key));
        let commit = self
            .version_store
            .commit_with(builder, |_, txn| -> Result<()> {
                for (object_key, object) in &doomed {
                    txn.delete(object_key.as_bytes())?;
                    if let Some(uid) = metadata_str(object, "uid") {
                        let entry = IndexKey::Uid {
                            uid: uid.to_string(),
                        };
                        txn.delete(entry.encode().as_bytes())?;
                    }
                    for owner_uid in owner_uids(object) {
                        let entry = IndexKey::Owner {
                            owner_uid,
                            dependent_key: object_key.clone(),
                        };
                        txn.delete(entry.encode().as_bytes())?;
                    }
                }
                for index_key in &stale_index {
                    txn.delete(index_key)?;
                }
                Ok(())
            })?;

        info!(
            "Deleted resource: {} at version {} ({} dependents collected)",
            key,
            commit.id(),
            doomed.len() - 1
        );

        // Publish DELETED events with last-known state (best-effort)
        for (object_key, object) in doomed {
            match resource_key_of(&object) {
                Some(event_key) => {
                    let _ = self.event_tx.send(ResourceEvent::deleted(
                        event_key,
                        object,
                        commit.id().to_string(),
                    ));
                }
                None => warn!("Deleted object {} has no apiVersion/kind/name", object_key),
            }
        }

        Ok(())
    }

    /// Owner references must point at live objects, so that no child is
    /// written after the cascade that should have collected it
    fn check_owners_exist<T: Resource>(&self, key: &ResourceKey, resource: &T) -> Result<()> {
        for owner in resource.metadata().owner_references.iter().flatten() {
            let uid_key = IndexKey::Uid {
                uid: owner.uid.clone(),
            };
            if !self.storage.contains(uid_key.encode().as_bytes())? {
                return Err(StoreError::conflict(
                    key,
                    format!(
                        "owner {} {} ({}) does not exist",
                        owner.kind, owner.name, owner.uid
                    ),
                ));
            }
        }
        Ok(())
    }

    /// Walk the owner index from `root`, returning every object to delete
    /// (root first) and index entries that no longer point at a dependent
    #[allow(clippy::type_complexity)]
    fn collect_cascade(
        &self,
        root_key: String,
        root: Value,
    ) -> Result<(Vec<(String, Value)>, Vec<Vec<u8>>)> {
        let mut doomed = Vec::new();
        let mut stale_index = Vec::new();
        let mut seen = HashSet::new();
        let mut pending = VecDeque::from([(root_key, root)]);

        while let Some((object_key, object)) = pending.pop_front() {
            if !seen.insert(object_key.clone()) {
                continue;
            }

            if let Some(uid) = metadata_str(&object, "uid") {
                let prefix = IndexKey::encode_prefix_for_owner(uid);
                for (index_key, dependent) in self.storage.scan(prefix.as_bytes())? {
                    let dependent_key = decode_key(&index_key, dependent)?;
                    let live = match self.storage.get(dependent_key.as_bytes())? {
                        Some(data) => serde_json::from_slice::<Value>(&data)
                            .ok()
                            .filter(|dependent| owner_uids(dependent).iter().any(|u| u == uid)),
                        None => None,
                    };

                    match live {
                        Some(dependent) => {
                            debug!("Collecting {} owned by {}", dependent_key, object_key);
                            pending.push_back((dependent_key, dependent));
                        }
                        None => stale_index.push(index_key.to_vec()),
                    }
                }
            }

            doomed.push((object_key, object));
        }

        Ok((doomed, stale_index))
    }

    fn list_objects<T: Resource>(&self, namespace: Option<&str>) -> Result<Vec<T>> {
        let prefix = KeyEncoder::encode_prefix(T::API_VERSION, T::KIND, namespace);
        debug!("Listing resources with prefix: {}", prefix);

        let resources = self
            .storage
            .scan(prefix.as_bytes())?
            .iter()
            .map(|(_, data)| serde_json::from_slice(data).map_err(StoreError::from))
            .collect::<Result<Vec<T>>>()?;

        debug!("Found {} resources", resources.len());
        Ok(resources)
    }
}

#[async_trait]
impl ClusterClient for ClusterStore {
    async fn get<T: Resource>(&self, key: &ResourceKey) -> Result<T> {
        self.get_object(key)
    }

    async fn create<T: Resource>(&self, resource: T) -> Result<T> {
        self.create_object(resource)
    }

    async fn update<T: Resource>(&self, resource: T) -> Result<T> {
        self.update_object(resource)
    }

    async fn delete<T: Resource>(&self, resource: &T) -> Result<()> {
        self.delete_object(resource)
    }

    async fn list<T: Resource>(&self, namespace: Option<&str>) -> Result<Vec<T>> {
        self.list_objects(namespace)
    }
}

fn object_key<T: Resource>(resource: &T) -> Result<ResourceKey> {
    resource
        .resource_key()
        .map_err(|e| StoreError::invalid_object(e.to_string()))
}

fn metadata_str<'a>(object: &'a Value, field: &str) -> Option<&'a str> {
    object.get("metadata")?.get(field)?.as_str()
}

fn owner_uids(object: &Value) -> Vec<String> {
    object
        .pointer("/metadata/ownerReferences")
        .and_then(Value::as_array)
        .map(|refs| {
            refs.iter()
                .filter_map(|r| r.get("uid").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn owner_index_keys<T: Resource>(resource: &T, storage_key: &str) -> Vec<IndexKey> {
    resource
        .metadata()
        .owner_references
        .iter()
        .flatten()
        .map(|owner| IndexKey::Owner {
            owner_uid: owner.uid.clone(),
            dependent_key: storage_key.to_string(),
        })
        .collect()
}

/// Rebuild the key of a stored object from its own fields
fn resource_key_of(object: &Value) -> Option<ResourceKey> {
    let api_version = object.get("apiVersion")?.as_str()?;
    let kind = object.get("kind")?.as_str()?;
    let name = metadata_str(object, "name")?;
    let gvk = GroupVersionKind::from_api_version_kind(api_version, kind);

    Some(match metadata_str(object, "namespace") {
        Some(namespace) => ResourceKey::new(gvk, namespace, name),
        None => ResourceKey::cluster_scoped(gvk, name),
    })
}
