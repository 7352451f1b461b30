use crate::{Commit, CommitBuilder, Result, VersioningError};
use cadence_storage::{KVStore, RedbBackend, Transaction};
use std::sync::Arc;
use tracing::{debug, info};

const COMMIT_PREFIX: &str = "version:commit:";
const HEAD_KEY: &[u8] = b"version:head";

/// Append-only commit log stored next to the objects it versions
pub struct VersionStore {
    storage: Arc<RedbBackend>,
    /// Current HEAD commit (latest commit)
    head: parking_lot::RwLock<Option<Commit>>,
}

impl VersionStore {
    /// Open the commit log, loading HEAD from storage
    pub fn new(storage: Arc<RedbBackend>) -> Result<Self> {
        info!("Initializing VersionStore");

        let store = Self {
            storage,
            head: parking_lot::RwLock::new(None),
        };

        if let Some(head_id) = store.storage.get_key(HEAD_KEY)? {
            let head = store.get_commit(&head_id)?;
            info!("Loaded HEAD: {} (sequence {})", head.id, head.sequence);
            *store.head.write() = Some(head);
        }

        Ok(store)
    }

    /// Append a commit on top of the current HEAD
    pub fn create_commit(&self, builder: CommitBuilder) -> Result<Commit> {
        self.commit_with(builder, |_, _| Ok(()))
    }

    /// Append a commit and let `apply` write the objects it versions in the
    /// same transaction
    ///
    /// Either the commit, HEAD and every write made by `apply` land
    /// together, or none of them do and HEAD stays where it was.
    pub fn commit_with<E, F>(
        &self,
        builder: CommitBuilder,
        apply: F,
    ) -> std::result::Result<Commit, E>
    where
        E: From<VersioningError>,
        F: FnOnce(&Commit, &mut dyn Transaction) -> std::result::Result<(), E>,
    {
        let mut head = self.head.write();
        let commit = builder.build(head.as_ref());
        debug!("Creating commit: {}", commit.id);

        let commit_json = serde_json::to_string(&commit)
            .map_err(|e| VersioningError::malformed_commit(&commit.id, e))?;
        let commit_key = format!("{}{}", COMMIT_PREFIX, commit.id);

        let mut txn = self
            .storage
            .transaction()
            .map_err(VersioningError::from)?;
        txn.put(commit_key.as_bytes(), commit_json.as_bytes())
            .map_err(VersioningError::from)?;
        txn.put(HEAD_KEY, commit.id.as_bytes())
            .map_err(VersioningError::from)?;
        apply(&commit, &mut *txn)?;
        txn.commit().map_err(VersioningError::from)?;
        *head = Some(commit.clone());

        debug!(
            "Created commit {} ({} changes)",
            commit.id,
            commit.changes.len()
        );
        Ok(commit)
    }

    /// Get a commit by ID
    pub fn get_commit(&self, commit_id: &str) -> Result<Commit> {
        let commit_key = format!("{}{}", COMMIT_PREFIX, commit_id);
        let commit_bytes = self
            .storage
            .get(commit_key.as_bytes())?
            .ok_or_else(|| VersioningError::commit_not_found(commit_id))?;

        serde_json::from_slice(&commit_bytes)
            .map_err(|e| VersioningError::malformed_commit(commit_id, e))
    }

    /// Get the current HEAD commit
    pub fn get_head(&self) -> Option<Commit> {
        self.head.read().clone()
    }

    /// All commits, oldest first
    pub fn list_commits(&self) -> Result<Vec<Commit>> {
        let entries = self.storage.scan(COMMIT_PREFIX.as_bytes())?;
        let mut commits = entries
            .iter()
            .map(|(key, value)| {
                serde_json::from_slice::<Commit>(value).map_err(|e| {
                    let id = key.strip_prefix(COMMIT_PREFIX.as_bytes()).unwrap_or(&key[..]);
                    VersioningError::malformed_commit(String::from_utf8_lossy(id), e)
                })
            })
            .collect::<Result<Vec<_>>>()?;

        commits.sort_by_key(|c| c.sequence);
        Ok(commits)
    }

    /// Commits that touched the object stored under `resource_key`, oldest first
    pub fn history_of(&self, resource_key: &str) -> Result<Vec<Commit>> {
        Ok(self
            .list_commits()?
            .into_iter()
            .filter(|c| c.touches(resource_key))
            .collect())
    }
}
