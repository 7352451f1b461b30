use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of write recorded by a [`Change`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Create,
    Update,
    Delete,
}

/// One object write inside a commit
///
/// Contents are the JSON documents as stored, so a commit can be replayed
/// or inspected without the object types at hand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum Change {
    Create {
        key: String,
        content: String,
    },
    Update {
        key: String,
        content: String,
        previous: String,
    },
    Delete {
        key: String,
        previous: String,
    },
}

impl Change {
    pub fn create(key: String, content: String) -> Self {
        Change::Create { key, content }
    }

    pub fn update(key: String, content: String, previous: String) -> Self {
        Change::Update {
            key,
            content,
            previous,
        }
    }

    pub fn delete(key: String, previous: String) -> Self {
        Change::Delete { key, previous }
    }

    /// Storage key of the written object
    pub fn key(&self) -> &str {
        match self {
            Change::Create { key, .. } | Change::Update { key, .. } | Change::Delete { key, .. } => {
                key
            }
        }
    }

    pub fn change_type(&self) -> ChangeType {
        match self {
            Change::Create { .. } => ChangeType::Create,
            Change::Update { .. } => ChangeType::Update,
            Change::Delete { .. } => ChangeType::Delete,
        }
    }

    /// Object content after the write; `None` for deletes
    pub fn content(&self) -> Option<&str> {
        match self {
            Change::Create { content, .. } | Change::Update { content, .. } => Some(content),
            Change::Delete { .. } => None,
        }
    }
}

/// One entry of the commit log
///
/// The id doubles as the resourceVersion of every object the commit wrote.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Commit {
    pub id: String,
    /// Position in the log, starting at 1
    pub sequence: u64,
    /// HEAD at the time this commit was appended
    pub parent: Option<String>,
    pub changes: Vec<Change>,
    pub message: String,
    pub author: String,
    pub timestamp: DateTime<Utc>,
}

impl Commit {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Whether any change in this commit wrote `key`
    pub fn touches(&self, key: &str) -> bool {
        self.changes.iter().any(|c| c.key() == key)
    }
}

/// Accumulates changes for [`crate::VersionStore::create_commit`]
pub struct CommitBuilder {
    changes: Vec<Change>,
    message: String,
    author: String,
}

impl CommitBuilder {
    pub fn new() -> Self {
        Self {
            changes: Vec::new(),
            message: String::new(),
            author: "cadence".to_string(),
        }
    }

    pub fn change(mut self, change: Change) -> Self {
        self.changes.push(change);
        self
    }

    pub fn changes(mut self, changes: impl IntoIterator<Item = Change>) -> Self {
        self.changes.extend(changes);
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    /// Seal the commit on top of `parent`
    pub(crate) fn build(self, parent: Option<&Commit>) -> Commit {
        Commit {
            id: Uuid::new_v4().to_string(),
            sequence: parent.map_or(1, |p| p.sequence + 1),
            parent: parent.map(|p| p.id.clone()),
            changes: self.changes,
            message: self.message,
            author: self.author,
            timestamp: Utc::now(),
        }
    }
}

impl Default for CommitBuilder {
    fn default() -> Self {
        Self::new()
    }
}
