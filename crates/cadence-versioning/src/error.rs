// Fields below are read by the miette derive
#![allow(unused_assignments)]

use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Debug, Diagnostic)]
pub enum VersioningError {
    /// HEAD or a resourceVersion names a commit that is not in the log
    #[error("Commit not found: {commit_id}")]
    #[diagnostic(
        code(versioning::commit_not_found),
        help("resourceVersions are commit ids; re-read the object to get a current one")
    )]
    CommitNotFound { commit_id: String },

    #[error("Storage error: {0}")]
    #[diagnostic(code(versioning::storage))]
    Storage(#[from] cadence_storage::StorageError),

    /// A commit could not be encoded or decoded
    #[error("Malformed commit {commit_id}: {source}")]
    #[diagnostic(
        code(versioning::malformed_commit),
        help("The commit log was written by an incompatible version or edited by hand")
    )]
    MalformedCommit {
        commit_id: String,
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, VersioningError>;

impl VersioningError {
    pub fn commit_not_found(commit_id: impl Into<String>) -> Self {
        Self::CommitNotFound {
            commit_id: commit_id.into(),
        }
    }

    pub fn malformed_commit(commit_id: impl Into<String>, source: serde_json::Error) -> Self {
        Self::MalformedCommit {
            commit_id: commit_id.into(),
            source,
        }
    }
}
