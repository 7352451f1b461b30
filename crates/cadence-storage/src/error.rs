// Fields below are read by the miette derive
#![allow(unused_assignments)]

use miette::Diagnostic;
use thiserror::Error;

type BoxedSource = Box<dyn std::error::Error + Send + Sync>;

/// Errors raised by the key-value layer
#[derive(Error, Debug, Diagnostic)]
pub enum StorageError {
    /// The redb file could not be opened, read or written
    #[error("Database error: {message}")]
    #[diagnostic(
        code(storage::database),
        help("Check that --data-dir points at a writable redb file that no other process holds open")
    )]
    Database {
        message: String,
        #[source]
        source: Option<BoxedSource>,
    },

    /// A write transaction was misused or failed to commit
    #[error("Transaction error: {message}")]
    #[diagnostic(
        code(storage::transaction),
        help("A transaction can be committed or rolled back exactly once")
    )]
    Transaction { message: String },

    /// An index or pointer entry holds bytes that are not a storage key
    #[error("Corrupt entry at {key}: {message}")]
    #[diagnostic(
        code(storage::corrupt_entry),
        help("The database was modified outside cadence; restore it from a copy")
    )]
    CorruptEntry { key: String, message: String },
}

/// Result type for storage operations
pub type Result<T> = std::result::Result<T, StorageError>;

impl StorageError {
    pub fn database_error(message: impl Into<String>, source: Option<BoxedSource>) -> Self {
        Self::Database {
            message: message.into(),
            source,
        }
    }

    pub fn transaction_error(message: impl Into<String>) -> Self {
        Self::Transaction {
            message: message.into(),
        }
    }

    pub fn corrupt_entry(key: &[u8], message: impl Into<String>) -> Self {
        Self::CorruptEntry {
            key: String::from_utf8_lossy(key).into_owned(),
            message: message.into(),
        }
    }
}

// redb splits its failures across one type per operation; they all land in
// one of the two variants above.
macro_rules! from_redb {
    (@build database, $err:ident) => {
        StorageError::database_error($err.to_string(), Some(Box::new($err)))
    };
    (@build transaction, $err:ident) => {
        StorageError::transaction_error($err.to_string())
    };
    ($($ty:ty => $ctor:ident),* $(,)?) => {
        $(
            impl From<$ty> for StorageError {
                fn from(err: $ty) -> Self {
                    from_redb!(@build $ctor, err)
                }
            }
        )*
    };
}

from_redb! {
    redb::Error => database,
    redb::DatabaseError => database,
    redb::StorageError => database,
    redb::TableError => database,
    redb::TransactionError => transaction,
    redb::CommitError => transaction,
}
