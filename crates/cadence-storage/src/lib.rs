//! Ordered key-value storage on redb, plus the key layout shared by the
//! object store and the commit log.

pub mod encoding;
pub mod error;
pub mod kv;
pub mod redb_backend;

pub use encoding::{IndexKey, KeyEncoder};
pub use error::{Result, StorageError};
pub use kv::{decode_key, KVStore, Transaction};
pub use redb_backend::RedbBackend;
