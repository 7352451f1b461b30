//! Byte-oriented key-value interface.
//!
//! Objects, the uid and owner indexes and the commit log all share one
//! ordered keyspace. Prefix scans return entries in key order.

use crate::{Result, StorageError};
use bytes::Bytes;

pub trait KVStore: Send + Sync {
    fn get(&self, key: &[u8]) -> Result<Option<Bytes>>;

    fn contains(&self, key: &[u8]) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Read an entry whose value is itself a key (index entries, HEAD)
    fn get_key(&self, key: &[u8]) -> Result<Option<String>> {
        self.get(key)?.map(|value| decode_key(key, value)).transpose()
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()>;

    fn delete(&self, key: &[u8]) -> Result<()>;

    /// Every entry under `prefix`, in key order
    fn scan(&self, prefix: &[u8]) -> Result<Vec<(Bytes, Bytes)>>;

    fn keys_with_prefix(&self, prefix: &[u8]) -> Result<Vec<Bytes>>;

    /// Start a write transaction; dropping it without commit discards it
    fn transaction(&self) -> Result<Box<dyn Transaction>>;
}

/// Atomic batch of writes
pub trait Transaction: Send {
    fn get(&self, key: &[u8]) -> Result<Option<Bytes>>;

    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()>;

    fn delete(&mut self, key: &[u8]) -> Result<()>;

    fn commit(self: Box<Self>) -> Result<()>;

    fn rollback(self: Box<Self>) -> Result<()>;
}

/// Decode a value that must hold a UTF-8 storage key
pub fn decode_key(at: &[u8], value: Bytes) -> Result<String> {
    String::from_utf8(value.to_vec())
        .map_err(|e| StorageError::corrupt_entry(at, format!("value is not UTF-8: {}", e)))
}
