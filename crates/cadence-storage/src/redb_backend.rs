use crate::{KVStore, Result, StorageError, Transaction as KVTransaction};
use bytes::Bytes;
use redb::{Database, ReadableTable, TableDefinition};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

// Objects, index entries and version commits share one table, separated by
// key prefix.
const OBJECTS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("objects");

type ObjectTable<'txn> = redb::Table<'txn, &'static [u8], &'static [u8]>;

const FINISHED: &str = "Transaction already committed or rolled back";

/// redb-based storage backend
pub struct RedbBackend {
    db: Arc<Database>,
}

impl RedbBackend {
    /// Open (or create) a database at `path`
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        info!("Opening redb database at: {}", path.as_ref().display());

        let db = Database::create(path.as_ref()).map_err(|e| {
            StorageError::database_error(
                format!("Failed to create database: {}", e),
                Some(Box::new(e)),
            )
        })?;

        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(OBJECTS)?;
        }
        write_txn.commit()?;

        info!("redb database initialized successfully");

        Ok(Self { db: Arc::new(db) })
    }

    /// Collect entries whose key starts with `prefix`, in key order
    fn collect_prefix<T>(
        &self,
        prefix: &[u8],
        mut map: impl FnMut(&[u8], &[u8]) -> T,
    ) -> Result<Vec<T>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(OBJECTS)?;

        let mut results = Vec::new();
        for entry in table.range(prefix..)? {
            let (key, value) = entry?;
            if !key.value().starts_with(prefix) {
                break;
            }
            results.push(map(key.value(), value.value()));
        }

        Ok(results)
    }

    /// Run a single-table write in its own transaction
    fn write_one(
        &self,
        op: impl FnOnce(&mut ObjectTable<'_>) -> std::result::Result<(), redb::StorageError>,
    ) -> Result<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(OBJECTS)?;
            op(&mut table)?;
        }
        write_txn.commit()?;
        Ok(())
    }
}

impl KVStore for RedbBackend {
    fn get(&self, key: &[u8]) -> Result<Option<Bytes>> {
        debug!("Getting key: {:?}", String::from_utf8_lossy(key));

        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(OBJECTS)?;

        let value = table
            .get(key)?
            .map(|guard| Bytes::copy_from_slice(guard.value()));
        Ok(value)
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        debug!("Putting key: {:?}", String::from_utf8_lossy(key));
        self.write_one(|table| table.insert(key, value).map(drop))
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        debug!("Deleting key: {:?}", String::from_utf8_lossy(key));
        self.write_one(|table| table.remove(key).map(drop))
    }

    fn scan(&self, prefix: &[u8]) -> Result<Vec<(Bytes, Bytes)>> {
        let results = self.collect_prefix(prefix, |k, v| {
            (Bytes::copy_from_slice(k), Bytes::copy_from_slice(v))
        })?;

        debug!(
            "Scan of {:?} found {} results",
            String::from_utf8_lossy(prefix),
            results.len()
        );
        Ok(results)
    }

    fn keys_with_prefix(&self, prefix: &[u8]) -> Result<Vec<Bytes>> {
        self.collect_prefix(prefix, |k, _| Bytes::copy_from_slice(k))
    }

    fn transaction(&self) -> Result<Box<dyn KVTransaction>> {
        let write_txn = self.db.begin_write()?;
        Ok(Box::new(RedbTransaction { txn: Some(write_txn) }))
    }
}

/// redb write transaction; aborted on drop unless committed
struct RedbTransaction {
    txn: Option<redb::WriteTransaction>,
}

impl RedbTransaction {
    fn active(&self) -> Result<&redb::WriteTransaction> {
        self.txn
            .as_ref()
            .ok_or_else(|| StorageError::transaction_error(FINISHED))
    }
}

impl KVTransaction for RedbTransaction {
    fn get(&self, key: &[u8]) -> Result<Option<Bytes>> {
        let table = self.active()?.open_table(OBJECTS)?;
        let value = table
            .get(key)?
            .map(|guard| Bytes::copy_from_slice(guard.value()));
        Ok(value)
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        let mut table = self.active()?.open_table(OBJECTS)?;
        table.insert(key, value)?;
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> Result<()> {
        let mut table = self.active()?.open_table(OBJECTS)?;
        table.remove(key)?;
        Ok(())
    }

    fn commit(mut self: Box<Self>) -> Result<()> {
        let txn = self
            .txn
            .take()
            .ok_or_else(|| StorageError::transaction_error(FINISHED))?;
        txn.commit()?;
        Ok(())
    }

    fn rollback(mut self: Box<Self>) -> Result<()> {
        let txn = self
            .txn
            .take()
            .ok_or_else(|| StorageError::transaction_error(FINISHED))?;
        txn.abort()?;
        Ok(())
    }
}

impl Drop for RedbTransaction {
    fn drop(&mut self) {
        if let Some(txn) = self.txn.take() {
            let _ = txn.abort();
        }
    }
}
