//! RocksDB-backed [`KeyValueStore`].
//!
//! Enabled with the `rocksdb` cargo feature. Writes are synced so a
//! successful `put` survives a crash.

use std::path::Path;

use rocksdb::{Options, WriteOptions, DB};

use crate::error::{RegistryError, RegistryResult};
use crate::storage::KeyValueStore;

pub struct RocksDbStore {
    db: DB,
}

impl RocksDbStore {
    /// Open or create a database at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> RegistryResult<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_compression_type(rocksdb::DBCompressionType::Snappy);

        let db = DB::open(&opts, path.as_ref())
            .map_err(|e| RegistryError::Storage(format!("Failed to open RocksDB: {}", e)))?;
        Ok(Self { db })
    }

    fn sync_writes() -> WriteOptions {
        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(true);
        write_opts
    }
}

impl KeyValueStore for RocksDbStore {
    fn get(&self, key: &str) -> RegistryResult<Option<Vec<u8>>> {
        self.db
            .get(key.as_bytes())
            .map_err(|e| RegistryError::Storage(format!("get {}: {}", key, e)))
    }

    fn put(&mut self, key: &str, value: &[u8]) -> RegistryResult<()> {
        self.db
            .put_opt(key.as_bytes(), value, &Self::sync_writes())
            .map_err(|e| RegistryError::Storage(format!("put {}: {}", key, e)))
    }

    fn delete(&mut self, key: &str) -> RegistryResult<()> {
        self.db
            .delete_opt(key.as_bytes(), &Self::sync_writes())
            .map_err(|e| RegistryError::Storage(format!("delete {}: {}", key, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let mut store = RocksDbStore::open(dir.path()).unwrap();
            store.put("chain", b"record").unwrap();
        }
        let mut store = RocksDbStore::open(dir.path()).unwrap();
        assert_eq!(store.get("chain").unwrap(), Some(b"record".to_vec()));
        store.delete("chain").unwrap();
        assert!(store.get("chain").unwrap().is_none());
    }
}
