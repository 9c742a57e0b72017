use crate::containers::{KeyCodec, StoreMap, StoreSet};
use crate::errors::{StoreError, StoreResult};
use parking_lot::{Mutex, RwLock};
use rocksdb::{ColumnFamilyDescriptor, IteratorMode, Options, WriteBatch, WriteOptions, DB};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

/// Durable store with staged mutations and an atomic commit.
///
/// Every container mutation lands in one shared write batch; `commit`
/// makes all of them durable in a single synced write. Reads bypass the
/// batch and observe committed state only.
pub struct Store {
    db: Arc<DB>,
    pending: Arc<Mutex<WriteBatch>>,
    is_closed: Arc<RwLock<bool>>,
}

impl Store {
    /// Opens or creates the store at `path` with one column family per
    /// named container.
    pub fn open<P: AsRef<Path>>(path: P, containers: &[&str]) -> StoreResult<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);
        opts.set_keep_log_file_num(10);
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);

        let cf_descriptors: Vec<_> = containers
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
            .collect();

        let db = DB::open_cf_descriptors(&opts, path, cf_descriptors)?;
        tracing::debug!("store opened with {} containers", containers.len());
        Ok(Self {
            db: Arc::new(db),
            pending: Arc::new(Mutex::new(WriteBatch::default())),
            is_closed: Arc::new(RwLock::new(false)),
        })
    }

    fn check_open(&self) -> StoreResult<()> {
        if *self.is_closed.read() {
            return Err(StoreError::Closed);
        }
        Ok(())
    }

    fn cf_handle(&self, name: &str) -> StoreResult<&rocksdb::ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::UnknownContainer(name.to_string()))
    }

    /// Typed keyed container backed by the column family `name`.
    pub fn map<K: KeyCodec, V: Serialize + DeserializeOwned>(
        &self,
        name: &str,
    ) -> StoreResult<StoreMap<K, V>> {
        self.check_open()?;
        self.cf_handle(name)?;
        Ok(StoreMap::new(self.clone(), name))
    }

    /// Typed membership container backed by the column family `name`.
    pub fn set<T: KeyCodec>(&self, name: &str) -> StoreResult<StoreSet<T>> {
        self.check_open()?;
        self.cf_handle(name)?;
        Ok(StoreSet::new(self.clone(), name))
    }

    /// Durably applies every staged mutation in one atomic, synced write.
    pub fn commit(&self) -> StoreResult<()> {
        self.check_open()?;
        let batch = std::mem::take(&mut *self.pending.lock());
        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(true);
        self.db.write_opt(batch, &write_opts)?;
        Ok(())
    }

    /// Marks the store closed; subsequent operations fail. The database
    /// handle is released when the last clone drops.
    pub fn close(&self) {
        *self.is_closed.write() = true;
    }

    pub(crate) fn stage<F>(&self, name: &str, f: F) -> StoreResult<()>
    where
        F: FnOnce(&mut WriteBatch, &rocksdb::ColumnFamily),
    {
        self.check_open()?;
        let cf = self.cf_handle(name)?;
        f(&mut self.pending.lock(), cf);
        Ok(())
    }

    pub(crate) fn get_raw(&self, name: &str, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        self.check_open()?;
        let cf = self.cf_handle(name)?;
        Ok(self.db.get_cf(cf, key)?)
    }

    /// Committed entries of a container, in key-encoding order.
    pub(crate) fn scan(&self, name: &str) -> StoreResult<Vec<(Vec<u8>, Vec<u8>)>> {
        self.check_open()?;
        let cf = self.cf_handle(name)?;
        let mut out = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (key, value) = item?;
            out.push((key.to_vec(), value.to_vec()));
        }
        Ok(out)
    }
}

impl Clone for Store {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            pending: self.pending.clone(),
            is_closed: self.is_closed.clone(),
        }
    }
}
