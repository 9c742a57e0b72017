use crate::errors::{StoreError, StoreResult};
use crate::store::Store;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use sync_types::{BlockHash, HASH_SIZE};

/// Byte encoding for container keys. The encoding must preserve the key
/// type's ordering so column-family iteration comes back sorted.
pub trait KeyCodec: Sized {
    fn encode_key(&self) -> Vec<u8>;
    fn decode_key(bytes: &[u8]) -> StoreResult<Self>;
}

impl KeyCodec for u64 {
    fn encode_key(&self) -> Vec<u8> {
        // big-endian so byte order equals numeric order
        self.to_be_bytes().to_vec()
    }

    fn decode_key(bytes: &[u8]) -> StoreResult<Self> {
        let array: [u8; 8] = bytes
            .try_into()
            .map_err(|_| StoreError::Codec(format!("expected 8 key bytes, got {}", bytes.len())))?;
        Ok(u64::from_be_bytes(array))
    }
}

impl KeyCodec for BlockHash {
    fn encode_key(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }

    fn decode_key(bytes: &[u8]) -> StoreResult<Self> {
        BlockHash::try_from_slice(bytes).map_err(|_| {
            StoreError::Codec(format!(
                "expected {} key bytes, got {}",
                HASH_SIZE,
                bytes.len()
            ))
        })
    }
}

/// Keyed container. Writes stage into the store's pending batch; reads
/// observe committed state.
pub struct StoreMap<K, V> {
    store: Store,
    name: String,
    _marker: PhantomData<fn() -> (K, V)>,
}

impl<K: KeyCodec, V: Serialize + DeserializeOwned> StoreMap<K, V> {
    pub(crate) fn new(store: Store, name: &str) -> Self {
        Self {
            store,
            name: name.to_string(),
            _marker: PhantomData,
        }
    }

    pub fn get(&self, key: &K) -> StoreResult<Option<V>> {
        match self.store.get_raw(&self.name, &key.encode_key())? {
            Some(data) => Ok(Some(bincode::deserialize(&data)?)),
            None => Ok(None),
        }
    }

    pub fn contains(&self, key: &K) -> StoreResult<bool> {
        Ok(self.store.get_raw(&self.name, &key.encode_key())?.is_some())
    }

    pub fn put(&self, key: &K, value: &V) -> StoreResult<()> {
        let data = bincode::serialize(value)?;
        self.store
            .stage(&self.name, |batch, cf| batch.put_cf(cf, key.encode_key(), data))
    }

    pub fn remove(&self, key: &K) -> StoreResult<()> {
        self.store
            .stage(&self.name, |batch, cf| batch.delete_cf(cf, key.encode_key()))
    }

    /// Committed entries in key order.
    pub fn entries(&self) -> StoreResult<Vec<(K, V)>> {
        let mut out = Vec::new();
        for (key, value) in self.store.scan(&self.name)? {
            out.push((K::decode_key(&key)?, bincode::deserialize(&value)?));
        }
        Ok(out)
    }

    /// Stages a delete for every committed entry.
    pub fn clear(&self) -> StoreResult<()> {
        for (key, _) in self.store.scan(&self.name)? {
            self.store
                .stage(&self.name, |batch, cf| batch.delete_cf(cf, key))?;
        }
        Ok(())
    }
}

/// Membership container; items are keys with empty values.
pub struct StoreSet<T> {
    store: Store,
    name: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T: KeyCodec> StoreSet<T> {
    pub(crate) fn new(store: Store, name: &str) -> Self {
        Self {
            store,
            name: name.to_string(),
            _marker: PhantomData,
        }
    }

    pub fn insert(&self, item: &T) -> StoreResult<()> {
        self.store
            .stage(&self.name, |batch, cf| batch.put_cf(cf, item.encode_key(), b""))
    }

    pub fn remove(&self, item: &T) -> StoreResult<()> {
        self.store
            .stage(&self.name, |batch, cf| batch.delete_cf(cf, item.encode_key()))
    }

    pub fn contains(&self, item: &T) -> StoreResult<bool> {
        Ok(self
            .store
            .get_raw(&self.name, &item.encode_key())?
            .is_some())
    }

    /// Committed items in key-encoding order.
    pub fn items(&self) -> StoreResult<Vec<T>> {
        let mut out = Vec::new();
        for (key, _) in self.store.scan(&self.name)? {
            out.push(T::decode_key(&key)?);
        }
        Ok(out)
    }

    /// Stages a delete for every committed item.
    pub fn clear(&self) -> StoreResult<()> {
        for (key, _) in self.store.scan(&self.name)? {
            self.store
                .stage(&self.name, |batch, cf| batch.delete_cf(cf, key))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn u64_keys_iterate_in_numeric_order() {
        let tmp = TempDir::new().unwrap();
        let store = Store::open(tmp.path(), &["m"]).unwrap();
        let map = store.map::<u64, String>("m").unwrap();

        for number in [300u64, 5, 40] {
            map.put(&number, &number.to_string()).unwrap();
        }
        store.commit().unwrap();

        let keys: Vec<u64> = map.entries().unwrap().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![5, 40, 300]);
    }

    #[test]
    fn map_remove_and_clear() {
        let tmp = TempDir::new().unwrap();
        let store = Store::open(tmp.path(), &["m"]).unwrap();
        let map = store.map::<u64, String>("m").unwrap();

        map.put(&1, &"one".to_string()).unwrap();
        map.put(&2, &"two".to_string()).unwrap();
        store.commit().unwrap();

        map.remove(&1).unwrap();
        store.commit().unwrap();
        assert!(!map.contains(&1).unwrap());
        assert!(map.contains(&2).unwrap());

        map.clear().unwrap();
        store.commit().unwrap();
        assert!(map.entries().unwrap().is_empty());
    }

    #[test]
    fn set_membership() {
        let tmp = TempDir::new().unwrap();
        let store = Store::open(tmp.path(), &["s"]).unwrap();
        let set = store.set::<BlockHash>("s").unwrap();

        let present = BlockHash::from_u64(1);
        let absent = BlockHash::from_u64(2);
        set.insert(&present).unwrap();
        store.commit().unwrap();

        assert!(set.contains(&present).unwrap());
        assert!(!set.contains(&absent).unwrap());
        assert_eq!(set.items().unwrap(), vec![present]);

        set.remove(&present).unwrap();
        store.commit().unwrap();
        assert!(!set.contains(&present).unwrap());
    }
}
