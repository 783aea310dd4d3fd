//! Key-value storage contract used by the registry.
//!
//! The registry never keeps state in memory between operations; every
//! operation rehydrates what it needs through [`KeyValueStore`] and writes it
//! back. Implementations only have to guarantee atomic single-key reads,
//! writes and deletes. Nothing is atomic across keys.

use std::collections::BTreeMap;

use crate::error::RegistryResult;

pub trait KeyValueStore {
    /// Read the value stored under `key`. `Ok(None)` means the key is absent.
    fn get(&self, key: &str) -> RegistryResult<Option<Vec<u8>>>;

    fn put(&mut self, key: &str, value: &[u8]) -> RegistryResult<()>;

    /// Remove `key`. Removing an absent key succeeds.
    fn delete(&mut self, key: &str) -> RegistryResult<()>;
}

/// In-process store, used by tests and by the `memory` backend.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    entries: BTreeMap<String, Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> RegistryResult<Option<Vec<u8>>> {
        Ok(self.entries.get(key).cloned())
    }

    fn put(&mut self, key: &str, value: &[u8]) -> RegistryResult<()> {
        self.entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&mut self, key: &str) -> RegistryResult<()> {
        self.entries.remove(key);
        Ok(())
    }
}

impl<S: KeyValueStore + ?Sized> KeyValueStore for Box<S> {
    fn get(&self, key: &str) -> RegistryResult<Option<Vec<u8>>> {
        (**self).get(key)
    }

    fn put(&mut self, key: &str, value: &[u8]) -> RegistryResult<()> {
        (**self).put(key, value)
    }

    fn delete(&mut self, key: &str) -> RegistryResult<()> {
        (**self).delete(key)
    }
}

impl<S: KeyValueStore + ?Sized> KeyValueStore for &mut S {
    fn get(&self, key: &str) -> RegistryResult<Option<Vec<u8>>> {
        (**self).get(key)
    }

    fn put(&mut self, key: &str, value: &[u8]) -> RegistryResult<()> {
        (**self).put(key, value)
    }

    fn delete(&mut self, key: &str) -> RegistryResult<()> {
        (**self).delete(key)
    }
}
