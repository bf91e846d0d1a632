use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};

use super::{Headers, Store, StoreError};

/// Process-local store. Clones share their content.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    content: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MemoryStore {
    pub fn len(&self) -> usize {
        self.content
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Store for MemoryStore {
    async fn store(&self, path: &str, bytes: Vec<u8>, headers: Headers) -> Result<(), StoreError> {
        self.content
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(headers.key(path), bytes);
        Ok(())
    }

    async fn load(&self, path: &str, headers: Headers) -> Result<Vec<u8>, StoreError> {
        let key = headers.key(path);
        self.content
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned()
            .ok_or(StoreError::NotFound(key))
    }
}
