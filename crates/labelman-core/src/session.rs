//! Session-scoped store for phantom model records.
//!
//! Injected explicitly into whatever needs it; clones share the same
//! records. Lives as long as the workflow that created it.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use indexmap::IndexMap;
use uuid::Uuid;

use crate::models::PhantomModelRecord;

#[derive(Debug, Clone, Default)]
pub struct SessionStore {
    records: Arc<Mutex<IndexMap<Uuid, PhantomModelRecord>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, IndexMap<Uuid, PhantomModelRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn put(&self, record: PhantomModelRecord) {
        self.lock().insert(record.id, record);
    }

    pub fn get(&self, id: Uuid) -> Option<PhantomModelRecord> {
        self.lock().get(&id).cloned()
    }

    /// Most recently stored record.
    pub fn latest(&self) -> Option<PhantomModelRecord> {
        self.lock().values().last().cloned()
    }

    pub fn records(&self) -> Vec<PhantomModelRecord> {
        self.lock().values().cloned().collect()
    }

    /// Removes and returns a record, e.g. once the backend has confirmed it.
    pub fn take(&self, id: Uuid) -> Option<PhantomModelRecord> {
        self.lock().shift_remove(&id)
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
