//! In-memory transactional key/value store backed by [`DashMap`].
//!
//! Committed entries live in a shared map. A [`MemoryTransaction`] buffers
//! its writes and applies them in order on commit; rollback drops them.
//! Reads through a transaction see its own pending writes first.

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::Value;
use stagehand_core::{Transaction, TransactionSource};

/// Shared in-memory store. Clones point at the same entries.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<DashMap<String, Value>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Committed value for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Writes outside any transaction.
    pub fn put(&self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.entries.insert(key.into(), value)
    }

    /// Removes outside any transaction.
    pub fn remove(&self, key: &str) -> Option<Value> {
        self.entries.remove(key).map(|(_, value)| value)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Committed entries whose key starts with `prefix`, sorted by key.
    #[must_use]
    pub fn scan_prefix(&self, prefix: &str) -> Vec<(String, Value)> {
        let mut found: Vec<(String, Value)> = self
            .entries
            .iter()
            .filter(|entry| entry.key().starts_with(prefix))
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        found.sort_by(|a, b| a.0.cmp(&b.0));
        found
    }

    fn begin(&self) -> MemoryTransaction {
        MemoryTransaction {
            entries: Arc::clone(&self.entries),
            pending: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl TransactionSource for MemoryStore {
    async fn open_managed(&self) -> anyhow::Result<Box<dyn Transaction>> {
        Ok(Box::new(self.begin()))
    }

    async fn open_unmanaged(&self) -> anyhow::Result<Box<dyn Transaction>> {
        Ok(Box::new(self.begin()))
    }
}

#[derive(Debug, Clone)]
enum Write {
    Put(String, Value),
    Delete(String),
}

impl Write {
    fn key(&self) -> &str {
        match self {
            Self::Put(key, _) | Self::Delete(key) => key,
        }
    }
}

/// Unit of work over a [`MemoryStore`].
///
/// Reached from business code through
/// `runtime.transaction().reference::<MemoryTransaction>()`.
#[derive(Debug)]
pub struct MemoryTransaction {
    entries: Arc<DashMap<String, Value>>,
    pending: Mutex<Vec<Write>>,
}

impl MemoryTransaction {
    /// Value for `key` as this transaction sees it.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        let pending = self.pending.lock();
        match pending.iter().rev().find(|write| write.key() == key) {
            Some(Write::Put(_, value)) => Some(value.clone()),
            Some(Write::Delete(_)) => None,
            None => self.entries.get(key).map(|entry| entry.value().clone()),
        }
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn put(&self, key: impl Into<String>, value: Value) {
        self.pending.lock().push(Write::Put(key.into(), value));
    }

    pub fn delete(&self, key: impl Into<String>) {
        self.pending.lock().push(Write::Delete(key.into()));
    }

    /// Number of buffered writes.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }
}

#[async_trait]
impl Transaction for MemoryTransaction {
    async fn commit(&self) -> anyhow::Result<()> {
        let writes = std::mem::take(&mut *self.pending.lock());
        for write in writes {
            match write {
                Write::Put(key, value) => {
                    self.entries.insert(key, value);
                }
                Write::Delete(key) => {
                    self.entries.remove(&key);
                }
            }
        }
        Ok(())
    }

    async fn rollback(&self) -> anyhow::Result<()> {
        self.pending.lock().clear();
        Ok(())
    }

    fn reference(&self) -> Option<&(dyn Any + Send + Sync)> {
        Some(self)
    }
}
