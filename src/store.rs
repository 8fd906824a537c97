// src/store.rs

//! The per-engine `store`: an opaque key-value mapping the generator owns.
//!
//! The engine never inspects its contents. It survives soft resets and is
//! cleared on hard reset.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;

type Value = Box<dyn Any + Send + Sync>;

/// User-owned opaque state. Cheap to clone; clones share the same map.
#[derive(Clone, Default)]
pub struct Store {
    inner: Arc<DashMap<String, Value>>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<V: Any + Send + Sync>(&self, key: impl Into<String>, value: V) {
        self.inner.insert(key.into(), Box::new(value));
    }

    /// Typed read. Returns `None` when the key is absent or holds a value of
    /// a different type.
    pub fn get<V: Any + Clone>(&self, key: &str) -> Option<V> {
        self.inner
            .get(key)
            .and_then(|entry| entry.value().downcast_ref::<V>().cloned())
    }

    pub fn remove(&self, key: &str) -> bool {
        self.inner.remove(key).is_some()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.contains_key(key)
    }

    pub fn clear(&self) {
        self.inner.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys: Vec<String> = self.inner.iter().map(|e| e.key().clone()).collect();
        f.debug_struct("Store").field("keys", &keys).finish()
    }
}
