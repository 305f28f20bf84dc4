//! Key/value cache capability.
//!
//! Read-mostly data that is expensive to rebuild (the intrusion-detection
//! rule set) goes through a [`Cache`]. Entries are opaque strings; callers
//! store their own freshness timestamp inside the value.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

pub trait Cache: Send + Sync {
    fn exists(&self, key: &str) -> bool;
    fn read(&self, key: &str) -> Option<String>;
    fn store(&self, key: &str, value: String);
}

/// Process-local cache.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Cache for MemoryCache {
    fn exists(&self, key: &str) -> bool {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).contains_key(key)
    }

    fn read(&self, key: &str) -> Option<String> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).get(key).cloned()
    }

    fn store(&self, key: &str, value: String) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_owned(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stores_and_reads() {
        let cache = MemoryCache::new();
        assert!(!cache.exists("ids.rules"));
        cache.store("ids.rules", "[]".into());
        assert!(cache.exists("ids.rules"));
        assert_eq!(cache.read("ids.rules").as_deref(), Some("[]"));
    }
}
