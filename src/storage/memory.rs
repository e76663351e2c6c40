//! In-memory engine without a log.
//!
//! Stands in for backends that replicate on their own: there is nothing
//! to ship to asynchronous replicas and nothing to compact.

use super::{lock_err, Storage};
use crate::common::{Error, Result};
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Debug, Default)]
pub struct MemStore {
    map: RwLock<HashMap<String, String>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.map.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Storage for MemStore {
    fn get(&self, key: &str) -> Result<String> {
        self.map
            .read()
            .map_err(lock_err)?
            .get(key)
            .cloned()
            .ok_or_else(|| Error::NotFound(key.to_string()))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.map
            .write()
            .map_err(lock_err)?
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_set() {
        let store = MemStore::new();
        assert!(store.is_empty());
        assert!(matches!(store.get("a"), Err(Error::NotFound(k)) if k == "a"));

        store.set("a", "1").unwrap();
        store.set("a", "2").unwrap();
        assert_eq!(store.get("a").unwrap(), "2");
        assert_eq!(store.len(), 1);
    }
}
