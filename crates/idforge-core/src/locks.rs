//! Per-group read/write lock registry.
//!
//! Each backend tier serializes mutation per group: `build_list` and
//! `propel` take the group's writer lock, `pop` and `clear` its reader
//! lock. The registry materializes a lock the first time a group name is
//! seen and never reclaims it, so its footprint grows with the number of
//! distinct groups ever observed.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

#[derive(Default)]
pub struct GroupLocks {
    locks: Mutex<HashMap<String, Arc<RwLock<()>>>>,
}

impl GroupLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the lock for `group`, inserting one on first use.
    pub fn of(&self, group: &str) -> Arc<RwLock<()>> {
        let mut locks = self.locks.lock().unwrap();
        match locks.get(group) {
            Some(lock) => lock.clone(),
            None => {
                let lock = Arc::new(RwLock::new(()));
                locks.insert(group.to_string(), lock.clone());
                lock
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_group_yields_same_lock() {
        let registry = GroupLocks::new();
        let a = registry.of("orders");
        let b = registry.of("orders");
        let c = registry.of("users");
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
    }

    #[test]
    fn writer_excludes_readers() {
        let registry = GroupLocks::new();
        let lock = registry.of("g");
        let writer = lock.write().unwrap();
        assert!(registry.of("g").try_read().is_err());
        drop(writer);
        assert!(registry.of("g").try_read().is_ok());
    }

    #[test]
    fn readers_are_concurrent() {
        let registry = GroupLocks::new();
        let lock = registry.of("g");
        let _first = lock.read().unwrap();
        assert!(registry.of("g").try_read().is_ok());
    }
}
