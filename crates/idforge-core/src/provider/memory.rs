//! In-memory implementations of both tiers.
//!
//! These back the test suite (no Redis or MySQL in CI) and embedded use.
//! They keep the exact contract of the networked providers, down to the
//! lock discipline, the error kinds and the two-step group
//! initialization.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use chrono::Utc;
use tracing::{info, warn};

use crate::error::IdError;
use crate::locks::GroupLocks;
use crate::provider::{
    CacheProvider, GroupInfo, IdRange, StorageProvider, check_group, check_range, next_range,
};

/// Cache tier over a `VecDeque` per group.
pub struct MemoryCacheProvider {
    name: String,
    locks: GroupLocks,
    lists: Mutex<HashMap<String, VecDeque<u64>>>,
}

impl MemoryCacheProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            locks: GroupLocks::new(),
            lists: Mutex::new(HashMap::new()),
        }
    }
}

impl CacheProvider for MemoryCacheProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn build_list(&self, group: &str, begin: u64, end: u64) -> Result<bool, IdError> {
        check_group(group)?;
        let lock = self.locks.of(group);
        let _guard = lock.write().unwrap();
        check_range(begin, end)?;
        let mut lists = self.lists.lock().unwrap();
        if let Some(old) = lists.insert(group.to_string(), (begin..end).collect())
            && !old.is_empty()
        {
            warn!(
                "replaced a non-empty id list of group '{}' ({} ids dropped)",
                group,
                old.len()
            );
        }
        info!(
            "built the id list of group '{}' (begin={}, end={})",
            group, begin, end
        );
        Ok(true)
    }

    fn pop(&self, group: &str) -> Result<u64, IdError> {
        check_group(group)?;
        let lock = self.locks.of(group);
        let _guard = lock.read().unwrap();
        let mut lists = self.lists.lock().unwrap();
        lists
            .get_mut(group)
            .and_then(|list| list.pop_front())
            .ok_or_else(|| IdError::EmptyList {
                group: group.to_string(),
            })
    }

    fn clear(&self, group: &str) -> Result<bool, IdError> {
        check_group(group)?;
        let lock = self.locks.of(group);
        let _guard = lock.read().unwrap();
        self.lists.lock().unwrap().remove(group);
        Ok(true)
    }
}

/// Storage tier over a `HashMap` of group records.
pub struct MemoryStorageProvider {
    name: String,
    locks: GroupLocks,
    groups: Mutex<HashMap<String, GroupInfo>>,
}

impl MemoryStorageProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            locks: GroupLocks::new(),
            groups: Mutex::new(HashMap::new()),
        }
    }
}

impl StorageProvider for MemoryStorageProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn build_info(&self, group: &str, start: u64, step: u32) -> Result<bool, IdError> {
        check_group(group)?;
        if step == 0 {
            return Err(IdError::InvalidArgument("step must be at least 1".to_string()));
        }
        let mut groups = self.groups.lock().unwrap();
        if groups.contains_key(group) {
            warn!("group '{}' already exists, skipping info build", group);
            return Ok(false);
        }
        groups.insert(
            group.to_string(),
            GroupInfo {
                name: group.to_string(),
                start,
                step,
                count: 0,
                begin: 0,
                end: 0,
                last_modified: Utc::now(),
            },
        );
        Ok(true)
    }

    fn get(&self, group: &str) -> Result<Option<GroupInfo>, IdError> {
        check_group(group)?;
        Ok(self.groups.lock().unwrap().get(group).cloned())
    }

    fn propel(&self, group: &str) -> Result<Option<IdRange>, IdError> {
        check_group(group)?;
        let lock = self.locks.of(group);
        let _guard = lock.write().unwrap();
        let mut groups = self.groups.lock().unwrap();
        let Some(record) = groups.get_mut(group) else {
            warn!("group '{}' does not exist, skipping propel", group);
            return Ok(None);
        };
        let range = next_range(record);
        record.begin = range.begin;
        record.end = range.end;
        record.count += 1;
        record.last_modified = Utc::now();
        Ok(Some(range))
    }

    fn clear(&self, group: &str) -> Result<bool, IdError> {
        check_group(group)?;
        let lock = self.locks.of(group);
        let _guard = lock.read().unwrap();
        let existed = self.groups.lock().unwrap().remove(group).is_some();
        info!("cleared group '{}' (existed={})", group, existed);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_list_pops_ascending_without_duplicates() {
        let cache = MemoryCacheProvider::new("mem");
        cache.build_list("g", 10, 15).unwrap();
        let popped: Vec<u64> = (0..5).map(|_| cache.pop("g").unwrap()).collect();
        assert_eq!(popped, vec![10, 11, 12, 13, 14]);
        assert!(cache.pop("g").unwrap_err().is_empty_list());
    }

    #[test]
    fn pop_from_unknown_group_is_empty_list() {
        let cache = MemoryCacheProvider::new("mem");
        assert!(cache.pop("nope").unwrap_err().is_empty_list());
    }

    #[test]
    fn build_list_rejects_invalid_arguments() {
        let cache = MemoryCacheProvider::new("mem");
        assert!(matches!(
            cache.build_list("", 1, 2),
            Err(IdError::InvalidArgument(_))
        ));
        assert!(matches!(
            cache.build_list("g", 0, 2),
            Err(IdError::InvalidArgument(_))
        ));
        assert!(matches!(
            cache.build_list("g", 5, 5),
            Err(IdError::InvalidArgument(_))
        ));
    }

    #[test]
    fn build_list_replaces_an_existing_list() {
        let cache = MemoryCacheProvider::new("mem");
        cache.build_list("g", 1, 4).unwrap();
        cache.build_list("g", 100, 103).unwrap();
        assert_eq!(cache.pop("g").unwrap(), 100);
    }

    #[test]
    fn clear_is_idempotent() {
        let cache = MemoryCacheProvider::new("mem");
        cache.build_list("g", 1, 3).unwrap();
        assert!(cache.clear("g").unwrap());
        assert!(cache.clear("g").unwrap());
        assert!(cache.pop("g").unwrap_err().is_empty_list());
    }

    #[test]
    fn build_info_reports_pre_existence_without_error() {
        let storage = MemoryStorageProvider::new("mem");
        assert!(storage.build_info("g", 7, 3).unwrap());
        assert!(!storage.build_info("g", 999, 999).unwrap());
        let info = storage.get("g").unwrap().unwrap();
        assert_eq!((info.start, info.step), (7, 3));
        assert_eq!((info.count, info.begin, info.end), (0, 0, 0));
    }

    #[test]
    fn build_info_rejects_zero_step() {
        let storage = MemoryStorageProvider::new("mem");
        assert!(matches!(
            storage.build_info("g", 1, 0),
            Err(IdError::InvalidArgument(_))
        ));
    }

    #[test]
    fn propel_advances_contiguous_blocks() {
        let storage = MemoryStorageProvider::new("mem");
        storage.build_info("g", 100, 10).unwrap();
        for k in 0..5u64 {
            let range = storage.propel("g").unwrap().unwrap();
            assert_eq!(range.begin, 100 + k * 10);
            assert_eq!(range.end, range.begin + 10);
        }
        let info = storage.get("g").unwrap().unwrap();
        assert_eq!(info.count, 5);
        assert_eq!(info.end, info.begin + u64::from(info.step));
    }

    #[test]
    fn propel_on_missing_group_yields_none() {
        let storage = MemoryStorageProvider::new("mem");
        assert_eq!(storage.propel("nope").unwrap(), None);
    }

    #[test]
    fn clear_removes_the_record() {
        let storage = MemoryStorageProvider::new("mem");
        storage.build_info("g", 1, 5).unwrap();
        assert!(storage.clear("g").unwrap());
        assert_eq!(storage.get("g").unwrap(), None);
        assert!(storage.clear("g").unwrap());
    }
}
