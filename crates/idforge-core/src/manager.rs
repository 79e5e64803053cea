//! The allocator: orchestrates the cache and storage tiers.
//!
//! A `get_id` is a single cache pop on the fast path. When the group's
//! list is exhausted, the caller takes the group's advance lock, advances
//! the durable counter by one block and materializes that block as a
//! fresh list. Waiters queued behind the advancing caller re-check the
//! list once they hold the lock, so one block advance serves everyone who
//! observed the same exhaustion.

use std::sync::Arc;

use tracing::{info, warn};

use crate::error::IdError;
use crate::locks::GroupLocks;
use crate::provider::{CacheProvider, StorageProvider};
use crate::registry::ProviderRegistry;

pub const DEFAULT_START: u64 = 1;
pub const DEFAULT_STEP: u32 = 1000;

pub struct IdManager {
    registry: Arc<ProviderRegistry>,
    cache_provider_name: String,
    storage_provider_name: String,
    start: u64,
    step: u32,
    /// Serializes the whole block advance (propel + build_list) per group.
    advance_locks: GroupLocks,
}

impl IdManager {
    /// Creates a manager resolving providers by name in `registry`.
    ///
    /// A zero `start` or `step` falls back to the defaults (1 and 1000).
    pub fn new(
        registry: Arc<ProviderRegistry>,
        cache_provider_name: impl Into<String>,
        storage_provider_name: impl Into<String>,
        start: u64,
        step: u32,
    ) -> Self {
        Self {
            registry,
            cache_provider_name: cache_provider_name.into(),
            storage_provider_name: storage_provider_name.into(),
            start: if start == 0 { DEFAULT_START } else { start },
            step: if step == 0 { DEFAULT_STEP } else { step },
            advance_locks: GroupLocks::new(),
        }
    }

    /// Allocates the next identifier for `group`.
    ///
    /// `Ok(0)` is the soft-failure case: the freshly materialized list was
    /// drained by concurrent callers before this one could read from it.
    /// The caller may simply retry.
    pub fn get_id(&self, group: &str) -> Result<u64, IdError> {
        let cache = self.cache_provider();
        let storage = self.storage_provider();

        match cache.pop(group) {
            Ok(id) => return Ok(id),
            Err(IdError::EmptyList { .. }) => {
                warn!("the id list of group '{}' is empty", group);
            }
            Err(e) => return Err(e),
        }

        info!("prepare check & build id list for group '{}'", group);
        let advance = self.advance_locks.of(group);
        let _guard = advance.write().unwrap();

        // A waiter that queued behind the advancing caller finds the list
        // already rebuilt; popping here avoids minting another block.
        match cache.pop(group) {
            Ok(id) => return Ok(id),
            Err(IdError::EmptyList { .. }) => {}
            Err(e) => return Err(e),
        }

        if storage.get(group)?.is_none() {
            let created = storage.build_info(group, self.start, self.step)?;
            if !created {
                // Benign race: another allocator created the group first.
                warn!("group info for '{}' already exists, skipping build", group);
            }
        }

        let range = storage.propel(group)?.unwrap_or_else(|| {
            panic!(
                "invariant violation: group '{}' vanished between build_info and propel",
                group
            )
        });

        let built = cache.build_list(group, range.begin, range.end)?;
        if !built {
            warn!("building the id list of group '{}' failed", group);
        }

        match cache.pop(group) {
            Ok(id) => Ok(id),
            Err(IdError::EmptyList { .. }) => {
                warn!(
                    "the rebuilt id list of group '{}' was drained before it could be read",
                    group
                );
                Ok(0)
            }
            Err(e) => Err(e),
        }
    }

    /// Wipes `group` from both tiers, attempting both even if one fails.
    pub fn clear(&self, group: &str) -> Result<bool, IdError> {
        let storage = self.storage_provider();
        let cache = self.cache_provider();
        let storage_result = storage.clear(group);
        let cache_result = cache.clear(group);
        let mut failures = Vec::new();
        if let Err(e) = &storage_result {
            failures.push(format!("{}: {}", storage.name(), e));
        }
        if let Err(e) = &cache_result {
            failures.push(format!("{}: {}", cache.name(), e));
        }
        if !failures.is_empty() {
            return Err(IdError::BackendUnavailable(format!(
                "clear failed: {}",
                failures.join("; ")
            )));
        }
        Ok(storage_result.unwrap_or(false) && cache_result.unwrap_or(false))
    }

    fn cache_provider(&self) -> Arc<dyn CacheProvider> {
        self.registry
            .cache(&self.cache_provider_name)
            .unwrap_or_else(|| {
                panic!(
                    "no cache provider named '{}' is registered",
                    self.cache_provider_name
                )
            })
    }

    fn storage_provider(&self) -> Arc<dyn StorageProvider> {
        self.registry
            .storage(&self.storage_provider_name)
            .unwrap_or_else(|| {
                panic!(
                    "no storage provider named '{}' is registered",
                    self.storage_provider_name
                )
            })
    }
}
