//! Name-keyed provider registry.
//!
//! Two disjoint maps, one per capability. Providers register once at
//! process init and are looked up by name on every request, so the maps
//! sit behind a single `RwLock`.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::warn;

use crate::error::IdError;
use crate::provider::{CacheProvider, StorageProvider};

#[derive(Default)]
struct Maps {
    cache: HashMap<String, Arc<dyn CacheProvider>>,
    storage: HashMap<String, Arc<dyn StorageProvider>>,
}

#[derive(Default)]
pub struct ProviderRegistry {
    inner: RwLock<Maps>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_cache(&self, provider: Arc<dyn CacheProvider>) -> Result<(), IdError> {
        let name = checked_name(provider.name())?;
        let mut maps = self.inner.write().unwrap();
        if maps.cache.contains_key(&name) {
            return Err(IdError::DuplicateProvider(name));
        }
        maps.cache.insert(name, provider);
        Ok(())
    }

    pub fn register_storage(&self, provider: Arc<dyn StorageProvider>) -> Result<(), IdError> {
        let name = checked_name(provider.name())?;
        let mut maps = self.inner.write().unwrap();
        if maps.storage.contains_key(&name) {
            return Err(IdError::DuplicateProvider(name));
        }
        maps.storage.insert(name, provider);
        Ok(())
    }

    /// Removes a cache provider; an unknown name is a warning, not an error.
    pub fn deregister_cache(&self, name: &str) -> bool {
        let removed = self.inner.write().unwrap().cache.remove(name).is_some();
        if !removed {
            warn!("no cache provider named '{}' to deregister", name);
        }
        removed
    }

    /// Removes a storage provider; an unknown name is a warning, not an error.
    pub fn deregister_storage(&self, name: &str) -> bool {
        let removed = self.inner.write().unwrap().storage.remove(name).is_some();
        if !removed {
            warn!("no storage provider named '{}' to deregister", name);
        }
        removed
    }

    pub fn cache(&self, name: &str) -> Option<Arc<dyn CacheProvider>> {
        self.inner.read().unwrap().cache.get(name).cloned()
    }

    pub fn storage(&self, name: &str) -> Option<Arc<dyn StorageProvider>> {
        self.inner.read().unwrap().storage.get(name).cloned()
    }
}

fn checked_name(name: &str) -> Result<String, IdError> {
    if name.is_empty() {
        return Err(IdError::InvalidArgument("the provider name is empty".to_string()));
    }
    Ok(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{MemoryCacheProvider, MemoryStorageProvider};

    #[test]
    fn registration_and_lookup() {
        let registry = ProviderRegistry::new();
        registry
            .register_cache(Arc::new(MemoryCacheProvider::new("mem-cache")))
            .unwrap();
        registry
            .register_storage(Arc::new(MemoryStorageProvider::new("mem-storage")))
            .unwrap();
        assert!(registry.cache("mem-cache").is_some());
        assert!(registry.storage("mem-storage").is_some());
        assert!(registry.cache("mem-storage").is_none());
    }

    #[test]
    fn duplicate_names_are_rejected_per_capability() {
        let registry = ProviderRegistry::new();
        registry
            .register_cache(Arc::new(MemoryCacheProvider::new("mem")))
            .unwrap();
        let dup = registry.register_cache(Arc::new(MemoryCacheProvider::new("mem")));
        assert!(matches!(dup, Err(IdError::DuplicateProvider(_))));
        // The same name in the other capability map is fine.
        registry
            .register_storage(Arc::new(MemoryStorageProvider::new("mem")))
            .unwrap();
    }

    #[test]
    fn deregistering_an_unknown_name_is_benign() {
        let registry = ProviderRegistry::new();
        assert!(!registry.deregister_cache("ghost"));
        registry
            .register_cache(Arc::new(MemoryCacheProvider::new("mem")))
            .unwrap();
        assert!(registry.deregister_cache("mem"));
        assert!(registry.cache("mem").is_none());
    }
}
