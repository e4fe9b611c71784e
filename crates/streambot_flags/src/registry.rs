//! One store per config file, one manager per (file, module).

use crate::{FeatureFlagManager, SharedFlagStore, StoreSettings, resolve_config_path};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

type ManagerKey = (PathBuf, String);

/// Owns the shared stores and managers of a process.
///
/// Paths are resolved before lookup, so `flags.json` and `./flags.json`
/// share a store. A store whose managers have all shut down is replaced by
/// a fresh one on the next [`open`](Self::open).
#[derive(Debug)]
pub struct ManagerRegistry {
    settings: StoreSettings,
    stores: Mutex<HashMap<PathBuf, Arc<SharedFlagStore>>>,
    managers: Mutex<HashMap<ManagerKey, Arc<FeatureFlagManager>>>,
}

impl Default for ManagerRegistry {
    fn default() -> Self {
        Self::new(StoreSettings::default())
    }
}

impl ManagerRegistry {
    /// Create a registry whose stores use `settings`.
    pub fn new(settings: StoreSettings) -> Self {
        Self {
            settings,
            stores: Mutex::new(HashMap::new()),
            managers: Mutex::new(HashMap::new()),
        }
    }

    /// Settings applied to new stores.
    pub fn settings(&self) -> &StoreSettings {
        &self.settings
    }

    /// The manager for `module` on `path`, created on first use.
    pub fn open(&self, path: impl AsRef<Path>, module: &str) -> Arc<FeatureFlagManager> {
        let resolved = resolve_config_path(path.as_ref());
        let key = (resolved.clone(), module.to_string());

        let mut managers = self.managers.lock();
        if let Some(existing) = managers.get(&key) {
            if !existing.is_shut_down() {
                return Arc::clone(existing);
            }
        }

        let store = self.store(&resolved);
        let manager = Arc::new(FeatureFlagManager::attach(store, module));
        managers.insert(key, Arc::clone(&manager));
        debug!(path = %resolved.display(), module, "Manager opened");
        manager
    }

    /// The live store for `path`, opened on first use.
    pub fn store(&self, path: impl AsRef<Path>) -> Arc<SharedFlagStore> {
        let resolved = resolve_config_path(path.as_ref());
        let mut stores = self.stores.lock();
        if let Some(existing) = stores.get(&resolved) {
            if !existing.is_closed() {
                return Arc::clone(existing);
            }
        }
        let store = SharedFlagStore::open(&resolved, self.settings.clone());
        stores.insert(resolved, Arc::clone(&store));
        store
    }

    /// Shut down the manager for `module` on `path`.
    ///
    /// Returns whether a manager was registered.
    pub fn close(&self, path: impl AsRef<Path>, module: &str) -> bool {
        let resolved = resolve_config_path(path.as_ref());
        let removed = self
            .managers
            .lock()
            .remove(&(resolved.clone(), module.to_string()));
        let Some(manager) = removed else {
            return false;
        };
        manager.shutdown();

        let mut stores = self.stores.lock();
        if stores.get(&resolved).is_some_and(|s| s.is_closed()) {
            stores.remove(&resolved);
        }
        true
    }

    /// Number of live managers.
    pub fn manager_count(&self) -> usize {
        self.managers
            .lock()
            .values()
            .filter(|m| !m.is_shut_down())
            .count()
    }

    /// Number of open stores.
    pub fn store_count(&self) -> usize {
        self.stores
            .lock()
            .values()
            .filter(|s| !s.is_closed())
            .count()
    }

    /// Shut down every manager, which closes every store.
    pub fn shutdown(&self) {
        let managers: Vec<_> = self.managers.lock().drain().map(|(_, m)| m).collect();
        if managers.is_empty() && self.stores.lock().is_empty() {
            return;
        }
        for manager in &managers {
            manager.shutdown();
        }
        self.stores.lock().clear();
        info!(managers = managers.len(), "Flag registry shut down");
    }
}

impl Drop for ManagerRegistry {
    fn drop(&mut self) {
        self.shutdown();
    }
}
