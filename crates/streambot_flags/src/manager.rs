//! Per-module facade over a shared store.

use crate::{
    AccessGrant, FeatureFlag, FlagDeclaration, FlagObserver, FlagOwnership, FlagValue, ObserverId,
    PermissionLevel, ReloadOutcome, SharedFlagStore,
};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use streambot_error::{FlagError, FlagErrorKind, FlagResult};
use tracing::{debug, info, instrument};

/// Value and description of one flag, for display.
#[derive(Debug, Clone, PartialEq, Serialize, derive_getters::Getters, derive_new::new)]
pub struct FlagSummary {
    /// Current value
    value: FlagValue,
    /// Description, empty when none was recorded
    description: String,
}

/// Feature flag access for one module on one config file.
///
/// A module must [`declare`](Self::declare) the flags it owns or
/// [`use_flag`](Self::use_flag) the flags other modules own before reading,
/// writing or observing them. Permission checks run against the ownership
/// registry shared by every manager on the same file.
///
/// # Examples
///
/// ```no_run
/// use streambot_flags::{FeatureFlag, ManagerRegistry, PermissionLevel, StoreSettings};
///
/// let registry = ManagerRegistry::new(StoreSettings::default());
/// let max_conn = FeatureFlag::new("max_conn").unwrap();
///
/// let owner = registry.open("feature_flags.json", "owner");
/// owner
///     .declare(&max_conn, PermissionLevel::ReadOnly, 100, "Maximum connections")
///     .unwrap();
///
/// let reader = registry.open("feature_flags.json", "reader");
/// reader.use_flag(&max_conn).unwrap();
/// assert_eq!(reader.get_int(&max_conn, 0).unwrap(), 100);
/// assert!(reader.set(&max_conn, 200).is_err());
/// ```
pub struct FeatureFlagManager {
    module: String,
    store: Arc<SharedFlagStore>,
    declarations: Mutex<HashMap<String, FlagDeclaration>>,
    my_observers: Mutex<HashMap<String, Vec<ObserverId>>>,
    shut_down: AtomicBool,
}

impl std::fmt::Debug for FeatureFlagManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureFlagManager")
            .field("module", &self.module)
            .field("path", &self.store.path())
            .field("declared", &self.declarations.lock().len())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

impl FeatureFlagManager {
    /// Attach a manager for `module` to `store`.
    pub fn attach(store: Arc<SharedFlagStore>, module: impl Into<String>) -> Self {
        let module = module.into();
        let attached = store.add_manager();
        debug!(module = %module, path = %store.path().display(), attached, "Manager attached");
        Self {
            module,
            store,
            declarations: Mutex::new(HashMap::new()),
            my_observers: Mutex::new(HashMap::new()),
            shut_down: AtomicBool::new(false),
        }
    }

    /// Module this manager acts for.
    pub fn module(&self) -> &str {
        &self.module
    }

    /// Resolved config file path.
    pub fn config_path(&self) -> &Path {
        self.store.path()
    }

    /// The shared store behind this manager.
    pub fn store(&self) -> &Arc<SharedFlagStore> {
        &self.store
    }

    /// Declare a flag as owned by this module.
    ///
    /// Seeds `default_value` only when the flag has no value yet, so state
    /// survives restarts. Re-declaring from the same module is idempotent.
    ///
    /// # Errors
    ///
    /// `OwnershipConflict` when another module owns the flag;
    /// `InvalidValue` when the default cannot be stored (NaN or infinite
    /// floats); `Persistence` when the config cannot be written.
    #[instrument(skip(self, flag, default_value, description), fields(module = %self.module, flag = %flag))]
    pub fn declare(
        &self,
        flag: &FeatureFlag,
        access_permissions: PermissionLevel,
        default_value: impl Into<FlagValue>,
        description: impl Into<String>,
    ) -> FlagResult<&Self> {
        self.ensure_live(flag)?;
        let name = flag.name();
        let default_value = default_value.into();
        check_storable(flag, &default_value)?;

        if let Err(existing) = self
            .store
            .claim_ownership(name, &self.module, access_permissions)
        {
            return Err(FlagError::new(FlagErrorKind::OwnershipConflict {
                flag: name.to_string(),
                owner: existing.owner_module().clone(),
                requester: self.module.clone(),
            }));
        }

        let description = description.into();
        self.declarations.lock().insert(
            name.to_string(),
            FlagDeclaration::new(
                flag.clone(),
                AccessGrant::Owner,
                Some(default_value.clone()),
                description.clone(),
            ),
        );

        if self.store.seed_flag_value(name, default_value) {
            debug!("Seeded flag with default value");
        }
        self.store.set_flag_description(name, description);
        self.store.persist()?;

        info!(%access_permissions, "Flag declared");
        Ok(self)
    }

    /// Declare intent to use a flag, usually one owned by another module.
    ///
    /// # Errors
    ///
    /// `AccessDenied` when no module has declared the flag, or when its
    /// owner restricts it to `owner_only`.
    #[instrument(skip(self, flag), fields(module = %self.module, flag = %flag))]
    pub fn use_flag(&self, flag: &FeatureFlag) -> FlagResult<&Self> {
        self.ensure_live(flag)?;
        let name = flag.name();

        let Some(ownership) = self.store.get_ownership_info(name) else {
            return Err(self.denied(flag, "flag has not been declared by any module"));
        };

        let grant = if ownership.is_owned_by(&self.module) {
            AccessGrant::Owner
        } else {
            AccessGrant::for_non_owner(*ownership.access_permissions()).ok_or_else(|| {
                self.denied(
                    flag,
                    format!(
                        "owned by module '{}' with owner_only access",
                        ownership.owner_module()
                    ),
                )
            })?
        };

        let description = self.store.description(name).unwrap_or_default();
        self.declarations.lock().insert(
            name.to_string(),
            FlagDeclaration::new(flag.clone(), grant, None, description),
        );

        debug!(%grant, "Flag in use");
        Ok(self)
    }

    /// Current value of a declared flag.
    ///
    /// Falls back to the declared default, then to `default`.
    ///
    /// # Errors
    ///
    /// `AccessDenied` when this module has not declared or used the flag.
    pub fn get(&self, flag: &FeatureFlag, default: Option<FlagValue>) -> FlagResult<Option<FlagValue>> {
        let declared_default = self.declaration(flag, "read")?.default_value().clone();
        Ok(self
            .store
            .get_flag_value(flag.name())
            .or(declared_default)
            .or(default))
    }

    /// Boolean value of a declared flag, or `default` when unset or not
    /// convertible.
    pub fn get_bool(&self, flag: &FeatureFlag, default: bool) -> FlagResult<bool> {
        Ok(self
            .get(flag, None)?
            .and_then(|v| v.as_bool())
            .unwrap_or(default))
    }

    /// Integer value of a declared flag, or `default` when unset or not
    /// convertible.
    pub fn get_int(&self, flag: &FeatureFlag, default: i64) -> FlagResult<i64> {
        Ok(self
            .get(flag, None)?
            .and_then(|v| v.as_int())
            .unwrap_or(default))
    }

    /// Float value of a declared flag, or `default` when unset or not
    /// convertible.
    pub fn get_float(&self, flag: &FeatureFlag, default: f64) -> FlagResult<f64> {
        Ok(self
            .get(flag, None)?
            .and_then(|v| v.as_float())
            .unwrap_or(default))
    }

    /// String value of a declared flag, or `default` when unset.
    pub fn get_string(&self, flag: &FeatureFlag, default: &str) -> FlagResult<String> {
        Ok(self
            .get(flag, None)?
            .map(|v| v.as_string())
            .unwrap_or_else(|| default.to_string()))
    }

    /// Set a flag value and persist the config.
    ///
    /// # Errors
    ///
    /// `AccessDenied` when the flag is not declared/used here, when this
    /// module holds read-only access, or when the live ownership record
    /// denies writes to non-owners. `InvalidValue` for NaN or infinite
    /// floats. `Persistence` when the write fails.
    #[instrument(skip(self, flag, value), fields(module = %self.module, flag = %flag))]
    pub fn set(&self, flag: &FeatureFlag, value: impl Into<FlagValue>) -> FlagResult<()> {
        let declaration = self.declaration(flag, "modify")?;
        if !declaration.grant().can_write() {
            return Err(self.denied(flag, "module has read-only access"));
        }

        if let Some(ownership) = self.store.get_ownership_info(flag.name()) {
            if !ownership.permits_write(&self.module) {
                return Err(self.denied(
                    flag,
                    format!(
                        "owned by module '{}' with {} access for other modules",
                        ownership.owner_module(),
                        ownership.access_permissions()
                    ),
                ));
            }
        }

        let value = value.into();
        check_storable(flag, &value)?;

        let changed = self.store.set_flag_value(flag.name(), value);
        self.store.persist()?;
        debug!(changed, "Flag set");
        Ok(())
    }

    /// Register an observer for a declared flag.
    ///
    /// # Errors
    ///
    /// `AccessDenied` when this module has not declared or used the flag.
    pub fn add_observer(
        &self,
        flag: &FeatureFlag,
        observer: Arc<dyn FlagObserver>,
    ) -> FlagResult<ObserverId> {
        self.declaration(flag, "observe")?;
        let id = self.store.add_observer(flag.name(), observer);
        self.my_observers
            .lock()
            .entry(flag.name().to_string())
            .or_default()
            .push(id);
        debug!(module = %self.module, %flag, %id, "Observer added");
        Ok(id)
    }

    /// Register a closure as an observer for a declared flag.
    pub fn on_change<F>(&self, flag: &FeatureFlag, callback: F) -> FlagResult<ObserverId>
    where
        F: Fn(&str, Option<&FlagValue>, Option<&FlagValue>) + Send + Sync + 'static,
    {
        self.add_observer(flag, Arc::new(callback))
    }

    /// Remove the observers this manager registered on `flag`.
    ///
    /// Observers registered by other managers are untouched. Returns how
    /// many were removed.
    pub fn remove_observer(&self, flag: &FeatureFlag) -> usize {
        let ids = self.my_observers.lock().remove(flag.name()).unwrap_or_default();
        ids.into_iter()
            .map(|id| self.store.remove_observer(flag.name(), Some(id)))
            .sum()
    }

    /// Description of a flag, from the store or this manager's declaration.
    pub fn description(&self, flag: &FeatureFlag) -> String {
        self.store
            .description(flag.name())
            .filter(|d| !d.is_empty())
            .or_else(|| {
                self.declarations
                    .lock()
                    .get(flag.name())
                    .map(|d| d.description().clone())
            })
            .unwrap_or_default()
    }

    /// Flags this manager has declared or used.
    pub fn declared_flags(&self) -> HashMap<String, FlagDeclaration> {
        self.declarations.lock().clone()
    }

    /// Ownership records for every flag in the file.
    pub fn ownership_info(&self) -> HashMap<String, FlagOwnership> {
        self.store.ownership_registry()
    }

    /// Every flag value in the file.
    pub fn all_flags(&self) -> HashMap<String, FlagValue> {
        self.store.cache()
    }

    /// Every flag value with its description, ordered by name.
    pub fn all_flags_with_descriptions(&self) -> BTreeMap<String, FlagSummary> {
        let tables = self.store.snapshot();
        tables
            .values()
            .iter()
            .map(|(name, value)| {
                let description = tables.descriptions().get(name).cloned().unwrap_or_default();
                (name.clone(), FlagSummary::new(value.clone(), description))
            })
            .collect()
    }

    /// Re-read the config file now (subject to debounce).
    pub fn reload(&self) -> ReloadOutcome {
        self.store.reload()
    }

    /// Whether [`shutdown`](Self::shutdown) has run.
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    /// Detach from the store, removing this manager's observers.
    ///
    /// The last manager to detach stops the store's file watcher. Calling
    /// this more than once has no further effect.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        let observers = std::mem::take(&mut *self.my_observers.lock());
        for (flag, ids) in observers {
            for id in ids {
                self.store.remove_observer(&flag, Some(id));
            }
        }
        let remaining = self.store.remove_manager();
        info!(module = %self.module, remaining, "Manager shut down");
    }

    #[track_caller]
    fn declaration(&self, flag: &FeatureFlag, action: &str) -> FlagResult<FlagDeclaration> {
        self.declarations
            .lock()
            .get(flag.name())
            .cloned()
            .ok_or_else(|| {
                self.denied(
                    flag,
                    format!("flag must be declared or used before it can {}", action),
                )
            })
    }

    #[track_caller]
    fn ensure_live(&self, flag: &FeatureFlag) -> FlagResult<()> {
        if self.is_shut_down() {
            return Err(self.denied(flag, "manager has been shut down"));
        }
        Ok(())
    }

    #[track_caller]
    fn denied(&self, flag: &FeatureFlag, reason: impl Into<String>) -> FlagError {
        FlagError::new(FlagErrorKind::AccessDenied {
            flag: flag.name().to_string(),
            module: self.module.clone(),
            reason: reason.into(),
        })
    }
}

#[track_caller]
fn check_storable(flag: &FeatureFlag, value: &FlagValue) -> FlagResult<()> {
    if value.is_storable() {
        return Ok(());
    }
    Err(FlagError::new(FlagErrorKind::InvalidValue {
        flag: flag.name().to_string(),
        reason: format!("{} cannot be stored in JSON", value),
    }))
}

impl Drop for FeatureFlagManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}
