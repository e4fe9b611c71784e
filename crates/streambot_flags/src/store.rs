//! Shared, file-backed flag storage.
//!
//! One [`SharedFlagStore`] exists per config file. It owns the in-memory
//! replica of the file (values, descriptions, ownership), the observer
//! registrations, and the file watcher. Every manager attached to the same
//! file talks to the same store.

use crate::document::{self, FlagTables};
use crate::observer::{self, Change, ObserverSet};
use crate::watcher::ConfigWatcher;
use crate::{FlagObserver, FlagOwnership, FlagValue, ObserverId, PermissionLevel, StoreSettings};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;
use streambot_error::FlagResult;
use tracing::{debug, info, instrument, warn};

/// Result of a reload request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum ReloadOutcome {
    /// The file was read and the cache replaced.
    #[display("reloaded {} flags ({} changed)", flags, changed)]
    Reloaded {
        /// Flags in the cache after the reload
        flags: usize,
        /// Observed flags whose value changed
        changed: usize,
    },
    /// The file holds exactly what this store last wrote.
    #[display("unchanged")]
    Unchanged,
    /// Dropped: the previous reload was too recent.
    #[display("debounced")]
    Debounced,
    /// The file could not be read or parsed; the cache was kept.
    #[display("failed")]
    Failed,
    /// The store is closed and no longer tracks the file.
    #[display("closed")]
    Closed,
}

#[derive(Default)]
struct StoreState {
    tables: FlagTables,
    observers: ObserverSet,
    last_reload: Option<Instant>,
    last_written: Option<Vec<u8>>,
    managers: usize,
}

/// Flag values, descriptions and ownership for one config file.
///
/// All state sits behind one mutex. Observers run after the mutation is
/// committed and with the mutex released, so a callback may read or write
/// flags without deadlocking.
pub struct SharedFlagStore {
    path: PathBuf,
    settings: StoreSettings,
    state: Mutex<StoreState>,
    // Held across snapshot + write, and across reload read + swap.
    write_lock: Mutex<()>,
    watcher: Mutex<Option<ConfigWatcher>>,
    closed: AtomicBool,
}

impl std::fmt::Debug for SharedFlagStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedFlagStore")
            .field("path", &self.path)
            .field("settings", &self.settings)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl SharedFlagStore {
    /// Open the store for `path`, load the file and start the watcher.
    ///
    /// Prefer [`ManagerRegistry`](crate::ManagerRegistry), which guarantees
    /// a single store per file. A watcher that fails to start is logged and
    /// the store falls back to explicit [`reload`](Self::reload) calls.
    #[instrument(skip(path, settings), fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>, settings: StoreSettings) -> Arc<Self> {
        let path = resolve_config_path(path.as_ref());
        let store = Arc::new(Self {
            path,
            settings,
            state: Mutex::new(StoreState::default()),
            write_lock: Mutex::new(()),
            watcher: Mutex::new(None),
            closed: AtomicBool::new(false),
        });

        store.load_initial();
        if *store.settings.watch() {
            store.start_watcher();
        }
        store
    }

    /// Resolved absolute path of the config file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Settings this store was opened with.
    pub fn settings(&self) -> &StoreSettings {
        &self.settings
    }

    fn load_initial(&self) {
        match std::fs::read(&self.path) {
            Ok(bytes) => match parse_bytes(&bytes) {
                Ok(tables) => {
                    info!(path = %self.path.display(), flags = tables.values().len(), "Loaded feature flags");
                    self.state.lock().tables = tables;
                }
                Err(e) => warn!(path = %self.path.display(), error = %e, "Ignoring unreadable config"),
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No config file yet; starting empty");
            }
            Err(e) => warn!(path = %self.path.display(), error = %e, "Could not read config"),
        }
    }

    fn start_watcher(self: &Arc<Self>) {
        let weak: Weak<Self> = Arc::downgrade(self);
        let started = ConfigWatcher::start(&self.path, move || {
            if let Some(store) = weak.upgrade() {
                if store.is_closed() {
                    return;
                }
                let outcome = store.reload();
                debug!(%outcome, "Watcher-triggered reload");
            }
        });
        match started {
            Ok(watcher) => *self.watcher.lock() = Some(watcher),
            Err(e) => warn!(
                path = %self.path.display(),
                error = %e,
                "Could not set up file watcher; changes require explicit reload"
            ),
        }
    }

    /// Whether a watcher is running for this store.
    pub fn is_watching(&self) -> bool {
        self.watcher.lock().is_some()
    }

    // ----------------------------------------------------------------------
    // Values
    // ----------------------------------------------------------------------

    /// Current value of a flag.
    pub fn get_flag_value(&self, flag: &str) -> Option<FlagValue> {
        self.state.lock().tables.values.get(flag).cloned()
    }

    /// Set a flag value, notifying observers if it changed.
    ///
    /// Returns whether the value changed. Does not touch the file; see
    /// [`persist`](Self::persist).
    #[instrument(level = "debug", skip(self, value))]
    pub fn set_flag_value(&self, flag: &str, value: FlagValue) -> bool {
        let pending = {
            let mut state = self.state.lock();
            let old = state.tables.values.insert(flag.to_string(), value.clone());
            if old.as_ref() == Some(&value) {
                None
            } else {
                let observers = state.observers.for_flag(flag);
                Some((
                    Change {
                        flag: flag.to_string(),
                        old,
                        new: Some(value),
                    },
                    observers,
                ))
            }
        };

        match pending {
            Some((change, observers)) => {
                debug!(observers = observers.len(), "Flag value changed");
                observer::deliver(&change, &observers);
                true
            }
            None => false,
        }
    }

    /// Set a flag value only if it has none. Returns whether it was seeded.
    pub fn seed_flag_value(&self, flag: &str, value: FlagValue) -> bool {
        let observers = {
            let mut state = self.state.lock();
            if state.tables.values.contains_key(flag) {
                return false;
            }
            state.tables.values.insert(flag.to_string(), value.clone());
            state.observers.for_flag(flag)
        };
        let change = Change {
            flag: flag.to_string(),
            old: None,
            new: Some(value),
        };
        observer::deliver(&change, &observers);
        true
    }

    /// Snapshot of every flag value.
    pub fn cache(&self) -> HashMap<String, FlagValue> {
        self.state.lock().tables.values.clone()
    }

    // ----------------------------------------------------------------------
    // Descriptions
    // ----------------------------------------------------------------------

    /// Record a flag description.
    pub fn set_flag_description(&self, flag: &str, description: impl Into<String>) {
        self.state
            .lock()
            .tables
            .descriptions
            .insert(flag.to_string(), description.into());
    }

    /// Description of one flag.
    pub fn description(&self, flag: &str) -> Option<String> {
        self.state.lock().tables.descriptions.get(flag).cloned()
    }

    /// Snapshot of every description.
    pub fn descriptions(&self) -> HashMap<String, String> {
        self.state.lock().tables.descriptions.clone()
    }

    // ----------------------------------------------------------------------
    // Ownership
    // ----------------------------------------------------------------------

    /// Ownership record of one flag.
    pub fn get_ownership_info(&self, flag: &str) -> Option<FlagOwnership> {
        self.state.lock().tables.ownership.get(flag).cloned()
    }

    /// Replace the ownership record of one flag.
    pub fn set_ownership_info(&self, flag: &str, ownership: FlagOwnership) {
        self.state
            .lock()
            .tables
            .ownership
            .insert(flag.to_string(), ownership);
    }

    /// Claim `flag` for `module` unless another module owns it.
    ///
    /// Check and claim happen under one lock acquisition, so two modules
    /// racing to declare the same flag cannot both win. On conflict the
    /// existing record is returned.
    pub fn claim_ownership(
        &self,
        flag: &str,
        module: &str,
        access_permissions: PermissionLevel,
    ) -> Result<(), FlagOwnership> {
        let mut state = self.state.lock();
        if let Some(existing) = state.tables.ownership.get(flag) {
            if !existing.is_owned_by(module) {
                return Err(existing.clone());
            }
        }
        state.tables.ownership.insert(
            flag.to_string(),
            FlagOwnership::new(module, access_permissions),
        );
        Ok(())
    }

    /// Snapshot of every ownership record.
    pub fn ownership_registry(&self) -> HashMap<String, FlagOwnership> {
        self.state.lock().tables.ownership.clone()
    }

    /// Snapshot of values, descriptions and ownership together.
    pub fn snapshot(&self) -> FlagTables {
        self.state.lock().tables.clone()
    }

    // ----------------------------------------------------------------------
    // Persistence
    // ----------------------------------------------------------------------

    /// Write `tables` to the config file atomically.
    pub fn write_config(&self, tables: &FlagTables) -> FlagResult<()> {
        let _guard = self.write_lock.lock();
        self.write_locked(tables)
    }

    /// Write the current in-memory state to the config file.
    #[instrument(level = "debug", skip(self), fields(path = %self.path.display()))]
    pub fn persist(&self) -> FlagResult<()> {
        let _guard = self.write_lock.lock();
        let tables = self.snapshot();
        self.write_locked(&tables)
    }

    fn write_locked(&self, tables: &FlagTables) -> FlagResult<()> {
        let text = document::render_document(tables)?;
        let bytes = text.into_bytes();
        document::write_atomic(&self.path, &bytes)?;
        debug!(path = %self.path.display(), flags = tables.values().len(), "Config written");
        self.state.lock().last_written = Some(bytes);
        Ok(())
    }

    /// Re-read the config file and notify observers of changed values.
    ///
    /// Requests arriving within the debounce window of the previous reload
    /// are dropped, not queued. A missing file or a document without a
    /// `flags` map resets the store to empty; invalid JSON or invalid UTF-8
    /// keeps the current cache. A closed store never reloads.
    ///
    /// The write lock is held from reading the file until the cache is
    /// swapped, so a reload can never observe a half-finished own write.
    pub fn reload(&self) -> ReloadOutcome {
        if self.is_closed() {
            return ReloadOutcome::Closed;
        }

        let now = Instant::now();
        {
            let mut state = self.state.lock();
            if let Some(last) = state.last_reload {
                let elapsed = now.duration_since(last);
                if elapsed < self.settings.debounce() {
                    debug!(elapsed_ms = elapsed.as_millis() as u64, "Config reload debounced");
                    return ReloadOutcome::Debounced;
                }
            }
            state.last_reload = Some(now);
        }

        let (pending, flags) = {
            let _write = self.write_lock.lock();
            if self.is_closed() {
                return ReloadOutcome::Closed;
            }

            let tables = match std::fs::read(&self.path) {
                Ok(bytes) => {
                    if self.state.lock().last_written.as_deref() == Some(bytes.as_slice()) {
                        return ReloadOutcome::Unchanged;
                    }
                    match parse_bytes(&bytes) {
                        Ok(tables) => tables,
                        Err(e) => {
                            warn!(
                                path = %self.path.display(),
                                error = %e,
                                "Malformed config; keeping previous flag values"
                            );
                            return ReloadOutcome::Failed;
                        }
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    info!(path = %self.path.display(), "Config file missing; flags reset");
                    FlagTables::default()
                }
                Err(e) => {
                    warn!(path = %self.path.display(), error = %e, "Could not read config");
                    return ReloadOutcome::Failed;
                }
            };

            let mut state = self.state.lock();
            let pending: Vec<_> = state
                .observers
                .observed_flags()
                .filter_map(|flag| {
                    let old = state.tables.values.get(flag);
                    let new = tables.values.get(flag);
                    (old != new).then(|| {
                        (
                            Change {
                                flag: flag.to_string(),
                                old: old.cloned(),
                                new: new.cloned(),
                            },
                            state.observers.for_flag(flag),
                        )
                    })
                })
                .collect();
            let flags = tables.values.len();
            state.tables = tables;
            (pending, flags)
        };

        for (change, observers) in &pending {
            observer::deliver(change, observers);
        }

        info!(flags, changed = pending.len(), "Feature flags reloaded");
        ReloadOutcome::Reloaded {
            flags,
            changed: pending.len(),
        }
    }

    // ----------------------------------------------------------------------
    // Observers
    // ----------------------------------------------------------------------

    /// Register an observer for one flag.
    pub fn add_observer(&self, flag: &str, observer: Arc<dyn FlagObserver>) -> ObserverId {
        self.state.lock().observers.add(flag, observer)
    }

    /// Remove one observer, or all observers of the flag when `id` is `None`.
    pub fn remove_observer(&self, flag: &str, id: Option<ObserverId>) -> usize {
        self.state.lock().observers.remove(flag, id)
    }

    /// Number of registered observers across all flags.
    pub fn observer_count(&self) -> usize {
        self.state.lock().observers.len()
    }

    // ----------------------------------------------------------------------
    // Lifecycle
    // ----------------------------------------------------------------------

    /// Record one more attached manager.
    pub fn add_manager(&self) -> usize {
        let mut state = self.state.lock();
        state.managers += 1;
        state.managers
    }

    /// Detach one manager; the last one out stops the watcher.
    ///
    /// Returns the number of managers still attached.
    pub fn remove_manager(&self) -> usize {
        let remaining = {
            let mut state = self.state.lock();
            state.managers = state.managers.saturating_sub(1);
            state.managers
        };
        if remaining == 0 {
            self.close();
        }
        remaining
    }

    /// Number of attached managers.
    pub fn manager_count(&self) -> usize {
        self.state.lock().managers
    }

    /// Whether the store has been closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let watcher = self.watcher.lock().take();
        if let Some(watcher) = watcher {
            watcher.stop();
        }
        info!(path = %self.path.display(), "Shared flag store closed");
    }
}

impl Drop for SharedFlagStore {
    fn drop(&mut self) {
        self.close();
    }
}

/// Why a config file could not be turned into flag tables.
#[derive(Debug, derive_more::Display, derive_more::From)]
enum UnreadableConfig {
    #[display("invalid UTF-8: {}", _0)]
    Utf8(std::str::Utf8Error),
    #[display("{}", _0)]
    Json(serde_json::Error),
}

fn parse_bytes(bytes: &[u8]) -> Result<FlagTables, UnreadableConfig> {
    let text = std::str::from_utf8(bytes)?;
    Ok(document::parse_document(text)?)
}

/// Absolute form of a config path, with the parent directory resolved.
///
/// The parent directory is created if missing so the watcher has a
/// directory to observe and symlinked parents resolve to one key.
pub fn resolve_config_path(path: &Path) -> PathBuf {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let (Some(parent), Some(name)) = (absolute.parent(), absolute.file_name()) else {
        return absolute;
    };
    if let Err(e) = std::fs::create_dir_all(parent) {
        debug!(dir = %parent.display(), error = %e, "Could not create config directory");
    }
    match parent.canonicalize() {
        Ok(dir) => dir.join(name),
        Err(_) => absolute,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn unwatched() -> StoreSettings {
        StoreSettings::default().with_watch(false).with_debounce_ms(0)
    }

    #[test]
    fn test_set_reports_change() {
        let dir = tempfile::tempdir().unwrap();
        let store = SharedFlagStore::open(dir.path().join("flags.json"), unwatched());

        assert!(store.set_flag_value("odds", FlagValue::Float(0.5)));
        assert!(!store.set_flag_value("odds", FlagValue::Float(0.5)));
        assert_eq!(store.get_flag_value("odds"), Some(FlagValue::Float(0.5)));
    }

    #[test]
    fn test_seed_never_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let store = SharedFlagStore::open(dir.path().join("flags.json"), unwatched());

        assert!(store.seed_flag_value("limit", FlagValue::Int(1)));
        assert!(!store.seed_flag_value("limit", FlagValue::Int(2)));
        assert_eq!(store.get_flag_value("limit"), Some(FlagValue::Int(1)));
    }

    #[test]
    fn test_claim_ownership_conflict() {
        let dir = tempfile::tempdir().unwrap();
        let store = SharedFlagStore::open(dir.path().join("flags.json"), unwatched());

        store
            .claim_ownership("limit", "owner", PermissionLevel::ReadOnly)
            .unwrap();
        store
            .claim_ownership("limit", "owner", PermissionLevel::ReadWrite)
            .unwrap();
        let existing = store
            .claim_ownership("limit", "intruder", PermissionLevel::ReadWrite)
            .unwrap_err();
        assert_eq!(existing.owner_module(), "owner");
        assert_eq!(
            *store.get_ownership_info("limit").unwrap().access_permissions(),
            PermissionLevel::ReadWrite
        );
    }

    #[test]
    fn test_own_write_is_not_reloaded() {
        let dir = tempfile::tempdir().unwrap();
        let store = SharedFlagStore::open(dir.path().join("flags.json"), unwatched());
        store.set_flag_value("limit", FlagValue::Int(3));
        store.persist().unwrap();

        assert_eq!(store.reload(), ReloadOutcome::Unchanged);
    }

    #[test]
    fn test_reload_debounce_drops_second_request() {
        let dir = tempfile::tempdir().unwrap();
        let settings = StoreSettings::default()
            .with_watch(false)
            .with_debounce_ms(60_000);
        let store = SharedFlagStore::open(dir.path().join("flags.json"), settings);

        assert!(matches!(store.reload(), ReloadOutcome::Reloaded { .. }));
        assert_eq!(store.reload(), ReloadOutcome::Debounced);
    }

    #[test]
    fn test_last_manager_closes_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = SharedFlagStore::open(
            dir.path().join("flags.json"),
            StoreSettings::default(),
        );
        assert_eq!(store.add_manager(), 1);
        assert_eq!(store.add_manager(), 2);
        assert_eq!(store.remove_manager(), 1);
        assert!(!store.is_closed());
        assert_eq!(store.remove_manager(), 0);
        assert!(store.is_closed());
        assert!(!store.is_watching());
    }

    #[test]
    fn test_reload_notifies_only_changed_observed_flags() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flags.json");
        let store = SharedFlagStore::open(&path, unwatched());
        store.set_flag_value("a", FlagValue::Int(1));
        store.set_flag_value("b", FlagValue::Int(1));

        let calls = Arc::new(AtomicUsize::new(0));
        for flag in ["a", "b"] {
            let calls = Arc::clone(&calls);
            store.add_observer(
                flag,
                Arc::new(move |_: &str, _: Option<&FlagValue>, _: Option<&FlagValue>| {
                    calls.fetch_add(1, Ordering::SeqCst);
                }),
            );
        }

        std::fs::write(&path, r#"{"flags": {"a": {"value": 1}, "b": {"value": 2}}}"#).unwrap();
        assert_eq!(
            store.reload(),
            ReloadOutcome::Reloaded {
                flags: 2,
                changed: 1
            }
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_reload_waits_for_in_flight_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flags.json");
        let store = SharedFlagStore::open(&path, unwatched());
        store.set_flag_value("limit", FlagValue::Int(1));

        // The renamed file is on disk but its bytes are not recorded yet.
        let guard = store.write_lock.lock();
        let bytes = br#"{"flags": {"limit": {"value": 1}}}"#.to_vec();
        std::fs::write(&path, &bytes).unwrap();

        let reloader = Arc::clone(&store);
        let handle = std::thread::spawn(move || reloader.reload());
        std::thread::sleep(std::time::Duration::from_millis(50));
        assert!(!handle.is_finished());

        store.set_flag_value("limit", FlagValue::Int(2));
        store.state.lock().last_written = Some(bytes);
        drop(guard);

        assert_eq!(handle.join().unwrap(), ReloadOutcome::Unchanged);
        assert_eq!(store.get_flag_value("limit"), Some(FlagValue::Int(2)));
    }

    #[test]
    fn test_closed_store_ignores_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flags.json");
        let store = SharedFlagStore::open(&path, unwatched());
        store.add_manager();
        store.set_flag_value("limit", FlagValue::Int(1));

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        store.add_observer(
            "limit",
            Arc::new(move |_: &str, _: Option<&FlagValue>, _: Option<&FlagValue>| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );
        store.remove_manager();
        assert!(store.is_closed());

        std::fs::write(&path, r#"{"flags": {"limit": {"value": 9}}}"#).unwrap();
        assert_eq!(store.reload(), ReloadOutcome::Closed);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(store.get_flag_value("limit"), Some(FlagValue::Int(1)));
    }

    #[test]
    fn test_invalid_utf8_keeps_cache() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flags.json");
        let store = SharedFlagStore::open(&path, unwatched());
        store.set_flag_value("greeting", FlagValue::from("hello"));

        std::fs::write(&path, b"{\"flags\": {\"greeting\": {\"value\": \"\xff\"}}}").unwrap();
        assert_eq!(store.reload(), ReloadOutcome::Failed);
        assert_eq!(store.get_flag_value("greeting"), Some(FlagValue::from("hello")));
    }

    #[test]
    fn test_invalid_utf8_is_ignored_at_startup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flags.json");
        std::fs::write(&path, b"{\"flags\": {\"greeting\": {\"value\": \"\xff\"}}}").unwrap();

        let store = SharedFlagStore::open(&path, unwatched());
        assert!(store.cache().is_empty());
    }

    #[test]
    fn test_resolve_config_path_is_absolute() {
        let dir = tempfile::tempdir().unwrap();
        let resolved = resolve_config_path(&dir.path().join("sub").join("flags.json"));
        assert!(resolved.is_absolute());
        assert!(resolved.parent().unwrap().is_dir());
        assert_eq!(resolved.file_name().unwrap(), "flags.json");
    }
}
