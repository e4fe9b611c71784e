//! Shared, file-backed feature flags for streambot modules.
//!
//! Several modules of one process (a chat bot, an overlay, a scheduler) read
//! and write runtime flags kept in one JSON file. Each module goes through its
//! own [`FeatureFlagManager`]; the managers on one file share a single
//! [`SharedFlagStore`] holding the values, descriptions, ownership records,
//! change observers and the file watcher.
//!
//! The module that [`declare`](FeatureFlagManager::declare)s a flag owns it
//! and picks what everyone else may do with it through a [`PermissionLevel`].
//! Other modules call [`use_flag`](FeatureFlagManager::use_flag) and get the
//! access that level allows.
//!
//! ```no_run
//! use streambot_flags::{FeatureFlag, ManagerRegistry, PermissionLevel, StoreSettings};
//!
//! # fn main() -> streambot_flags::FlagResult<()> {
//! let registry = ManagerRegistry::new(StoreSettings::default());
//! let overlay = FeatureFlag::new("overlay_enabled")?;
//!
//! let bot = registry.open("feature_flags.json", "bot");
//! bot.declare(&overlay, PermissionLevel::ReadWrite, true, "Show the stream overlay")?;
//! bot.on_change(&overlay, |flag, _old, new| {
//!     tracing::info!(flag, ?new, "Overlay toggled");
//! })?;
//!
//! let dashboard = registry.open("feature_flags.json", "dashboard");
//! dashboard.use_flag(&overlay)?;
//! dashboard.set(&overlay, false)?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod document;
mod flag;
mod manager;
mod observer;
mod permission;
mod registry;
mod settings;
mod store;
mod value;
mod watcher;

pub use document::{FORMAT_VERSION, FlagTables, parse_document, render_document, temp_path, write_atomic};
pub use flag::{FeatureFlag, MAX_FLAG_NAME_LEN};
pub use manager::{FeatureFlagManager, FlagSummary};
pub use observer::{FlagObserver, ObserverId};
pub use permission::{AccessGrant, FlagDeclaration, FlagOwnership, PermissionLevel};
pub use registry::ManagerRegistry;
pub use settings::{DEFAULT_DEBOUNCE_MS, StoreSettings};
pub use store::{ReloadOutcome, SharedFlagStore, resolve_config_path};
pub use value::FlagValue;

pub use streambot_error::{FlagError, FlagErrorKind, FlagResult};
