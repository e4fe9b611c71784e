//! Streambot runtime feature flags.
//!
//! This crate re-exports the flag core from `streambot_flags` and the error
//! types from `streambot_error`, and adds loading of the application config
//! file `streambot.toml`:
//!
//! ```toml
//! [flags]
//! path = "feature_flags.json"
//! debounce_ms = 100
//! watch = true
//! module = "cli"
//! ```
//!
//! # Example
//!
//! ```no_run
//! use streambot::{FeatureFlag, ManagerRegistry, PermissionLevel, StreambotConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = StreambotConfig::from_file("streambot.toml")?;
//! let registry = ManagerRegistry::new(config.flags().store_settings());
//!
//! let chat = registry.open(config.flags().path(), "chat");
//! let slow_mode = FeatureFlag::new("slow_mode")?;
//! chat.declare(&slow_mode, PermissionLevel::ReadWrite, false, "Throttle chat commands")?;
//!
//! if chat.get_bool(&slow_mode, false)? {
//!     println!("slow mode on");
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod config;

pub use config::{
    DEFAULT_FLAGS_PATH, DEFAULT_MODULE, FlagsConfig, FlagsConfigBuilder, FlagsConfigBuilderError,
    StreambotConfig,
};

pub use streambot_error::{
    ConfigError, ConfigErrorKind, FlagError, FlagErrorKind, FlagResult, StreambotError,
    StreambotErrorKind, StreambotResult,
};
pub use streambot_flags::{
    AccessGrant, DEFAULT_DEBOUNCE_MS, FeatureFlag, FeatureFlagManager, FlagDeclaration,
    FlagObserver, FlagOwnership, FlagSummary, FlagValue, MAX_FLAG_NAME_LEN, ManagerRegistry,
    ObserverId, PermissionLevel, ReloadOutcome, SharedFlagStore, StoreSettings,
};
