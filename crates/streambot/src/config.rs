//! Application configuration loaded from `streambot.toml`.

use derive_getters::Getters;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use streambot_error::{ConfigError, ConfigErrorKind, StreambotError, StreambotResult};
use streambot_flags::{DEFAULT_DEBOUNCE_MS, StoreSettings};
use tracing::{debug, info};

/// Default location of the feature flag file.
pub const DEFAULT_FLAGS_PATH: &str = "feature_flags.json";

/// Module name the CLI acts as when none is given.
pub const DEFAULT_MODULE: &str = "cli";

/// Top-level application configuration.
///
/// # Examples
///
/// ```
/// use streambot::StreambotConfig;
///
/// let config = StreambotConfig::parse("[flags]\nmodule = \"overlay\"\n").unwrap();
/// assert_eq!(config.flags().module(), "overlay");
/// assert_eq!(*config.flags().debounce_ms(), 100);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Getters)]
pub struct StreambotConfig {
    /// Feature flag settings
    #[serde(default)]
    flags: FlagsConfig,
}

/// The `[flags]` table.
#[derive(
    Debug, Clone, PartialEq, Serialize, Deserialize, Getters, derive_builder::Builder,
)]
#[serde(default)]
#[builder(setter(into), default)]
pub struct FlagsConfig {
    /// Path of the flag file
    path: PathBuf,
    /// Minimum interval between reloads in milliseconds
    debounce_ms: u64,
    /// Whether to watch the flag file for external edits
    watch: bool,
    /// Module name used for permission checks
    module: String,
}

impl Default for FlagsConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_FLAGS_PATH),
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            watch: true,
            module: DEFAULT_MODULE.to_string(),
        }
    }
}

impl FlagsConfig {
    /// Store settings derived from this table.
    pub fn store_settings(&self) -> StoreSettings {
        StoreSettings::default()
            .with_debounce_ms(self.debounce_ms)
            .with_watch(self.watch)
    }
}

impl StreambotConfig {
    /// Load configuration from a TOML file.
    ///
    /// A missing file yields the defaults.
    #[tracing::instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn from_file(path: impl AsRef<Path>) -> StreambotResult<Self> {
        let path = path.as_ref();
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No config file; using defaults");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(StreambotError::from(ConfigError::new(ConfigErrorKind::Read {
                    path: path.display().to_string(),
                    message: e.to_string(),
                })));
            }
        };

        let config = Self::parse(&content)?;
        info!(flags_path = %config.flags.path.display(), module = %config.flags.module, "Configuration loaded");
        Ok(config)
    }

    /// Parse configuration from TOML text.
    pub fn parse(content: &str) -> StreambotResult<Self> {
        toml::from_str(content).map_err(|e| {
            StreambotError::from(ConfigError::new(ConfigErrorKind::Parse(e.to_string())))
        })
    }

    /// Replace the flag file path.
    pub fn with_flags_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.flags.path = path.into();
        self
    }

    /// Replace the acting module name.
    pub fn with_module(mut self, module: impl Into<String>) -> Self {
        self.flags.module = module.into();
        self
    }
}
