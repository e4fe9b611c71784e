//! Store tuning knobs.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default minimum interval between reloads, in milliseconds.
pub const DEFAULT_DEBOUNCE_MS: u64 = 100;

/// Settings applied to every shared store a registry opens.
///
/// # Examples
///
/// ```
/// use streambot_flags::StoreSettings;
///
/// let settings = StoreSettings::default().with_debounce_ms(250).with_watch(false);
/// assert_eq!(settings.debounce().as_millis(), 250);
/// ```
#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    derive_getters::Getters,
    derive_setters::Setters,
)]
#[setters(prefix = "with_")]
pub struct StoreSettings {
    /// Reload requests closer together than this are dropped
    #[serde(default = "default_debounce_ms")]
    debounce_ms: u64,
    /// Whether to watch the config file for external edits
    #[serde(default = "default_watch")]
    watch: bool,
}

impl StoreSettings {
    /// Debounce window as a duration.
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            watch: default_watch(),
        }
    }
}

fn default_debounce_ms() -> u64 {
    DEFAULT_DEBOUNCE_MS
}

fn default_watch() -> bool {
    true
}
