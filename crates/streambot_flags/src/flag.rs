//! Feature flag identifiers.

use serde::{Deserialize, Serialize};
use streambot_error::{FlagError, FlagErrorKind, FlagResult};

/// Longest accepted flag name.
pub const MAX_FLAG_NAME_LEN: usize = 100;

/// Name of a feature flag.
///
/// A `FeatureFlag` holds only the name; values live in the shared store and
/// are reached through a [`FeatureFlagManager`](crate::FeatureFlagManager).
///
/// # Examples
///
/// ```
/// use streambot_flags::FeatureFlag;
///
/// let debug_mode = FeatureFlag::new("debug_mode").unwrap();
/// assert_eq!(debug_mode.name(), "debug_mode");
/// assert!(FeatureFlag::new("   ").is_err());
/// ```
#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    derive_more::Display,
)]
#[serde(try_from = "String", into = "String")]
#[display("{}", name)]
pub struct FeatureFlag {
    name: String,
}

impl FeatureFlag {
    /// Create a flag identifier, validating the name.
    #[track_caller]
    pub fn new(name: impl Into<String>) -> FlagResult<Self> {
        let name = name.into();
        if !is_valid_name(&name) {
            return Err(FlagError::new(FlagErrorKind::InvalidName(name)));
        }
        Ok(Self { name })
    }

    /// The flag name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

fn is_valid_name(name: &str) -> bool {
    !name.trim().is_empty() && name.chars().count() <= MAX_FLAG_NAME_LEN
}

impl TryFrom<String> for FeatureFlag {
    type Error = FlagError;

    fn try_from(name: String) -> FlagResult<Self> {
        Self::new(name)
    }
}

impl TryFrom<&str> for FeatureFlag {
    type Error = FlagError;

    fn try_from(name: &str) -> FlagResult<Self> {
        Self::new(name)
    }
}

impl From<FeatureFlag> for String {
    fn from(flag: FeatureFlag) -> Self {
        flag.name
    }
}

impl AsRef<str> for FeatureFlag {
    fn as_ref(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_equality_and_hash_by_name() {
        let a = FeatureFlag::new("max_connections").unwrap();
        let b = FeatureFlag::new("max_connections").unwrap();
        let mut set = HashSet::new();
        set.insert(a.clone());
        assert!(set.contains(&b));
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "max_connections");
    }

    #[test]
    fn test_rejects_blank_and_oversized_names() {
        assert!(FeatureFlag::new("").is_err());
        assert!(FeatureFlag::new(" \t ").is_err());
        assert!(FeatureFlag::new("x".repeat(MAX_FLAG_NAME_LEN)).is_ok());

        let err = FeatureFlag::new("x".repeat(MAX_FLAG_NAME_LEN + 1)).unwrap_err();
        assert!(matches!(err.kind, FlagErrorKind::InvalidName(_)));
    }

    #[test]
    fn test_serde_validates() {
        let flag: FeatureFlag = serde_json::from_str("\"beta_features\"").unwrap();
        assert_eq!(flag.name(), "beta_features");
        assert!(serde_json::from_str::<FeatureFlag>("\"\"").is_err());
    }
}
