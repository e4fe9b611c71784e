//! Permission model for flag ownership and access.

use crate::{FeatureFlag, FlagValue};
use serde::{Deserialize, Serialize};

/// Access granted to modules other than the flag's owner.
///
/// The owner always has full read/write access regardless of this level.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PermissionLevel {
    /// Non-owners may read the value.
    ReadOnly,
    /// Non-owners may read and modify the value.
    ReadWrite,
    /// Non-owners may not access the flag at all.
    OwnerOnly,
}

impl PermissionLevel {
    /// Whether a non-owner may read under this level.
    pub fn allows_read(self) -> bool {
        !matches!(self, Self::OwnerOnly)
    }

    /// Whether a non-owner may write under this level.
    pub fn allows_write(self) -> bool {
        matches!(self, Self::ReadWrite)
    }
}

/// Ownership record shared by every manager on one config file.
#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    derive_getters::Getters,
    derive_new::new,
)]
pub struct FlagOwnership {
    /// Module that declared the flag
    #[new(into)]
    owner_module: String,
    /// Access level for every other module
    access_permissions: PermissionLevel,
}

impl FlagOwnership {
    /// Whether `module` is the owner.
    pub fn is_owned_by(&self, module: &str) -> bool {
        self.owner_module == module
    }

    /// Whether `module` may write under this record.
    pub fn permits_write(&self, module: &str) -> bool {
        self.is_owned_by(module) || self.access_permissions.allows_write()
    }
}

/// Effective access recorded in one manager's declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum AccessGrant {
    /// Declared by this module; full access.
    Owner,
    /// Used with read-only access.
    ReadOnly,
    /// Used with read/write access.
    ReadWrite,
}

impl AccessGrant {
    /// Grant for a non-owner under `level`, or `None` when the level locks
    /// non-owners out.
    pub fn for_non_owner(level: PermissionLevel) -> Option<Self> {
        match level {
            PermissionLevel::ReadOnly => Some(Self::ReadOnly),
            PermissionLevel::ReadWrite => Some(Self::ReadWrite),
            PermissionLevel::OwnerOnly => None,
        }
    }

    /// Whether this grant allows writes.
    pub fn can_write(self) -> bool {
        !matches!(self, Self::ReadOnly)
    }
}

/// A module's local record that it reads or writes a flag.
#[derive(Debug, Clone, PartialEq, derive_getters::Getters, derive_new::new)]
pub struct FlagDeclaration {
    /// The declared flag
    flag: FeatureFlag,
    /// Access granted to the declaring manager
    grant: AccessGrant,
    /// Fallback value when the store has none
    default_value: Option<FlagValue>,
    /// Human-readable description
    #[new(into)]
    description: String,
}

impl FlagDeclaration {
    /// Whether the declaring manager owns the flag.
    pub fn is_owner(&self) -> bool {
        self.grant == AccessGrant::Owner
    }
}
