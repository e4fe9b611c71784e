//! Feature flag error types.

/// Kinds of feature flag errors.
#[derive(Debug, Clone, PartialEq, Eq, Hash, derive_more::Display)]
pub enum FlagErrorKind {
    /// Another module already owns the flag
    #[display(
        "Flag '{}' is already owned by module '{}'; module '{}' cannot declare it",
        flag,
        owner,
        requester
    )]
    OwnershipConflict {
        /// Flag name
        flag: String,
        /// Module holding ownership
        owner: String,
        /// Module that attempted the declaration
        requester: String,
    },
    /// The requesting module lacks the permission for this operation
    #[display("Access to flag '{}' denied for module '{}': {}", flag, module, reason)]
    AccessDenied {
        /// Flag name
        flag: String,
        /// Module that attempted the access
        module: String,
        /// Why the access was refused
        reason: String,
    },
    /// The config file could not be written
    #[display("Failed to write config to {}: {}", path, message)]
    Persistence {
        /// Target config path
        path: String,
        /// Underlying I/O failure
        message: String,
    },
    /// Flag name failed validation
    #[display("Invalid flag name: {:?}", _0)]
    InvalidName(String),
    /// The value cannot be stored in the config file
    #[display("Invalid value for flag '{}': {}", flag, reason)]
    InvalidValue {
        /// Flag name
        flag: String,
        /// Why the value was refused
        reason: String,
    },
}

/// Feature flag error with location tracking.
///
/// # Examples
///
/// ```
/// use streambot_error::{FlagError, FlagErrorKind};
///
/// let err = FlagError::new(FlagErrorKind::InvalidName(String::new()));
/// assert!(format!("{}", err).contains("Invalid flag name"));
/// assert!(!err.is_permission_error());
/// ```
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Flag Error: {} at line {} in {}", kind, line, file)]
pub struct FlagError {
    /// The kind of error that occurred
    pub kind: FlagErrorKind,
    /// Line number where error was created
    pub line: u32,
    /// File where error was created
    pub file: &'static str,
}

impl FlagError {
    /// Create a new flag error with automatic location tracking.
    #[track_caller]
    pub fn new(kind: FlagErrorKind) -> Self {
        let location = std::panic::Location::caller();
        Self {
            kind,
            line: location.line(),
            file: location.file(),
        }
    }

    /// Get the error kind.
    pub fn kind(&self) -> &FlagErrorKind {
        &self.kind
    }

    /// Ownership conflicts and access denials are both permission errors.
    pub fn is_permission_error(&self) -> bool {
        matches!(
            self.kind,
            FlagErrorKind::OwnershipConflict { .. } | FlagErrorKind::AccessDenied { .. }
        )
    }
}

impl From<FlagErrorKind> for FlagError {
    #[track_caller]
    fn from(kind: FlagErrorKind) -> Self {
        Self::new(kind)
    }
}

/// Result type for feature flag operations.
pub type FlagResult<T> = std::result::Result<T, FlagError>;
