//! Error types for pulsekeeper.

use thiserror::Error;

/// A shared error type for the whole pulsekeeper workspace.
///
/// Variants are grouped by who is expected to handle them: credential and
/// identity failures are fatal to one account, token and pulse failures are
/// retried or degraded inside a monitor, and registry failures are surfaced
/// to the caller of the registry operation.
#[derive(Error, Debug, Clone)]
pub enum PulseError {
    /// The stored session credential has the wrong shape
    #[error("Invalid credential: {0}")]
    InvalidCredential(String),

    /// No anti-forgery token could be obtained from the remote service
    #[error("CSRF token acquisition failed: {0}")]
    CsrfAcquisitionFailed(String),

    /// The home page request failed, so no session tracker cookie is available
    #[error("Session id unavailable: {0}")]
    SessionIdUnavailable(String),

    /// The authenticated identity lookup failed
    #[error("Identity unavailable: {0}")]
    IdentityUnavailable(String),

    /// Every pulse attempt failed
    #[error("Failed pulse after {attempts} attempts: {cause}")]
    PulseExhausted { attempts: u32, cause: String },

    /// An account with the same identifier is already registered
    #[error("Account {0} already exists.")]
    DuplicateAccount(String),

    /// Entity not found error with type information
    #[error("Entity not found: {entity_type} '{id}'")]
    NotFound {
        entity_type: &'static str,
        id: String,
    },

    /// The configuration document could not be loaded
    #[error("Configuration load failed: {0}")]
    ConfigLoad(String),

    /// Network-level failure with no usable response
    #[error("Transport error: {0}")]
    Transport(String),

    /// IO error (file system operations)
    #[error("IO error: {message}")]
    Io { message: String },

    /// Serialization/deserialization error
    #[error("Serialization error: {format} - {message}")]
    Serialization { format: String, message: String },

    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PulseError {
    // ============================================================================
    // Constructor helpers
    // ============================================================================

    /// Creates an InvalidCredential error
    pub fn invalid_credential(message: impl Into<String>) -> Self {
        Self::InvalidCredential(message.into())
    }

    /// Creates a NotFound error
    pub fn not_found(entity_type: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type,
            id: id.into(),
        }
    }

    /// Creates a Transport error
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// Creates an IO error
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    /// Creates an Internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    // ============================================================================
    // Type checking methods
    // ============================================================================

    /// Check if this is an InvalidCredential error
    pub fn is_invalid_credential(&self) -> bool {
        matches!(self, Self::InvalidCredential(_))
    }

    /// Check if this is a NotFound error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if this is a DuplicateAccount error
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::DuplicateAccount(_))
    }

    /// Check if this is a PulseExhausted error
    pub fn is_pulse_exhausted(&self) -> bool {
        matches!(self, Self::PulseExhausted { .. })
    }

    /// Check if this is a serialization error
    pub fn is_serialization(&self) -> bool {
        matches!(self, Self::Serialization { .. })
    }
}

// ============================================================================
// From implementations for automatic conversion
// ============================================================================

impl From<std::io::Error> for PulseError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: format!("{} (kind: {:?})", err, err.kind()),
        }
    }
}

impl From<serde_json::Error> for PulseError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            format: "JSON".to_string(),
            message: err.to_string(),
        }
    }
}

/// A type alias for `Result<T, PulseError>`.
pub type Result<T> = std::result::Result<T, PulseError>;
