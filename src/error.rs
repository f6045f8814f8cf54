// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Error types shared by the session manager and its collaborators.
//!
//! Every public session operation returns [`SessionError`] instead of
//! panicking, so a presentation layer can render the failure inline.
//! Adapter-level failures ([`ProviderError`], [`StoreError`]) are translated
//! at the operation boundary.

/// Error kinds surfaced by session operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// Malformed input detected before any network call.
    #[error("Invalid input: {0}")]
    Validation(String),

    /// The identity provider rejected the credential or flow.
    #[error("{message}")]
    Auth { code: String, message: String },

    /// An owner-only operation was invoked with nobody signed in.
    #[error("No user is signed in")]
    NotAuthenticated,

    /// Profile document does not exist.
    #[error("Profile not found: {0}")]
    NotFound(String),

    /// Document store read/write failure. Not retried automatically.
    #[error("Storage error: {0}")]
    Storage(String),
}

impl SessionError {
    /// Provider code used when a phone verification handle was superseded.
    pub const STALE_VERIFICATION: &'static str = "stale-verification";
    /// Provider code used when the session manager stopped mid-operation.
    pub const SESSION_CLOSED: &'static str = "session-closed";

    /// Build an `Auth` error with an explicit code.
    pub fn auth(code: impl Into<String>, message: impl Into<String>) -> Self {
        SessionError::Auth {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Provider error code, if this is an `Auth` error.
    pub fn auth_code(&self) -> Option<&str> {
        match self {
            SessionError::Auth { code, .. } => Some(code),
            _ => None,
        }
    }

    /// True for failures the user can fix by correcting input.
    pub fn is_validation(&self) -> bool {
        matches!(self, SessionError::Validation(_))
    }
}

/// Error returned by an identity provider adapter.
///
/// `code` is the provider's machine-readable code (e.g. `EMAIL_EXISTS`),
/// `message` is meant for humans.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} ({code})")]
pub struct ProviderError {
    pub code: String,
    pub message: String,
}

impl ProviderError {
    pub const NETWORK: &'static str = "network-request-failed";
    pub const POPUP_CLOSED: &'static str = "popup-closed-by-user";
    pub const POPUP_BLOCKED: &'static str = "popup-blocked";
    pub const NOT_SIGNED_IN: &'static str = "no-current-user";
    pub const OPERATION_NOT_ALLOWED: &'static str = "operation-not-allowed";

    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Transport failure talking to the provider.
    pub fn network(err: impl std::fmt::Display) -> Self {
        Self::new(Self::NETWORK, format!("Network request failed: {}", err))
    }
}

impl From<ProviderError> for SessionError {
    fn from(err: ProviderError) -> Self {
        SessionError::Auth {
            code: err.code,
            message: err.message,
        }
    }
}

/// Error returned by a document store adapter.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("Document store unavailable: {0}")]
    Unavailable(String),

    #[error("Malformed document {collection}/{id}: {reason}")]
    Malformed {
        collection: String,
        id: String,
        reason: String,
    },

    #[error("Document store error: {0}")]
    Backend(String),
}

impl From<StoreError> for SessionError {
    fn from(err: StoreError) -> Self {
        tracing::error!(error = %err, "Document store error");
        SessionError::Storage(err.to_string())
    }
}

/// Result type alias for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;
