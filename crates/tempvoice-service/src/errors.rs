//! Temp Voice error types.
//!
//! Errors fall into two groups. Expected races (a member left mid-operation,
//! an update matched no row, a dialog timed out, a non-owner pressed a
//! button) are logged at debug level and unwound quietly. Everything else is
//! surfaced to the orchestrator's per-notification handler, which logs and
//! drops the in-flight operation.
//!
//! Actor-facing text comes from [`TempVoiceError::client_message`] and never
//! includes internal details.

use crate::provider::ProviderError;
use thiserror::Error;

/// Temp Voice error type.
#[derive(Debug, Error)]
pub enum TempVoiceError {
    /// The provider rejected resource creation. Nothing was persisted.
    #[error("Resource creation failed: {0}")]
    ResourceCreationFailed(String),

    /// A member or resource vanished mid-operation.
    #[error("Resource gone: {0}")]
    ResourceGone(String),

    /// An update matched zero rows.
    #[error("Persistence conflict: {0}")]
    PersistenceConflict(String),

    /// An interaction came from someone other than the room owner.
    #[error("Unauthorized interaction")]
    Unauthorized,

    /// A dialog deadline elapsed before the owner answered.
    #[error("Dialog expired")]
    DialogExpired,

    /// Owner input failed validation (name too long, non-numeric count).
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(String),

    /// Provider or transport failure other than a vanished target.
    #[error("Provider error: {0}")]
    Provider(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error with context.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl TempVoiceError {
    /// Whether this error is an expected race rather than a fault.
    ///
    /// Expected races are logged at debug level and never escalated.
    #[must_use]
    pub fn is_expected_race(&self) -> bool {
        matches!(
            self,
            TempVoiceError::ResourceGone(_)
                | TempVoiceError::PersistenceConflict(_)
                | TempVoiceError::Unauthorized
                | TempVoiceError::DialogExpired
        )
    }

    /// Returns an actor-safe message (no internal details).
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            TempVoiceError::ResourceCreationFailed(_) => {
                "Your room could not be created, please try again".to_string()
            }
            TempVoiceError::ResourceGone(_) => "That room no longer exists".to_string(),
            TempVoiceError::PersistenceConflict(_) => "Nothing to update".to_string(),
            TempVoiceError::Unauthorized => "Only the room owner can use these controls".to_string(),
            TempVoiceError::DialogExpired => {
                "This menu has expired, open it again from the control panel".to_string()
            }
            TempVoiceError::InvalidInput(msg) => msg.clone(),
            TempVoiceError::Database(_)
            | TempVoiceError::Provider(_)
            | TempVoiceError::Config(_)
            | TempVoiceError::Internal(_) => "An internal error occurred".to_string(),
        }
    }
}

impl From<ProviderError> for TempVoiceError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Gone(what) => TempVoiceError::ResourceGone(what),
            ProviderError::Rejected(msg) | ProviderError::Transport(msg) => {
                TempVoiceError::Provider(msg)
            }
        }
    }
}

impl From<sqlx::Error> for TempVoiceError {
    fn from(err: sqlx::Error) -> Self {
        TempVoiceError::Database(err.to_string())
    }
}

impl From<common::error::CommonError> for TempVoiceError {
    fn from(err: common::error::CommonError) -> Self {
        TempVoiceError::Database(err.to_string())
    }
}
