//! Key vault error types using thiserror 2.0.
//!
//! Provides sample-specific errors with retryability and status-code
//! classification, and folds retry executor failures back into one type.

use rust_common::{PlatformError, RetryError, StatusClassified};
use thiserror::Error;

/// Key vault errors.
#[derive(Error, Debug)]
pub enum KeyVaultError {
    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Secret or key name rejected before sending
    #[error("Invalid object name '{0}': use 1-127 letters, digits or dashes")]
    InvalidName(String),

    /// No usable access token
    #[error("Credential error: {0}")]
    Credential(String),

    /// Vault exists but has not finished provisioning
    #[error("Vault {name} is still provisioning (state: {state})")]
    ProvisioningIncomplete {
        /// Vault name
        name: String,
        /// Provisioning state reported by the management plane
        state: String,
    },

    /// Vault provisioning ended in a terminal failure state
    #[error("Vault {name} provisioning failed (state: {state})")]
    ProvisioningFailed {
        /// Vault name
        name: String,
        /// Provisioning state reported by the management plane
        state: String,
    },

    /// Retry policy aborted the call
    #[error("{operation} aborted on status {status}")]
    PolicyViolation {
        /// Operation name
        operation: String,
        /// Status listed in the policy's abort set
        status: u16,
        /// Failure of the aborted attempt
        #[source]
        source: Box<KeyVaultError>,
    },

    /// Every attempt failed with a retriable status
    #[error("{operation} gave up after {attempts} attempts (last status {last_status})")]
    RetriesExhausted {
        /// Operation name
        operation: String,
        /// Invocations made
        attempts: u32,
        /// Status of the final attempt
        last_status: u16,
    },

    /// Call stopped on an accepted status without a response body
    #[error("{operation} stopped on status {status} without a response")]
    NoResponse {
        /// Operation name
        operation: String,
        /// Accepted status
        status: u16,
    },

    /// Call was cancelled
    #[error("{0} was cancelled")]
    Cancelled(String),

    /// Platform error
    #[error(transparent)]
    Platform(#[from] PlatformError),
}

/// Result type for key vault operations.
pub type KeyVaultResult<T> = Result<T, KeyVaultError>;

impl KeyVaultError {
    /// Check if error is retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Http(_) | Self::ProvisioningIncomplete { .. } => true,
            Self::Platform(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Create an invalid configuration error.
    #[must_use]
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a credential error.
    #[must_use]
    pub fn credential(msg: impl Into<String>) -> Self {
        Self::Credential(msg.into())
    }
}

impl StatusClassified for KeyVaultError {
    fn status_code(&self) -> Option<u16> {
        match self {
            Self::Http(e) => e.status_code(),
            Self::Platform(e) => e.status_code(),
            // 202 Accepted: the upsert is still in flight.
            Self::ProvisioningIncomplete { .. } => Some(202),
            _ => None,
        }
    }
}

impl From<RetryError<Self>> for KeyVaultError {
    fn from(err: RetryError<Self>) -> Self {
        match err {
            RetryError::PolicyViolation {
                operation,
                status,
                source,
            } => Self::PolicyViolation {
                operation,
                status,
                source: Box::new(source),
            },
            RetryError::Operation(source) => source,
            RetryError::Cancelled { operation, .. } => Self::Cancelled(operation),
        }
    }
}
