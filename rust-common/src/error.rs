//! Centralized error types for the Rust libraries.
//!
//! This module provides a unified error type with built-in retryability
//! classification, plus the [`StatusClassified`] seam the retry executor uses
//! to read an HTTP status code out of any error type.

use thiserror::Error;

/// Exposes the HTTP status code carried by a failure, if any.
///
/// Only failures that return `Some` take part in status-code classification.
/// A `None` marks a failure the retry executor treats as fatal.
pub trait StatusClassified {
    /// Status code of the failed response, or `None` when no response was received.
    fn status_code(&self) -> Option<u16>;
}

impl StatusClassified for reqwest::Error {
    fn status_code(&self) -> Option<u16> {
        self.status().map(|s| s.as_u16())
    }
}

/// Common error type for platform operations.
///
/// All errors are classified as either retryable or non-retryable,
/// which helps callers decide whether to retry failed operations.
#[derive(Error, Debug)]
pub enum PlatformError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Response carried a non-success status
    #[error("HTTP status {code}: {message}")]
    Status {
        /// Status code returned by the server
        code: u16,
        /// Response body or reason phrase
        message: String,
    },

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Service is temporarily unavailable
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Rate limit exceeded
    #[error("Rate limited")]
    RateLimited,

    /// Invalid input provided
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Timeout occurred
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PlatformError {
    /// Check if this error is retryable.
    ///
    /// Retryable errors are transient failures that may succeed on retry,
    /// such as network issues, rate limiting, or temporary unavailability.
    ///
    /// # Examples
    ///
    /// ```
    /// use rust_common::PlatformError;
    ///
    /// let err = PlatformError::RateLimited;
    /// assert!(err.is_retryable());
    ///
    /// let err = PlatformError::NotFound("vault".to_string());
    /// assert!(!err.is_retryable());
    /// ```
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Unavailable(_) | Self::RateLimited | Self::Timeout(_) => true,
            Self::Status { code, .. } => matches!(*code, 408 | 429 | 500..=599),
            _ => false,
        }
    }

    /// Create a status error for the given code and message.
    #[must_use]
    pub fn status(code: u16, message: impl Into<String>) -> Self {
        Self::Status {
            code,
            message: message.into(),
        }
    }

    /// Create an unavailable error with the given message.
    #[must_use]
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    /// Create an invalid input error with the given message.
    #[must_use]
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }
}

impl StatusClassified for PlatformError {
    fn status_code(&self) -> Option<u16> {
        match self {
            Self::Http(e) => e.status_code(),
            Self::Status { code, .. } => Some(*code),
            Self::NotFound(_) => Some(404),
            Self::RateLimited => Some(429),
            _ => None,
        }
    }
}
