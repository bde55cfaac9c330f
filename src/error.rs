//! Error types for transfer operations.
//!
//! Every transfer failure is reported as one of three kinds so callers can
//! tell "the resource is not there" apart from "you may not touch it" and
//! "something broke on the way".

use thiserror::Error;

/// Boxed underlying cause carried by a [`TransferError`].
pub type BoxedCause = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur while transferring resources.
#[derive(Debug, Error)]
pub enum TransferError {
    /// Catch-all for I/O failures, unexpected status codes and listing failures.
    #[error("{message}")]
    TransferFailed {
        /// Human-readable description, including the URL where applicable.
        message: String,
        /// The underlying error, if any.
        #[source]
        source: Option<BoxedCause>,
    },

    /// The resource is absent server-side, or its URL is malformed.
    #[error("{message}")]
    ResourceDoesNotExist {
        /// Human-readable description, including the URL where applicable.
        message: String,
        /// The underlying error, if any.
        #[source]
        source: Option<BoxedCause>,
    },

    /// The server refused access (HTTP 403).
    #[error("{message}")]
    AuthorizationDenied {
        /// Human-readable description naming the URL.
        message: String,
        /// The underlying error, if any.
        #[source]
        source: Option<BoxedCause>,
    },
}

impl TransferError {
    /// Creates a transfer failure without an underlying cause.
    pub fn transfer_failed(message: impl Into<String>) -> Self {
        Self::TransferFailed {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a transfer failure wrapping an underlying cause.
    pub fn transfer_failed_with(message: impl Into<String>, source: impl Into<BoxedCause>) -> Self {
        Self::TransferFailed {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Creates a missing-resource error without an underlying cause.
    pub fn resource_does_not_exist(message: impl Into<String>) -> Self {
        Self::ResourceDoesNotExist {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a missing-resource error wrapping an underlying cause.
    pub fn resource_does_not_exist_with(
        message: impl Into<String>,
        source: impl Into<BoxedCause>,
    ) -> Self {
        Self::ResourceDoesNotExist {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Creates an authorization error.
    pub fn authorization_denied(message: impl Into<String>) -> Self {
        Self::AuthorizationDenied {
            message: message.into(),
            source: None,
        }
    }

    /// Returns the human-readable message without the cause chain.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::TransferFailed { message, .. }
            | Self::ResourceDoesNotExist { message, .. }
            | Self::AuthorizationDenied { message, .. } => message,
        }
    }

    /// Returns true when the error means "not present" rather than "broken".
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ResourceDoesNotExist { .. })
    }
}

// No `From<reqwest::Error>` or `From<std::io::Error>`: the kind of error a
// failed request maps to depends on the operation, so call sites pick it.

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::error::Error as _;

    use super::*;

    #[test]
    fn test_authorization_denied_display_names_url() {
        let error = TransferError::authorization_denied("Access denied to: http://host/repo/a.jar");
        assert_eq!(error.to_string(), "Access denied to: http://host/repo/a.jar");
        assert!(error.source().is_none());
    }

    #[test]
    fn test_transfer_failed_with_keeps_source() {
        let io_error = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset by peer");
        let error = TransferError::transfer_failed_with("Error transferring file", io_error);
        assert_eq!(error.message(), "Error transferring file");
        let source = error.source().unwrap();
        assert!(source.to_string().contains("reset by peer"));
    }

    #[test]
    fn test_is_not_found_only_for_missing_resources() {
        assert!(TransferError::resource_does_not_exist("gone").is_not_found());
        assert!(!TransferError::transfer_failed("broken").is_not_found());
        assert!(!TransferError::authorization_denied("denied").is_not_found());
    }
}
