//! Controller-specific error types.
//!
//! This module defines error types specific to the capacity buffer
//! controller that are not covered by upstream library errors.

use buffer_client::BufferClientError;
use thiserror::Error;

/// Errors that can occur in the capacity buffer controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Buffer client error
    #[error("Buffer client error: {0}")]
    Client(#[from] BufferClientError),

    /// A buffer spec could not be translated into a provisionable status
    #[error("Translation failed for buffer {buffer}: {reason}")]
    Translation {
        /// Namespaced buffer name
        buffer: String,
        /// Why translation failed
        reason: String,
    },

    /// A quota scope selector could not be evaluated
    #[error("Quota scope evaluation failed for quota {quota}: {reason}")]
    QuotaScope {
        /// Quota name
        quota: String,
        /// Why evaluation failed
        reason: String,
    },

    /// A resource quantity string could not be parsed
    #[error("Invalid quantity {value:?}: {reason}")]
    InvalidQuantity {
        /// The offending quantity string
        value: String,
        /// Why parsing failed
        reason: String,
    },

    /// Writing a buffer's status subresource failed
    #[error("Status update failed for buffer {buffer}: {reason}")]
    StatusUpdate {
        /// Namespaced buffer name
        buffer: String,
        /// Why the update failed
        reason: String,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ControllerError {
    /// Build a translation error for a buffer.
    pub fn translation(namespace: &str, name: &str, reason: impl Into<String>) -> Self {
        ControllerError::Translation {
            buffer: format!("{namespace}/{name}"),
            reason: reason.into(),
        }
    }
}
