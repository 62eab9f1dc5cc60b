//! Buffer client errors

use thiserror::Error;

/// Errors that can occur when reading or writing cluster state
#[derive(Debug, Error)]
pub enum BufferClientError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Discovery could not resolve an (apiGroup, kind) pair
    #[error("Discovery failed: {0}")]
    Discovery(String),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid request (e.g., missing required fields)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl BufferClientError {
    /// Whether the error denotes a missing resource, either as a typed
    /// `NotFound` or as a Kubernetes 404 response.
    pub fn is_not_found(&self) -> bool {
        match self {
            BufferClientError::NotFound(_) => true,
            BufferClientError::Kube(kube::Error::Api(resp)) => resp.code == 404,
            _ => false,
        }
    }
}
