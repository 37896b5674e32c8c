//! Remote resource error types

use thiserror::Error;

/// Errors returned by a [`crate::ResourceClient`]
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("Resource already exists: {0}")]
    ResourceAlreadyExists(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Command execution failed: {0}")]
    CommandFailed(String),

    #[error("Invalid resource spec: {0}")]
    InvalidSpec(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Resource entered a failed state: {0}")]
    ResourceFailed(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CloudError {
    /// The remote side reported that the resource does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, CloudError::ResourceNotFound(_))
    }

    /// The credential context is missing or rejected
    pub fn is_auth(&self) -> bool {
        matches!(self, CloudError::AuthenticationFailed(_))
    }
}

pub type Result<T> = std::result::Result<T, CloudError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(CloudError::ResourceNotFound("gw".into()).is_not_found());
        assert!(!CloudError::ApiError("throttled".into()).is_not_found());
        assert!(CloudError::AuthenticationFailed("expired".into()).is_auth());
        assert!(!CloudError::Timeout("memory".into()).is_auth());
    }
}
