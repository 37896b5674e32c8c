//! AWS resource client error types

use aws_sdk_bedrockagentcorecontrol::error::BuildError;
use corelab_cloud::CloudError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AwsError {
    #[error("AWS authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("AWS resource not found: {0}")]
    NotFound(String),

    #[error("AWS resource already exists: {0}")]
    AlreadyExists(String),

    #[error("AWS SDK error: {0}")]
    Sdk(String),

    #[error("Invalid request: {0}")]
    Build(#[from] BuildError),

    #[error("Invalid resource spec: {0}")]
    InvalidSpec(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),
}

impl From<AwsError> for CloudError {
    fn from(err: AwsError) -> Self {
        match err {
            AwsError::AuthenticationFailed(msg) => CloudError::AuthenticationFailed(msg),
            AwsError::NotFound(msg) => CloudError::ResourceNotFound(msg),
            AwsError::AlreadyExists(msg) => CloudError::ResourceAlreadyExists(msg),
            AwsError::InvalidSpec(msg) => CloudError::InvalidSpec(msg),
            AwsError::Unsupported(msg) => CloudError::Unsupported(msg),
            AwsError::Build(e) => CloudError::InvalidSpec(e.to_string()),
            other => CloudError::ApiError(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, AwsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_cloud_error_keeps_class() {
        let not_found: CloudError = AwsError::NotFound("gateway gw-1".into()).into();
        assert!(not_found.is_not_found());

        let auth: CloudError = AwsError::AuthenticationFailed("expired".into()).into();
        assert!(auth.is_auth());

        let sdk: CloudError = AwsError::Sdk("throttled".into()).into();
        assert!(matches!(sdk, CloudError::ApiError(_)));
    }
}
