//! Pipeline error types

use crate::stage::StageId;
use corelab_cloud::CloudError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Error raised by a cross-stage state store
#[derive(Debug, Error)]
pub enum StateError {
    #[error("Failed to access state file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("State file {path} is not valid JSON: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("State file {0} must contain a JSON object")]
    NotAnObject(PathBuf),

    #[error("Remote parameter store error: {0}")]
    Remote(#[from] CloudError),
}

/// Error raised inside a stage; converted to a failed `StageResult` at the stage boundary
#[derive(Debug, Error)]
pub enum StageError {
    #[error("Missing dependency `{key}` (produced by stage `{producer}`)")]
    MissingDependency { key: String, producer: StageId },

    #[error("{operation} failed: {source}")]
    RemoteOperation {
        operation: String,
        #[source]
        source: CloudError,
    },

    #[error("Authentication unavailable: {0}")]
    Authentication(String),

    #[error("State persistence failed: {0}")]
    State(#[from] StateError),

    #[error("Container registry {repository} has no `{tag}` image")]
    ImageNotPushed { repository: String, tag: String },

    #[error("Failed to write {path}: {source}")]
    LocalArtifact {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StageError {
    /// Wrap a remote failure, keeping authentication errors in their own class
    pub fn remote(operation: impl Into<String>, source: CloudError) -> Self {
        match source {
            CloudError::AuthenticationFailed(msg) => StageError::Authentication(msg),
            source => StageError::RemoteOperation {
                operation: operation.into(),
                source,
            },
        }
    }

    pub fn local(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StageError::LocalArtifact {
            path: path.into(),
            source,
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            StageError::MissingDependency { .. } => ErrorClass::MissingDependency,
            StageError::RemoteOperation { .. } | StageError::ImageNotPushed { .. } => {
                ErrorClass::RemoteOperationFailed
            }
            StageError::Authentication(_) => ErrorClass::AuthenticationUnavailable,
            StageError::State(StateError::Remote(CloudError::AuthenticationFailed(_))) => {
                ErrorClass::AuthenticationUnavailable
            }
            StageError::State(_) => ErrorClass::StatePersistenceFailed,
            StageError::LocalArtifact { .. } => ErrorClass::LocalArtifactFailed,
        }
    }

    pub fn to_record(&self) -> ErrorRecord {
        let hint = match self {
            StageError::MissingDependency { producer, .. } => {
                format!("先に `corelab stage {}` を実行してください", producer)
            }
            StageError::ImageNotPushed { repository, tag } => format!(
                "イメージを {}:{} に push するか container_uri を設定して、`corelab stage runtime` を再実行してください",
                repository, tag
            ),
            _ => self.class().hint().to_string(),
        };
        ErrorRecord {
            class: self.class(),
            message: self.to_string(),
            hint,
        }
    }
}

/// Classification of a failure; drives the continue/abort decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    MissingDependency,
    RemoteOperationFailed,
    AuthenticationUnavailable,
    CleanupPartialFailure,
    StatePersistenceFailed,
    LocalArtifactFailed,
}

impl ErrorClass {
    /// ユーザー向けの対処方法
    pub fn hint(&self) -> &'static str {
        match self {
            ErrorClass::MissingDependency => "前のステージを先に実行してください",
            ErrorClass::RemoteOperationFailed => {
                "AWS コンソールでリソースの状態を確認し、再実行してください"
            }
            ErrorClass::AuthenticationUnavailable => {
                "AWS 認証情報を設定してください (aws configure / AWS_PROFILE)"
            }
            ErrorClass::CleanupPartialFailure => {
                "残ったリソースを確認し、`corelab cleanup` を再実行してください"
            }
            ErrorClass::StatePersistenceFailed => {
                "状態ファイルの権限と内容 (JSON オブジェクト) を確認してください"
            }
            ErrorClass::LocalArtifactFailed => "作業ディレクトリの書き込み権限を確認してください",
        }
    }
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorClass::MissingDependency => "MissingDependency",
            ErrorClass::RemoteOperationFailed => "RemoteOperationFailed",
            ErrorClass::AuthenticationUnavailable => "AuthenticationUnavailable",
            ErrorClass::CleanupPartialFailure => "CleanupPartialFailure",
            ErrorClass::StatePersistenceFailed => "StatePersistenceFailed",
            ErrorClass::LocalArtifactFailed => "LocalArtifactFailed",
        };
        write!(f, "{}", name)
    }
}

/// Serializable failure summary carried by a `StageResult`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub class: ErrorClass,
    pub message: String,
    pub hint: String,
}

pub type Result<T> = std::result::Result<T, StageError>;
