//! Shared SDK plumbing
//!
//! Every service client in this crate maps SDK failures through [`missing`],
//! [`conflicting`] or [`sdk_failure`]. Credential rejections become
//! [`AwsError::AuthenticationFailed`]; the typed not-found and already-exists
//! variants of each operation error decide the rest. Parameters and caller
//! identity live here too.

use crate::error::{AwsError, Result};
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_credential_types::provider::error::CredentialsError;
use aws_sdk_ssm::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_ssm::types::ParameterType;

/// Error codes returned when the caller's credentials are rejected
const AUTH_CODES: &[&str] = &[
    "ExpiredToken",
    "ExpiredTokenException",
    "InvalidClientTokenId",
    "InvalidSignatureException",
    "UnrecognizedClientException",
];

/// Load the shared SDK configuration for a region
pub async fn load_sdk_config(region: &str) -> SdkConfig {
    aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(region.to_string()))
        .load()
        .await
}

/// How a service error relates to the resource it was about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Failure {
    NotFound,
    AlreadyExists,
    Other,
}

/// Classify an SDK error
///
/// Credential rejections come first; `kind` only sees the remaining
/// service errors.
fn classify<E, R>(err: SdkError<E, R>, kind: impl FnOnce(&E) -> Failure) -> AwsError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug + Send + Sync + 'static,
{
    let message = DisplayErrorContext(&err).to_string();
    if is_auth_failure(&err) {
        return AwsError::AuthenticationFailed(message);
    }
    match err.as_service_error().map(kind) {
        Some(Failure::NotFound) => AwsError::NotFound(message),
        Some(Failure::AlreadyExists) => AwsError::AlreadyExists(message),
        _ => AwsError::Sdk(message),
    }
}

/// Classify an SDK error of an operation without resource-level variants
pub(crate) fn sdk_failure<E, R>(err: SdkError<E, R>) -> AwsError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug + Send + Sync + 'static,
{
    classify(err, |_| Failure::Other)
}

/// Classify an SDK error; `is_missing` picks the operation's not-found variant
pub(crate) fn missing<E, R>(err: SdkError<E, R>, is_missing: impl FnOnce(&E) -> bool) -> AwsError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug + Send + Sync + 'static,
{
    classify(err, |e| {
        if is_missing(e) {
            Failure::NotFound
        } else {
            Failure::Other
        }
    })
}

/// Classify an SDK error; `is_conflict` picks the operation's already-exists variant
pub(crate) fn conflicting<E, R>(
    err: SdkError<E, R>,
    is_conflict: impl FnOnce(&E) -> bool,
) -> AwsError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug + Send + Sync + 'static,
{
    classify(err, |e| {
        if is_conflict(e) {
            Failure::AlreadyExists
        } else {
            Failure::Other
        }
    })
}

fn is_auth_failure<E, R>(err: &SdkError<E, R>) -> bool
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug + 'static,
{
    if let Some(code) = err.as_service_error().and_then(|e| e.code()) {
        return AUTH_CODES.contains(&code);
    }

    // Missing or unusable credentials surface before the request is sent
    let mut source: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(current) = source {
        if current.downcast_ref::<CredentialsError>().is_some() {
            return true;
        }
        source = current.source();
    }
    false
}

/// Converts SDK accessors to owned strings
///
/// Required members come back as `&str` (or `&Enum`), optional ones as
/// `Option<&str>`.
pub(crate) trait Field {
    fn owned(self) -> Option<String>;
}

impl<T: AsRef<str> + ?Sized> Field for &T {
    fn owned(self) -> Option<String> {
        Some(self.as_ref().to_string())
    }
}

impl<T: AsRef<str> + ?Sized> Field for Option<&T> {
    fn owned(self) -> Option<String> {
        self.map(|value| value.as_ref().to_string())
    }
}

pub(crate) fn field(value: impl Field) -> Option<String> {
    value.owned()
}

/// Like [`field`], for members the caller cannot do without
pub(crate) fn required_field(value: impl Field, what: &str) -> Result<String> {
    value
        .owned()
        .ok_or_else(|| AwsError::Sdk(format!("response is missing {}", what)))
}

/// Structure members of an SDK output, required (`&T`) or optional (`Option<&T>`)
pub(crate) trait Member<'a, T: ?Sized> {
    fn present(self) -> Option<&'a T>;
}

impl<'a, T: ?Sized> Member<'a, T> for &'a T {
    fn present(self) -> Option<&'a T> {
        Some(self)
    }
}

impl<'a, T: ?Sized> Member<'a, T> for Option<&'a T> {
    fn present(self) -> Option<&'a T> {
        self
    }
}

pub(crate) fn member<'a, T: ?Sized>(value: impl Member<'a, T>, what: &str) -> Result<&'a T> {
    value
        .present()
        .ok_or_else(|| AwsError::Sdk(format!("response is missing {}", what)))
}

/// Caller identity lookup
pub struct IdentityClient {
    client: aws_sdk_sts::Client,
}

impl IdentityClient {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            client: aws_sdk_sts::Client::new(config),
        }
    }

    /// Returns `"<account> (<arn>)"` for the active credentials
    pub async fn caller_identity(&self) -> Result<String> {
        let out = self
            .client
            .get_caller_identity()
            .send()
            .await
            .map_err(|e| match sdk_failure(e) {
                AwsError::Sdk(message) => AwsError::AuthenticationFailed(message),
                other => other,
            })?;

        Ok(format!(
            "{} ({})",
            out.account().unwrap_or("unknown account"),
            out.arn().unwrap_or("unknown principal")
        ))
    }
}

/// SSM parameter store client
pub struct ParameterClient {
    client: aws_sdk_ssm::Client,
}

impl ParameterClient {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            client: aws_sdk_ssm::Client::new(config),
        }
    }

    /// Read a parameter; `None` when it does not exist
    pub async fn get(&self, name: &str) -> Result<Option<String>> {
        match self.client.get_parameter().name(name).send().await {
            Ok(out) => Ok(out
                .parameter()
                .and_then(|p| p.value())
                .map(str::to_string)),
            Err(err) => match missing(err, |e| e.is_parameter_not_found()) {
                AwsError::NotFound(_) => Ok(None),
                other => Err(other),
            },
        }
    }

    /// Write a string parameter, overwriting any previous value
    pub async fn put(&self, name: &str, value: &str) -> Result<()> {
        self.client
            .put_parameter()
            .name(name)
            .value(value)
            .r#type(ParameterType::String)
            .overwrite(true)
            .send()
            .await
            .map_err(sdk_failure)?;
        Ok(())
    }

    /// Delete a parameter; `false` when it was already gone
    pub async fn delete(&self, name: &str) -> Result<bool> {
        match self.client.delete_parameter().name(name).send().await {
            Ok(_) => Ok(true),
            Err(err) => match missing(err, |e| e.is_parameter_not_found()) {
                AwsError::NotFound(_) => Ok(false),
                other => Err(other),
            },
        }
    }

    /// All parameters whose name starts with `prefix`, as `(name, value)`
    pub async fn list(&self, prefix: &str) -> Result<Vec<(String, String)>> {
        let path = match prefix.trim_end_matches('/') {
            "" => "/",
            trimmed => trimmed,
        };

        let mut found = Vec::new();
        let mut next_token: Option<String> = None;
        loop {
            let out = self
                .client
                .get_parameters_by_path()
                .path(path)
                .recursive(true)
                .set_next_token(next_token)
                .send()
                .await
                .map_err(sdk_failure)?;

            for parameter in out.parameters() {
                if let (Some(name), Some(value)) = (parameter.name(), parameter.value())
                    && name.starts_with(prefix)
                {
                    found.push((name.to_string(), value.to_string()));
                }
            }

            next_token = out.next_token().map(str::to_string);
            if next_token.is_none() {
                break;
            }
        }

        tracing::debug!("Found {} parameters under {}", found.len(), prefix);
        Ok(found)
    }
}
