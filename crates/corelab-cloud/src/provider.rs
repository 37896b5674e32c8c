//! Resource client trait definition

use crate::error::Result;
use crate::resource::{Deletion, ResourceCategory, ResourceHandle, ResourceSpec};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Remote resource-management facade
///
/// One operation per (category, verb) pair. `create` is not idempotent on the
/// remote side; callers check with `describe` / `find_by_name` first.
#[async_trait]
pub trait ResourceClient: Send + Sync {
    /// Returns the client name (e.g., "aws", "simulated")
    fn name(&self) -> &str;

    /// Region every handle produced by this client lives in
    fn region(&self) -> &str;

    /// Check that a usable credential context is configured
    async fn check_auth(&self) -> Result<AuthStatus>;

    /// Look up a resource by key; `ResourceNotFound` when it does not exist
    async fn describe(&self, category: ResourceCategory, key: &str) -> Result<ResourceHandle>;

    /// List resources of a category
    ///
    /// `scope` is the parent id for nested categories and a name prefix otherwise.
    async fn list(&self, category: ResourceCategory, scope: &str) -> Result<Vec<ResourceHandle>>;

    /// Create a resource
    async fn create(&self, spec: &ResourceSpec) -> Result<ResourceHandle>;

    /// Delete a resource; `Deletion::Absent` when it was already gone
    async fn delete(&self, category: ResourceCategory, key: &str) -> Result<Deletion>;

    /// Find a resource by its conventional name
    async fn find_by_name(
        &self,
        category: ResourceCategory,
        name: &str,
        parent: Option<&str>,
    ) -> Result<Option<ResourceHandle>> {
        let scope = parent.unwrap_or(name);
        let found = self.list(category, scope).await?;
        Ok(found.into_iter().find(|h| h.name() == Some(name)))
    }
}

/// Authentication status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthStatus {
    /// Whether authentication is valid
    pub authenticated: bool,

    /// Account/user information if available
    pub account_info: Option<String>,

    /// Error message if not authenticated
    pub error: Option<String>,
}

impl AuthStatus {
    pub fn ok(account_info: impl Into<String>) -> Self {
        Self {
            authenticated: true,
            account_info: Some(account_info.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            authenticated: false,
            account_info: None,
            error: Some(error.into()),
        }
    }
}

/// Readiness polling configuration
///
/// Polling uses a fixed interval and a bounded number of attempts.
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Maximum number of status checks
    pub max_attempts: u32,

    /// Delay between two status checks
    pub interval: Duration,
}

impl PollConfig {
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
        }
    }

    /// Total time spent sleeping before giving up
    pub fn budget(&self) -> Duration {
        self.interval * self.max_attempts.saturating_sub(1)
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            max_attempts: 30,
            interval: Duration::from_secs(10),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poll_budget() {
        let config = PollConfig::new(6, Duration::from_secs(10));
        assert_eq!(config.budget(), Duration::from_secs(50));
        assert_eq!(PollConfig::new(0, Duration::from_secs(10)).budget(), Duration::ZERO);
    }

    #[test]
    fn test_auth_status_constructors() {
        let ok = AuthStatus::ok("123456789012");
        assert!(ok.authenticated);
        assert_eq!(ok.account_info.as_deref(), Some("123456789012"));

        let failed = AuthStatus::failed("no credentials");
        assert!(!failed.authenticated);
        assert_eq!(failed.error.as_deref(), Some("no credentials"));
    }
}
