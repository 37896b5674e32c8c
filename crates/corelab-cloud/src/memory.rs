//! In-memory resource client
//!
//! Backs `--simulate` runs and the pipeline tests. Resources live in a map
//! guarded by a mutex; every call is recorded so tests can assert on the
//! exact sequence of remote operations.

use crate::error::{CloudError, Result};
use crate::provider::{AuthStatus, ResourceClient};
use crate::resource::{
    Deletion, ResourceCategory, ResourceHandle, ResourceSpec, nested_key, split_nested_key,
};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

const ACCOUNT_ID: &str = "000000000000";

/// Operation recorded by [`InMemoryClient`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Describe,
    List,
    Create,
    Delete,
}

/// One recorded call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub operation: Operation,
    pub category: ResourceCategory,
    pub key: String,
}

#[derive(Default)]
struct Inner {
    resources: BTreeMap<(ResourceCategory, String), ResourceHandle>,
    sequence: u64,
    calls: Vec<Call>,
    faults: HashSet<(Operation, ResourceCategory)>,
    auth_denied: bool,
}

/// Resource client that keeps everything in process memory
pub struct InMemoryClient {
    region: String,
    inner: Mutex<Inner>,
}

impl InMemoryClient {
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            inner: Mutex::new(Inner::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make every `operation` on `category` fail with an API error
    pub fn fail(&self, operation: Operation, category: ResourceCategory) {
        self.lock().faults.insert((operation, category));
    }

    /// Remove a previously injected failure
    pub fn heal(&self, operation: Operation, category: ResourceCategory) {
        self.lock().faults.remove(&(operation, category));
    }

    /// Reject the credential context for every subsequent call
    pub fn deny_auth(&self) {
        self.lock().auth_denied = true;
    }

    /// Seed an existing resource
    pub fn insert(&self, handle: ResourceHandle) {
        let key = handle.key();
        self.lock().resources.insert((handle.category, key), handle);
    }

    /// Overwrite one attribute of a stored resource
    pub fn set_attribute(&self, category: ResourceCategory, key: &str, name: &str, value: &str) {
        if let Some(handle) = self.lock().resources.get_mut(&(category, key.to_string())) {
            handle.attributes.insert(name.to_string(), value.to_string());
        }
    }

    pub fn set_status(&self, category: ResourceCategory, key: &str, status: &str) {
        self.set_attribute(category, key, "status", status);
    }

    pub fn contains(&self, category: ResourceCategory, key: &str) -> bool {
        self.lock()
            .resources
            .contains_key(&(category, key.to_string()))
    }

    /// Number of stored resources in a category
    pub fn len_of(&self, category: ResourceCategory) -> usize {
        self.lock()
            .resources
            .keys()
            .filter(|(c, _)| *c == category)
            .count()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    /// Number of recorded `operation` calls on `category`
    pub fn count(&self, operation: Operation, category: ResourceCategory) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.operation == operation && c.category == category)
            .count()
    }

    fn begin(
        &self,
        operation: Operation,
        category: ResourceCategory,
        key: &str,
    ) -> Result<MutexGuard<'_, Inner>> {
        let mut inner = self.lock();
        inner.calls.push(Call {
            operation,
            category,
            key: key.to_string(),
        });

        if inner.auth_denied {
            return Err(CloudError::AuthenticationFailed(
                "simulated credentials rejected".to_string(),
            ));
        }
        if category == ResourceCategory::LocalArtifact {
            return Err(CloudError::Unsupported(
                "local artifacts are not remote resources".to_string(),
            ));
        }
        if inner.faults.contains(&(operation, category)) {
            return Err(CloudError::ApiError(format!(
                "injected {:?} failure for {} {}",
                operation, category, key
            )));
        }
        Ok(inner)
    }

    fn build_handle(&self, spec: &ResourceSpec, sequence: u64) -> Result<ResourceHandle> {
        let region = self.region.as_str();
        let name = spec.name.as_str();
        let base = |id: String| {
            ResourceHandle::new(spec.category, id, region).with_attribute("name", name)
        };

        let handle = match spec.category {
            ResourceCategory::Memory => {
                let id = format!("{}-{:010}", name, sequence);
                let arn = format!(
                    "arn:aws:bedrock-agentcore:{}:{}:memory/{}",
                    region, ACCOUNT_ID, id
                );
                base(id).with_attribute("arn", arn).with_attribute("status", "ACTIVE")
            }
            ResourceCategory::Gateway => {
                let id = format!("{}-{:010}", name, sequence);
                let url = format!(
                    "https://{}.gateway.bedrock-agentcore.{}.amazonaws.com/mcp",
                    id, region
                );
                base(id).with_attribute("url", url).with_attribute("status", "READY")
            }
            ResourceCategory::Runtime => {
                let id = format!("{}-{:010}", name, sequence);
                let arn = format!(
                    "arn:aws:bedrock-agentcore:{}:{}:runtime/{}",
                    region, ACCOUNT_ID, id
                );
                base(id).with_attribute("arn", arn).with_attribute("status", "READY")
            }
            ResourceCategory::GatewayTarget | ResourceCategory::PoolClient => {
                let parent = spec.parent.as_deref().ok_or_else(|| {
                    CloudError::InvalidSpec(format!("{} requires a parent", spec.category))
                })?;
                let prefix = if spec.category == ResourceCategory::GatewayTarget {
                    "T"
                } else {
                    "client"
                };
                base(format!("{}{:08}", prefix, sequence))
                    .with_attribute("parent", parent)
                    .with_attribute("status", "READY")
            }
            ResourceCategory::Registry => {
                let uri = format!("{}.dkr.ecr.{}.amazonaws.com/{}", ACCOUNT_ID, region, name);
                // Simulated repositories already hold the workshop image
                base(name.to_string())
                    .with_attribute("uri", uri)
                    .with_attribute("image_tags", "latest")
            }
            ResourceCategory::IdentityPool => {
                let id = format!("{}_{:09}", region, sequence);
                base(id).with_attribute("status", "ACTIVE")
            }
            ResourceCategory::Role => {
                let arn = format!("arn:aws:iam::{}:role/{}", ACCOUNT_ID, name);
                base(name.to_string()).with_attribute("arn", arn)
            }
            ResourceCategory::Parameter => {
                let value = spec.config_str("value").ok_or_else(|| {
                    CloudError::InvalidSpec(format!("parameter {} has no value", name))
                })?;
                base(name.to_string()).with_attribute("value", value)
            }
            ResourceCategory::Secret => {
                let arn = format!(
                    "arn:aws:secretsmanager:{}:{}:secret:{}",
                    region, ACCOUNT_ID, name
                );
                base(name.to_string()).with_attribute("arn", arn)
            }
            ResourceCategory::LogGroup => base(name.to_string()),
            ResourceCategory::LocalArtifact => {
                return Err(CloudError::Unsupported(name.to_string()));
            }
        };
        Ok(handle)
    }
}

#[async_trait]
impl ResourceClient for InMemoryClient {
    fn name(&self) -> &str {
        "simulated"
    }

    fn region(&self) -> &str {
        &self.region
    }

    async fn check_auth(&self) -> Result<AuthStatus> {
        if self.lock().auth_denied {
            return Ok(AuthStatus::failed("simulated credentials rejected"));
        }
        Ok(AuthStatus::ok(format!("simulated account {}", ACCOUNT_ID)))
    }

    async fn describe(&self, category: ResourceCategory, key: &str) -> Result<ResourceHandle> {
        let inner = self.begin(Operation::Describe, category, key)?;
        inner
            .resources
            .get(&(category, key.to_string()))
            .cloned()
            .ok_or_else(|| CloudError::ResourceNotFound(format!("{} {}", category, key)))
    }

    async fn list(&self, category: ResourceCategory, scope: &str) -> Result<Vec<ResourceHandle>> {
        let inner = self.begin(Operation::List, category, scope)?;
        let found = inner
            .resources
            .iter()
            .filter(|((c, _), _)| *c == category)
            .map(|(_, handle)| handle)
            .filter(|handle| {
                if category.is_nested() {
                    handle.attribute("parent") == Some(scope)
                } else {
                    handle.name().unwrap_or(&handle.id).starts_with(scope)
                }
            })
            .cloned()
            .collect();
        Ok(found)
    }

    async fn create(&self, spec: &ResourceSpec) -> Result<ResourceHandle> {
        let mut inner = self.begin(Operation::Create, spec.category, &spec.name)?;

        let name_addressed = matches!(
            spec.category,
            ResourceCategory::Registry
                | ResourceCategory::Role
                | ResourceCategory::Secret
                | ResourceCategory::LogGroup
        );
        if name_addressed
            && inner
                .resources
                .contains_key(&(spec.category, spec.name.clone()))
        {
            return Err(CloudError::ResourceAlreadyExists(format!(
                "{} {}",
                spec.category, spec.name
            )));
        }

        if let Some(parent) = &spec.parent {
            let parent_category = match spec.category {
                ResourceCategory::GatewayTarget => Some(ResourceCategory::Gateway),
                ResourceCategory::PoolClient => Some(ResourceCategory::IdentityPool),
                _ => None,
            };
            if let Some(parent_category) = parent_category
                && !inner
                    .resources
                    .contains_key(&(parent_category, parent.clone()))
            {
                return Err(CloudError::ResourceNotFound(format!(
                    "{} {}",
                    parent_category, parent
                )));
            }
        }

        inner.sequence += 1;
        let handle = self.build_handle(spec, inner.sequence)?;
        inner
            .resources
            .insert((spec.category, handle.key()), handle.clone());
        tracing::debug!("Simulated create {} {}", spec.category, handle.key());
        Ok(handle)
    }

    async fn delete(&self, category: ResourceCategory, key: &str) -> Result<Deletion> {
        let mut inner = self.begin(Operation::Delete, category, key)?;

        if category == ResourceCategory::Gateway {
            let has_targets = inner.resources.keys().any(|(c, k)| {
                *c == ResourceCategory::GatewayTarget
                    && split_nested_key(k).map(|(parent, _)| parent) == Some(key)
            });
            if has_targets {
                return Err(CloudError::ApiError(format!(
                    "gateway {} still has targets attached",
                    key
                )));
            }
        }

        let removed = inner.resources.remove(&(category, key.to_string()));
        if category == ResourceCategory::IdentityPool && removed.is_some() {
            let prefix = nested_key(key, "");
            inner.resources.retain(|(c, k), _| {
                !(*c == ResourceCategory::PoolClient && k.starts_with(&prefix))
            });
        }

        Ok(if removed.is_some() {
            Deletion::Deleted
        } else {
            Deletion::Absent
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_describe_delete() {
        let client = InMemoryClient::new("eu-west-1");
        let memory = client
            .create(&ResourceSpec::new(ResourceCategory::Memory, "CustomerSupportMemory"))
            .await
            .unwrap();
        assert!(memory.id.starts_with("CustomerSupportMemory-"));
        assert_eq!(memory.region, "eu-west-1");

        let described = client
            .describe(ResourceCategory::Memory, &memory.id)
            .await
            .unwrap();
        assert_eq!(described, memory);

        assert_eq!(
            client.delete(ResourceCategory::Memory, &memory.id).await.unwrap(),
            Deletion::Deleted
        );
        assert_eq!(
            client.delete(ResourceCategory::Memory, &memory.id).await.unwrap(),
            Deletion::Absent
        );
        assert!(
            client
                .describe(ResourceCategory::Memory, &memory.id)
                .await
                .unwrap_err()
                .is_not_found()
        );
    }

    #[tokio::test]
    async fn test_nested_targets_block_gateway_delete() {
        let client = InMemoryClient::new("us-east-1");
        let gw = client
            .create(&ResourceSpec::new(ResourceCategory::Gateway, "gw"))
            .await
            .unwrap();
        let target = client
            .create(
                &ResourceSpec::new(ResourceCategory::GatewayTarget, "LambdaToolsTarget")
                    .with_parent(&gw.id),
            )
            .await
            .unwrap();

        let listed = client
            .list(ResourceCategory::GatewayTarget, &gw.id)
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);

        assert!(client.delete(ResourceCategory::Gateway, &gw.id).await.is_err());
        client
            .delete(ResourceCategory::GatewayTarget, &target.key())
            .await
            .unwrap();
        assert_eq!(
            client.delete(ResourceCategory::Gateway, &gw.id).await.unwrap(),
            Deletion::Deleted
        );
    }

    #[tokio::test]
    async fn test_nested_create_requires_existing_parent() {
        let client = InMemoryClient::new("us-east-1");
        let err = client
            .create(&ResourceSpec::new(ResourceCategory::PoolClient, "app").with_parent("nope"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_name_addressed_duplicate_is_rejected() {
        let client = InMemoryClient::new("us-east-1");
        let spec = ResourceSpec::new(ResourceCategory::Role, "AgentCoreRuntimeExecutionRole");
        client.create(&spec).await.unwrap();
        let err = client.create(&spec).await.unwrap_err();
        assert!(matches!(err, CloudError::ResourceAlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_parameter_overwrite_and_prefix_list() {
        let client = InMemoryClient::new("us-east-1");
        for (name, value) in [
            ("/app/a/memory_id", "m-1"),
            ("/app/a/memory_id", "m-2"),
            ("/other/x", "y"),
        ] {
            client
                .create(
                    &ResourceSpec::new(ResourceCategory::Parameter, name)
                        .with_config("value", serde_json::json!(value)),
                )
                .await
                .unwrap();
        }

        let listed = client.list(ResourceCategory::Parameter, "/app/a/").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].attribute("value"), Some("m-2"));
    }

    #[tokio::test]
    async fn test_find_by_name() {
        let client = InMemoryClient::new("us-east-1");
        client
            .create(&ResourceSpec::new(ResourceCategory::Gateway, "customersupport-gw"))
            .await
            .unwrap();

        let found = client
            .find_by_name(ResourceCategory::Gateway, "customersupport-gw", None)
            .await
            .unwrap();
        assert!(found.is_some());
        let missing = client
            .find_by_name(ResourceCategory::Gateway, "customersupport", None)
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_fault_injection_and_auth() {
        let client = InMemoryClient::new("us-east-1");
        client.fail(Operation::Create, ResourceCategory::Gateway);
        assert!(
            client
                .create(&ResourceSpec::new(ResourceCategory::Gateway, "gw"))
                .await
                .is_err()
        );
        client.heal(Operation::Create, ResourceCategory::Gateway);
        assert!(
            client
                .create(&ResourceSpec::new(ResourceCategory::Gateway, "gw"))
                .await
                .is_ok()
        );

        client.deny_auth();
        assert!(!client.check_auth().await.unwrap().authenticated);
        assert!(
            client
                .list(ResourceCategory::Gateway, "")
                .await
                .unwrap_err()
                .is_auth()
        );
        assert_eq!(client.count(Operation::Create, ResourceCategory::Gateway), 2);
    }
}
