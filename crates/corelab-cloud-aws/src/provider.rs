//! AWS resource client implementation

use crate::agentcore::{
    AgentCoreClient, CreateGatewayConfig, CreateMemoryConfig, CreateRuntimeConfig,
    CreateTargetConfig, GatewayInfo, MemoryInfo, RuntimeInfo, TargetInfo,
};
use crate::cognito::{CognitoClient, PoolClientInfo, UserPoolInfo};
use crate::ecr::{RegistryClient, RepositoryInfo};
use crate::error::{AwsError, Result};
use crate::iam::{CreateRoleConfig, RoleClient};
use crate::logs::LogGroupClient;
use crate::sdk::{IdentityClient, ParameterClient, load_sdk_config};
use crate::secrets::{SecretClient, SecretInfo};
use async_trait::async_trait;
use corelab_cloud::{
    AuthStatus, CloudError, Deletion, ResourceCategory, ResourceClient, ResourceHandle,
    ResourceSpec, split_nested_key,
};

const DEFAULT_EVENT_EXPIRY_DAYS: i32 = 90;

/// AWS resource client
///
/// One SDK client per service, all built from the same shared configuration.
pub struct AwsResourceClient {
    region: String,
    agentcore: AgentCoreClient,
    roles: RoleClient,
    cognito: CognitoClient,
    registry: RegistryClient,
    secrets: SecretClient,
    logs: LogGroupClient,
    parameters: ParameterClient,
    identity: IdentityClient,
}

impl AwsResourceClient {
    /// Build a client for `region` from the default credential chain
    pub async fn connect(region: impl Into<String>) -> Self {
        let region = region.into();
        let config = load_sdk_config(&region).await;
        Self {
            region,
            agentcore: AgentCoreClient::new(&config),
            roles: RoleClient::new(&config),
            cognito: CognitoClient::new(&config),
            registry: RegistryClient::new(&config),
            secrets: SecretClient::new(&config),
            logs: LogGroupClient::new(&config),
            parameters: ParameterClient::new(&config),
            identity: IdentityClient::new(&config),
        }
    }

    fn handle(&self, category: ResourceCategory, id: impl Into<String>) -> ResourceHandle {
        ResourceHandle::new(category, id, &self.region)
    }

    fn memory_handle(&self, info: MemoryInfo) -> ResourceHandle {
        let mut handle = self
            .handle(ResourceCategory::Memory, &info.id)
            .with_attribute("name", info.display_name());
        set_optional(&mut handle, "arn", info.arn);
        set_optional(&mut handle, "status", info.status);
        handle
    }

    fn gateway_handle(&self, info: GatewayInfo) -> ResourceHandle {
        let mut handle = self.handle(ResourceCategory::Gateway, info.gateway_id);
        set_optional(&mut handle, "name", info.name);
        set_optional(&mut handle, "arn", info.gateway_arn);
        set_optional(&mut handle, "url", info.gateway_url);
        set_optional(&mut handle, "status", info.status);
        handle
    }

    fn target_handle(&self, gateway_id: &str, info: TargetInfo) -> ResourceHandle {
        let mut handle = self
            .handle(ResourceCategory::GatewayTarget, info.target_id)
            .with_attribute("parent", gateway_id);
        set_optional(&mut handle, "name", info.name);
        set_optional(&mut handle, "status", info.status);
        handle
    }

    fn runtime_handle(&self, info: RuntimeInfo) -> ResourceHandle {
        let mut handle = self.handle(ResourceCategory::Runtime, info.agent_runtime_id);
        set_optional(&mut handle, "name", info.agent_runtime_name);
        set_optional(&mut handle, "arn", info.agent_runtime_arn);
        set_optional(&mut handle, "status", info.status);
        handle
    }

    fn registry_handle(&self, info: RepositoryInfo) -> ResourceHandle {
        let mut handle = self
            .handle(ResourceCategory::Registry, &info.repository_name)
            .with_attribute("name", info.repository_name);
        set_optional(&mut handle, "uri", info.repository_uri);
        set_optional(&mut handle, "arn", info.repository_arn);
        handle
    }

    fn pool_handle(&self, info: UserPoolInfo) -> ResourceHandle {
        let mut handle = self.handle(ResourceCategory::IdentityPool, info.id);
        set_optional(&mut handle, "name", info.name);
        set_optional(&mut handle, "arn", info.arn);
        handle
    }

    fn pool_client_handle(&self, pool_id: &str, info: PoolClientInfo) -> ResourceHandle {
        let mut handle = self
            .handle(ResourceCategory::PoolClient, info.client_id)
            .with_attribute("parent", pool_id);
        set_optional(&mut handle, "name", info.client_name);
        handle
    }

    fn secret_handle(&self, info: SecretInfo) -> ResourceHandle {
        let mut handle = self.named_handle(ResourceCategory::Secret, &info.name);
        set_optional(&mut handle, "arn", info.arn);
        handle
    }

    fn named_handle(&self, category: ResourceCategory, name: &str) -> ResourceHandle {
        self.handle(category, name).with_attribute("name", name)
    }

    /// Repository handle with the tags of the images it holds
    async fn describe_registry(&self, name: &str) -> Result<ResourceHandle> {
        let repository = self.registry.describe_repository(name).await?;
        let tags = self.registry.image_tags(name).await?;
        Ok(self
            .registry_handle(repository)
            .with_attribute("image_tags", tags.join(",")))
    }

    async fn describe_inner(
        &self,
        category: ResourceCategory,
        key: &str,
    ) -> Result<ResourceHandle> {
        let handle = match category {
            ResourceCategory::Memory => self.memory_handle(self.agentcore.get_memory(key).await?),
            ResourceCategory::Gateway => {
                self.gateway_handle(self.agentcore.get_gateway(key).await?)
            }
            ResourceCategory::GatewayTarget => {
                let (gateway_id, target_id) = nested(key)?;
                let info = self
                    .agentcore
                    .get_gateway_target(gateway_id, target_id)
                    .await?;
                self.target_handle(gateway_id, info)
            }
            ResourceCategory::Runtime => {
                self.runtime_handle(self.agentcore.get_agent_runtime(key).await?)
            }
            ResourceCategory::Registry => self.describe_registry(key).await?,
            ResourceCategory::IdentityPool => {
                self.pool_handle(self.cognito.describe_user_pool(key).await?)
            }
            ResourceCategory::PoolClient => {
                let (pool_id, client_id) = nested(key)?;
                let info = self.cognito.describe_pool_client(pool_id, client_id).await?;
                self.pool_client_handle(pool_id, info)
            }
            ResourceCategory::Role => {
                let role = self.roles.get_role(key).await?;
                self.named_handle(category, &role.role_name)
                    .with_attribute("arn", role.arn)
            }
            ResourceCategory::Parameter => match self.parameters.get(key).await? {
                Some(value) => self.named_handle(category, key).with_attribute("value", value),
                None => return Err(AwsError::NotFound(format!("parameter {}", key))),
            },
            ResourceCategory::Secret => {
                self.secret_handle(self.secrets.describe_secret(key).await?)
            }
            ResourceCategory::LogGroup => {
                let groups = self.logs.describe_log_groups(key).await?;
                match groups.into_iter().find(|g| g.log_group_name == key) {
                    Some(group) => self.named_handle(category, &group.log_group_name),
                    None => return Err(AwsError::NotFound(format!("log group {}", key))),
                }
            }
            ResourceCategory::LocalArtifact => return Err(unsupported(category)),
        };
        Ok(handle)
    }

    /// Summaries under `scope`; see [`ResourceClient::list`]
    async fn list_inner(
        &self,
        category: ResourceCategory,
        scope: &str,
    ) -> Result<Vec<ResourceHandle>> {
        let by_prefix =
            |handle: &ResourceHandle| handle.name().unwrap_or(&handle.id).starts_with(scope);

        let handles: Vec<ResourceHandle> = match category {
            ResourceCategory::Memory => self
                .agentcore
                .list_memories()
                .await?
                .into_iter()
                .map(|m| self.memory_handle(m))
                .filter(by_prefix)
                .collect(),
            ResourceCategory::Gateway => self
                .agentcore
                .list_gateways()
                .await?
                .into_iter()
                .map(|g| self.gateway_handle(g))
                .filter(by_prefix)
                .collect(),
            ResourceCategory::GatewayTarget => self
                .agentcore
                .list_gateway_targets(scope)
                .await?
                .into_iter()
                .map(|t| self.target_handle(scope, t))
                .collect(),
            ResourceCategory::Runtime => self
                .agentcore
                .list_agent_runtimes()
                .await?
                .into_iter()
                .map(|r| self.runtime_handle(r))
                .filter(by_prefix)
                .collect(),
            ResourceCategory::Registry => self
                .registry
                .list_repositories()
                .await?
                .into_iter()
                .map(|r| self.registry_handle(r))
                .filter(by_prefix)
                .collect(),
            ResourceCategory::IdentityPool => self
                .cognito
                .list_user_pools()
                .await?
                .into_iter()
                .map(|p| self.pool_handle(p))
                .filter(by_prefix)
                .collect(),
            ResourceCategory::PoolClient => self
                .cognito
                .list_pool_clients(scope)
                .await?
                .into_iter()
                .map(|c| self.pool_client_handle(scope, c))
                .collect(),
            ResourceCategory::Role => self
                .roles
                .list_roles()
                .await?
                .into_iter()
                .map(|r| {
                    self.named_handle(category, &r.role_name)
                        .with_attribute("arn", r.arn)
                })
                .filter(by_prefix)
                .collect(),
            ResourceCategory::Parameter => self
                .parameters
                .list(scope)
                .await?
                .into_iter()
                .map(|(name, value)| {
                    self.named_handle(category, &name)
                        .with_attribute("value", value)
                })
                .collect(),
            ResourceCategory::Secret => self
                .secrets
                .list_secrets(scope)
                .await?
                .into_iter()
                .map(|s| self.secret_handle(s))
                .filter(by_prefix)
                .collect(),
            ResourceCategory::LogGroup => self
                .logs
                .describe_log_groups(scope)
                .await?
                .into_iter()
                .map(|g| self.named_handle(category, &g.log_group_name))
                .collect(),
            ResourceCategory::LocalArtifact => return Err(unsupported(category)),
        };
        Ok(handles)
    }

    async fn create_inner(&self, spec: &ResourceSpec) -> Result<ResourceHandle> {
        let name = spec.name.as_str();
        let handle = match spec.category {
            ResourceCategory::Memory => {
                let config = CreateMemoryConfig {
                    name: spec.name.clone(),
                    description: spec
                        .config_str("description")
                        .unwrap_or("corelab memory store")
                        .to_string(),
                    event_expiry_days: spec
                        .config_value("event_expiry_days")
                        .and_then(|v| v.as_i64())
                        .and_then(|days| i32::try_from(days).ok())
                        .unwrap_or(DEFAULT_EVENT_EXPIRY_DAYS),
                    strategies: json_or(spec, "strategies", serde_json::json!([])),
                };
                self.memory_handle(self.agentcore.create_memory(&config).await?)
            }
            ResourceCategory::Gateway => {
                let config = CreateGatewayConfig {
                    name: spec.name.clone(),
                    role_arn: required(spec, "role_arn")?.to_string(),
                    authorizer: json_required(spec, "authorizer")?,
                    description: spec
                        .config_str("description")
                        .unwrap_or("corelab tool gateway")
                        .to_string(),
                };
                self.gateway_handle(self.agentcore.create_gateway(&config).await?)
            }
            ResourceCategory::GatewayTarget => {
                let gateway_id = parent(spec)?;
                let config = CreateTargetConfig {
                    gateway_id: gateway_id.to_string(),
                    name: spec.name.clone(),
                    target_configuration: json_required(spec, "target_configuration")?,
                    credential_providers: json_or(
                        spec,
                        "credential_providers",
                        serde_json::json!([{ "credentialProviderType": "GATEWAY_IAM_ROLE" }]),
                    ),
                };
                let info = self.agentcore.create_gateway_target(&config).await?;
                self.target_handle(gateway_id, info)
            }
            ResourceCategory::Runtime => {
                let config = CreateRuntimeConfig {
                    name: spec.name.clone(),
                    container_uri: required(spec, "container_uri")?.to_string(),
                    role_arn: required(spec, "role_arn")?.to_string(),
                    authorizer: json_required(spec, "authorizer")?,
                    environment: json_or(spec, "environment", serde_json::json!({})),
                };
                self.runtime_handle(self.agentcore.create_agent_runtime(&config).await?)
            }
            // A fresh repository holds no image yet
            ResourceCategory::Registry => self
                .registry_handle(self.registry.create_repository(name).await?)
                .with_attribute("image_tags", ""),
            ResourceCategory::IdentityPool => {
                self.pool_handle(self.cognito.create_user_pool(name).await?)
            }
            ResourceCategory::PoolClient => {
                let pool_id = parent(spec)?;
                let info = self.cognito.create_pool_client(pool_id, name).await?;
                self.pool_client_handle(pool_id, info)
            }
            ResourceCategory::Role => {
                let managed_policies = spec
                    .config_value("managed_policies")
                    .and_then(|v| v.as_array())
                    .map(|arns| {
                        arns.iter()
                            .filter_map(|a| a.as_str().map(str::to_string))
                            .collect()
                    })
                    .unwrap_or_default();
                let inline_policies = spec
                    .config_value("inline_policies")
                    .and_then(|v| v.as_object())
                    .map(|policies| {
                        policies
                            .iter()
                            .map(|(name, doc)| (name.clone(), doc.clone()))
                            .collect()
                    })
                    .unwrap_or_default();
                let config = CreateRoleConfig {
                    name: spec.name.clone(),
                    trust_policy: json_required(spec, "trust_policy")?,
                    managed_policies,
                    inline_policies,
                };
                let role = self.roles.create_role(&config).await?;
                self.named_handle(spec.category, &role.role_name)
                    .with_attribute("arn", role.arn)
            }
            ResourceCategory::Parameter => {
                let value = required(spec, "value")?;
                self.parameters.put(name, value).await?;
                self.named_handle(spec.category, name).with_attribute("value", value)
            }
            ResourceCategory::Secret => {
                let secret_string = spec.config_str("secret_string").unwrap_or("{}");
                self.secret_handle(self.secrets.create_secret(name, secret_string).await?)
            }
            ResourceCategory::LogGroup => {
                self.logs.create_log_group(name).await?;
                self.named_handle(spec.category, name)
            }
            ResourceCategory::LocalArtifact => return Err(unsupported(spec.category)),
        };

        tracing::info!("Created {} {}", spec.category, handle.key());
        Ok(handle)
    }

    async fn delete_inner(&self, category: ResourceCategory, key: &str) -> Result<()> {
        match category {
            ResourceCategory::Memory => self.agentcore.delete_memory(key).await,
            ResourceCategory::Gateway => self.agentcore.delete_gateway(key).await,
            ResourceCategory::GatewayTarget => {
                let (gateway_id, target_id) = nested(key)?;
                self.agentcore
                    .delete_gateway_target(gateway_id, target_id)
                    .await
            }
            ResourceCategory::Runtime => self.agentcore.delete_agent_runtime(key).await,
            ResourceCategory::Registry => self.registry.delete_repository(key).await,
            ResourceCategory::IdentityPool => self.cognito.delete_user_pool(key).await,
            ResourceCategory::PoolClient => {
                let (pool_id, client_id) = nested(key)?;
                self.cognito.delete_pool_client(pool_id, client_id).await
            }
            ResourceCategory::Role => self.roles.delete_role(key).await,
            ResourceCategory::Parameter => {
                if self.parameters.delete(key).await? {
                    Ok(())
                } else {
                    Err(AwsError::NotFound(format!("parameter {}", key)))
                }
            }
            ResourceCategory::Secret => self.secrets.delete_secret(key).await,
            ResourceCategory::LogGroup => self.logs.delete_log_group(key).await,
            ResourceCategory::LocalArtifact => Err(unsupported(category)),
        }
    }
}

#[async_trait]
impl ResourceClient for AwsResourceClient {
    fn name(&self) -> &str {
        "aws"
    }

    fn region(&self) -> &str {
        &self.region
    }

    async fn check_auth(&self) -> corelab_cloud::Result<AuthStatus> {
        match self.identity.caller_identity().await {
            Ok(identity) => Ok(AuthStatus::ok(identity)),
            Err(AwsError::AuthenticationFailed(msg)) => Ok(AuthStatus::failed(msg)),
            Err(e) => Err(e.into()),
        }
    }

    async fn describe(
        &self,
        category: ResourceCategory,
        key: &str,
    ) -> corelab_cloud::Result<ResourceHandle> {
        Ok(self.describe_inner(category, key).await?)
    }

    async fn list(
        &self,
        category: ResourceCategory,
        scope: &str,
    ) -> corelab_cloud::Result<Vec<ResourceHandle>> {
        Ok(self.list_inner(category, scope).await?)
    }

    async fn create(&self, spec: &ResourceSpec) -> corelab_cloud::Result<ResourceHandle> {
        Ok(self.create_inner(spec).await?)
    }

    async fn delete(
        &self,
        category: ResourceCategory,
        key: &str,
    ) -> corelab_cloud::Result<Deletion> {
        match self.delete_inner(category, key).await {
            Ok(()) => {
                tracing::info!("Deleted {} {}", category, key);
                Ok(Deletion::Deleted)
            }
            Err(AwsError::NotFound(_)) => Ok(Deletion::Absent),
            Err(e) => Err(CloudError::from(e)),
        }
    }
}

fn set_optional(handle: &mut ResourceHandle, key: &str, value: Option<String>) {
    if let Some(value) = value {
        handle.attributes.insert(key.to_string(), value);
    }
}

fn nested(key: &str) -> Result<(&str, &str)> {
    split_nested_key(key)
        .ok_or_else(|| AwsError::InvalidSpec(format!("expected parent/child key, got {}", key)))
}

fn parent(spec: &ResourceSpec) -> Result<&str> {
    spec.parent
        .as_deref()
        .ok_or_else(|| AwsError::InvalidSpec(format!("{} requires a parent", spec.category)))
}

fn required<'a>(spec: &'a ResourceSpec, key: &str) -> Result<&'a str> {
    spec.config_str(key).ok_or_else(|| {
        AwsError::InvalidSpec(format!("{} {} is missing `{}`", spec.category, spec.name, key))
    })
}

fn json_required(spec: &ResourceSpec, key: &str) -> Result<serde_json::Value> {
    spec.config_value(key).cloned().ok_or_else(|| {
        AwsError::InvalidSpec(format!("{} {} is missing `{}`", spec.category, spec.name, key))
    })
}

fn json_or(spec: &ResourceSpec, key: &str, default: serde_json::Value) -> serde_json::Value {
    spec.config_value(key).cloned().unwrap_or(default)
}

fn unsupported(category: ResourceCategory) -> AwsError {
    AwsError::Unsupported(format!("{} is not a remote resource", category))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_key_required() {
        assert_eq!(nested("gw-1/T1").unwrap(), ("gw-1", "T1"));
        assert!(nested("gw-1").is_err());
    }

    #[test]
    fn test_spec_helpers() {
        let spec = ResourceSpec::new(ResourceCategory::Gateway, "customersupport-gw")
            .with_config("role_arn", serde_json::json!("arn:aws:iam::1:role/gw"));
        assert_eq!(required(&spec, "role_arn").unwrap(), "arn:aws:iam::1:role/gw");
        assert!(json_required(&spec, "authorizer").is_err());
        assert_eq!(
            json_or(&spec, "environment", serde_json::json!({})),
            serde_json::json!({})
        );
        assert!(parent(&spec).is_err());
    }
}
