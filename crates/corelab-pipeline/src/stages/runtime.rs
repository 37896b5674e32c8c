use super::gateway::jwt_authorizer;
use super::{agentcore_trust_policy, role_arn, smoke_test, write_artifact};
use crate::error::{Result, StageError};
use crate::provision::find_or_create;
use crate::stage::{Stage, StageContext, StageId, StageOutput, keys};
use async_trait::async_trait;
use corelab_cloud::{CloudError, ResourceCategory, ResourceSpec};

const AGENT_DIR: &str = "runtime_agent";
const IMAGE_TAG: &str = "latest";
const AGENT_REQUIREMENTS: &str =
    "bedrock-agentcore\nstrands-agents\nmcp\nboto3>=1.34.0\n";

/// Hosted agent runtime wired to the gateway and memory
pub struct RuntimeStage;

fn execution_role_policies() -> serde_json::Value {
    serde_json::json!({
        "AgentCoreRuntimeAccess": {
            "Version": "2012-10-17",
            "Statement": [
                {
                    "Effect": "Allow",
                    "Action": [
                        "bedrock:InvokeModel",
                        "bedrock:InvokeModelWithResponseStream",
                        "bedrock-agentcore:*"
                    ],
                    "Resource": "*"
                },
                {
                    "Effect": "Allow",
                    "Action": [
                        "ecr:GetAuthorizationToken",
                        "ecr:BatchGetImage",
                        "ecr:GetDownloadUrlForLayer"
                    ],
                    "Resource": "*"
                },
                {
                    "Effect": "Allow",
                    "Action": [
                        "logs:CreateLogGroup",
                        "logs:CreateLogStream",
                        "logs:PutLogEvents"
                    ],
                    "Resource": "*"
                }
            ]
        }
    })
}

impl RuntimeStage {
    /// Agent-side configuration consumed by the container at start-up
    async fn write_agent_files(
        ctx: &StageContext<'_>,
        gateway_url: &str,
        memory_id: &str,
    ) -> Result<()> {
        let dir = ctx.settings.artifact_path(AGENT_DIR);
        let config = serde_json::json!({
            "gateway_url": gateway_url,
            "memory_id": memory_id,
            "region": ctx.region(),
        });
        let content = serde_json::to_string_pretty(&config)
            .map_err(|e| StageError::local(dir.join("config.json"), std::io::Error::other(e)))?;

        write_artifact(&dir.join("config.json"), &content).await?;
        write_artifact(&dir.join("requirements.txt"), AGENT_REQUIREMENTS).await
    }

    /// Image to run: configured URI, or the `latest` tag of the registry
    ///
    /// The registry must already hold that image; a runtime pointed at a
    /// missing image never becomes ready.
    async fn container_uri(
        ctx: &StageContext<'_>,
        output: &mut StageOutput,
    ) -> Result<String> {
        if let Some(uri) = ctx.settings.container_uri.as_deref().filter(|u| !u.is_empty()) {
            let repository = uri
                .rsplit_once(':')
                .filter(|(_, tag)| !tag.contains('/'))
                .map_or(uri, |(repository, _)| repository);
            output.produce(keys::REGISTRY_URI, repository);
            return Ok(uri.to_string());
        }

        let spec = ResourceSpec::new(ResourceCategory::Registry, &ctx.settings.names.registry);
        let registry = find_or_create(ctx.client, None, &spec)
            .await
            .map_err(|e| StageError::remote("create container registry", e))?
            .into_handle();
        let uri = registry.attribute("uri").map(str::to_string).ok_or_else(|| {
            StageError::remote(
                "create container registry",
                CloudError::ApiError(format!("registry {} has no URI", registry.id)),
            )
        })?;

        output.produce(keys::REGISTRY_URI, uri.clone());

        let pushed = registry
            .attribute("image_tags")
            .is_some_and(|tags| tags.split(',').any(|t| t.trim() == IMAGE_TAG));
        if !pushed {
            return Err(StageError::ImageNotPushed {
                repository: uri,
                tag: IMAGE_TAG.to_string(),
            });
        }
        Ok(format!("{}:{}", uri, IMAGE_TAG))
    }
}

#[async_trait]
impl Stage for RuntimeStage {
    fn id(&self) -> StageId {
        StageId::Runtime
    }

    fn description(&self) -> &str {
        "Agent runtime"
    }

    async fn execute(&self, ctx: &StageContext<'_>) -> Result<StageOutput> {
        let gateway_url = ctx.require(keys::GATEWAY_URL)?.to_string();

        let mut output = StageOutput::new();
        let client_id = ctx.optional(keys::CLIENT_ID);
        let discovery_url = ctx.optional(keys::COGNITO_DISCOVERY_URL);
        let memory_id = ctx.optional(keys::MEMORY_ID);

        Self::write_agent_files(ctx, &gateway_url, &memory_id).await?;

        let role_spec =
            ResourceSpec::new(ResourceCategory::Role, &ctx.settings.names.execution_role)
                .with_config("trust_policy", agentcore_trust_policy())
                .with_config("inline_policies", execution_role_policies());
        let role = find_or_create(ctx.client, None, &role_spec)
            .await
            .map_err(|e| StageError::remote("create execution role", e))?
            .into_handle();
        let execution_role_arn = role_arn(&role);

        let container_uri = Self::container_uri(ctx, &mut output).await?;

        let spec = ResourceSpec::new(ResourceCategory::Runtime, &ctx.settings.names.runtime)
            .with_config("container_uri", serde_json::json!(container_uri))
            .with_config("role_arn", serde_json::json!(execution_role_arn))
            .with_config("authorizer", jwt_authorizer(&client_id, &discovery_url))
            .with_config(
                "environment",
                serde_json::json!({
                    "GATEWAY_URL": gateway_url,
                    "MEMORY_ID": memory_id,
                    "AWS_REGION": ctx.region(),
                }),
            );
        let runtime = find_or_create(ctx.client, ctx.input(keys::RUNTIME_ID), &spec)
            .await
            .map_err(|e| StageError::remote("create agent runtime", e))?
            .into_handle();
        let runtime = smoke_test(ctx, runtime, &mut output).await?;

        let runtime_arn = runtime.arn().map(str::to_string).ok_or_else(|| {
            StageError::remote(
                "create agent runtime",
                CloudError::ApiError(format!("runtime {} has no ARN", runtime.id)),
            )
        })?;

        output.produce(keys::EXECUTION_ROLE_ARN, execution_role_arn);
        output.produce(keys::RUNTIME_ARN, runtime_arn);
        output.produce(keys::RUNTIME_ID, runtime.id);
        Ok(output)
    }
}
