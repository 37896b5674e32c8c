use super::smoke_test;
use crate::error::{Result, StageError};
use crate::provision::find_or_create;
use crate::stage::{Stage, StageContext, StageId, StageOutput, keys};
use crate::state::PersistedConfig;
use async_trait::async_trait;
use corelab_cloud::{ResourceCategory, ResourceSpec, nested_key};

/// MCP tool gateway backed by the support Lambda
pub struct GatewayStage;

/// JWT authorizer accepting tokens issued to the pool client
pub(crate) fn jwt_authorizer(client_id: &str, discovery_url: &str) -> serde_json::Value {
    serde_json::json!({
        "customJWTAuthorizer": {
            "allowedClients": [client_id],
            "discoveryUrl": discovery_url
        }
    })
}

/// Inline schema of the tools exposed by the Lambda target
fn tool_schema() -> serde_json::Value {
    serde_json::json!([
        {
            "name": "check_warranty_status",
            "description": "Check the warranty status of a product using its serial number",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "serial_number": { "type": "string" },
                    "customer_email": { "type": "string" }
                },
                "required": ["serial_number"]
            }
        },
        {
            "name": "web_search",
            "description": "Search the web for up-to-date product and troubleshooting information",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "keywords": { "type": "string" },
                    "region": { "type": "string" },
                    "max_results": { "type": "integer" }
                },
                "required": ["keywords"]
            }
        }
    ])
}

fn target_configuration(lambda_arn: &str) -> serde_json::Value {
    serde_json::json!({
        "mcp": {
            "lambda": {
                "lambdaArn": lambda_arn,
                "toolSchema": { "inlinePayload": tool_schema() }
            }
        }
    })
}

impl GatewayStage {
    fn lambda_arn(ctx: &StageContext<'_>) -> String {
        match &ctx.settings.lambda_arn {
            Some(arn) if !arn.is_empty() => arn.clone(),
            _ => ctx.optional(keys::LAMBDA_ARN),
        }
    }

    /// Attach the Lambda target; failures only produce warnings
    async fn attach_target(
        &self,
        ctx: &StageContext<'_>,
        gateway_id: &str,
        lambda_arn: &str,
        output: &mut StageOutput,
    ) -> Result<()> {
        if PersistedConfig::is_placeholder(lambda_arn) {
            output.warn(format!(
                "No Lambda ARN configured; target {} was not attached",
                ctx.settings.names.gateway_target
            ));
            return Ok(());
        }

        let spec = ResourceSpec::new(
            ResourceCategory::GatewayTarget,
            &ctx.settings.names.gateway_target,
        )
        .with_parent(gateway_id)
        .with_config("target_configuration", target_configuration(lambda_arn))
        .with_config(
            "credential_providers",
            serde_json::json!([{ "credentialProviderType": "GATEWAY_IAM_ROLE" }]),
        );

        match find_or_create(ctx.client, None, &spec).await {
            Ok(target) => {
                tracing::info!(
                    "Gateway target {} attached",
                    nested_key(gateway_id, &target.handle().id)
                );
                Ok(())
            }
            Err(e) if e.is_auth() => Err(StageError::remote("attach gateway target", e)),
            Err(e) => {
                output.warn(format!("Failed to attach gateway target: {}", e));
                Ok(())
            }
        }
    }
}

#[async_trait]
impl Stage for GatewayStage {
    fn id(&self) -> StageId {
        StageId::Gateway
    }

    fn description(&self) -> &str {
        "MCP gateway and Lambda target"
    }

    async fn execute(&self, ctx: &StageContext<'_>) -> Result<StageOutput> {
        // Checked before any remote call
        ctx.require(keys::MEMORY_ID)?;

        let mut output = StageOutput::new();
        let client_id = ctx.optional(keys::CLIENT_ID);
        let discovery_url = ctx.optional(keys::COGNITO_DISCOVERY_URL);
        let role_arn = ctx.optional(keys::GATEWAY_IAM_ROLE);
        let lambda_arn = Self::lambda_arn(ctx);

        let spec = ResourceSpec::new(ResourceCategory::Gateway, &ctx.settings.names.gateway)
            .with_config("role_arn", serde_json::json!(role_arn))
            .with_config("authorizer", jwt_authorizer(&client_id, &discovery_url))
            .with_config(
                "description",
                serde_json::json!("Customer support tool gateway"),
            );

        let gateway = find_or_create(ctx.client, ctx.input(keys::GATEWAY_ID), &spec)
            .await
            .map_err(|e| StageError::remote("create gateway", e))?
            .into_handle();
        let gateway = smoke_test(ctx, gateway, &mut output).await?;

        let url = gateway.attribute("url").map(str::to_string).ok_or_else(|| {
            StageError::remote(
                "create gateway",
                corelab_cloud::CloudError::ApiError(format!("gateway {} has no URL", gateway.id)),
            )
        })?;

        self.attach_target(ctx, &gateway.id, &lambda_arn, &mut output)
            .await?;

        output.produce(keys::GATEWAY_ID, gateway.id.clone());
        output.produce(keys::GATEWAY_URL, url);
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorClass;
    use crate::stage::PipelineState;
    use crate::stages::test_support::{SummaryListClient, context, settings_in};
    use corelab_cloud::{InMemoryClient, Operation};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_missing_memory_id_makes_no_remote_calls() {
        let temp_dir = tempfile::tempdir().unwrap();
        let client = InMemoryClient::new("us-east-1");
        let settings = settings_in(temp_dir.path());
        let config = PersistedConfig::new();
        let pipeline = PipelineState::new();

        let err = GatewayStage
            .execute(&context(&client, &settings, &config, &pipeline))
            .await
            .unwrap_err();

        assert_eq!(err.class(), ErrorClass::MissingDependency);
        assert!(err.to_record().hint.contains("corelab stage memory"));
        assert!(client.calls().is_empty());
    }

    #[tokio::test]
    async fn test_produces_gateway_keys_with_placeholders() {
        let temp_dir = tempfile::tempdir().unwrap();
        let client = InMemoryClient::new("us-east-1");
        let settings = settings_in(temp_dir.path());
        let config: PersistedConfig = [(keys::MEMORY_ID, "m-1")].into_iter().collect();
        let pipeline = PipelineState::new();

        let output = GatewayStage
            .execute(&context(&client, &settings, &config, &pipeline))
            .await
            .unwrap();

        let gateway_id = &output.produced[keys::GATEWAY_ID];
        assert!(gateway_id.starts_with("customersupport-gw-"));
        assert!(output.produced[keys::GATEWAY_URL].starts_with("https://"));
        // No Lambda configured: the target is skipped with a warning
        assert_eq!(output.warnings.len(), 1);
        assert_eq!(client.len_of(ResourceCategory::GatewayTarget), 0);
    }

    #[tokio::test]
    async fn test_attaches_target_when_lambda_configured() {
        let temp_dir = tempfile::tempdir().unwrap();
        let client = InMemoryClient::new("us-east-1");
        let mut settings = settings_in(temp_dir.path());
        settings.lambda_arn =
            Some("arn:aws:lambda:us-east-1:000000000000:function:support-tools".to_string());
        let config: PersistedConfig = [(keys::MEMORY_ID, "m-1")].into_iter().collect();
        let pipeline = PipelineState::new();

        let output = GatewayStage
            .execute(&context(&client, &settings, &config, &pipeline))
            .await
            .unwrap();

        assert!(output.warnings.is_empty());
        assert_eq!(client.len_of(ResourceCategory::GatewayTarget), 1);
    }

    #[tokio::test]
    async fn test_target_failure_is_not_fatal() {
        let temp_dir = tempfile::tempdir().unwrap();
        let client = InMemoryClient::new("us-east-1");
        client.fail(Operation::Create, ResourceCategory::GatewayTarget);
        let settings = settings_in(temp_dir.path());
        let config: PersistedConfig = [
            (keys::MEMORY_ID, "m-1"),
            (keys::LAMBDA_ARN, "arn:aws:lambda:us-east-1:000000000000:function:tools"),
        ]
        .into_iter()
        .collect();
        let pipeline = PipelineState::new();

        let output = GatewayStage
            .execute(&context(&client, &settings, &config, &pipeline))
            .await
            .unwrap();

        assert!(output.produced.contains_key(keys::GATEWAY_URL));
        assert_eq!(output.warnings.len(), 1);
    }

    #[tokio::test]
    async fn test_rerun_reuses_listed_gateway() {
        let temp_dir = tempfile::tempdir().unwrap();
        let inner = Arc::new(InMemoryClient::new("us-east-1"));
        let client = SummaryListClient::new(inner.clone());
        let settings = settings_in(temp_dir.path());
        // gateway_id is not remembered: the gateway is found by name
        let config: PersistedConfig = [(keys::MEMORY_ID, "m-1")].into_iter().collect();
        let pipeline = PipelineState::new();

        let first = GatewayStage
            .execute(&context(&client, &settings, &config, &pipeline))
            .await
            .unwrap();
        let second = GatewayStage
            .execute(&context(&client, &settings, &config, &pipeline))
            .await
            .unwrap();

        assert_eq!(second.produced[keys::GATEWAY_ID], first.produced[keys::GATEWAY_ID]);
        assert_eq!(second.produced[keys::GATEWAY_URL], first.produced[keys::GATEWAY_URL]);
        assert_eq!(inner.count(Operation::Create, ResourceCategory::Gateway), 1);
    }

    #[test]
    fn test_target_configuration_carries_schema() {
        let config = target_configuration("arn:lambda");
        let tools = &config["mcp"]["lambda"]["toolSchema"]["inlinePayload"];
        assert_eq!(tools.as_array().unwrap().len(), 2);
        assert_eq!(tools[0]["name"], "check_warranty_status");
        assert_eq!(tools[1]["inputSchema"]["required"][0], "keywords");
    }
}
