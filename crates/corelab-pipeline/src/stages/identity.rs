use super::{agentcore_trust_policy, role_arn};
use crate::error::{Result, StageError};
use crate::provision::find_or_create;
use crate::stage::{Stage, StageContext, StageId, StageOutput, keys};
use async_trait::async_trait;
use corelab_cloud::{ResourceCategory, ResourceSpec};

/// Identity pool, its app client, the gateway role and the shared secret
pub struct IdentityStage;

/// OIDC discovery document of a pool
pub fn discovery_url(region: &str, pool_id: &str) -> String {
    format!(
        "https://cognito-idp.{}.amazonaws.com/{}/.well-known/openid-configuration",
        region, pool_id
    )
}

fn gateway_role_policies() -> serde_json::Value {
    serde_json::json!({
        "GatewayLambdaInvoke": {
            "Version": "2012-10-17",
            "Statement": [{
                "Effect": "Allow",
                "Action": ["lambda:InvokeFunction"],
                "Resource": "*"
            }]
        }
    })
}

#[async_trait]
impl Stage for IdentityStage {
    fn id(&self) -> StageId {
        StageId::Identity
    }

    fn description(&self) -> &str {
        "Identity pool and gateway role"
    }

    async fn execute(&self, ctx: &StageContext<'_>) -> Result<StageOutput> {
        let mut output = StageOutput::new();
        let names = &ctx.settings.names;

        let role_spec = ResourceSpec::new(ResourceCategory::Role, &names.gateway_role)
            .with_config("trust_policy", agentcore_trust_policy())
            .with_config("inline_policies", gateway_role_policies());
        let role = find_or_create(ctx.client, None, &role_spec)
            .await
            .map_err(|e| StageError::remote("create gateway role", e))?
            .into_handle();

        let pool_spec = ResourceSpec::new(ResourceCategory::IdentityPool, &names.identity_pool);
        let pool = find_or_create(ctx.client, ctx.input(keys::POOL_ID), &pool_spec)
            .await
            .map_err(|e| StageError::remote("create identity pool", e))?
            .into_handle();

        let known_client = ctx
            .input(keys::CLIENT_ID)
            .map(|client_id| corelab_cloud::nested_key(&pool.id, client_id));
        let client_spec = ResourceSpec::new(ResourceCategory::PoolClient, &names.pool_client)
            .with_parent(&pool.id);
        let app_client = find_or_create(ctx.client, known_client.as_deref(), &client_spec)
            .await
            .map_err(|e| StageError::remote("create pool client", e))?
            .into_handle();

        let discovery = discovery_url(ctx.region(), &pool.id);

        // The secret only mirrors the ids; losing it does not block the pipeline
        let secret_string =
            serde_json::json!({ "pool_id": pool.id, "client_id": app_client.id }).to_string();
        let secret_spec = ResourceSpec::new(ResourceCategory::Secret, &names.secret)
            .with_config("secret_string", serde_json::Value::String(secret_string));
        if let Err(e) = find_or_create(ctx.client, None, &secret_spec).await {
            if e.is_auth() {
                return Err(StageError::remote("create secret", e));
            }
            output.warn(format!("Failed to store secret {}: {}", names.secret, e));
        }

        output.produce(keys::POOL_ID, pool.id.clone());
        output.produce(keys::CLIENT_ID, app_client.id);
        output.produce(keys::COGNITO_DISCOVERY_URL, discovery);
        output.produce(keys::GATEWAY_IAM_ROLE, role_arn(&role));
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::PipelineState;
    use crate::stages::test_support::{context, settings_in};
    use crate::state::PersistedConfig;
    use corelab_cloud::{InMemoryClient, Operation};

    #[tokio::test]
    async fn test_produces_identity_keys() {
        let temp_dir = tempfile::tempdir().unwrap();
        let client = InMemoryClient::new("eu-west-1");
        let settings = settings_in(temp_dir.path());
        let config = PersistedConfig::new();
        let pipeline = PipelineState::new();

        let output = IdentityStage
            .execute(&context(&client, &settings, &config, &pipeline))
            .await
            .unwrap();

        for key in StageId::Identity.produces() {
            assert!(output.produced.contains_key(*key), "missing {}", key);
        }
        let pool_id = &output.produced[keys::POOL_ID];
        assert_eq!(
            output.produced[keys::COGNITO_DISCOVERY_URL],
            discovery_url("eu-west-1", pool_id)
        );
        assert!(output.produced[keys::GATEWAY_IAM_ROLE].starts_with("arn:aws:iam::"));
        assert!(client.contains(ResourceCategory::Secret, "customer-support-secret"));
        assert!(output.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_rerun_reuses_everything() {
        let temp_dir = tempfile::tempdir().unwrap();
        let client = InMemoryClient::new("us-east-1");
        let settings = settings_in(temp_dir.path());
        let pipeline = PipelineState::new();

        let config = PersistedConfig::new();
        let first = IdentityStage
            .execute(&context(&client, &settings, &config, &pipeline))
            .await
            .unwrap();

        let config: PersistedConfig = first.produced.clone().into();
        let second = IdentityStage
            .execute(&context(&client, &settings, &config, &pipeline))
            .await
            .unwrap();

        assert_eq!(first.produced, second.produced);
        assert_eq!(client.count(Operation::Create, ResourceCategory::IdentityPool), 1);
        assert_eq!(client.count(Operation::Create, ResourceCategory::PoolClient), 1);
    }

    #[tokio::test]
    async fn test_secret_failure_is_a_warning() {
        let temp_dir = tempfile::tempdir().unwrap();
        let client = InMemoryClient::new("us-east-1");
        client.fail(Operation::Create, ResourceCategory::Secret);
        let settings = settings_in(temp_dir.path());
        let config = PersistedConfig::new();
        let pipeline = PipelineState::new();

        let output = IdentityStage
            .execute(&context(&client, &settings, &config, &pipeline))
            .await
            .unwrap();
        assert_eq!(output.warnings.len(), 1);
        assert!(output.produced.contains_key(keys::CLIENT_ID));
    }
}
