use super::smoke_test;
use crate::error::{Result, StageError};
use crate::provision::find_or_create;
use crate::stage::{Stage, StageContext, StageId, StageOutput, keys};
use async_trait::async_trait;
use corelab_cloud::{ResourceCategory, ResourceSpec};

const EVENT_EXPIRY_DAYS: u32 = 90;

/// Agent memory store with per-customer preference and semantic strategies
pub struct MemoryStage;

fn strategies() -> serde_json::Value {
    serde_json::json!([
        {
            "userPreferenceMemoryStrategy": {
                "name": "CustomerPreferences",
                "namespaces": ["support/customer/{actorId}/preferences"]
            }
        },
        {
            "semanticMemoryStrategy": {
                "name": "CustomerSupportSemantic",
                "namespaces": ["support/customer/{actorId}/semantic"]
            }
        }
    ])
}

#[async_trait]
impl Stage for MemoryStage {
    fn id(&self) -> StageId {
        StageId::Memory
    }

    fn description(&self) -> &str {
        "Memory store"
    }

    async fn execute(&self, ctx: &StageContext<'_>) -> Result<StageOutput> {
        let mut output = StageOutput::new();

        let spec = ResourceSpec::new(ResourceCategory::Memory, &ctx.settings.names.memory)
            .with_config(
                "description",
                serde_json::json!("Customer support agent memory"),
            )
            .with_config("event_expiry_days", serde_json::json!(EVENT_EXPIRY_DAYS))
            .with_config("strategies", strategies());

        let memory = find_or_create(ctx.client, ctx.input(keys::MEMORY_ID), &spec)
            .await
            .map_err(|e| StageError::remote("create memory", e))?
            .into_handle();
        let memory = smoke_test(ctx, memory, &mut output).await?;

        output.produce(keys::MEMORY_ID, memory.id);
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::PipelineState;
    use crate::stages::test_support::{context, settings_in};
    use crate::state::PersistedConfig;
    use corelab_cloud::{InMemoryClient, Operation, ResourceClient};

    #[tokio::test]
    async fn test_creates_memory_once() {
        let temp_dir = tempfile::tempdir().unwrap();
        let client = InMemoryClient::new("us-east-1");
        let settings = settings_in(temp_dir.path());
        let pipeline = PipelineState::new();

        let config = PersistedConfig::new();
        let first = MemoryStage
            .execute(&context(&client, &settings, &config, &pipeline))
            .await
            .unwrap();
        let memory_id = first.produced[keys::MEMORY_ID].clone();
        assert!(memory_id.starts_with("CustomerSupportMemory-"));

        let config: PersistedConfig = [(keys::MEMORY_ID, memory_id.as_str())].into_iter().collect();
        let second = MemoryStage
            .execute(&context(&client, &settings, &config, &pipeline))
            .await
            .unwrap();
        assert_eq!(second.produced[keys::MEMORY_ID], memory_id);
        assert_eq!(client.count(Operation::Create, ResourceCategory::Memory), 1);
    }

    #[tokio::test]
    async fn test_unready_memory_is_a_warning() {
        let temp_dir = tempfile::tempdir().unwrap();
        let client = InMemoryClient::new("us-east-1");
        let settings = settings_in(temp_dir.path());
        let pipeline = PipelineState::new();

        let existing = client
            .create(&ResourceSpec::new(ResourceCategory::Memory, "CustomerSupportMemory"))
            .await
            .unwrap();
        client.set_status(ResourceCategory::Memory, &existing.id, "CREATING");

        let config = PersistedConfig::new();
        let output = MemoryStage
            .execute(&context(&client, &settings, &config, &pipeline))
            .await
            .unwrap();
        assert_eq!(output.produced[keys::MEMORY_ID], existing.id);
        assert_eq!(output.warnings.len(), 1);
    }

    #[tokio::test]
    async fn test_create_failure_is_remote_error() {
        let temp_dir = tempfile::tempdir().unwrap();
        let client = InMemoryClient::new("us-east-1");
        client.fail(Operation::Create, ResourceCategory::Memory);
        let settings = settings_in(temp_dir.path());
        let pipeline = PipelineState::new();
        let config = PersistedConfig::new();

        let err = MemoryStage
            .execute(&context(&client, &settings, &config, &pipeline))
            .await
            .unwrap_err();
        assert!(matches!(err, StageError::RemoteOperation { .. }));
    }
}
