//! The five provisioning stages in forward order

mod frontend;
mod gateway;
mod identity;
mod memory;
mod runtime;

pub use frontend::FrontendStage;
pub use gateway::GatewayStage;
pub use identity::IdentityStage;
pub use memory::MemoryStage;
pub use runtime::RuntimeStage;

use crate::error::{Result, StageError};
use crate::stage::{Stage, StageContext, StageOutput};
use corelab_cloud::{ResourceHandle, ResourceStatus, wait_until_ready};
use std::path::Path;

/// All stages, memory first
pub fn catalogue() -> Vec<Box<dyn Stage>> {
    vec![
        Box::new(MemoryStage),
        Box::new(IdentityStage),
        Box::new(GatewayStage),
        Box::new(RuntimeStage),
        Box::new(FrontendStage::default()),
    ]
}

/// Poll a freshly provisioned resource; a failed wait becomes a warning
async fn smoke_test(
    ctx: &StageContext<'_>,
    handle: ResourceHandle,
    output: &mut StageOutput,
) -> Result<ResourceHandle> {
    if handle.status() == ResourceStatus::Ready {
        return Ok(handle);
    }

    let key = handle.key();
    match wait_until_ready(ctx.client, handle.category, &key, &ctx.poll).await {
        Ok(ready) => Ok(ready),
        Err(e) if e.is_auth() => Err(StageError::remote(format!("wait for {}", key), e)),
        Err(e) => {
            output.warn(format!("{} {} is not ready yet: {}", handle.category, key, e));
            Ok(handle)
        }
    }
}

/// Standard trust policy letting the agentcore service assume a role
fn agentcore_trust_policy() -> serde_json::Value {
    serde_json::json!({
        "Version": "2012-10-17",
        "Statement": [{
            "Effect": "Allow",
            "Principal": { "Service": "bedrock-agentcore.amazonaws.com" },
            "Action": "sts:AssumeRole"
        }]
    })
}

fn role_arn(handle: &ResourceHandle) -> String {
    handle
        .arn()
        .map(str::to_string)
        .unwrap_or_else(|| handle.id.clone())
}

/// Write a generated file, creating its directory
async fn write_artifact(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| StageError::local(parent, e))?;
    }
    tokio::fs::write(path, content)
        .await
        .map_err(|e| StageError::local(path, e))?;
    tracing::debug!("Wrote {}", path.display());
    Ok(())
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::stage::{PipelineState, StageContext};
    use crate::state::PersistedConfig;
    use async_trait::async_trait;
    use corelab_cloud::{
        AuthStatus, Deletion, InMemoryClient, PollConfig, ResourceCategory, ResourceClient,
        ResourceHandle, ResourceSpec,
    };
    use corelab_config::Settings;
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Duration;

    pub fn settings_in(dir: &Path) -> Settings {
        Settings {
            work_dir: dir.to_path_buf(),
            ..Settings::default()
        }
    }

    pub fn context<'a>(
        client: &'a dyn ResourceClient,
        settings: &'a Settings,
        config: &'a PersistedConfig,
        pipeline: &'a PipelineState,
    ) -> StageContext<'a> {
        let mut ctx = StageContext::new(client, settings, config, pipeline);
        ctx.poll = PollConfig::new(2, Duration::ZERO);
        ctx
    }

    /// Lists bare summaries (id, name, status) the way the AWS list APIs do;
    /// url and arn are only available from `describe`
    pub struct SummaryListClient {
        pub inner: Arc<InMemoryClient>,
    }

    impl SummaryListClient {
        pub fn new(inner: Arc<InMemoryClient>) -> Self {
            Self { inner }
        }
    }

    #[async_trait]
    impl ResourceClient for SummaryListClient {
        fn name(&self) -> &str {
            "summary-list"
        }

        fn region(&self) -> &str {
            self.inner.region()
        }

        async fn check_auth(&self) -> corelab_cloud::Result<AuthStatus> {
            self.inner.check_auth().await
        }

        async fn describe(
            &self,
            category: ResourceCategory,
            key: &str,
        ) -> corelab_cloud::Result<ResourceHandle> {
            self.inner.describe(category, key).await
        }

        async fn list(
            &self,
            category: ResourceCategory,
            scope: &str,
        ) -> corelab_cloud::Result<Vec<ResourceHandle>> {
            let listed = self.inner.list(category, scope).await?;
            Ok(listed
                .into_iter()
                .map(|handle| {
                    let mut summary =
                        ResourceHandle::new(handle.category, &handle.id, &handle.region);
                    for key in ["name", "status", "parent", "value"] {
                        if let Some(value) = handle.attribute(key) {
                            summary = summary.with_attribute(key, value);
                        }
                    }
                    summary
                })
                .collect())
        }

        async fn create(&self, spec: &ResourceSpec) -> corelab_cloud::Result<ResourceHandle> {
            self.inner.create(spec).await
        }

        async fn delete(
            &self,
            category: ResourceCategory,
            key: &str,
        ) -> corelab_cloud::Result<Deletion> {
            self.inner.delete(category, key).await
        }
    }
}
