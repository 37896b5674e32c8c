use super::write_artifact;
use crate::error::{Result, StageError};
use crate::stage::{Stage, StageContext, StageId, StageOutput, keys};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

const APP_DIR: &str = "streamlit_app";
const APP_REQUIREMENTS: &str = "streamlit>=1.28.0\nboto3>=1.34.0\n";
const APP_PORT: u16 = 8501;
const SAGEMAKER_ROOT: &str = "/opt/ml";

/// Chat frontend configuration for the deployed runtime
///
/// Only local files are written; the frontend itself is started by the user.
pub struct FrontendStage {
    sagemaker_root: PathBuf,
}

impl Default for FrontendStage {
    fn default() -> Self {
        Self {
            sagemaker_root: PathBuf::from(SAGEMAKER_ROOT),
        }
    }
}

impl FrontendStage {
    /// Detect SageMaker Studio by the presence of `root` instead of `/opt/ml`
    pub fn with_sagemaker_root(root: impl AsRef<Path>) -> Self {
        Self {
            sagemaker_root: root.as_ref().to_path_buf(),
        }
    }

    /// Address the frontend is reachable at once started
    pub fn frontend_url(&self, region: &str) -> String {
        if self.sagemaker_root.exists() {
            let domain = std::env::var("SAGEMAKER_DOMAIN_ID")
                .ok()
                .filter(|d| !d.is_empty())
                .unwrap_or_else(|| "local".to_string());
            format!(
                "https://{}.studio.{}.sagemaker.aws/jupyter/default/proxy/{}/",
                domain, region, APP_PORT
            )
        } else {
            format!("http://localhost:{}", APP_PORT)
        }
    }
}

#[async_trait]
impl Stage for FrontendStage {
    fn id(&self) -> StageId {
        StageId::Frontend
    }

    fn description(&self) -> &str {
        "Frontend configuration"
    }

    async fn execute(&self, ctx: &StageContext<'_>) -> Result<StageOutput> {
        let runtime_arn = ctx.require(keys::RUNTIME_ARN)?;
        let client_id = ctx.optional(keys::CLIENT_ID);
        let pool_id = ctx.optional(keys::POOL_ID);

        let dir = ctx.settings.artifact_path(APP_DIR);
        let config = serde_json::json!({
            "runtime_arn": runtime_arn,
            "client_id": client_id,
            "pool_id": pool_id,
            "region": ctx.region(),
        });
        let config_path = dir.join("config.json");
        let content = serde_json::to_string_pretty(&config)
            .map_err(|e| StageError::local(&config_path, std::io::Error::other(e)))?;

        write_artifact(&config_path, &content).await?;
        write_artifact(&dir.join("requirements.txt"), APP_REQUIREMENTS).await?;

        let mut output = StageOutput::new();
        output.produce(keys::FRONTEND_DIR, dir.display().to_string());
        output.produce(keys::FRONTEND_URL, self.frontend_url(ctx.region()));
        Ok(output)
    }
}
