pub mod check;
pub mod cleanup;
pub mod stage;
pub mod status;
pub mod up;

use crate::ui::{SpinnerObserver, StdinPrompt};
use colored::Colorize;
use corelab_cloud::{InMemoryClient, ResourceClient};
use corelab_cloud_aws::AwsResourceClient;
use corelab_config::Settings;
use corelab_pipeline::{
    LayeredStore, LocalFileStore, Orchestrator, ParameterStore, Prompt, RunMode, Sweeper,
};
use std::path::PathBuf;
use std::sync::Arc;

/// グローバルオプション
#[derive(Debug, Clone)]
pub struct GlobalOptions {
    pub non_interactive: bool,
    pub simulate: bool,
    pub config: Option<PathBuf>,
}

/// コマンド共通の実行環境
pub struct AppContext {
    pub settings: Settings,
    pub client: Arc<dyn ResourceClient>,
    pub store: Arc<LayeredStore>,
    pub mode: RunMode,
}

impl AppContext {
    pub async fn build(options: &GlobalOptions) -> anyhow::Result<Self> {
        let settings = match &options.config {
            Some(path) => corelab_config::load_settings(Some(path.as_path()))?,
            None => corelab_config::discover_settings()?,
        };
        let region = settings.resolve_region();

        let client: Arc<dyn ResourceClient> = if options.simulate {
            println!(
                "{}",
                "シミュレーションモード: AWS には接続しません".yellow()
            );
            Arc::new(InMemoryClient::new(region))
        } else {
            Arc::new(AwsResourceClient::connect(region).await)
        };

        let store = Arc::new(LayeredStore::new(
            LocalFileStore::new(settings.state_path()),
            Some(ParameterStore::new(
                client.clone(),
                settings.parameter_prefix.clone(),
            )),
        ));

        let mode = if options.non_interactive {
            RunMode::Batch
        } else {
            RunMode::Interactive
        };

        tracing::debug!(
            "Using {} client in {} (state: {})",
            client.name(),
            client.region(),
            settings.state_path().display()
        );

        Ok(Self {
            settings,
            client,
            store,
            mode,
        })
    }

    pub fn interactive(&self) -> bool {
        self.mode == RunMode::Interactive
    }

    /// 対話モードなら質問し、非対話モードなら既定値を返す
    pub fn confirm(&self, question: &str, default: bool) -> bool {
        if self.interactive() {
            StdinPrompt.confirm(question, default)
        } else {
            default
        }
    }

    pub fn orchestrator(&self) -> Orchestrator {
        Orchestrator::new(self.client.clone(), self.store.clone(), self.settings.clone())
            .with_mode(self.mode)
            .with_prompt(Box::new(StdinPrompt))
            .with_observer(Box::new(SpinnerObserver::new()))
    }

    pub fn sweeper(&self) -> Sweeper {
        Sweeper::new(self.client.clone(), self.store.clone(), self.settings.clone())
    }

    pub fn print_header(&self, title: &str) {
        println!("{}", title.bold());
        println!("  リージョン: {}", self.client.region().cyan());
        println!(
            "  状態ファイル: {}",
            self.settings.state_path().display().to_string().cyan()
        );
        println!();
    }
}
