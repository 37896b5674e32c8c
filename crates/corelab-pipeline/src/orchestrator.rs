//! Sequential stage runner
//!
//! Runs stages in forward order, persists each success, and decides after every
//! stage whether to continue. The decision is a pure function of the run mode
//! and the error class ([`decide`]); prompting is delegated to a [`Prompt`].

use crate::error::{ErrorClass, StageError};
use crate::report::{RunOutcome, RunReport};
use crate::stage::{PipelineState, Stage, StageContext, StageId, StageResult};
use crate::stages;
use crate::state::{PersistedConfig, StateStore};
use chrono::Utc;
use corelab_cloud::ResourceClient;
use corelab_config::Settings;
use std::sync::Arc;

/// How continuation decisions are made
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Ask the user between stages
    Interactive,
    /// Never ask; stop at the first failure
    Batch,
}

/// Yes/no question asked between stages
pub trait Prompt: Send + Sync {
    fn confirm(&self, question: &str, default: bool) -> bool;
}

/// Answers every question with its default
pub struct AcceptDefaults;

impl Prompt for AcceptDefaults {
    fn confirm(&self, _question: &str, default: bool) -> bool {
        default
    }
}

/// Progress callbacks
pub trait PipelineObserver: Send + Sync {
    fn on_stage_start(&self, _stage: StageId, _description: &str, _number: usize, _total: usize) {}

    fn on_stage_result(&self, _result: &StageResult) {}
}

/// Observer that ignores every event
pub struct NoopObserver;

impl PipelineObserver for NoopObserver {}

/// Run state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Pending(StageId),
    Running(StageId),
    Succeeded(StageId),
    Failed(StageId),
    Aborted,
    Completed,
}

/// What to do after a stage finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Continue,
    Abort,
    Ask { default: bool },
}

/// Continuation decision for a finished stage (`None` means it succeeded)
pub fn decide(mode: RunMode, error: Option<ErrorClass>) -> Decision {
    match (mode, error) {
        (_, Some(ErrorClass::AuthenticationUnavailable)) => Decision::Abort,
        (RunMode::Batch, None) => Decision::Continue,
        (RunMode::Batch, Some(_)) => Decision::Abort,
        (RunMode::Interactive, None) => Decision::Ask { default: true },
        (RunMode::Interactive, Some(_)) => Decision::Ask { default: false },
    }
}

pub struct Orchestrator {
    client: Arc<dyn ResourceClient>,
    store: Arc<dyn StateStore>,
    settings: Settings,
    mode: RunMode,
    prompt: Box<dyn Prompt>,
    observer: Box<dyn PipelineObserver>,
    stages: Vec<Box<dyn Stage>>,
}

impl Orchestrator {
    pub fn new(
        client: Arc<dyn ResourceClient>,
        store: Arc<dyn StateStore>,
        settings: Settings,
    ) -> Self {
        Self {
            client,
            store,
            settings,
            mode: RunMode::Batch,
            prompt: Box::new(AcceptDefaults),
            observer: Box::new(NoopObserver),
            stages: stages::catalogue(),
        }
    }

    pub fn with_mode(mut self, mode: RunMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_prompt(mut self, prompt: Box<dyn Prompt>) -> Self {
        self.prompt = prompt;
        self
    }

    pub fn with_observer(mut self, observer: Box<dyn PipelineObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Replace the stage catalogue
    pub fn with_stages(mut self, stages: Vec<Box<dyn Stage>>) -> Self {
        self.stages = stages;
        self
    }

    /// Run every stage in forward order
    pub async fn run_all(&self) -> RunReport {
        let selected: Vec<&dyn Stage> = self.stages.iter().map(|s| s.as_ref()).collect();
        self.run(&selected).await
    }

    /// Run a single stage against the persisted record
    pub async fn run_only(&self, stage_id: StageId) -> RunReport {
        let selected: Vec<&dyn Stage> = self
            .stages
            .iter()
            .filter(|s| s.id() == stage_id)
            .map(|s| s.as_ref())
            .collect();
        self.run(&selected).await
    }

    fn transition(&self, state: RunState) {
        tracing::debug!("Pipeline state: {:?}", state);
    }

    async fn preflight(&self) -> Result<PersistedConfig, StageError> {
        match self.client.check_auth().await {
            Ok(status) if status.authenticated => {
                tracing::info!(
                    "Authenticated via {} ({})",
                    self.client.name(),
                    status.account_info.as_deref().unwrap_or("unknown account")
                );
            }
            Ok(status) => {
                return Err(StageError::Authentication(
                    status
                        .error
                        .unwrap_or_else(|| "no credential context".to_string()),
                ));
            }
            Err(e) => return Err(StageError::Authentication(e.to_string())),
        }

        Ok(self.store.load().await?)
    }

    async fn execute_stage(
        &self,
        stage: &dyn Stage,
        config: &mut PersistedConfig,
        pipeline: &PipelineState,
    ) -> StageResult {
        let started_at = Utc::now();
        let outcome = {
            let ctx = StageContext::new(self.client.as_ref(), &self.settings, config, pipeline);
            stage.execute(&ctx).await
        };

        let output = match outcome {
            Ok(output) => output,
            Err(e) => {
                tracing::warn!("Stage {} failed: {}", stage.id(), e);
                return StageResult::failure(stage.id(), &e, started_at);
            }
        };

        let partial = PersistedConfig::from(output.produced.clone());
        match self.store.save(&partial).await {
            Ok(merged) => {
                *config = merged;
                StageResult::success(stage.id(), output, started_at)
            }
            Err(e) => {
                let e = StageError::from(e);
                tracing::warn!("Could not persist outputs of stage {}: {}", stage.id(), e);
                StageResult::failure(stage.id(), &e, started_at)
            }
        }
    }

    fn question(result: &StageResult, next: StageId) -> String {
        if result.succeeded {
            format!("次のステージ ({}) に進みますか?", next)
        } else {
            format!(
                "ステージ {} が失敗しました。失敗を無視して {} に進みますか?",
                result.stage_id, next
            )
        }
    }

    async fn run(&self, selected: &[&dyn Stage]) -> RunReport {
        let ids: Vec<StageId> = selected.iter().map(|s| s.id()).collect();
        for id in &ids {
            self.transition(RunState::Pending(*id));
        }

        let mut pipeline = PipelineState::new();
        let mut config = match self.preflight().await {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Preflight failed: {}", e);
                let Some(first) = ids.first().copied() else {
                    return self.finish(
                        RunOutcome::Aborted,
                        pipeline,
                        Vec::new(),
                        PersistedConfig::new(),
                    );
                };
                let result = StageResult::failure(first, &e, Utc::now());
                self.observer.on_stage_result(&result);
                pipeline.record(result);
                self.transition(RunState::Failed(first));
                return self.finish(
                    RunOutcome::Aborted,
                    pipeline,
                    ids[1..].to_vec(),
                    PersistedConfig::new(),
                );
            }
        };

        let total = selected.len();
        for (index, stage) in selected.iter().enumerate() {
            let id = stage.id();
            self.observer
                .on_stage_start(id, stage.description(), index + 1, total);
            self.transition(RunState::Running(id));

            let result = self.execute_stage(*stage, &mut config, &pipeline).await;
            self.observer.on_stage_result(&result);
            self.transition(if result.succeeded {
                RunState::Succeeded(id)
            } else {
                RunState::Failed(id)
            });

            let class = result.error.as_ref().map(|e| e.class);
            let next = ids.get(index + 1).copied();
            let question = next.map(|next| Self::question(&result, next));
            pipeline.record(result);

            let proceed = match (decide(self.mode, class), question) {
                (Decision::Abort, _) => false,
                // Nothing left to ask about after the last stage
                (_, None) => true,
                (Decision::Continue, Some(_)) => true,
                (Decision::Ask { default }, Some(question)) => {
                    self.prompt.confirm(&question, default)
                }
            };

            if !proceed {
                let skipped = ids[index + 1..].to_vec();
                return self.finish(RunOutcome::Aborted, pipeline, skipped, config);
            }
        }

        self.finish(RunOutcome::Completed, pipeline, Vec::new(), config)
    }

    fn finish(
        &self,
        outcome: RunOutcome,
        pipeline: PipelineState,
        not_attempted: Vec<StageId>,
        config: PersistedConfig,
    ) -> RunReport {
        self.transition(match outcome {
            RunOutcome::Completed => RunState::Completed,
            RunOutcome::Aborted => RunState::Aborted,
        });
        RunReport {
            outcome,
            results: pipeline.into_results(),
            not_attempted,
            config,
        }
    }
}
