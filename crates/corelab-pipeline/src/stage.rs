//! Stage model: identifiers, results, run context and the `Stage` trait

use crate::error::{ErrorRecord, Result, StageError};
use crate::state::PersistedConfig;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use corelab_cloud::{PollConfig, ResourceClient};
use corelab_config::Settings;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Keys exchanged between stages through `PersistedConfig`
pub mod keys {
    pub const MEMORY_ID: &str = "memory_id";
    pub const POOL_ID: &str = "pool_id";
    pub const CLIENT_ID: &str = "client_id";
    pub const COGNITO_DISCOVERY_URL: &str = "cognito_discovery_url";
    pub const GATEWAY_IAM_ROLE: &str = "gateway_iam_role";
    pub const GATEWAY_ID: &str = "gateway_id";
    pub const GATEWAY_URL: &str = "gateway_url";
    pub const LAMBDA_ARN: &str = "lambda_arn";
    pub const EXECUTION_ROLE_ARN: &str = "execution_role_arn";
    pub const REGISTRY_URI: &str = "registry_uri";
    pub const RUNTIME_ARN: &str = "runtime_arn";
    pub const RUNTIME_ID: &str = "runtime_id";
    pub const FRONTEND_DIR: &str = "frontend_dir";
    pub const FRONTEND_URL: &str = "frontend_url";
}

/// Provisioning stage identifier, in forward order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageId {
    Memory,
    Identity,
    Gateway,
    Runtime,
    Frontend,
}

impl StageId {
    pub const ALL: [StageId; 5] = [
        StageId::Memory,
        StageId::Identity,
        StageId::Gateway,
        StageId::Runtime,
        StageId::Frontend,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StageId::Memory => "memory",
            StageId::Identity => "identity",
            StageId::Gateway => "gateway",
            StageId::Runtime => "runtime",
            StageId::Frontend => "frontend",
        }
    }

    /// 1-based position in the forward order
    pub fn number(&self) -> usize {
        StageId::ALL
            .iter()
            .position(|s| s == self)
            .map(|i| i + 1)
            .unwrap_or(0)
    }

    /// Keys this stage writes into `PersistedConfig`
    pub fn produces(&self) -> &'static [&'static str] {
        match self {
            StageId::Memory => &[keys::MEMORY_ID],
            StageId::Identity => &[
                keys::POOL_ID,
                keys::CLIENT_ID,
                keys::COGNITO_DISCOVERY_URL,
                keys::GATEWAY_IAM_ROLE,
            ],
            StageId::Gateway => &[keys::GATEWAY_ID, keys::GATEWAY_URL],
            StageId::Runtime => &[
                keys::EXECUTION_ROLE_ARN,
                keys::REGISTRY_URI,
                keys::RUNTIME_ARN,
                keys::RUNTIME_ID,
            ],
            StageId::Frontend => &[keys::FRONTEND_DIR, keys::FRONTEND_URL],
        }
    }

    /// Stage that produces `key`, if any
    pub fn producer_of(key: &str) -> Option<StageId> {
        StageId::ALL
            .into_iter()
            .find(|stage| stage.produces().contains(&key))
    }
}

impl std::fmt::Display for StageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for StageId {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        StageId::ALL
            .into_iter()
            .find(|stage| stage.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                let known: Vec<&str> = StageId::ALL.iter().map(|s| s.as_str()).collect();
                format!("unknown stage `{}` (expected one of: {})", s, known.join(", "))
            })
    }
}

/// Outcome of one stage run; never modified once built
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageResult {
    pub stage_id: StageId,
    pub succeeded: bool,
    pub produced: BTreeMap<String, String>,
    pub error: Option<ErrorRecord>,
    /// Non-fatal failures (optional steps, smoke tests)
    pub warnings: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl StageResult {
    pub fn success(stage_id: StageId, output: StageOutput, started_at: DateTime<Utc>) -> Self {
        Self {
            stage_id,
            succeeded: true,
            produced: output.produced,
            error: None,
            warnings: output.warnings,
            started_at,
            finished_at: Utc::now(),
        }
    }

    pub fn failure(stage_id: StageId, error: &StageError, started_at: DateTime<Utc>) -> Self {
        Self {
            stage_id,
            succeeded: false,
            produced: BTreeMap::new(),
            error: Some(error.to_record()),
            warnings: Vec::new(),
            started_at,
            finished_at: Utc::now(),
        }
    }

    pub fn elapsed(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

/// Results of the current run, appended in execution order
#[derive(Debug, Clone, Default)]
pub struct PipelineState {
    results: Vec<StageResult>,
}

impl PipelineState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, result: StageResult) {
        self.results.push(result);
    }

    pub fn get(&self, stage_id: StageId) -> Option<&StageResult> {
        self.results.iter().rev().find(|r| r.stage_id == stage_id)
    }

    /// Value produced for `key` by a successful stage of this run
    pub fn produced(&self, key: &str) -> Option<&str> {
        self.results
            .iter()
            .rev()
            .filter(|r| r.succeeded)
            .find_map(|r| r.produced.get(key).map(String::as_str))
    }

    pub fn results(&self) -> &[StageResult] {
        &self.results
    }

    pub fn into_results(self) -> Vec<StageResult> {
        self.results
    }
}

/// Identifiers and warnings emitted by a successful stage
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StageOutput {
    pub produced: BTreeMap<String, String>,
    pub warnings: Vec<String>,
}

impl StageOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn produce(&mut self, key: &str, value: impl Into<String>) {
        self.produced.insert(key.to_string(), value.into());
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!("{}", message);
        self.warnings.push(message);
    }
}

/// Everything a stage may read while running
pub struct StageContext<'a> {
    pub client: &'a dyn ResourceClient,
    pub settings: &'a Settings,
    pub config: &'a PersistedConfig,
    pub pipeline: &'a PipelineState,
    pub poll: PollConfig,
}

impl<'a> StageContext<'a> {
    pub fn new(
        client: &'a dyn ResourceClient,
        settings: &'a Settings,
        config: &'a PersistedConfig,
        pipeline: &'a PipelineState,
    ) -> Self {
        Self {
            client,
            settings,
            config,
            pipeline,
            poll: PollConfig::new(settings.poll.max_attempts, settings.poll.interval()),
        }
    }

    pub fn region(&self) -> &str {
        self.client.region()
    }

    /// Resolve an input: this run's outputs first, then the persisted record
    pub fn input(&self, key: &str) -> Option<&str> {
        self.pipeline
            .produced(key)
            .or_else(|| self.config.get(key))
            .filter(|value| !PersistedConfig::is_placeholder(value))
    }

    /// Resolve a hard-required input
    pub fn require(&self, key: &str) -> Result<&str> {
        self.input(key).ok_or_else(|| StageError::MissingDependency {
            key: key.to_string(),
            producer: StageId::producer_of(key).unwrap_or(StageId::Memory),
        })
    }

    /// Resolve an optional input, substituting a marked placeholder when absent
    pub fn optional(&self, key: &str) -> String {
        match self.input(key) {
            Some(value) => value.to_string(),
            None => {
                tracing::warn!("`{}` not available, using placeholder", key);
                PersistedConfig::placeholder(key)
            }
        }
    }
}

/// One provisioning stage
#[async_trait]
pub trait Stage: Send + Sync {
    fn id(&self) -> StageId;

    /// Short human-readable description shown while the stage runs
    fn description(&self) -> &str;

    /// Perform the stage; errors are converted to a failed result by the caller
    async fn execute(&self, ctx: &StageContext<'_>) -> Result<StageOutput>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_id_parse_and_order() {
        assert_eq!("gateway".parse::<StageId>().unwrap(), StageId::Gateway);
        assert_eq!("Runtime".parse::<StageId>().unwrap(), StageId::Runtime);
        assert!("lab3".parse::<StageId>().is_err());
        assert_eq!(StageId::Memory.number(), 1);
        assert_eq!(StageId::Frontend.number(), 5);
        assert!(StageId::Identity < StageId::Gateway);
    }

    #[test]
    fn test_producer_of() {
        assert_eq!(StageId::producer_of(keys::MEMORY_ID), Some(StageId::Memory));
        assert_eq!(StageId::producer_of(keys::GATEWAY_URL), Some(StageId::Gateway));
        assert_eq!(StageId::producer_of(keys::RUNTIME_ARN), Some(StageId::Runtime));
        assert_eq!(StageId::producer_of(keys::LAMBDA_ARN), None);
    }

    #[test]
    fn test_pipeline_state_prefers_latest_success() {
        let now = Utc::now();
        let mut state = PipelineState::new();

        let mut first = StageOutput::new();
        first.produce(keys::MEMORY_ID, "m-1");
        state.record(StageResult::success(StageId::Memory, first, now));

        let failed = StageError::Authentication("expired".into());
        state.record(StageResult::failure(StageId::Memory, &failed, now));

        assert_eq!(state.produced(keys::MEMORY_ID), Some("m-1"));
        assert!(!state.get(StageId::Memory).unwrap().succeeded);
        assert_eq!(state.results().len(), 2);
    }
}
