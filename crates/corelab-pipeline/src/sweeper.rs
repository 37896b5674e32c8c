//! Best-effort teardown of everything the stages provision
//!
//! The sweeper never stops at a failure: every deletion is attempted, and the
//! result of each one is written to a [`CleanupLedger`].

use crate::error::{ErrorClass, ErrorRecord};
use crate::stage::keys;
use crate::state::{ClearOutcome, ClearResult, PersistedConfig, StateStore};
use corelab_cloud::{CloudError, Deletion, ResourceCategory, ResourceClient};
use corelab_config::Settings;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

/// Group of resources swept together, in sweep order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepCategory {
    Memory,
    Runtime,
    Gateway,
    Identity,
    Observability,
    LocalArtifacts,
}

impl SweepCategory {
    pub const ALL: [SweepCategory; 6] = [
        SweepCategory::Memory,
        SweepCategory::Runtime,
        SweepCategory::Gateway,
        SweepCategory::Identity,
        SweepCategory::Observability,
        SweepCategory::LocalArtifacts,
    ];
}

impl std::fmt::Display for SweepCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SweepCategory::Memory => "memory",
            SweepCategory::Runtime => "runtime",
            SweepCategory::Gateway => "gateway",
            SweepCategory::Identity => "identity",
            SweepCategory::Observability => "observability",
            SweepCategory::LocalArtifacts => "local artifacts",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepStatus {
    Deleted,
    /// Already gone
    Absent,
    Failed(String),
}

/// One deletion attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepOutcome {
    pub target: String,
    pub status: SweepStatus,
}

/// Per-category record of a sweep
#[derive(Debug, Clone, Default)]
pub struct CleanupLedger {
    entries: BTreeMap<SweepCategory, Vec<SweepOutcome>>,
}

impl CleanupLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(
        &mut self,
        category: SweepCategory,
        target: impl Into<String>,
        status: SweepStatus,
    ) {
        let target = target.into();
        match &status {
            SweepStatus::Deleted => tracing::info!("Deleted {} {}", category, target),
            SweepStatus::Absent => tracing::debug!("{} {} already gone", category, target),
            SweepStatus::Failed(e) => {
                tracing::warn!("Failed to delete {} {}: {}", category, target, e)
            }
        }
        self.entries
            .entry(category)
            .or_default()
            .push(SweepOutcome { target, status });
    }

    pub fn entries(&self) -> impl Iterator<Item = (SweepCategory, &[SweepOutcome])> {
        self.entries.iter().map(|(c, o)| (*c, o.as_slice()))
    }

    pub fn outcomes(&self, category: SweepCategory) -> &[SweepOutcome] {
        self.entries.get(&category).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn failures(&self) -> Vec<(SweepCategory, &SweepOutcome)> {
        self.entries
            .iter()
            .flat_map(|(c, outcomes)| outcomes.iter().map(move |o| (*c, o)))
            .filter(|(_, o)| matches!(o.status, SweepStatus::Failed(_)))
            .collect()
    }

    pub fn count(&self, status: &SweepStatus) -> usize {
        self.entries
            .values()
            .flatten()
            .filter(|o| std::mem::discriminant(&o.status) == std::mem::discriminant(status))
            .count()
    }

    /// Nothing failed
    pub fn is_clean(&self) -> bool {
        self.failures().is_empty()
    }

    /// Summary error when at least one deletion failed
    pub fn partial_failure(&self) -> Option<ErrorRecord> {
        let failures = self.failures();
        if failures.is_empty() {
            return None;
        }
        let targets: Vec<String> = failures
            .iter()
            .map(|(c, o)| format!("{} {}", c, o.target))
            .collect();
        Some(ErrorRecord {
            class: ErrorClass::CleanupPartialFailure,
            message: format!(
                "{} resource(s) could not be deleted: {}",
                failures.len(),
                targets.join(", ")
            ),
            hint: ErrorClass::CleanupPartialFailure.hint().to_string(),
        })
    }
}

fn status_of(result: Result<Deletion, CloudError>) -> SweepStatus {
    match result {
        Ok(Deletion::Deleted) => SweepStatus::Deleted,
        Ok(Deletion::Absent) => SweepStatus::Absent,
        Err(e) if e.is_not_found() => SweepStatus::Absent,
        Err(e) => SweepStatus::Failed(e.to_string()),
    }
}

fn clear_status(result: &ClearResult) -> SweepStatus {
    match result {
        ClearResult::Removed => SweepStatus::Deleted,
        ClearResult::Absent => SweepStatus::Absent,
        ClearResult::Failed(e) => SweepStatus::Failed(e.clone()),
    }
}

pub struct Sweeper {
    client: Arc<dyn ResourceClient>,
    store: Arc<dyn StateStore>,
    settings: Settings,
}

impl Sweeper {
    pub fn new(
        client: Arc<dyn ResourceClient>,
        store: Arc<dyn StateStore>,
        settings: Settings,
    ) -> Self {
        Self {
            client,
            store,
            settings,
        }
    }

    /// Delete every known resource; never fails
    pub async fn sweep(&self) -> CleanupLedger {
        let mut ledger = CleanupLedger::new();

        let config = match self.store.load().await {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Could not read persisted state, using conventional names: {}", e);
                PersistedConfig::new()
            }
        };

        for category in SweepCategory::ALL {
            tracing::debug!("Sweeping {}", category);
            match category {
                SweepCategory::Memory => self.sweep_memory(&config, &mut ledger).await,
                SweepCategory::Runtime => self.sweep_runtime(&config, &mut ledger).await,
                SweepCategory::Gateway => self.sweep_gateway(&config, &mut ledger).await,
                SweepCategory::Identity => self.sweep_identity(&config, &mut ledger).await,
                SweepCategory::Observability => self.sweep_log_groups(&mut ledger).await,
                SweepCategory::LocalArtifacts => self.sweep_local(&mut ledger).await,
            }
        }

        ledger
    }

    /// Key of a resource: remembered id, else lookup by conventional name
    async fn locate(
        &self,
        category: ResourceCategory,
        known: Option<&str>,
        name: &str,
    ) -> Result<Option<String>, CloudError> {
        if let Some(key) = known.filter(|k| !PersistedConfig::is_placeholder(k)) {
            return Ok(Some(key.to_string()));
        }
        Ok(self
            .client
            .find_by_name(category, name, None)
            .await?
            .map(|handle| handle.key()))
    }

    async fn delete_located(
        &self,
        ledger: &mut CleanupLedger,
        sweep: SweepCategory,
        category: ResourceCategory,
        known: Option<&str>,
        name: &str,
    ) -> Option<String> {
        match self.locate(category, known, name).await {
            Ok(Some(key)) => {
                let status = status_of(self.client.delete(category, &key).await);
                ledger.record(sweep, format!("{} {}", category, key), status);
                Some(key)
            }
            Ok(None) => {
                ledger.record(sweep, format!("{} {}", category, name), SweepStatus::Absent);
                None
            }
            Err(e) => {
                ledger.record(
                    sweep,
                    format!("{} {}", category, name),
                    SweepStatus::Failed(e.to_string()),
                );
                None
            }
        }
    }

    async fn delete_named(
        &self,
        ledger: &mut CleanupLedger,
        sweep: SweepCategory,
        category: ResourceCategory,
        name: &str,
    ) {
        let status = status_of(self.client.delete(category, name).await);
        ledger.record(sweep, format!("{} {}", category, name), status);
    }

    async fn sweep_memory(&self, config: &PersistedConfig, ledger: &mut CleanupLedger) {
        self.delete_located(
            ledger,
            SweepCategory::Memory,
            ResourceCategory::Memory,
            config.get(keys::MEMORY_ID),
            &self.settings.names.memory,
        )
        .await;
    }

    async fn sweep_runtime(&self, config: &PersistedConfig, ledger: &mut CleanupLedger) {
        let names = &self.settings.names;
        self.delete_located(
            ledger,
            SweepCategory::Runtime,
            ResourceCategory::Runtime,
            config.get(keys::RUNTIME_ID),
            &names.runtime,
        )
        .await;
        self.delete_named(
            ledger,
            SweepCategory::Runtime,
            ResourceCategory::Registry,
            &names.registry,
        )
        .await;
    }

    async fn sweep_gateway(&self, config: &PersistedConfig, ledger: &mut CleanupLedger) {
        let gateway_id = match self
            .locate(
                ResourceCategory::Gateway,
                config.get(keys::GATEWAY_ID),
                &self.settings.names.gateway,
            )
            .await
        {
            Ok(Some(id)) => id,
            Ok(None) => {
                ledger.record(
                    SweepCategory::Gateway,
                    format!("gateway {}", self.settings.names.gateway),
                    SweepStatus::Absent,
                );
                return;
            }
            Err(e) => {
                ledger.record(
                    SweepCategory::Gateway,
                    format!("gateway {}", self.settings.names.gateway),
                    SweepStatus::Failed(e.to_string()),
                );
                return;
            }
        };

        // Targets block gateway deletion
        match self
            .client
            .list(ResourceCategory::GatewayTarget, &gateway_id)
            .await
        {
            Ok(targets) => {
                for target in targets {
                    let key = target.key();
                    let status =
                        status_of(self.client.delete(ResourceCategory::GatewayTarget, &key).await);
                    let target = format!("gateway-target {}", key);
                    ledger.record(SweepCategory::Gateway, target, status);
                }
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => ledger.record(
                SweepCategory::Gateway,
                format!("gateway-target {}/*", gateway_id),
                SweepStatus::Failed(e.to_string()),
            ),
        }

        let status = status_of(self.client.delete(ResourceCategory::Gateway, &gateway_id).await);
        ledger.record(SweepCategory::Gateway, format!("gateway {}", gateway_id), status);
    }

    async fn sweep_identity(&self, config: &PersistedConfig, ledger: &mut CleanupLedger) {
        let names = &self.settings.names;
        for role in [&names.execution_role, &names.gateway_role] {
            self.delete_named(ledger, SweepCategory::Identity, ResourceCategory::Role, role)
                .await;
        }

        // Deleting the pool also removes its app clients
        self.delete_located(
            ledger,
            SweepCategory::Identity,
            ResourceCategory::IdentityPool,
            config.get(keys::POOL_ID),
            &names.identity_pool,
        )
        .await;

        self.delete_named(ledger, SweepCategory::Identity, ResourceCategory::Secret, &names.secret)
            .await;

        match self.store.clear().await {
            Ok(outcomes) => {
                for ClearOutcome {
                    target,
                    remote,
                    result,
                } in outcomes
                {
                    let category = if remote {
                        SweepCategory::Identity
                    } else {
                        SweepCategory::LocalArtifacts
                    };
                    ledger.record(category, target, clear_status(&result));
                }
            }
            Err(e) => ledger.record(
                SweepCategory::Identity,
                self.settings.parameter_prefix.clone(),
                SweepStatus::Failed(e.to_string()),
            ),
        }
    }

    async fn sweep_log_groups(&self, ledger: &mut CleanupLedger) {
        for prefix in &self.settings.log_group_prefixes {
            match self.client.list(ResourceCategory::LogGroup, prefix).await {
                Ok(groups) if groups.is_empty() => {
                    ledger.record(
                        SweepCategory::Observability,
                        format!("log-group {}*", prefix),
                        SweepStatus::Absent,
                    );
                }
                Ok(groups) => {
                    for group in groups {
                        self.delete_named(
                            ledger,
                            SweepCategory::Observability,
                            ResourceCategory::LogGroup,
                            &group.id,
                        )
                        .await;
                    }
                }
                Err(e) => ledger.record(
                    SweepCategory::Observability,
                    format!("log-group {}*", prefix),
                    SweepStatus::Failed(e.to_string()),
                ),
            }
        }
    }

    async fn sweep_local(&self, ledger: &mut CleanupLedger) {
        let state_file = self.settings.state_path();
        for name in &self.settings.local_artifacts {
            let path = self.settings.artifact_path(name);
            // Removed through the state store
            if path == state_file {
                continue;
            }
            let status = match remove_path(&path).await {
                Ok(true) => SweepStatus::Deleted,
                Ok(false) => SweepStatus::Absent,
                Err(e) => SweepStatus::Failed(e.to_string()),
            };
            ledger.record(SweepCategory::LocalArtifacts, path.display().to_string(), status);
        }
    }
}

/// Remove a file or directory tree; `false` when it did not exist
async fn remove_path(path: &Path) -> std::io::Result<bool> {
    let metadata = match tokio::fs::symlink_metadata(path).await {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    };
    if metadata.is_dir() {
        tokio::fs::remove_dir_all(path).await?;
    } else {
        tokio::fs::remove_file(path).await?;
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::Orchestrator;
    use crate::stages::test_support::SummaryListClient;
    use crate::state::{LayeredStore, LocalFileStore, ParameterStore};
    use corelab_cloud::{InMemoryClient, Operation, ResourceSpec};

    struct Fixture {
        _dir: tempfile::TempDir,
        client: Arc<InMemoryClient>,
        store: Arc<LayeredStore>,
        settings: Settings,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let client = Arc::new(InMemoryClient::new("us-east-1"));
        let mut settings = Settings {
            work_dir: dir.path().to_path_buf(),
            ..Settings::default()
        };
        settings.poll.interval_secs = 0;
        let store = Arc::new(LayeredStore::new(
            LocalFileStore::new(settings.state_path()),
            Some(ParameterStore::new(client.clone(), &settings.parameter_prefix)),
        ));
        Fixture {
            _dir: dir,
            client,
            store,
            settings,
        }
    }

    impl Fixture {
        fn sweeper(&self) -> Sweeper {
            Sweeper::new(self.client.clone(), self.store.clone(), self.settings.clone())
        }

        async fn provision(&self) {
            let report = Orchestrator::new(
                self.client.clone(),
                self.store.clone(),
                self.settings.clone(),
            )
            .run_all()
            .await;
            assert!(report.success());
            self.client
                .create(&ResourceSpec::new(
                    ResourceCategory::LogGroup,
                    "/aws/bedrock/agentcore/runtime/customer_support_agent",
                ))
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_sweep_removes_everything() {
        let fx = fixture();
        fx.provision().await;
        assert!(fx.settings.artifact_path("runtime_agent").exists());

        let ledger = fx.sweeper().sweep().await;

        assert!(ledger.is_clean(), "{:?}", ledger.failures());
        assert!(ledger.partial_failure().is_none());
        for category in [
            ResourceCategory::Memory,
            ResourceCategory::Gateway,
            ResourceCategory::Runtime,
            ResourceCategory::Registry,
            ResourceCategory::IdentityPool,
            ResourceCategory::PoolClient,
            ResourceCategory::Role,
            ResourceCategory::Secret,
            ResourceCategory::Parameter,
            ResourceCategory::LogGroup,
        ] {
            assert_eq!(fx.client.len_of(category), 0, "{} left behind", category);
        }
        assert!(!fx.settings.state_path().exists());
        assert!(!fx.settings.artifact_path("runtime_agent").exists());
        assert!(!fx.settings.artifact_path("streamlit_app").exists());
    }

    #[tokio::test]
    async fn test_second_sweep_only_finds_absent() {
        let fx = fixture();
        fx.provision().await;
        fx.sweeper().sweep().await;

        let ledger = fx.sweeper().sweep().await;

        assert!(ledger.is_clean());
        assert_eq!(ledger.count(&SweepStatus::Deleted), 0);
        assert!(ledger.count(&SweepStatus::Absent) > 0);
        for category in SweepCategory::ALL {
            assert!(!ledger.outcomes(category).is_empty(), "{} not swept", category);
        }
    }

    #[tokio::test]
    async fn test_failures_do_not_stop_the_sweep() {
        let fx = fixture();
        fx.provision().await;
        fx.client.fail(Operation::Delete, ResourceCategory::Gateway);
        fx.client.fail(Operation::Delete, ResourceCategory::Memory);

        let ledger = fx.sweeper().sweep().await;

        let failed: Vec<SweepCategory> = ledger.failures().iter().map(|(c, _)| *c).collect();
        assert_eq!(failed, vec![SweepCategory::Memory, SweepCategory::Gateway]);
        let record = ledger.partial_failure().unwrap();
        assert_eq!(record.class, ErrorClass::CleanupPartialFailure);

        // Later categories were still processed
        assert_eq!(fx.client.len_of(ResourceCategory::Runtime), 0);
        assert_eq!(fx.client.len_of(ResourceCategory::Role), 0);
        assert!(!fx.settings.state_path().exists());
    }

    #[tokio::test]
    async fn test_gateway_targets_are_removed_first() {
        let fx = fixture();
        let gateway = fx
            .client
            .create(&ResourceSpec::new(ResourceCategory::Gateway, "customersupport-gw"))
            .await
            .unwrap();
        fx.client
            .create(
                &ResourceSpec::new(ResourceCategory::GatewayTarget, "LambdaToolsTarget")
                    .with_parent(&gateway.id),
            )
            .await
            .unwrap();

        let ledger = fx.sweeper().sweep().await;

        let gateway_outcomes = ledger.outcomes(SweepCategory::Gateway);
        assert_eq!(gateway_outcomes.len(), 2);
        assert!(gateway_outcomes[0].target.starts_with("gateway-target "));
        assert!(gateway_outcomes
            .iter()
            .all(|o| o.status == SweepStatus::Deleted));
        assert_eq!(fx.client.len_of(ResourceCategory::Gateway), 0);
    }

    #[tokio::test]
    async fn test_second_sweep_finds_survivors_by_name() {
        let fx = fixture();
        fx.provision().await;
        fx.client.fail(Operation::Delete, ResourceCategory::Memory);

        let first = fx.sweeper().sweep().await;
        assert!(!first.is_clean());
        assert_eq!(fx.client.len_of(ResourceCategory::Memory), 1);
        // Remembered ids are gone with the state file
        assert!(!fx.settings.state_path().exists());

        fx.client.heal(Operation::Delete, ResourceCategory::Memory);
        let lists_before = fx.client.count(Operation::List, ResourceCategory::Memory);
        let second = fx.sweeper().sweep().await;

        assert!(second.is_clean(), "{:?}", second.failures());
        assert_eq!(fx.client.len_of(ResourceCategory::Memory), 0);
        assert!(fx.client.count(Operation::List, ResourceCategory::Memory) > lists_before);
        let memory = second.outcomes(SweepCategory::Memory);
        assert_eq!(memory.len(), 1);
        assert_eq!(memory[0].status, SweepStatus::Deleted);
    }

    #[tokio::test]
    async fn test_sweep_by_name_with_summary_listings() {
        let fx = fixture();
        fx.provision().await;
        // Forget every remembered id
        fx.store.clear().await.unwrap();
        let client = Arc::new(SummaryListClient::new(fx.client.clone()));

        let ledger = Sweeper::new(client, fx.store.clone(), fx.settings.clone())
            .sweep()
            .await;

        assert!(ledger.is_clean(), "{:?}", ledger.failures());
        for category in [
            ResourceCategory::Memory,
            ResourceCategory::Gateway,
            ResourceCategory::Runtime,
            ResourceCategory::IdentityPool,
        ] {
            assert_eq!(fx.client.len_of(category), 0, "{} left behind", category);
        }
    }

    #[tokio::test]
    async fn test_sweep_on_empty_account() {
        let fx = fixture();
        let ledger = fx.sweeper().sweep().await;

        assert!(ledger.is_clean());
        assert_eq!(ledger.count(&SweepStatus::Deleted), 0);
    }
}
