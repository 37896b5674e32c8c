//! Cross-stage state store
//!
//! Identifiers produced by one stage are persisted to a flat JSON file in the
//! working directory and mirrored to the remote parameter namespace, so a later
//! invocation (or a single `stage` run) can pick them up.

use crate::error::StateError;
use async_trait::async_trait;
use corelab_cloud::{ResourceCategory, ResourceClient, ResourceSpec};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;

const PLACEHOLDER_PREFIX: &str = "placeholder-";
const BACKUP_SUFFIX: &str = "backup";

pub type Result<T> = std::result::Result<T, StateError>;

/// Durable key-value record shared between stages and invocations
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PersistedConfig {
    values: BTreeMap<String, String>,
}

impl PersistedConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clearly marked stand-in for an optional key that is not available
    pub fn placeholder(key: &str) -> String {
        format!("{}{}", PLACEHOLDER_PREFIX, key)
    }

    pub fn is_placeholder(value: &str) -> bool {
        value.starts_with(PLACEHOLDER_PREFIX)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.values.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Merge `other` into `self`; keys in `other` win
    pub fn merge(&mut self, other: &PersistedConfig) {
        for (key, value) in &other.values {
            self.values.insert(key.clone(), value.clone());
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl From<BTreeMap<String, String>> for PersistedConfig {
    fn from(values: BTreeMap<String, String>) -> Self {
        Self { values }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for PersistedConfig {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Result of removing one piece of persisted state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClearResult {
    Removed,
    Absent,
    Failed(String),
}

/// One entry reported by `StateStore::clear`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClearOutcome {
    /// File path or parameter name
    pub target: String,
    /// Whether the target lives on the remote side
    pub remote: bool,
    pub result: ClearResult,
}

/// Persisted key-value record
///
/// No locking: a single process drives a single run.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn load(&self) -> Result<PersistedConfig>;

    /// Merge `partial` into the stored record and return the merged record
    async fn save(&self, partial: &PersistedConfig) -> Result<PersistedConfig>;

    /// Remove everything this store persisted
    async fn clear(&self) -> Result<Vec<ClearOutcome>>;
}

/// Flat JSON object on the local filesystem
pub struct LocalFileStore {
    path: PathBuf,
}

impl LocalFileStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn backup_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_os_string();
        name.push(".");
        name.push(BACKUP_SUFFIX);
        PathBuf::from(name)
    }

    fn io_error(&self, source: std::io::Error) -> StateError {
        StateError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

#[async_trait]
impl StateStore for LocalFileStore {
    async fn load(&self) -> Result<PersistedConfig> {
        if !self.path.exists() {
            tracing::debug!("State file {} not found, starting empty", self.path.display());
            return Ok(PersistedConfig::new());
        }

        let content = fs::read_to_string(&self.path)
            .await
            .map_err(|e| self.io_error(e))?;
        if content.trim().is_empty() {
            return Ok(PersistedConfig::new());
        }

        let value: serde_json::Value =
            serde_json::from_str(&content).map_err(|source| StateError::Parse {
                path: self.path.clone(),
                source,
            })?;
        let serde_json::Value::Object(map) = value else {
            return Err(StateError::NotAnObject(self.path.clone()));
        };

        // Older files may hold non-string values; keep them as their JSON text
        let config: PersistedConfig = map
            .into_iter()
            .map(|(key, value)| match value {
                serde_json::Value::String(s) => (key, s),
                other => (key, other.to_string()),
            })
            .collect();

        tracing::debug!("Loaded {} keys from {}", config.len(), self.path.display());
        Ok(config)
    }

    async fn save(&self, partial: &PersistedConfig) -> Result<PersistedConfig> {
        let mut merged = self.load().await?;
        merged.merge(partial);

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| self.io_error(e))?;
        }

        // Keep the previous version next to the new one
        if self.path.exists() {
            let backup = self.backup_path();
            fs::copy(&self.path, &backup)
                .await
                .map_err(|e| self.io_error(e))?;
            tracing::debug!("Created state backup {}", backup.display());
        }

        let content = serde_json::to_string_pretty(&merged).map_err(|source| StateError::Parse {
            path: self.path.clone(),
            source,
        })?;
        fs::write(&self.path, content)
            .await
            .map_err(|e| self.io_error(e))?;

        tracing::debug!("Saved {} keys to {}", merged.len(), self.path.display());
        Ok(merged)
    }

    async fn clear(&self) -> Result<Vec<ClearOutcome>> {
        let mut outcomes = Vec::new();
        for path in [self.path.clone(), self.backup_path()] {
            let existed = path.exists();
            let result = if !existed {
                ClearResult::Absent
            } else {
                match fs::remove_file(&path).await {
                    Ok(()) => ClearResult::Removed,
                    Err(e) => ClearResult::Failed(e.to_string()),
                }
            };
            // The backup is only reported when there was one
            if existed || path == self.path {
                outcomes.push(ClearOutcome {
                    target: path.display().to_string(),
                    remote: false,
                    result,
                });
            }
        }
        Ok(outcomes)
    }
}

/// Remote parameter namespace, one parameter per key
pub struct ParameterStore {
    client: Arc<dyn ResourceClient>,
    prefix: String,
}

impl ParameterStore {
    pub fn new(client: Arc<dyn ResourceClient>, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into().trim_end_matches('/').to_string();
        Self { client, prefix }
    }

    /// Full parameter name of `key`
    pub fn parameter_name(&self, key: &str) -> String {
        format!("{}/{}", self.prefix, key)
    }

    fn scope(&self) -> String {
        format!("{}/", self.prefix)
    }
}

#[async_trait]
impl StateStore for ParameterStore {
    async fn load(&self) -> Result<PersistedConfig> {
        let scope = self.scope();
        let handles = self
            .client
            .list(ResourceCategory::Parameter, &scope)
            .await?;

        let config: PersistedConfig = handles
            .iter()
            .filter_map(|handle| {
                let key = handle.id.strip_prefix(&scope)?;
                let value = handle.attribute("value")?;
                // Nested parameters below the namespace are not ours
                (!key.contains('/')).then(|| (key.to_string(), value.to_string()))
            })
            .collect();

        tracing::debug!("Loaded {} keys from {}", config.len(), self.prefix);
        Ok(config)
    }

    async fn save(&self, partial: &PersistedConfig) -> Result<PersistedConfig> {
        for (key, value) in partial.iter() {
            let spec = ResourceSpec::new(ResourceCategory::Parameter, self.parameter_name(key))
                .with_config("value", serde_json::json!(value));
            self.client.create(&spec).await?;
        }
        self.load().await
    }

    async fn clear(&self) -> Result<Vec<ClearOutcome>> {
        let handles = self
            .client
            .list(ResourceCategory::Parameter, &self.scope())
            .await?;

        let mut outcomes = Vec::new();
        for handle in handles {
            let result = match self
                .client
                .delete(ResourceCategory::Parameter, &handle.id)
                .await
            {
                Ok(corelab_cloud::Deletion::Deleted) => ClearResult::Removed,
                Ok(corelab_cloud::Deletion::Absent) => ClearResult::Absent,
                Err(e) => ClearResult::Failed(e.to_string()),
            };
            outcomes.push(ClearOutcome {
                target: handle.id,
                remote: true,
                result,
            });
        }
        Ok(outcomes)
    }
}

/// Where a key of the merged record came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    Local,
    Remote,
    Both,
}

impl std::fmt::Display for KeySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeySource::Local => write!(f, "local"),
            KeySource::Remote => write!(f, "remote"),
            KeySource::Both => write!(f, "local+remote"),
        }
    }
}

/// Local file with a remote mirror; the remote copy wins on load
pub struct LayeredStore {
    local: LocalFileStore,
    remote: Option<ParameterStore>,
}

impl LayeredStore {
    pub fn new(local: LocalFileStore, remote: Option<ParameterStore>) -> Self {
        Self { local, remote }
    }

    pub fn local_path(&self) -> &Path {
        self.local.path()
    }

    async fn load_remote(&self) -> PersistedConfig {
        let Some(remote) = &self.remote else {
            return PersistedConfig::new();
        };
        match remote.load().await {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Remote parameters unavailable, using local state only: {}", e);
                PersistedConfig::new()
            }
        }
    }

    /// Merged record together with the origin of every key
    pub async fn load_with_sources(&self) -> Result<Vec<(String, String, KeySource)>> {
        let local = self.local.load().await?;
        let remote = self.load_remote().await;

        let mut merged = local.clone();
        merged.merge(&remote);

        Ok(merged
            .iter()
            .map(|(key, value)| {
                let source = match (local.contains_key(key), remote.contains_key(key)) {
                    (true, true) => KeySource::Both,
                    (false, true) => KeySource::Remote,
                    _ => KeySource::Local,
                };
                (key.to_string(), value.to_string(), source)
            })
            .collect())
    }
}

#[async_trait]
impl StateStore for LayeredStore {
    async fn load(&self) -> Result<PersistedConfig> {
        let mut merged = self.local.load().await?;
        merged.merge(&self.load_remote().await);
        Ok(merged)
    }

    async fn save(&self, partial: &PersistedConfig) -> Result<PersistedConfig> {
        let mut merged = self.local.save(partial).await?;

        if let Some(remote) = &self.remote {
            match remote.save(partial).await {
                Ok(remote_config) => merged.merge(&remote_config),
                Err(e) => {
                    tracing::warn!("Failed to mirror state to remote parameters: {}", e);
                }
            }
        }
        Ok(merged)
    }

    async fn clear(&self) -> Result<Vec<ClearOutcome>> {
        let mut outcomes = Vec::new();
        if let Some(remote) = &self.remote {
            match remote.clear().await {
                Ok(remote_outcomes) => outcomes.extend(remote_outcomes),
                Err(e) => outcomes.push(ClearOutcome {
                    target: remote.scope(),
                    remote: true,
                    result: ClearResult::Failed(e.to_string()),
                }),
            }
        }
        outcomes.extend(self.local.clear().await?);
        Ok(outcomes)
    }
}
