//! Resource descriptors shared by every client implementation

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Kind of externally managed resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceCategory {
    /// Agent memory store
    Memory,
    /// MCP tool gateway
    Gateway,
    /// Target attached to a gateway (nested under the gateway id)
    GatewayTarget,
    /// Agent runtime
    Runtime,
    /// Container image repository backing a runtime
    Registry,
    /// Identity (user) pool
    IdentityPool,
    /// App client of an identity pool (nested under the pool id)
    PoolClient,
    /// IAM role
    Role,
    /// Remote parameter
    Parameter,
    /// Stored secret
    Secret,
    /// Log group
    LogGroup,
    /// File or directory generated in the working directory
    LocalArtifact,
}

impl ResourceCategory {
    pub const ALL: [ResourceCategory; 12] = [
        ResourceCategory::Memory,
        ResourceCategory::Gateway,
        ResourceCategory::GatewayTarget,
        ResourceCategory::Runtime,
        ResourceCategory::Registry,
        ResourceCategory::IdentityPool,
        ResourceCategory::PoolClient,
        ResourceCategory::Role,
        ResourceCategory::Parameter,
        ResourceCategory::Secret,
        ResourceCategory::LogGroup,
        ResourceCategory::LocalArtifact,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceCategory::Memory => "memory",
            ResourceCategory::Gateway => "gateway",
            ResourceCategory::GatewayTarget => "gateway-target",
            ResourceCategory::Runtime => "runtime",
            ResourceCategory::Registry => "registry",
            ResourceCategory::IdentityPool => "identity-pool",
            ResourceCategory::PoolClient => "pool-client",
            ResourceCategory::Role => "role",
            ResourceCategory::Parameter => "parameter",
            ResourceCategory::Secret => "secret",
            ResourceCategory::LogGroup => "log-group",
            ResourceCategory::LocalArtifact => "local-artifact",
        }
    }

    /// Categories whose key is the conventional name rather than a
    /// provider-generated id
    pub fn uses_name_as_key(&self) -> bool {
        matches!(
            self,
            ResourceCategory::Registry
                | ResourceCategory::Role
                | ResourceCategory::Parameter
                | ResourceCategory::Secret
                | ResourceCategory::LogGroup
                | ResourceCategory::LocalArtifact
        )
    }

    /// Nested categories are addressed as `parent/child`
    pub fn is_nested(&self) -> bool {
        matches!(
            self,
            ResourceCategory::GatewayTarget | ResourceCategory::PoolClient
        )
    }
}

impl std::fmt::Display for ResourceCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Build the key of a nested resource
pub fn nested_key(parent: &str, child: &str) -> String {
    format!("{}/{}", parent, child)
}

/// Split a nested key into `(parent, child)`
pub fn split_nested_key(key: &str) -> Option<(&str, &str)> {
    key.split_once('/')
        .filter(|(parent, child)| !parent.is_empty() && !child.is_empty())
}

/// Lifecycle status reported by the remote side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceStatus {
    Creating,
    Ready,
    Failed,
    Deleting,
    Unknown,
}

impl ResourceStatus {
    /// Map a remote status string (`ACTIVE`, `READY`, `CREATE_FAILED`, ...)
    pub fn from_remote(status: &str) -> Self {
        match status.to_ascii_uppercase().as_str() {
            "CREATING" | "UPDATING" | "PENDING" => ResourceStatus::Creating,
            "ACTIVE" | "READY" | "AVAILABLE" => ResourceStatus::Ready,
            "FAILED" | "CREATE_FAILED" | "UPDATE_FAILED" => ResourceStatus::Failed,
            "DELETING" => ResourceStatus::Deleting,
            _ => ResourceStatus::Unknown,
        }
    }
}

impl std::fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceStatus::Creating => write!(f, "creating"),
            ResourceStatus::Ready => write!(f, "ready"),
            ResourceStatus::Failed => write!(f, "failed"),
            ResourceStatus::Deleting => write!(f, "deleting"),
            ResourceStatus::Unknown => write!(f, "unknown"),
        }
    }
}

/// Identifies one externally managed resource
///
/// Handles are never patched in place: recreating a resource yields a new handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceHandle {
    pub category: ResourceCategory,

    /// Provider-side identifier (or name, for name-addressed resources)
    pub id: String,

    pub region: String,

    /// Extra identifiers such as `name`, `arn`, `url`, `status`, `value`
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl ResourceHandle {
    pub fn new(
        category: ResourceCategory,
        id: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        Self {
            category,
            id: id.into(),
            region: region.into(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    pub fn name(&self) -> Option<&str> {
        self.attribute("name")
    }

    pub fn arn(&self) -> Option<&str> {
        self.attribute("arn")
    }

    pub fn status(&self) -> ResourceStatus {
        self.attribute("status")
            .map(ResourceStatus::from_remote)
            .unwrap_or(ResourceStatus::Unknown)
    }

    /// Key accepted by `describe` / `delete` for this handle
    pub fn key(&self) -> String {
        match self.attribute("parent") {
            Some(parent) if self.category.is_nested() => nested_key(parent, &self.id),
            _ => self.id.clone(),
        }
    }
}

/// Desired configuration of a resource to create
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceSpec {
    pub category: ResourceCategory,

    /// Conventional name of the resource
    pub name: String,

    /// Parent identifier for nested categories
    pub parent: Option<String>,

    /// Category-specific configuration
    pub config: serde_json::Value,
}

impl ResourceSpec {
    pub fn new(category: ResourceCategory, name: impl Into<String>) -> Self {
        Self {
            category,
            name: name.into(),
            parent: None,
            config: serde_json::Value::Object(serde_json::Map::new()),
        }
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn with_config(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        if let serde_json::Value::Object(map) = &mut self.config {
            map.insert(key.into(), value);
        }
        self
    }

    pub fn config_value(&self, key: &str) -> Option<&serde_json::Value> {
        self.config.get(key)
    }

    pub fn config_str(&self, key: &str) -> Option<&str> {
        self.config.get(key).and_then(|v| v.as_str())
    }
}

/// Outcome of a delete call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Deletion {
    Deleted,
    /// The resource did not exist
    Absent,
}
