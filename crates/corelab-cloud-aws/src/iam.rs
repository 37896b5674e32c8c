//! IAM roles used by the gateway and the agent runtime

use crate::error::Result;
use crate::sdk::{conflicting, field, member, missing, required_field, sdk_failure};
use aws_config::SdkConfig;
use aws_sdk_iam::Client;
use aws_sdk_iam::types::Role;

/// Configuration for creating an IAM role
#[derive(Debug, Clone)]
pub struct CreateRoleConfig {
    pub name: String,
    pub trust_policy: serde_json::Value,
    pub managed_policies: Vec<String>,
    pub inline_policies: Vec<(String, serde_json::Value)>,
}

#[derive(Debug, Clone)]
pub struct RoleInfo {
    pub role_name: String,
    pub arn: String,
}

impl RoleInfo {
    fn from_sdk(role: &Role) -> Result<Self> {
        Ok(Self {
            role_name: required_field(role.role_name(), "role name")?,
            arn: required_field(role.arn(), "role arn")?,
        })
    }
}

pub struct RoleClient {
    client: Client,
}

impl RoleClient {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            client: Client::new(config),
        }
    }

    pub async fn get_role(&self, name: &str) -> Result<RoleInfo> {
        let out = self
            .client
            .get_role()
            .role_name(name)
            .send()
            .await
            .map_err(|e| missing(e, |e| e.is_no_such_entity_exception()))?;
        RoleInfo::from_sdk(member(out.role(), "role")?)
    }

    pub async fn list_roles(&self) -> Result<Vec<RoleInfo>> {
        let mut roles = Vec::new();
        let mut marker: Option<String> = None;
        loop {
            let out = self
                .client
                .list_roles()
                .set_marker(marker)
                .send()
                .await
                .map_err(sdk_failure)?;

            for role in out.roles() {
                roles.push(RoleInfo::from_sdk(role)?);
            }

            marker = field(out.marker());
            if marker.is_none() {
                break;
            }
        }
        Ok(roles)
    }

    /// Create a role and attach its managed and inline policies
    pub async fn create_role(&self, config: &CreateRoleConfig) -> Result<RoleInfo> {
        let out = self
            .client
            .create_role()
            .role_name(&config.name)
            .assume_role_policy_document(config.trust_policy.to_string())
            .send()
            .await
            .map_err(|e| conflicting(e, |e| e.is_entity_already_exists_exception()))?;
        let role = RoleInfo::from_sdk(member(out.role(), "role")?)?;

        for policy_arn in &config.managed_policies {
            self.client
                .attach_role_policy()
                .role_name(&config.name)
                .policy_arn(policy_arn)
                .send()
                .await
                .map_err(|e| missing(e, |e| e.is_no_such_entity_exception()))?;
        }
        for (policy_name, document) in &config.inline_policies {
            self.client
                .put_role_policy()
                .role_name(&config.name)
                .policy_name(policy_name)
                .policy_document(document.to_string())
                .send()
                .await
                .map_err(|e| missing(e, |e| e.is_no_such_entity_exception()))?;
        }
        Ok(role)
    }

    /// Delete a role after detaching managed and removing inline policies
    pub async fn delete_role(&self, name: &str) -> Result<()> {
        let attached = self
            .client
            .list_attached_role_policies()
            .role_name(name)
            .send()
            .await
            .map_err(|e| missing(e, |e| e.is_no_such_entity_exception()))?;
        for policy_arn in attached.attached_policies().iter().filter_map(|p| p.policy_arn()) {
            self.client
                .detach_role_policy()
                .role_name(name)
                .policy_arn(policy_arn)
                .send()
                .await
                .map_err(|e| missing(e, |e| e.is_no_such_entity_exception()))?;
        }

        let inline = self
            .client
            .list_role_policies()
            .role_name(name)
            .send()
            .await
            .map_err(|e| missing(e, |e| e.is_no_such_entity_exception()))?;
        for policy_name in inline.policy_names() {
            self.client
                .delete_role_policy()
                .role_name(name)
                .policy_name(policy_name)
                .send()
                .await
                .map_err(|e| missing(e, |e| e.is_no_such_entity_exception()))?;
        }

        self.client
            .delete_role()
            .role_name(name)
            .send()
            .await
            .map_err(|e| missing(e, |e| e.is_no_such_entity_exception()))?;
        Ok(())
    }
}
