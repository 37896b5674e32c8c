//! Cognito user pools and app clients

use crate::error::Result;
use crate::sdk::{field, member, missing, required_field, sdk_failure};
use aws_config::SdkConfig;
use aws_sdk_cognitoidentityprovider::Client;
use aws_sdk_cognitoidentityprovider::types::ExplicitAuthFlowsType;

/// Page size for `ListUserPools`, which requires one
const POOL_PAGE_SIZE: i32 = 60;

/// Auth flows the workshop client signs in with
const AUTH_FLOWS: &[&str] = &["ALLOW_USER_PASSWORD_AUTH", "ALLOW_REFRESH_TOKEN_AUTH"];

#[derive(Debug, Clone)]
pub struct UserPoolInfo {
    pub id: String,
    pub name: Option<String>,
    pub arn: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PoolClientInfo {
    pub client_id: String,
    pub client_name: Option<String>,
}

pub struct CognitoClient {
    client: Client,
}

impl CognitoClient {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            client: Client::new(config),
        }
    }

    // ---- user pools ----

    pub async fn describe_user_pool(&self, pool_id: &str) -> Result<UserPoolInfo> {
        let out = self
            .client
            .describe_user_pool()
            .user_pool_id(pool_id)
            .send()
            .await
            .map_err(|e| missing(e, |e| e.is_resource_not_found_exception()))?;
        let pool = member(out.user_pool(), "user pool")?;
        Ok(UserPoolInfo {
            id: required_field(pool.id(), "user pool id")?,
            name: field(pool.name()),
            arn: field(pool.arn()),
        })
    }

    pub async fn list_user_pools(&self) -> Result<Vec<UserPoolInfo>> {
        let mut pools = Vec::new();
        let mut next_token: Option<String> = None;
        loop {
            let out = self
                .client
                .list_user_pools()
                .max_results(POOL_PAGE_SIZE)
                .set_next_token(next_token)
                .send()
                .await
                .map_err(sdk_failure)?;

            for pool in out.user_pools() {
                if let Some(id) = field(pool.id()) {
                    pools.push(UserPoolInfo {
                        id,
                        name: field(pool.name()),
                        arn: None,
                    });
                }
            }

            next_token = field(out.next_token());
            if next_token.is_none() {
                break;
            }
        }
        Ok(pools)
    }

    pub async fn create_user_pool(&self, name: &str) -> Result<UserPoolInfo> {
        let out = self
            .client
            .create_user_pool()
            .pool_name(name)
            .send()
            .await
            .map_err(sdk_failure)?;
        let pool = member(out.user_pool(), "user pool")?;
        Ok(UserPoolInfo {
            id: required_field(pool.id(), "user pool id")?,
            name: field(pool.name()),
            arn: field(pool.arn()),
        })
    }

    /// Delete a user pool after removing its users
    pub async fn delete_user_pool(&self, pool_id: &str) -> Result<()> {
        let mut pagination_token: Option<String> = None;
        loop {
            let out = self
                .client
                .list_users()
                .user_pool_id(pool_id)
                .set_pagination_token(pagination_token)
                .send()
                .await
                .map_err(|e| missing(e, |e| e.is_resource_not_found_exception()))?;

            for username in out.users().iter().filter_map(|u| u.username()) {
                self.client
                    .admin_delete_user()
                    .user_pool_id(pool_id)
                    .username(username)
                    .send()
                    .await
                    .map_err(|e| missing(e, |e| e.is_user_not_found_exception()))?;
            }

            pagination_token = field(out.pagination_token());
            if pagination_token.is_none() {
                break;
            }
        }

        self.client
            .delete_user_pool()
            .user_pool_id(pool_id)
            .send()
            .await
            .map_err(|e| missing(e, |e| e.is_resource_not_found_exception()))?;
        Ok(())
    }

    // ---- app clients ----

    pub async fn describe_pool_client(
        &self,
        pool_id: &str,
        client_id: &str,
    ) -> Result<PoolClientInfo> {
        let out = self
            .client
            .describe_user_pool_client()
            .user_pool_id(pool_id)
            .client_id(client_id)
            .send()
            .await
            .map_err(|e| missing(e, |e| e.is_resource_not_found_exception()))?;
        let app_client = member(out.user_pool_client(), "user pool client")?;
        Ok(PoolClientInfo {
            client_id: required_field(app_client.client_id(), "client id")?,
            client_name: field(app_client.client_name()),
        })
    }

    pub async fn list_pool_clients(&self, pool_id: &str) -> Result<Vec<PoolClientInfo>> {
        let mut clients = Vec::new();
        let mut next_token: Option<String> = None;
        loop {
            let out = self
                .client
                .list_user_pool_clients()
                .user_pool_id(pool_id)
                .set_next_token(next_token)
                .send()
                .await
                .map_err(|e| missing(e, |e| e.is_resource_not_found_exception()))?;

            for app_client in out.user_pool_clients() {
                if let Some(client_id) = field(app_client.client_id()) {
                    clients.push(PoolClientInfo {
                        client_id,
                        client_name: field(app_client.client_name()),
                    });
                }
            }

            next_token = field(out.next_token());
            if next_token.is_none() {
                break;
            }
        }
        Ok(clients)
    }

    pub async fn create_pool_client(&self, pool_id: &str, name: &str) -> Result<PoolClientInfo> {
        let auth_flows = AUTH_FLOWS
            .iter()
            .map(|flow| ExplicitAuthFlowsType::from(*flow))
            .collect();
        let out = self
            .client
            .create_user_pool_client()
            .user_pool_id(pool_id)
            .client_name(name)
            .set_explicit_auth_flows(Some(auth_flows))
            .send()
            .await
            .map_err(|e| missing(e, |e| e.is_resource_not_found_exception()))?;
        let app_client = member(out.user_pool_client(), "user pool client")?;
        Ok(PoolClientInfo {
            client_id: required_field(app_client.client_id(), "client id")?,
            client_name: field(app_client.client_name()),
        })
    }

    pub async fn delete_pool_client(&self, pool_id: &str, client_id: &str) -> Result<()> {
        self.client
            .delete_user_pool_client()
            .user_pool_id(pool_id)
            .client_id(client_id)
            .send()
            .await
            .map_err(|e| missing(e, |e| e.is_resource_not_found_exception()))?;
        Ok(())
    }
}
