//! Secrets Manager secrets

use crate::error::Result;
use crate::sdk::{conflicting, field, missing, required_field, sdk_failure};
use aws_config::SdkConfig;
use aws_sdk_secretsmanager::Client;
use aws_sdk_secretsmanager::types::{Filter, FilterNameStringType};

#[derive(Debug, Clone)]
pub struct SecretInfo {
    pub name: String,
    pub arn: Option<String>,
}

pub struct SecretClient {
    client: Client,
}

impl SecretClient {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            client: Client::new(config),
        }
    }

    pub async fn describe_secret(&self, name: &str) -> Result<SecretInfo> {
        let out = self
            .client
            .describe_secret()
            .secret_id(name)
            .send()
            .await
            .map_err(|e| missing(e, |e| e.is_resource_not_found_exception()))?;
        Ok(SecretInfo {
            name: required_field(out.name(), "secret name")?,
            arn: field(out.arn()),
        })
    }

    /// Secrets whose name starts with `prefix`
    pub async fn list_secrets(&self, prefix: &str) -> Result<Vec<SecretInfo>> {
        let filter = Filter::builder()
            .key(FilterNameStringType::from("name"))
            .values(prefix)
            .build();

        let mut secrets = Vec::new();
        let mut next_token: Option<String> = None;
        loop {
            let out = self
                .client
                .list_secrets()
                .filters(filter.clone())
                .set_next_token(next_token)
                .send()
                .await
                .map_err(sdk_failure)?;

            for entry in out.secret_list() {
                if let Some(name) = field(entry.name()) {
                    secrets.push(SecretInfo {
                        name,
                        arn: field(entry.arn()),
                    });
                }
            }

            next_token = field(out.next_token());
            if next_token.is_none() {
                break;
            }
        }
        Ok(secrets)
    }

    pub async fn create_secret(&self, name: &str, secret_string: &str) -> Result<SecretInfo> {
        let out = self
            .client
            .create_secret()
            .name(name)
            .secret_string(secret_string)
            .send()
            .await
            .map_err(|e| conflicting(e, |e| e.is_resource_exists_exception()))?;
        Ok(SecretInfo {
            name: field(out.name()).unwrap_or_else(|| name.to_string()),
            arn: field(out.arn()),
        })
    }

    /// Delete a secret immediately, without a recovery window
    pub async fn delete_secret(&self, name: &str) -> Result<()> {
        self.client
            .delete_secret()
            .secret_id(name)
            .force_delete_without_recovery(true)
            .send()
            .await
            .map_err(|e| missing(e, |e| e.is_resource_not_found_exception()))?;
        Ok(())
    }
}
