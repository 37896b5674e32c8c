//! CloudWatch log groups written by the agent runtime

use crate::error::Result;
use crate::sdk::{conflicting, field, missing, sdk_failure};
use aws_config::SdkConfig;
use aws_sdk_cloudwatchlogs::Client;

#[derive(Debug, Clone)]
pub struct LogGroupInfo {
    pub log_group_name: String,
    pub arn: Option<String>,
}

pub struct LogGroupClient {
    client: Client,
}

impl LogGroupClient {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            client: Client::new(config),
        }
    }

    /// Log groups whose name starts with `prefix`
    pub async fn describe_log_groups(&self, prefix: &str) -> Result<Vec<LogGroupInfo>> {
        let mut groups = Vec::new();
        let mut next_token: Option<String> = None;
        loop {
            let out = self
                .client
                .describe_log_groups()
                .log_group_name_prefix(prefix)
                .set_next_token(next_token)
                .send()
                .await
                .map_err(sdk_failure)?;

            for group in out.log_groups() {
                if let Some(log_group_name) = field(group.log_group_name()) {
                    groups.push(LogGroupInfo {
                        log_group_name,
                        arn: field(group.arn()),
                    });
                }
            }

            next_token = field(out.next_token());
            if next_token.is_none() {
                break;
            }
        }
        Ok(groups)
    }

    pub async fn create_log_group(&self, name: &str) -> Result<()> {
        self.client
            .create_log_group()
            .log_group_name(name)
            .send()
            .await
            .map_err(|e| conflicting(e, |e| e.is_resource_already_exists_exception()))?;
        Ok(())
    }

    pub async fn delete_log_group(&self, name: &str) -> Result<()> {
        self.client
            .delete_log_group()
            .log_group_name(name)
            .send()
            .await
            .map_err(|e| missing(e, |e| e.is_resource_not_found_exception()))?;
        Ok(())
    }
}
