//! Readiness polling

use crate::error::{CloudError, Result};
use crate::provider::{PollConfig, ResourceClient};
use crate::resource::{ResourceCategory, ResourceHandle, ResourceStatus};
use tokio::time::sleep;

/// Poll `describe` until the resource reports a ready status
///
/// Describe failures other than authentication are retried; a failed status
/// or an exhausted attempt budget ends the wait.
pub async fn wait_until_ready(
    client: &dyn ResourceClient,
    category: ResourceCategory,
    key: &str,
    config: &PollConfig,
) -> Result<ResourceHandle> {
    let mut last_status = ResourceStatus::Unknown;

    for attempt in 0..config.max_attempts {
        match client.describe(category, key).await {
            Ok(handle) => match handle.status() {
                ResourceStatus::Ready => return Ok(handle),
                ResourceStatus::Failed => {
                    return Err(CloudError::ResourceFailed(format!("{} {}", category, key)));
                }
                status => {
                    last_status = status;
                    tracing::debug!(
                        "{} {} is {} (attempt {}/{})",
                        category,
                        key,
                        status,
                        attempt + 1,
                        config.max_attempts
                    );
                }
            },
            Err(e) if e.is_auth() => return Err(e),
            Err(e) => {
                tracing::debug!("Status check for {} {} failed: {}", category, key, e);
            }
        }

        if attempt + 1 < config.max_attempts {
            sleep(config.interval).await;
        }
    }

    Err(CloudError::Timeout(format!(
        "{} {} still {} after {} checks",
        category, key, last_status, config.max_attempts
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{InMemoryClient, Operation};
    use crate::resource::ResourceSpec;
    use std::time::Duration;

    fn fast() -> PollConfig {
        PollConfig::new(3, Duration::ZERO)
    }

    #[tokio::test]
    async fn test_ready_on_first_check() {
        let client = InMemoryClient::new("us-east-1");
        let gw = client
            .create(&ResourceSpec::new(ResourceCategory::Gateway, "gw"))
            .await
            .unwrap();

        let ready = wait_until_ready(&client, ResourceCategory::Gateway, &gw.id, &fast())
            .await
            .unwrap();
        assert_eq!(ready.id, gw.id);
    }

    #[tokio::test]
    async fn test_times_out_while_creating() {
        let client = InMemoryClient::new("us-east-1");
        let gw = client
            .create(&ResourceSpec::new(ResourceCategory::Gateway, "gw"))
            .await
            .unwrap();
        client.set_status(ResourceCategory::Gateway, &gw.id, "CREATING");

        let err = wait_until_ready(&client, ResourceCategory::Gateway, &gw.id, &fast())
            .await
            .unwrap_err();
        assert!(matches!(err, CloudError::Timeout(_)));
        assert_eq!(client.count(Operation::Describe, ResourceCategory::Gateway), 3);
    }

    #[tokio::test]
    async fn test_failed_status_stops_polling() {
        let client = InMemoryClient::new("us-east-1");
        let rt = client
            .create(&ResourceSpec::new(ResourceCategory::Runtime, "agent"))
            .await
            .unwrap();
        client.set_status(ResourceCategory::Runtime, &rt.id, "CREATE_FAILED");

        let err = wait_until_ready(&client, ResourceCategory::Runtime, &rt.id, &fast())
            .await
            .unwrap_err();
        assert!(matches!(err, CloudError::ResourceFailed(_)));
        assert_eq!(client.count(Operation::Describe, ResourceCategory::Runtime), 1);
    }

    #[tokio::test]
    async fn test_auth_failure_is_not_retried() {
        let client = InMemoryClient::new("us-east-1");
        client.deny_auth();

        let err = wait_until_ready(&client, ResourceCategory::Memory, "mem-1", &fast())
            .await
            .unwrap_err();
        assert!(err.is_auth());
        assert_eq!(client.count(Operation::Describe, ResourceCategory::Memory), 1);
    }
}
