//! Find-or-create helper shared by the stages

use corelab_cloud::{CloudError, ResourceClient, ResourceHandle, ResourceSpec};

/// Handle returned by [`find_or_create`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Provisioned {
    /// The resource already existed and was reused
    Existing(ResourceHandle),
    Created(ResourceHandle),
}

impl Provisioned {
    pub fn handle(&self) -> &ResourceHandle {
        match self {
            Provisioned::Existing(h) | Provisioned::Created(h) => h,
        }
    }

    pub fn into_handle(self) -> ResourceHandle {
        match self {
            Provisioned::Existing(h) | Provisioned::Created(h) => h,
        }
    }

    pub fn was_created(&self) -> bool {
        matches!(self, Provisioned::Created(_))
    }
}

/// Reuse an existing resource or create it
///
/// Lookup order: the identifier remembered from an earlier run, then the
/// conventional name, then `create`. A lookup that fails for any reason other
/// than authentication counts as "absent".
pub async fn find_or_create(
    client: &dyn ResourceClient,
    known_key: Option<&str>,
    spec: &ResourceSpec,
) -> Result<Provisioned, CloudError> {
    if let Some(key) = known_key {
        match client.describe(spec.category, key).await {
            Ok(handle) => {
                tracing::info!("Reusing {} {}", spec.category, handle.key());
                return Ok(Provisioned::Existing(handle));
            }
            Err(e) if e.is_auth() => return Err(e),
            Err(e) if e.is_not_found() => {
                tracing::debug!("Remembered {} {} no longer exists", spec.category, key);
            }
            Err(e) => {
                tracing::warn!("Could not describe {} {}: {}", spec.category, key, e);
            }
        }
    }

    if let Some(handle) = lookup_by_name(client, spec).await? {
        tracing::info!("Reusing {} {} ({})", spec.category, spec.name, handle.key());
        return Ok(Provisioned::Existing(handle));
    }

    tracing::info!("Creating {} {}", spec.category, spec.name);
    match client.create(spec).await {
        Ok(handle) => Ok(Provisioned::Created(handle)),
        // Created concurrently, or still settling and missed by the listing
        Err(CloudError::ResourceAlreadyExists(msg)) => {
            tracing::debug!("{}; looking it up again", msg);
            if spec.category.uses_name_as_key() {
                return client
                    .describe(spec.category, &spec.name)
                    .await
                    .map(Provisioned::Existing);
            }
            match client
                .find_by_name(spec.category, &spec.name, spec.parent.as_deref())
                .await?
            {
                Some(summary) => complete(client, summary).await.map(Provisioned::Existing),
                None => Err(CloudError::ResourceAlreadyExists(msg)),
            }
        }
        Err(e) => Err(e),
    }
}

async fn lookup_by_name(
    client: &dyn ResourceClient,
    spec: &ResourceSpec,
) -> Result<Option<ResourceHandle>, CloudError> {
    match client
        .find_by_name(spec.category, &spec.name, spec.parent.as_deref())
        .await
    {
        Ok(Some(summary)) => complete(client, summary).await.map(Some),
        Ok(None) => Ok(None),
        Err(e) if e.is_auth() => Err(e),
        Err(e) => {
            tracing::warn!("Could not list {} {}: {}", spec.category, spec.name, e);
            Ok(None)
        }
    }
}

/// Listings return summaries without url or arn; describe for the full handle
async fn complete(
    client: &dyn ResourceClient,
    summary: ResourceHandle,
) -> Result<ResourceHandle, CloudError> {
    let key = summary.key();
    match client.describe(summary.category, &key).await {
        Ok(handle) => Ok(handle),
        Err(e) if e.is_auth() => Err(e),
        Err(e) => {
            tracing::warn!("Could not describe {} {}: {}", summary.category, key, e);
            Ok(summary)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::test_support::SummaryListClient;
    use async_trait::async_trait;
    use corelab_cloud::{
        AuthStatus, Deletion, InMemoryClient, Operation, ResourceCategory, ResourceClient,
    };
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// The resource exists but is missing from the first listing, and `create`
    /// reports a conflict
    struct SettlingClient {
        inner: InMemoryClient,
        listed_once: AtomicBool,
    }

    #[async_trait]
    impl ResourceClient for SettlingClient {
        fn name(&self) -> &str {
            "settling"
        }

        fn region(&self) -> &str {
            self.inner.region()
        }

        async fn check_auth(&self) -> corelab_cloud::Result<AuthStatus> {
            self.inner.check_auth().await
        }

        async fn describe(
            &self,
            category: ResourceCategory,
            key: &str,
        ) -> corelab_cloud::Result<ResourceHandle> {
            self.inner.describe(category, key).await
        }

        async fn list(
            &self,
            category: ResourceCategory,
            scope: &str,
        ) -> corelab_cloud::Result<Vec<ResourceHandle>> {
            if !self.listed_once.swap(true, Ordering::SeqCst) {
                return Ok(Vec::new());
            }
            self.inner.list(category, scope).await
        }

        async fn create(&self, spec: &ResourceSpec) -> corelab_cloud::Result<ResourceHandle> {
            Err(CloudError::ResourceAlreadyExists(format!(
                "{} {}",
                spec.category, spec.name
            )))
        }

        async fn delete(
            &self,
            category: ResourceCategory,
            key: &str,
        ) -> corelab_cloud::Result<Deletion> {
            self.inner.delete(category, key).await
        }
    }

    #[tokio::test]
    async fn test_second_call_creates_nothing() {
        let client = InMemoryClient::new("us-east-1");
        let spec = ResourceSpec::new(ResourceCategory::Memory, "CustomerSupportMemory");

        let first = find_or_create(&client, None, &spec).await.unwrap();
        assert!(first.was_created());

        let second = find_or_create(&client, None, &spec).await.unwrap();
        assert!(!second.was_created());
        assert_eq!(second.handle().id, first.handle().id);
        assert_eq!(client.count(Operation::Create, ResourceCategory::Memory), 1);
    }

    #[tokio::test]
    async fn test_known_key_skips_listing() {
        let client = InMemoryClient::new("us-east-1");
        let spec = ResourceSpec::new(ResourceCategory::Gateway, "customersupport-gw");
        let created = find_or_create(&client, None, &spec).await.unwrap();

        let again = find_or_create(&client, Some(&created.handle().id), &spec)
            .await
            .unwrap();
        assert!(!again.was_created());
        assert_eq!(client.count(Operation::List, ResourceCategory::Gateway), 1);
    }

    #[tokio::test]
    async fn test_stale_key_falls_back_to_create() {
        let client = InMemoryClient::new("us-east-1");
        let spec = ResourceSpec::new(ResourceCategory::Runtime, "agent");

        let created = find_or_create(&client, Some("agent-gone"), &spec).await.unwrap();
        assert!(created.was_created());
    }

    #[tokio::test]
    async fn test_lookup_failure_counts_as_absent() {
        let client = InMemoryClient::new("us-east-1");
        client.fail(Operation::Describe, ResourceCategory::Memory);
        client.fail(Operation::List, ResourceCategory::Memory);
        let spec = ResourceSpec::new(ResourceCategory::Memory, "mem");

        let created = find_or_create(&client, Some("mem-1"), &spec).await.unwrap();
        assert!(created.was_created());
    }

    #[tokio::test]
    async fn test_already_exists_is_described() {
        let client = InMemoryClient::new("us-east-1");
        let spec = ResourceSpec::new(ResourceCategory::Role, "Runner");
        client.create(&spec).await.unwrap();
        client.fail(Operation::List, ResourceCategory::Role);

        let found = find_or_create(&client, None, &spec).await.unwrap();
        assert!(!found.was_created());
        assert_eq!(found.into_handle().id, "Runner");
    }

    #[tokio::test]
    async fn test_auth_failure_propagates() {
        let client = InMemoryClient::new("us-east-1");
        client.deny_auth();
        let spec = ResourceSpec::new(ResourceCategory::Memory, "mem");

        let err = find_or_create(&client, None, &spec).await.unwrap_err();
        assert!(err.is_auth());
    }

    #[tokio::test]
    async fn test_listed_summary_is_described() {
        let inner = Arc::new(InMemoryClient::new("us-east-1"));
        let spec = ResourceSpec::new(ResourceCategory::Gateway, "customersupport-gw");
        let created = inner.create(&spec).await.unwrap();
        let client = SummaryListClient::new(inner.clone());

        let found = find_or_create(&client, None, &spec).await.unwrap();

        assert!(!found.was_created());
        assert_eq!(found.handle().id, created.id);
        assert_eq!(found.handle().attribute("url"), created.attribute("url"));
        assert_eq!(inner.count(Operation::Create, ResourceCategory::Gateway), 1);
    }

    #[tokio::test]
    async fn test_conflict_on_generated_id_finds_by_name() {
        let client = SettlingClient {
            inner: InMemoryClient::new("us-east-1"),
            listed_once: AtomicBool::new(false),
        };
        let spec = ResourceSpec::new(ResourceCategory::Gateway, "customersupport-gw");
        let existing = client.inner.create(&spec).await.unwrap();

        let found = find_or_create(&client, None, &spec).await.unwrap();

        assert!(!found.was_created());
        assert_eq!(found.handle().id, existing.id);
        assert!(found.handle().attribute("url").is_some());
        // The conventional name is never used as a gateway id
        assert!(
            client
                .inner
                .calls()
                .iter()
                .all(|c| !(c.operation == Operation::Describe && c.key == spec.name))
        );
    }

    #[tokio::test]
    async fn test_conflict_without_match_is_reported() {
        let client = SettlingClient {
            inner: InMemoryClient::new("us-east-1"),
            listed_once: AtomicBool::new(false),
        };
        let spec = ResourceSpec::new(ResourceCategory::Memory, "CustomerSupportMemory");

        let err = find_or_create(&client, None, &spec).await.unwrap_err();
        assert!(matches!(err, CloudError::ResourceAlreadyExists(_)));
    }
}
