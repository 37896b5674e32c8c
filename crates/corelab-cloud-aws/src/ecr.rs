//! ECR repositories holding the agent image

use crate::error::{AwsError, Result};
use crate::sdk::{conflicting, field, member, missing, required_field};
use aws_config::SdkConfig;
use aws_sdk_ecr::Client;
use aws_sdk_ecr::types::Repository;

#[derive(Debug, Clone)]
pub struct RepositoryInfo {
    pub repository_name: String,
    pub repository_uri: Option<String>,
    pub repository_arn: Option<String>,
}

impl RepositoryInfo {
    fn from_sdk(repository: &Repository) -> Result<Self> {
        Ok(Self {
            repository_name: required_field(repository.repository_name(), "repository name")?,
            repository_uri: field(repository.repository_uri()),
            repository_arn: field(repository.repository_arn()),
        })
    }
}

pub struct RegistryClient {
    client: Client,
}

impl RegistryClient {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            client: Client::new(config),
        }
    }

    pub async fn describe_repository(&self, name: &str) -> Result<RepositoryInfo> {
        let out = self
            .client
            .describe_repositories()
            .repository_names(name)
            .send()
            .await
            .map_err(|e| missing(e, |e| e.is_repository_not_found_exception()))?;
        match out.repositories().first() {
            Some(repository) => RepositoryInfo::from_sdk(repository),
            None => Err(AwsError::NotFound(format!("repository {}", name))),
        }
    }

    pub async fn list_repositories(&self) -> Result<Vec<RepositoryInfo>> {
        let mut repositories = Vec::new();
        let mut next_token: Option<String> = None;
        loop {
            let out = self
                .client
                .describe_repositories()
                .set_next_token(next_token)
                .send()
                .await
                .map_err(|e| missing(e, |e| e.is_repository_not_found_exception()))?;

            for repository in out.repositories() {
                repositories.push(RepositoryInfo::from_sdk(repository)?);
            }

            next_token = field(out.next_token());
            if next_token.is_none() {
                break;
            }
        }
        Ok(repositories)
    }

    /// Tags of the images pushed to a repository
    pub async fn image_tags(&self, name: &str) -> Result<Vec<String>> {
        let mut tags = Vec::new();
        let mut next_token: Option<String> = None;
        loop {
            let out = self
                .client
                .list_images()
                .repository_name(name)
                .set_next_token(next_token)
                .send()
                .await
                .map_err(|e| missing(e, |e| e.is_repository_not_found_exception()))?;

            tags.extend(out.image_ids().iter().filter_map(|id| field(id.image_tag())));

            next_token = field(out.next_token());
            if next_token.is_none() {
                break;
            }
        }
        Ok(tags)
    }

    pub async fn create_repository(&self, name: &str) -> Result<RepositoryInfo> {
        let out = self
            .client
            .create_repository()
            .repository_name(name)
            .send()
            .await
            .map_err(|e| conflicting(e, |e| e.is_repository_already_exists_exception()))?;
        RepositoryInfo::from_sdk(member(out.repository(), "repository")?)
    }

    /// Delete a repository together with its images
    pub async fn delete_repository(&self, name: &str) -> Result<()> {
        self.client
            .delete_repository()
            .repository_name(name)
            .force(true)
            .send()
            .await
            .map_err(|e| missing(e, |e| e.is_repository_not_found_exception()))?;
        Ok(())
    }
}
