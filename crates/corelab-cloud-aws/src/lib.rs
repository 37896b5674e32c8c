//! AWS resource client for corelab
//!
//! This crate implements the `ResourceClient` trait against AWS, so the
//! workshop pipeline can provision Bedrock AgentCore resources and the IAM,
//! Cognito, ECR, Secrets Manager, CloudWatch Logs and SSM resources around them.
//!
//! Each service has its own SDK client module; [`AwsResourceClient`] routes
//! resource categories to them. Credentials come from the default AWS
//! credential chain.
//!
//! # Example
//!
//! ```ignore
//! use corelab_cloud::ResourceClient;
//! use corelab_cloud_aws::AwsResourceClient;
//!
//! let client = AwsResourceClient::connect("us-east-1").await;
//!
//! let auth = client.check_auth().await?;
//! if !auth.authenticated {
//!     eprintln!("Not authenticated: {:?}", auth.error);
//! }
//! ```

pub mod agentcore;
pub mod cognito;
pub mod ecr;
pub mod error;
pub mod iam;
pub mod logs;
pub mod provider;
pub mod sdk;
pub mod secrets;

pub use error::{AwsError, Result};
pub use provider::AwsResourceClient;
pub use sdk::{IdentityClient, ParameterClient, load_sdk_config};
