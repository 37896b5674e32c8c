//! CoreLab Cloud Resources
//!
//! This crate provides the resource-management facade used by the CoreLab
//! provisioning pipeline. Every stage talks to remote resources through
//! [`ResourceClient`], so the same pipeline runs against AWS or against the
//! in-memory client used for simulation and tests.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                  CoreLab CLI                     │
//! │            (corelab up/stage/cleanup)            │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │               corelab-pipeline                   │
//! │   stages / state store / orchestrator / sweeper  │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │                corelab-cloud                     │
//! │  ┌──────────────────────────────────────────┐   │
//! │  │          Resource Client Facade           │   │
//! │  │  trait ResourceClient { ... }             │   │
//! │  └──────────────────────────────────────────┘   │
//! │  ┌──────────────┐  ┌──────────────┐            │
//! │  │   Polling    │  │  In-memory   │            │
//! │  └──────────────┘  └──────────────┘            │
//! └───────┬─────────────────────────────────────────┘
//!         │
//! ┌───────▼───────┐
//! │  corelab-     │
//! │  cloud-aws    │
//! └───────────────┘
//! ```

pub mod error;
pub mod memory;
pub mod poll;
pub mod provider;
pub mod resource;

// Re-exports
pub use error::{CloudError, Result};
pub use memory::{Call, InMemoryClient, Operation};
pub use poll::wait_until_ready;
pub use provider::{AuthStatus, PollConfig, ResourceClient};
pub use resource::{
    Deletion, ResourceCategory, ResourceHandle, ResourceSpec, ResourceStatus, nested_key,
    split_nested_key,
};
