//! corelab-pipeline
//!
//! Stages, cross-stage state, orchestration and cleanup for the workshop
//! environment.
//!
//! ## Architecture
//!
//! ```text
//!                ┌──────────────────────┐
//!                │     Orchestrator     │──── Prompt / PipelineObserver
//!                └──────────┬───────────┘
//!                           │ run(ctx)
//!   ┌────────┬──────────┬───┴─────┬─────────┬──────────┐
//!   │ memory │ identity │ gateway │ runtime │ frontend │   (Stage)
//!   └────────┴──────────┴────┬────┴─────────┴──────────┘
//!                            │
//!          ┌─────────────────┼──────────────────┐
//!          ▼                                    ▼
//!   ┌──────────────┐                    ┌──────────────┐
//!   │ StateStore   │                    │ResourceClient│
//!   │ (file + SSM) │                    │ (aws / sim)  │
//!   └──────────────┘                    └──────────────┘
//!          ▲                                    ▲
//!          └────────────── Sweeper ─────────────┘
//! ```

pub mod error;
pub mod orchestrator;
pub mod provision;
pub mod report;
pub mod stage;
pub mod stages;
pub mod state;
pub mod sweeper;

pub use error::{ErrorClass, ErrorRecord, StageError, StateError};
pub use orchestrator::{
    AcceptDefaults, Decision, NoopObserver, Orchestrator, PipelineObserver, Prompt, RunMode,
    RunState, decide,
};
pub use provision::{Provisioned, find_or_create};
pub use report::{RunOutcome, RunReport};
pub use stage::{PipelineState, Stage, StageContext, StageId, StageOutput, StageResult, keys};
pub use stages::catalogue;
pub use state::{
    ClearOutcome, ClearResult, KeySource, LayeredStore, LocalFileStore, ParameterStore,
    PersistedConfig, StateStore,
};
pub use sweeper::{CleanupLedger, SweepCategory, SweepOutcome, SweepStatus, Sweeper};
