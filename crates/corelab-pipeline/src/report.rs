//! Final report of a pipeline run

use crate::stage::{StageId, StageResult};
use crate::state::PersistedConfig;
use serde::{Deserialize, Serialize};

/// Terminal state of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Completed,
    Aborted,
}

/// Produced in both terminal states
#[derive(Debug, Clone)]
pub struct RunReport {
    pub outcome: RunOutcome,
    /// Results of every attempted stage, in execution order
    pub results: Vec<StageResult>,
    pub not_attempted: Vec<StageId>,
    /// Persisted record at the end of the run
    pub config: PersistedConfig,
}

impl RunReport {
    pub fn succeeded(&self) -> impl Iterator<Item = &StageResult> {
        self.results.iter().filter(|r| r.succeeded)
    }

    pub fn failed(&self) -> impl Iterator<Item = &StageResult> {
        self.results.iter().filter(|r| !r.succeeded)
    }

    pub fn result(&self, stage_id: StageId) -> Option<&StageResult> {
        self.results.iter().find(|r| r.stage_id == stage_id)
    }

    /// Overall success: completed with every attempted stage succeeded
    pub fn success(&self) -> bool {
        self.outcome == RunOutcome::Completed && self.results.iter().all(|r| r.succeeded)
    }

    pub fn warning_count(&self) -> usize {
        self.results.iter().map(|r| r.warnings.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StageError;
    use crate::stage::StageOutput;
    use chrono::Utc;

    #[test]
    fn test_success_requires_completed_run() {
        let now = Utc::now();
        let mut report = RunReport {
            outcome: RunOutcome::Completed,
            results: vec![StageResult::success(StageId::Memory, StageOutput::new(), now)],
            not_attempted: Vec::new(),
            config: PersistedConfig::new(),
        };
        assert!(report.success());

        report.outcome = RunOutcome::Aborted;
        assert!(!report.success());
    }

    #[test]
    fn test_continued_failure_is_not_success() {
        let now = Utc::now();
        let err = StageError::Authentication("expired".into());
        let report = RunReport {
            outcome: RunOutcome::Completed,
            results: vec![
                StageResult::failure(StageId::Memory, &err, now),
                StageResult::success(StageId::Identity, StageOutput::new(), now),
            ],
            not_attempted: Vec::new(),
            config: PersistedConfig::new(),
        };
        assert!(!report.success());
        assert_eq!(report.failed().count(), 1);
        assert_eq!(report.succeeded().count(), 1);
        assert!(report.result(StageId::Gateway).is_none());
    }
}
