//! Run lifecycle states and final reports.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Unique run identifier.
pub type RunId = Uuid;

/// Lifecycle state of a single optimization run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    Created,
    Initializing,
    Running,
    Converged,
    Exhausted,
    Cancelled,
    Failed,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Converged | Self::Exhausted | Self::Cancelled | Self::Failed
        )
    }
}

/// Why a run reached its terminal state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StopReason {
    /// The strategy reported internal convergence.
    Converged,
    /// The configured generation limit was reached.
    GenerationLimit,
    /// An external cancellation request was observed.
    Cancelled,
    /// The pool scheduler halted this run as durably outperformed.
    PoolOutperformed,
    /// An unrecoverable objective or strategy error.
    Error(String),
}

/// Final report for a single optimization run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub id: RunId,
    pub state: RunState,
    pub stop_reason: Option<StopReason>,

    /// Best fitness found, in the objective's raw (unnormalized) direction.
    pub best_fitness: f64,

    /// The seed the strategy actually ran with. Recorded even when the
    /// configured seed was 0 ("pick nondeterministically") so the run can be
    /// reproduced.
    pub resolved_seed: u64,

    /// Total generations executed.
    pub generations: u64,

    /// Individual candidate evaluations that failed and were scored as
    /// worst-fitness instead of aborting their generation.
    pub evaluation_failures: u64,

    pub output_folder: Option<PathBuf>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunReport {
    pub fn new(id: RunId, worst_fitness: f64) -> Self {
        Self {
            id,
            state: RunState::Created,
            stop_reason: None,
            best_fitness: worst_fitness,
            resolved_seed: 0,
            generations: 0,
            evaluation_failures: 0,
            output_folder: None,
            started_at: None,
            finished_at: None,
        }
    }

    pub fn mark_started(&mut self) {
        self.state = RunState::Running;
        self.started_at = Some(Utc::now());
    }

    pub fn mark_finished(&mut self, state: RunState, reason: StopReason) {
        debug_assert!(state.is_terminal());
        self.state = state;
        self.stop_reason = Some(reason);
        self.finished_at = Some(Utc::now());
    }
}

/// One generation's summary, produced by the strategy and consumed
/// immediately. Not persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRecord {
    pub index: u64,
    /// Population-average fitness (raw direction).
    pub avg_fitness: f64,
    /// Population-best fitness (raw direction).
    pub best_fitness: f64,
    /// Current strategy mean over the free parameters.
    pub mean: Vec<f64>,
    /// Current strategy std (covariance diagonal square roots).
    pub std: Vec<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(!RunState::Created.is_terminal());
        assert!(!RunState::Initializing.is_terminal());
        assert!(!RunState::Running.is_terminal());
        assert!(RunState::Converged.is_terminal());
        assert!(RunState::Exhausted.is_terminal());
        assert!(RunState::Cancelled.is_terminal());
        assert!(RunState::Failed.is_terminal());
    }

    #[test]
    fn report_lifecycle() {
        let mut report = RunReport::new(Uuid::new_v4(), f64::INFINITY);
        assert_eq!(report.state, RunState::Created);
        assert!(report.started_at.is_none());

        report.mark_started();
        assert_eq!(report.state, RunState::Running);
        assert!(report.started_at.is_some());

        report.mark_finished(RunState::Exhausted, StopReason::GenerationLimit);
        assert_eq!(report.state, RunState::Exhausted);
        assert_eq!(report.stop_reason, Some(StopReason::GenerationLimit));
        assert!(report.finished_at.is_some());
    }

    #[test]
    fn report_serializes() {
        let mut report = RunReport::new(Uuid::new_v4(), f64::NEG_INFINITY);
        // serde_json maps non-finite floats to null, so flush a real fitness
        // before the round trip.
        report.best_fitness = 12.5;
        let json = serde_json::to_string(&report).unwrap();
        let back: RunReport = serde_json::from_str(&json).unwrap();
        assert_eq!(report.id, back.id);
        assert_eq!(back.state, RunState::Created);
    }
}
