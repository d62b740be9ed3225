//! The objective capability interface.
//!
//! The simulation back-end (or any other fitness source) is consumed through
//! [`Objective`]; the optimizer never sees what is behind it.

use std::path::PathBuf;

use myo_params::ParamSet;
use myo_types::{Direction, MyoResult};

/// The outcome of evaluating one candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    /// Scalar fitness in the objective's raw direction.
    pub fitness: f64,
    /// Human-readable evaluation report, persisted next to the winning
    /// candidate's checkpoint.
    pub report: String,
}

impl Evaluation {
    pub fn new(fitness: f64) -> Self {
        Self {
            fitness,
            report: String::new(),
        }
    }

    pub fn with_report(mut self, report: impl Into<String>) -> Self {
        self.report = report.into();
        self
    }
}

/// A black-box fitness function over a full parameter vector.
///
/// Implementations must be thread-safe: candidates of one generation are
/// evaluated concurrently through a shared reference.
pub trait Objective: Send + Sync {
    /// Register this objective's parameters. Called once, with the set in
    /// declare mode, before the optimization loop starts.
    fn declare(&self, params: &mut ParamSet) -> MyoResult<()>;

    /// Evaluate a full parameter vector (every declared parameter, in
    /// declaration order). An error here counts against this candidate only;
    /// the generation continues with `worst_fitness()` in its place.
    fn evaluate(&self, full_values: &[f64]) -> MyoResult<Evaluation>;

    /// Whether fitness is minimized or maximized.
    fn direction(&self) -> Direction;

    /// The "worse than any real result" sentinel.
    fn worst_fitness(&self) -> f64 {
        self.direction().worst()
    }

    /// Short identifier used to name output folders.
    fn signature(&self) -> String;

    /// Files the objective needs at evaluation time; copied verbatim into
    /// the output folder at run start.
    fn external_resources(&self) -> Vec<PathBuf> {
        Vec::new()
    }
}
