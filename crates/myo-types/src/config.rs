//! Run configuration for a single optimization.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::errors::{MyoError, MyoResult};

/// Configuration for one optimization run.
///
/// A pool of runs shares one `RunConfig`; only the random seed differs
/// between pool members.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Maximum number of generations before the run terminates as Exhausted.
    pub max_generations: u64,

    /// Random seed for the evolution strategy. 0 means "pick one from a
    /// nondeterministic source"; the resolved seed is always recorded in the
    /// run report.
    pub random_seed: u64,

    /// Optional checkpoint file whose values seed the initial search mean.
    pub init_file: Option<PathBuf>,

    /// Whether to also take per-parameter std from the init file.
    pub use_init_file_std: bool,

    /// Scaling applied to std values taken from the init file.
    pub init_file_std_factor: f64,
    pub init_file_std_offset: f64,

    /// When either is non-zero, every free parameter's initial std is
    /// recomputed as `global_std_factor * |init_mean| + global_std_offset`,
    /// overriding the per-parameter std uniformly.
    pub global_std_factor: f64,
    pub global_std_offset: f64,

    /// Minimum fractional improvement a checkpoint must show on both sides
    /// to survive pruning (see `OutputManager`).
    pub min_improvement_for_file_output: f64,

    /// A checkpoint is forced after this many generations without one, so
    /// on-disk progress stays live even on plateaus.
    pub max_generations_without_file_output: u64,

    /// Worker threads for population evaluation. 0 = rayon default.
    pub max_threads: usize,

    /// Population size per generation. 0 = let the strategy suggest one
    /// from the problem dimension.
    pub population: usize,

    /// Root directory under which each run creates its unique output folder.
    pub output_root: PathBuf,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_generations: 10_000,
            random_seed: 0,
            init_file: None,
            use_init_file_std: true,
            init_file_std_factor: 1.0,
            init_file_std_offset: 0.0,
            global_std_factor: 0.0,
            global_std_offset: 0.0,
            min_improvement_for_file_output: 0.05,
            max_generations_without_file_output: 1000,
            max_threads: 0,
            population: 0,
            output_root: PathBuf::from("results"),
        }
    }
}

impl RunConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_generations(mut self, n: u64) -> Self {
        self.max_generations = n;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.random_seed = seed;
        self
    }

    pub fn with_init_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.init_file = Some(path.into());
        self
    }

    pub fn with_global_std(mut self, factor: f64, offset: f64) -> Self {
        self.global_std_factor = factor;
        self.global_std_offset = offset;
        self
    }

    pub fn with_population(mut self, n: usize) -> Self {
        self.population = n;
        self
    }

    pub fn with_max_threads(mut self, n: usize) -> Self {
        self.max_threads = n;
        self
    }

    pub fn with_output_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_root = path.into();
        self
    }

    /// Whether the uniform std override is active.
    pub fn global_std_enabled(&self) -> bool {
        self.global_std_factor != 0.0 || self.global_std_offset != 0.0
    }

    /// Reject configurations no run could execute. Fatal before any run
    /// starts.
    pub fn validate(&self) -> MyoResult<()> {
        if self.max_generations == 0 {
            return Err(crate::config_error!("max_generations must be at least 1"));
        }
        if self.min_improvement_for_file_output < 0.0 {
            return Err(crate::config_error!(
                "min_improvement_for_file_output must be non-negative, got {}",
                self.min_improvement_for_file_output
            ));
        }
        if self.global_std_factor < 0.0 || self.global_std_offset < 0.0 {
            return Err(crate::config_error!(
                "global std settings must be non-negative"
            ));
        }
        if self.init_file_std_factor < 0.0 {
            return Err(crate::config_error!(
                "init_file_std_factor must be non-negative"
            ));
        }
        Ok(())
    }
}

impl RunConfig {
    /// Parse a configuration from JSON, then validate it.
    pub fn from_json(json: &str) -> MyoResult<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| MyoError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}
