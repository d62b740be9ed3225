//! Minimal pool runner: optimizes a built-in benchmark objective with a pool
//! of default strategies and prints the final reports as JSON.
//!
//! Configuration comes from the environment:
//! - `MYO_RUN_CONFIG`: path to a `RunConfig` JSON file (optional).
//! - `MYO_POOL_MEMBERS`: pool size (default 4).

use std::path::PathBuf;
use std::sync::Arc;

use myo_optimizer::{DiagonalEsFactory, Evaluation, Objective};
use myo_params::ParamSet;
use myo_pool::{LogReporter, OptimizerPool, PoolConfig};
use myo_types::{Direction, MyoResult, RunConfig};

/// Rosenbrock's valley — a standard hard-to-descend benchmark.
struct Rosenbrock {
    dim: usize,
}

impl Objective for Rosenbrock {
    fn declare(&self, params: &mut ParamSet) -> MyoResult<()> {
        for i in 0..self.dim {
            params.declare(&format!("x{i}"), 0.0, 0.5)?;
        }
        Ok(())
    }

    fn evaluate(&self, full_values: &[f64]) -> MyoResult<Evaluation> {
        let fitness: f64 = full_values
            .windows(2)
            .map(|w| 100.0 * (w[1] - w[0] * w[0]).powi(2) + (1.0 - w[0]).powi(2))
            .sum();
        Ok(Evaluation::new(fitness))
    }

    fn direction(&self) -> Direction {
        Direction::Minimize
    }

    fn signature(&self) -> String {
        format!("rosenbrock.d{}", self.dim)
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let run_config = match std::env::var_os("MYO_RUN_CONFIG") {
        Some(path) => {
            let json = std::fs::read_to_string(PathBuf::from(path))?;
            RunConfig::from_json(&json)?
        }
        None => RunConfig::new()
            .with_max_generations(200)
            .with_seed(1),
    };

    let members = std::env::var("MYO_POOL_MEMBERS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(4);

    let mut pool = OptimizerPool::new(
        PoolConfig::new(members),
        run_config,
        Arc::new(Rosenbrock { dim: 6 }),
        Arc::new(DiagonalEsFactory::default()),
    )?;
    pool.add_reporter(Box::new(LogReporter));

    let reports = pool.run();
    println!("{}", serde_json::to_string_pretty(&reports)?);
    Ok(())
}
