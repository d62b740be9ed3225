//! Prioritized scheduling of multiple independent optimization runs.
//!
//! An [`OptimizerPool`] owns N [`SingleOptimizer`]s configured identically
//! except for their random seeds and advances them one generation per tick.
//! Each member carries a sliding window of its best-fitness trajectory; a
//! member that has been durably outperformed by every other running member
//! for a whole window is stopped early so its compute goes to the rest.

use std::collections::VecDeque;
use std::sync::Arc;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use myo_optimizer::{Objective, SingleOptimizer, StrategyFactory};
use myo_types::{MyoResult, RunConfig, RunReport, StopReason};

use crate::reporter::PoolReporter;

/// Pool-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Number of optimization instances.
    pub members: usize,

    /// Sliding-window length (in generations) used to decide whether a
    /// member has been durably outperformed.
    pub window: usize,

    /// How much better (in fitness units, direction-aware) every entry of a
    /// competitor's window must be before a member counts as outperformed.
    pub margin: f64,

    /// Global budget across all members, in summed generations.
    /// 0 = unlimited; members then run to their own terminal states.
    pub max_total_generations: u64,

    /// Advance members of one tick in parallel. Member state is independent,
    /// so this only changes wall-clock behavior, not results.
    pub parallel_members: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            members: 4,
            window: 400,
            margin: 0.0,
            max_total_generations: 0,
            parallel_members: false,
        }
    }
}

impl PoolConfig {
    pub fn new(members: usize) -> Self {
        Self {
            members,
            ..Self::default()
        }
    }

    pub fn with_window(mut self, window: usize) -> Self {
        self.window = window;
        self
    }

    pub fn with_margin(mut self, margin: f64) -> Self {
        self.margin = margin;
        self
    }

    pub fn with_budget(mut self, generations: u64) -> Self {
        self.max_total_generations = generations;
        self
    }

    fn validate(&self) -> MyoResult<()> {
        if self.members == 0 {
            return Err(myo_types::config_error!("pool needs at least one member"));
        }
        if self.window < 2 {
            return Err(myo_types::config_error!(
                "pool window must be at least 2, got {}",
                self.window
            ));
        }
        if self.margin < 0.0 {
            return Err(myo_types::config_error!("pool margin must be non-negative"));
        }
        Ok(())
    }
}

struct PoolMember {
    opt: SingleOptimizer,
    /// Best-so-far per generation, normalized lower-is-better.
    window: VecDeque<f64>,
    reported: bool,
}

impl PoolMember {
    /// Advance one generation. A member's failure is absorbed: its optimizer
    /// transitions to Failed and the rest of the pool is unaffected.
    fn advance(&mut self) {
        if self.opt.state().is_terminal() {
            return;
        }
        if let Err(e) = self.opt.step() {
            debug!(id = %self.opt.id(), error = %e, "pool member failed");
        }
        if self.opt.state().is_terminal() {
            return;
        }
        self.window.push_back(self.normalized_best());
    }

    fn normalized_best(&self) -> f64 {
        self.opt.direction().normalize(self.opt.best_fitness())
    }

    fn active(&self) -> bool {
        !self.opt.state().is_terminal()
    }
}

/// A fixed set of identically configured, independently seeded optimization
/// runs, scheduled to favor the most promising ones.
pub struct OptimizerPool {
    config: PoolConfig,
    members: Vec<PoolMember>,
    reporters: Vec<Box<dyn PoolReporter>>,
    total_generations: u64,
}

impl OptimizerPool {
    /// Build a pool of `config.members` optimizers over a shared objective.
    ///
    /// When `run_config.random_seed` is non-zero, member `i` runs with
    /// `seed + i` so the whole pool stays reproducible; a zero seed lets
    /// every member resolve its own nondeterministic seed.
    pub fn new(
        config: PoolConfig,
        run_config: RunConfig,
        objective: Arc<dyn Objective>,
        factory: Arc<dyn StrategyFactory>,
    ) -> MyoResult<Self> {
        config.validate()?;
        run_config.validate()?;

        let mut members = Vec::with_capacity(config.members);
        for i in 0..config.members {
            let mut member_config = run_config.clone();
            if member_config.random_seed != 0 {
                member_config.random_seed += i as u64;
            }
            let opt = SingleOptimizer::new(member_config, objective.clone(), factory.clone())?;
            members.push(PoolMember {
                opt,
                window: VecDeque::with_capacity(config.window + 1),
                reported: false,
            });
        }

        Ok(Self {
            config,
            members,
            reporters: Vec::new(),
            total_generations: 0,
        })
    }

    pub fn add_reporter(&mut self, reporter: Box<dyn PoolReporter>) {
        self.reporters.push(reporter);
    }

    pub fn active_members(&self) -> usize {
        self.members.iter().filter(|m| m.active()).count()
    }

    pub fn total_generations(&self) -> u64 {
        self.total_generations
    }

    /// Advance every non-terminal member by one generation, update windows,
    /// and signal any durably outperformed member to stop.
    pub fn tick(&mut self) {
        let window = self.config.window;

        if self.config.parallel_members {
            self.members.par_iter_mut().for_each(PoolMember::advance);
        } else {
            for member in &mut self.members {
                member.advance();
            }
        }
        for member in &mut self.members {
            self.total_generations += u64::from(member.active());
            while member.window.len() > window {
                member.window.pop_front();
            }
        }

        self.signal_outperformed();
        self.fire_finished_hooks();
    }

    /// A member is stopped once every other still-running member's entire
    /// window is better than this member's current best by more than the
    /// margin — durably outperformed, not just momentarily behind.
    fn signal_outperformed(&self) {
        let window = self.config.window;
        let margin = self.config.margin;
        let active: Vec<&PoolMember> = self.members.iter().filter(|m| m.active()).collect();
        if active.len() < 2 {
            return;
        }

        for (i, candidate) in active.iter().enumerate() {
            if candidate.window.len() < window {
                continue;
            }
            let bar = candidate.normalized_best() - margin;
            let outperformed = active.iter().enumerate().all(|(j, other)| {
                i == j || (other.window.len() >= window && other.window.iter().all(|&f| f < bar))
            });
            if outperformed {
                info!(
                    id = %candidate.opt.id(),
                    best = candidate.opt.best_fitness(),
                    "stopping durably outperformed pool member"
                );
                candidate
                    .opt
                    .cancel_token()
                    .cancel_with_reason(StopReason::PoolOutperformed);
            }
        }
    }

    fn fire_finished_hooks(&mut self) {
        for member in &mut self.members {
            if member.opt.state().is_terminal() && !member.reported {
                member.reported = true;
                for reporter in &self.reporters {
                    reporter.on_instance_finished(member.opt.report());
                }
            }
        }
    }

    fn budget_exhausted(&self) -> bool {
        self.config.max_total_generations != 0
            && self.total_generations >= self.config.max_total_generations
    }

    /// Cancel every still-running member and let each observe the request at
    /// its next generation boundary, finalizing its checkpoints.
    fn finalize_remaining(&mut self) {
        for member in &mut self.members {
            if member.active() {
                member.opt.cancel_token().cancel();
                let _ = member.opt.step();
            }
        }
        self.fire_finished_hooks();
    }

    /// Run the whole pool to completion: tick until every member is terminal
    /// or the global budget is exhausted. Returns every member's report,
    /// in member order.
    pub fn run(&mut self) -> Vec<RunReport> {
        for reporter in &self.reporters {
            reporter.on_pool_start(self.members.len());
        }

        while self.active_members() > 0 && !self.budget_exhausted() {
            self.tick();
        }
        self.finalize_remaining();

        let best = self
            .members
            .iter()
            .map(|m| m.normalized_best())
            .fold(f64::INFINITY, f64::min);
        info!(
            members = self.members.len(),
            total_generations = self.total_generations,
            best,
            "pool finished"
        );

        self.members.iter().map(|m| m.opt.report().clone()).collect()
    }
}
