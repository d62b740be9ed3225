//! The single-run generation loop.
//!
//! A [`SingleOptimizer`] drives one optimization: it builds the objective's
//! parameter set, seeds an evolution strategy, then advances it generation by
//! generation — evaluating populations, tracking the best-so-far solution,
//! and writing pruned checkpoints — until a terminal state is reached.

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use rayon::prelude::*;
use tracing::{debug, info, info_span, warn};
use uuid::Uuid;

use myo_params::ParamSet;
use myo_types::{
    Direction, GenerationRecord, MyoError, MyoResult, RunConfig, RunId, RunReport, RunState,
    StopReason,
};

use crate::objective::Objective;
use crate::output::{create_unique_folder, OutputManager};
use crate::strategy::{EvolutionStrategy, StrategyFactory, StrategyInit};

/// Cooperative cancellation handle, shared between a run and whoever may stop
/// it. Observed only at generation boundaries — never mid-evaluation.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    reason: Arc<Mutex<Option<StopReason>>>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation at the next generation boundary.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Request cancellation, recording why (e.g. pool scheduling).
    pub fn cancel_with_reason(&self, reason: StopReason) {
        *self.reason.lock() = Some(reason);
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    fn take_reason(&self) -> StopReason {
        self.reason.lock().take().unwrap_or(StopReason::Cancelled)
    }
}

/// One optimization run: objective, parameter set, strategy, and checkpoint
/// output, advanced a generation at a time.
pub struct SingleOptimizer {
    id: RunId,
    config: RunConfig,
    objective: Arc<dyn Objective>,
    factory: Arc<dyn StrategyFactory>,
    direction: Direction,

    state: RunState,
    params: ParamSet,
    strategy: Option<Box<dyn EvolutionStrategy>>,
    output: Option<OutputManager>,
    thread_pool: Option<rayon::ThreadPool>,

    generation: u64,
    last_output_gen: u64,
    /// Best-so-far in the internal lower-is-better convention.
    best_internal: f64,
    best_report: Option<String>,
    report: RunReport,
    cancel: CancelToken,
}

impl SingleOptimizer {
    pub fn new(
        config: RunConfig,
        objective: Arc<dyn Objective>,
        factory: Arc<dyn StrategyFactory>,
    ) -> MyoResult<Self> {
        config.validate()?;
        let id = Uuid::new_v4();
        let direction = objective.direction();
        let report = RunReport::new(id, objective.worst_fitness());
        Ok(Self {
            id,
            config,
            objective,
            factory,
            direction,
            state: RunState::Created,
            params: ParamSet::new(),
            strategy: None,
            output: None,
            thread_pool: None,
            generation: 0,
            last_output_gen: 0,
            best_internal: f64::INFINITY,
            best_report: None,
            report,
            cancel: CancelToken::new(),
        })
    }

    pub fn id(&self) -> RunId {
        self.id
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Best fitness so far, in the objective's raw direction.
    pub fn best_fitness(&self) -> f64 {
        self.direction.normalize(self.best_internal)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn report(&self) -> &RunReport {
        &self.report
    }

    /// Handle for requesting cooperative cancellation.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Construct the parameter set, resolve the seed, create the output
    /// folder, and build the strategy. Surfaces configuration and dimension
    /// errors immediately.
    fn initialize(&mut self) -> MyoResult<()> {
        self.state = RunState::Initializing;

        let mut params = ParamSet::new();
        self.objective.declare(&mut params)?;

        if let Some(init_file) = self.config.init_file.clone() {
            let (imported, skipped) = params.import_mean_std(
                &init_file,
                self.config.use_init_file_std,
                self.config.init_file_std_factor,
                self.config.init_file_std_offset,
            )?;
            info!(
                imported,
                skipped,
                file = %init_file.display(),
                "applied init file"
            );
        }

        params.finalize();
        let dim = params.free_count();
        if dim == 0 {
            return Err(MyoError::Dimension {
                message: "objective declared no free parameters".to_string(),
            });
        }

        let global_std = self
            .config
            .global_std_enabled()
            .then_some((self.config.global_std_factor, self.config.global_std_offset));
        let (mean, std) = params.init_mean_std(global_std);

        let resolved_seed = if self.config.random_seed == 0 {
            rand::random::<u64>()
        } else {
            self.config.random_seed
        };
        self.report.resolved_seed = resolved_seed;

        let folder = create_unique_folder(&self.config.output_root, &self.objective.signature())?;
        self.report.output_folder = Some(folder.clone());
        self.write_run_inputs(&folder)?;

        self.strategy = Some(self.factory.create(StrategyInit {
            dim,
            population: self.config.population,
            mean,
            std,
            seed: resolved_seed,
        })?);

        if self.config.max_threads > 0 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.config.max_threads)
                .build()
                .map_err(|e| MyoError::Internal(format!("thread pool: {e}")))?;
            self.thread_pool = Some(pool);
        }

        self.output = Some(OutputManager::new(
            folder,
            self.direction,
            self.config.min_improvement_for_file_output,
        ));
        self.best_internal = f64::INFINITY;
        self.params = params;

        info!(
            id = %self.id,
            dim,
            seed = resolved_seed,
            "optimization initialized"
        );
        self.report.mark_started();
        self.state = RunState::Running;
        Ok(())
    }

    /// Persist the resolved configuration and copy the init file and the
    /// objective's external resources into the output folder.
    fn write_run_inputs(&self, folder: &std::path::Path) -> MyoResult<()> {
        let config_json = serde_json::to_string_pretty(&self.config)?;
        fs::write(folder.join("config.json"), config_json)?;

        let mut inputs: Vec<PathBuf> = self.objective.external_resources();
        if let Some(init_file) = &self.config.init_file {
            inputs.push(init_file.clone());
        }
        for file in inputs {
            match file.file_name() {
                Some(name) => {
                    fs::copy(&file, folder.join(name))?;
                }
                None => warn!(file = %file.display(), "resource has no file name, skipped"),
            }
        }
        Ok(())
    }

    /// Advance the run by exactly one generation.
    ///
    /// Unrecoverable errors flip the run to `Failed` (finalizing output) and
    /// propagate; per-candidate evaluation errors are absorbed.
    pub fn step(&mut self) -> MyoResult<RunState> {
        if self.state.is_terminal() {
            return Ok(self.state);
        }
        match self.step_inner() {
            Ok(()) => Ok(self.state),
            Err(e) => {
                self.finish(RunState::Failed, StopReason::Error(e.to_string()));
                Err(e)
            }
        }
    }

    fn step_inner(&mut self) -> MyoResult<()> {
        if self.state == RunState::Created {
            self.initialize()?;
        }

        // generation boundary: the only place cancellation is observed
        if self.cancel.is_cancelled() {
            let reason = self.cancel.take_reason();
            self.finish(RunState::Cancelled, reason);
            return Ok(());
        }
        if self.generation >= self.config.max_generations {
            self.finish(RunState::Exhausted, StopReason::GenerationLimit);
            return Ok(());
        }
        let strategy = self.strategy.as_mut().expect("initialized above");
        if strategy.converged() {
            self.finish(RunState::Converged, StopReason::Converged);
            return Ok(());
        }

        let population = strategy.ask();
        let (internal, reports, failures) = self.evaluate_population(&population);
        self.report.evaluation_failures += failures;

        // single-threaded strategy update
        let strategy = self.strategy.as_mut().expect("initialized above");
        strategy.tell(&internal);

        let (best_idx, gen_best_internal) = internal
            .iter()
            .copied()
            .enumerate()
            .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
            .expect("population is never empty");
        let avg_internal = internal.iter().sum::<f64>() / internal.len() as f64;

        let record = GenerationRecord {
            index: self.generation,
            avg_fitness: self.direction.normalize(avg_internal),
            best_fitness: self.direction.normalize(gen_best_internal),
            mean: strategy.mean().to_vec(),
            std: strategy.std_diag(),
        };

        let new_best = gen_best_internal < self.best_internal;
        if new_best {
            self.best_internal = gen_best_internal;
            self.report.best_fitness = self.direction.normalize(gen_best_internal);
            self.best_report = reports.into_iter().nth(best_idx).flatten();

            let mean = record.mean.clone();
            let std = record.std.clone();
            self.params.set_free_values(&population[best_idx])?;
            self.params.update_mean_std(&mean, &std)?;
            debug!(
                generation = self.generation,
                best = self.report.best_fitness,
                "new best"
            );
        }

        let overdue =
            self.generation - self.last_output_gen > self.config.max_generations_without_file_output;
        if new_best || overdue {
            self.write_checkpoint(&record, new_best);
        }

        self.generation += 1;
        self.report.generations = self.generation;
        Ok(())
    }

    /// Evaluate one population through the objective, in parallel, bounded by
    /// the configured thread count. A failed candidate scores the worst
    /// fitness instead of aborting the generation.
    fn evaluate_population(
        &self,
        population: &[Vec<f64>],
    ) -> (Vec<f64>, Vec<Option<String>>, u64) {
        let failures = AtomicU64::new(0);
        let objective = &self.objective;
        let params = &self.params;
        let direction = self.direction;

        let eval_all = || {
            population
                .par_iter()
                .map(|candidate| {
                    let result = params
                        .full_values_with(candidate)
                        .and_then(|full| objective.evaluate(&full));
                    match result {
                        Ok(eval) => {
                            let report = (!eval.report.is_empty()).then_some(eval.report);
                            (direction.normalize(eval.fitness), report)
                        }
                        Err(e) => {
                            warn!(error = %e, "candidate evaluation failed, scoring worst fitness");
                            failures.fetch_add(1, Ordering::Relaxed);
                            (direction.normalize(objective.worst_fitness()), None)
                        }
                    }
                })
                .collect::<Vec<_>>()
        };

        let scored = match &self.thread_pool {
            Some(pool) => pool.install(eval_all),
            None => eval_all(),
        };

        let (internal, reports) = scored.into_iter().unzip();
        (internal, reports, failures.into_inner())
    }

    /// Write the generation's `.par` checkpoint (plus the best candidate's
    /// report artifact) and route it through the pruning log. IO failures are
    /// logged and retried at the next checkpoint opportunity.
    fn write_checkpoint(&mut self, record: &GenerationRecord, new_best: bool) {
        let best_raw = self.best_fitness();
        let folder = self
            .output
            .as_ref()
            .expect("initialized above")
            .folder()
            .to_path_buf();
        let base = format!(
            "{:04}_{:.3}_{:.3}",
            record.index, record.avg_fitness, record.best_fitness
        );

        let par_path = folder.join(format!("{base}.par"));
        if let Err(e) = self.params.export(&par_path) {
            warn!(file = %par_path.display(), error = %e, "checkpoint write failed");
            return;
        }

        let mut files = vec![par_path];
        if new_best {
            if let Some(report) = &self.best_report {
                let report_path = folder.join(format!("{base}.txt"));
                match fs::write(&report_path, report) {
                    Ok(()) => files.push(report_path),
                    Err(e) => {
                        warn!(file = %report_path.display(), error = %e, "report write failed")
                    }
                }
            }
        }

        self.last_output_gen = record.index;
        self.output
            .as_mut()
            .expect("initialized above")
            .record(record.index, best_raw, files);
    }

    /// Terminal transition: flush the in-memory best one final time and
    /// finalize the report.
    fn finish(&mut self, state: RunState, reason: StopReason) {
        if self.state.is_terminal() {
            return;
        }
        if let Some(output) = &self.output {
            if self.best_internal.is_finite() {
                let best_path = output.folder().join("best.par");
                if let Err(e) = self.params.export(&best_path) {
                    warn!(file = %best_path.display(), error = %e, "final flush failed");
                }
            }
        }
        info!(
            id = %self.id,
            ?state,
            ?reason,
            best = self.report.best_fitness,
            generations = self.generation,
            "optimization finished"
        );
        self.state = state;
        self.report.mark_finished(state, reason);
    }

    /// Run to a terminal state, returning the final report.
    pub fn run(&mut self) -> MyoResult<RunReport> {
        let span = info_span!("opt", id = %self.id);
        let _guard = span.enter();
        while !self.state.is_terminal() {
            self.step()?;
        }
        Ok(self.report.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objective::Evaluation;
    use crate::strategy::DiagonalEsFactory;
    use tempfile::tempdir;

    /// Minimizes the distance to a fixed target point.
    struct TargetObjective {
        target: Vec<f64>,
        direction: Direction,
        /// Evaluations after which the token is cancelled (test hook).
        cancel_after: Option<(u64, CancelToken)>,
        calls: AtomicU64,
        fail_every: Option<u64>,
    }

    impl TargetObjective {
        fn new(target: Vec<f64>) -> Self {
            Self {
                target,
                direction: Direction::Minimize,
                cancel_after: None,
                calls: AtomicU64::new(0),
                fail_every: None,
            }
        }
    }

    impl Objective for TargetObjective {
        fn declare(&self, params: &mut ParamSet) -> MyoResult<()> {
            for i in 0..self.target.len() {
                params.declare(&format!("x{i}"), 0.0, 1.0)?;
            }
            params.declare_fixed("scale", 1.0)?;
            Ok(())
        }

        fn evaluate(&self, full_values: &[f64]) -> MyoResult<Evaluation> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some((after, token)) = &self.cancel_after {
                if call == *after {
                    token.cancel();
                }
            }
            if let Some(every) = self.fail_every {
                if call % every == 0 {
                    return Err(MyoError::Evaluation("simulation diverged".to_string()));
                }
            }
            let free = &full_values[..self.target.len()];
            let dist: f64 = free
                .iter()
                .zip(&self.target)
                .map(|(v, t)| (v - t).powi(2))
                .sum();
            let raw = match self.direction {
                Direction::Minimize => dist,
                Direction::Maximize => -dist,
            };
            Ok(Evaluation::new(raw).with_report(format!("dist={dist:.6}")))
        }

        fn direction(&self) -> Direction {
            self.direction
        }

        fn signature(&self) -> String {
            "target".to_string()
        }
    }

    fn optimizer_with(
        objective: TargetObjective,
        config: RunConfig,
    ) -> (SingleOptimizer, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let config = config.with_output_root(dir.path());
        let opt = SingleOptimizer::new(
            config,
            Arc::new(objective),
            Arc::new(DiagonalEsFactory::default()),
        )
        .unwrap();
        (opt, dir)
    }

    #[test]
    fn run_reaches_generation_limit() {
        let (mut opt, _dir) = optimizer_with(
            TargetObjective::new(vec![0.3, -0.2]),
            RunConfig::new().with_seed(21).with_max_generations(25),
        );
        let report = opt.run().unwrap();
        assert_eq!(report.state, RunState::Exhausted);
        assert_eq!(report.stop_reason, Some(StopReason::GenerationLimit));
        assert_eq!(report.generations, 25);
        assert_eq!(report.resolved_seed, 21);
        assert!(report.best_fitness.is_finite());
    }

    #[test]
    fn best_fitness_never_worsens() {
        let (mut opt, _dir) = optimizer_with(
            TargetObjective::new(vec![0.5]),
            RunConfig::new().with_seed(3).with_max_generations(30),
        );
        let mut last = f64::INFINITY;
        while !opt.state().is_terminal() {
            opt.step().unwrap();
            if opt.state().is_terminal() {
                break;
            }
            assert!(opt.best_fitness() <= last);
            last = opt.best_fitness();
        }
    }

    #[test]
    fn equal_seeds_give_identical_trajectories() {
        let trajectory = |seed: u64| {
            let (mut opt, _dir) = optimizer_with(
                TargetObjective::new(vec![0.1, 0.7, -0.4]),
                RunConfig::new().with_seed(seed).with_max_generations(15),
            );
            let mut bests = Vec::new();
            while !opt.state().is_terminal() {
                opt.step().unwrap();
                bests.push(opt.best_fitness());
            }
            bests
        };
        assert_eq!(trajectory(99), trajectory(99));
        assert_ne!(trajectory(99), trajectory(100));
    }

    #[test]
    fn zero_seed_is_resolved_and_recorded() {
        let (mut opt, _dir) = optimizer_with(
            TargetObjective::new(vec![0.0]),
            RunConfig::new().with_seed(0).with_max_generations(2),
        );
        let report = opt.run().unwrap();
        assert_ne!(report.resolved_seed, 0);
    }

    #[test]
    fn zero_free_parameters_is_dimension_error() {
        struct NoFree;
        impl Objective for NoFree {
            fn declare(&self, params: &mut ParamSet) -> MyoResult<()> {
                params.declare_fixed("constant", 1.0)?;
                Ok(())
            }
            fn evaluate(&self, _: &[f64]) -> MyoResult<Evaluation> {
                Ok(Evaluation::new(0.0))
            }
            fn direction(&self) -> Direction {
                Direction::Minimize
            }
            fn signature(&self) -> String {
                "nofree".to_string()
            }
        }

        let dir = tempdir().unwrap();
        let config = RunConfig::new().with_output_root(dir.path());
        let mut opt = SingleOptimizer::new(
            config,
            Arc::new(NoFree),
            Arc::new(DiagonalEsFactory::default()),
        )
        .unwrap();
        let err = opt.step().unwrap_err();
        assert!(matches!(err, MyoError::Dimension { .. }));
        assert_eq!(opt.state(), RunState::Failed);
    }

    #[test]
    fn failing_candidates_do_not_halt_the_run() {
        let mut objective = TargetObjective::new(vec![0.2]);
        objective.fail_every = Some(5);
        let (mut opt, _dir) = optimizer_with(
            objective,
            RunConfig::new().with_seed(8).with_max_generations(10),
        );
        let report = opt.run().unwrap();
        assert_eq!(report.state, RunState::Exhausted);
        assert!(report.evaluation_failures > 0);
        assert!(report.best_fitness.is_finite());
    }

    #[test]
    fn cancellation_waits_for_the_generation_boundary() {
        let mut objective = TargetObjective::new(vec![0.0, 0.0]);
        let token = CancelToken::new();
        // population for dim=2 is 4 + floor(3 ln 2) = 6, so evaluation 9
        // lands in the middle of the second generation
        objective.cancel_after = Some((9, token.clone()));
        let dir = tempdir().unwrap();
        let config = RunConfig::new()
            .with_seed(4)
            .with_max_generations(100)
            .with_output_root(dir.path());
        let mut opt = SingleOptimizer::new(
            config,
            Arc::new(objective),
            Arc::new(DiagonalEsFactory::default()),
        )
        .unwrap();
        // wire the external token to the optimizer's own
        opt.cancel = token;

        let report = opt.run().unwrap();
        assert_eq!(report.state, RunState::Cancelled);
        assert_eq!(report.stop_reason, Some(StopReason::Cancelled));
        // the generation in flight completed before the stop took effect
        assert_eq!(report.generations, 2);
    }

    #[test]
    fn output_folder_holds_config_checkpoints_and_final_best() {
        let (mut opt, _dir) = optimizer_with(
            TargetObjective::new(vec![0.4]),
            RunConfig::new().with_seed(13).with_max_generations(20),
        );
        let report = opt.run().unwrap();
        let folder = report.output_folder.unwrap();
        assert!(folder.join("config.json").exists());
        assert!(folder.join("best.par").exists());
        let par_files = fs::read_dir(&folder)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().map(|x| x == "par").unwrap_or(false))
            .count();
        assert!(par_files >= 2); // at least one generation checkpoint + best.par
    }

    #[test]
    fn maximizing_objective_reports_raw_fitness() {
        let mut objective = TargetObjective::new(vec![0.0]);
        objective.direction = Direction::Maximize;
        let (mut opt, _dir) = optimizer_with(
            objective,
            RunConfig::new().with_seed(17).with_max_generations(15),
        );
        let report = opt.run().unwrap();
        // raw fitness of the maximizing wrapper is -distance: close to zero
        // from below, never positive
        assert!(report.best_fitness <= 0.0);
        assert!(report.best_fitness > -5.0);
    }

    #[test]
    fn halt_reason_is_carried_through_the_token() {
        let (mut opt, _dir) = optimizer_with(
            TargetObjective::new(vec![0.0]),
            RunConfig::new().with_seed(5).with_max_generations(100),
        );
        opt.step().unwrap();
        opt.cancel_token()
            .cancel_with_reason(StopReason::PoolOutperformed);
        let report = opt.run().unwrap();
        assert_eq!(report.state, RunState::Cancelled);
        assert_eq!(report.stop_reason, Some(StopReason::PoolOutperformed));
    }
}
