//! The evolution-strategy capability interface and a default implementation.
//!
//! Any sampler that can propose generations and report its current
//! mean/spread/best can plug in here; the generation loop never depends on a
//! particular adaptation scheme.

use myo_types::MyoResult;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Everything a strategy needs to start: problem dimension, population size
/// (0 = strategy's choice), the initial search distribution, and the resolved
/// random seed.
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyInit {
    pub dim: usize,
    pub population: usize,
    pub mean: Vec<f64>,
    pub std: Vec<f64>,
    pub seed: u64,
}

/// A generation-based sampler over R^dim.
///
/// Fitnesses passed to [`tell`](EvolutionStrategy::tell) are already
/// normalized so that lower is better; strategies never deal with
/// minimize/maximize themselves.
pub trait EvolutionStrategy: Send {
    /// Propose the next population of candidate points.
    fn ask(&mut self) -> Vec<Vec<f64>>;

    /// Report the fitnesses of the last asked population, in the same order.
    /// Single-threaded: callers must not overlap `tell` with evaluation.
    fn tell(&mut self, fitnesses: &[f64]);

    /// Best point seen so far and its (normalized) fitness.
    fn best(&self) -> (&[f64], f64);

    /// Current distribution mean.
    fn mean(&self) -> &[f64];

    /// Square roots of the covariance diagonal.
    fn std_diag(&self) -> Vec<f64>;

    /// Whether the strategy considers itself converged.
    fn converged(&self) -> bool;

    /// Population size per generation.
    fn population(&self) -> usize;
}

/// Builds a fresh strategy for each run.
pub trait StrategyFactory: Send + Sync {
    fn create(&self, init: StrategyInit) -> MyoResult<Box<dyn EvolutionStrategy>>;
}

impl<F> StrategyFactory for F
where
    F: Fn(StrategyInit) -> MyoResult<Box<dyn EvolutionStrategy>> + Send + Sync,
{
    fn create(&self, init: StrategyInit) -> MyoResult<Box<dyn EvolutionStrategy>> {
        self(init)
    }
}

/// Default population size for a given problem dimension.
pub fn suggest_lambda(dim: usize) -> usize {
    4 + (3.0 * (dim.max(1) as f64).ln()).floor() as usize
}

/// A seeded diagonal-Gaussian (mu/lambda) evolution strategy.
///
/// Samples each generation from an axis-aligned normal around the current
/// mean, recombines the top-mu candidates with log-rank weights, and shrinks
/// the per-axis std toward the selected set's spread. Deliberately simple;
/// swap in a full covariance-adapting strategy through [`StrategyFactory`]
/// when the problem needs one.
pub struct DiagonalEs {
    lambda: usize,
    mu: usize,
    weights: Vec<f64>,
    mean: Vec<f64>,
    std: Vec<f64>,
    rng: ChaCha8Rng,
    last_population: Vec<Vec<f64>>,
    best_point: Vec<f64>,
    best_value: f64,
    std_floor: f64,
}

impl DiagonalEs {
    pub fn new(init: StrategyInit) -> Self {
        let lambda = if init.population > 0 {
            init.population
        } else {
            suggest_lambda(init.dim)
        };
        let mu = (lambda / 2).max(1);

        // log-rank recombination weights, normalized to 1
        let raw: Vec<f64> = (0..mu)
            .map(|i| ((mu as f64) + 0.5).ln() - ((i + 1) as f64).ln())
            .collect();
        let total: f64 = raw.iter().sum();
        let weights = raw.iter().map(|w| w / total).collect();

        Self {
            lambda,
            mu,
            weights,
            best_point: init.mean.clone(),
            mean: init.mean,
            std: init.std,
            rng: ChaCha8Rng::seed_from_u64(init.seed),
            last_population: Vec::new(),
            best_value: f64::INFINITY,
            std_floor: 1e-10,
        }
    }

    pub fn with_std_floor(mut self, floor: f64) -> Self {
        self.std_floor = floor;
        self
    }

    /// Box-Muller standard normal draw.
    fn standard_normal(&mut self) -> f64 {
        let u1: f64 = self.rng.gen_range(f64::EPSILON..1.0);
        let u2: f64 = self.rng.gen::<f64>();
        (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
    }
}

impl EvolutionStrategy for DiagonalEs {
    fn ask(&mut self) -> Vec<Vec<f64>> {
        let dim = self.mean.len();
        let mut population = Vec::with_capacity(self.lambda);
        for _ in 0..self.lambda {
            let mut point = Vec::with_capacity(dim);
            for d in 0..dim {
                point.push(self.mean[d] + self.std[d] * self.standard_normal());
            }
            population.push(point);
        }
        self.last_population = population.clone();
        population
    }

    fn tell(&mut self, fitnesses: &[f64]) {
        debug_assert_eq!(fitnesses.len(), self.last_population.len());

        let mut ranked: Vec<usize> = (0..fitnesses.len()).collect();
        ranked.sort_by(|&a, &b| {
            fitnesses[a]
                .partial_cmp(&fitnesses[b])
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        if let Some(&leader) = ranked.first() {
            if fitnesses[leader] < self.best_value {
                self.best_value = fitnesses[leader];
                self.best_point = self.last_population[leader].clone();
            }
        }

        let dim = self.mean.len();
        let old_mean = self.mean.clone();
        let mut new_mean = vec![0.0; dim];
        let mut spread = vec![0.0; dim];
        for (rank, &idx) in ranked.iter().take(self.mu).enumerate() {
            let w = self.weights[rank];
            let point = &self.last_population[idx];
            for d in 0..dim {
                new_mean[d] += w * point[d];
                spread[d] += w * (point[d] - old_mean[d]).powi(2);
            }
        }
        self.mean = new_mean;
        for d in 0..dim {
            self.std[d] = spread[d].sqrt().max(self.std_floor);
        }
    }

    fn best(&self) -> (&[f64], f64) {
        (&self.best_point, self.best_value)
    }

    fn mean(&self) -> &[f64] {
        &self.mean
    }

    fn std_diag(&self) -> Vec<f64> {
        self.std.clone()
    }

    fn converged(&self) -> bool {
        let dim = self.std.len().max(1) as f64;
        self.std.iter().sum::<f64>() / dim <= self.std_floor
    }

    fn population(&self) -> usize {
        self.lambda
    }
}

/// Factory for the default strategy.
#[derive(Debug, Clone, Default)]
pub struct DiagonalEsFactory {
    pub std_floor: Option<f64>,
}

impl StrategyFactory for DiagonalEsFactory {
    fn create(&self, init: StrategyInit) -> MyoResult<Box<dyn EvolutionStrategy>> {
        let mut es = DiagonalEs::new(init);
        if let Some(floor) = self.std_floor {
            es = es.with_std_floor(floor);
        }
        Ok(Box::new(es))
    }
}
