//! # myo-optimizer
//!
//! The MyoSearch single-run optimization core: the [`Objective`] and
//! [`EvolutionStrategy`] capability interfaces, a default seeded
//! diagonal-Gaussian strategy, checkpoint output management with pruning,
//! and the generation loop that ties them together.

mod objective;
mod output;
mod single;
mod strategy;

pub use objective::{Evaluation, Objective};
pub use output::{create_unique_folder, Checkpoint, OutputManager};
pub use single::{CancelToken, SingleOptimizer};
pub use strategy::{
    suggest_lambda, DiagonalEs, DiagonalEsFactory, EvolutionStrategy, StrategyFactory,
    StrategyInit,
};
