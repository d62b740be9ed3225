//! Fitness direction handling.
//!
//! Objectives may minimize or maximize; internally all bookkeeping uses a
//! single lower-is-better convention via [`Direction::normalize`].

use serde::{Deserialize, Serialize};

/// Whether the objective is minimized or maximized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Minimize,
    Maximize,
}

impl Default for Direction {
    fn default() -> Self {
        Self::Minimize
    }
}

impl Direction {
    /// The "worse than anything" sentinel fitness for this direction.
    pub fn worst(self) -> f64 {
        match self {
            Self::Minimize => f64::INFINITY,
            Self::Maximize => f64::NEG_INFINITY,
        }
    }

    /// Strict direction-aware comparison: does `new` beat `old`?
    pub fn improved(self, new: f64, old: f64) -> bool {
        match self {
            Self::Minimize => new < old,
            Self::Maximize => new > old,
        }
    }

    /// Sign-convert a raw fitness so that lower is always better.
    ///
    /// Self-inverse: applying it twice restores the raw value, so the same
    /// function converts internal fitnesses back for reporting.
    pub fn normalize(self, raw: f64) -> f64 {
        match self {
            Self::Minimize => raw,
            Self::Maximize => -raw,
        }
    }

    pub fn is_minimizing(self) -> bool {
        matches!(self, Self::Minimize)
    }
}
