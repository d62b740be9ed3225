//! Checkpoint log and file-output pruning.
//!
//! The [`OutputManager`] owns a run's output folder and an append-only log of
//! `(generation, fitness, files)` checkpoints. After each append it applies a
//! local three-entry pruning rule that deletes a checkpoint whose neighbors
//! show too little improvement on either side, bounding disk usage to
//! roughly one retained checkpoint per fitness plateau.

use std::fs;
use std::path::{Path, PathBuf};

use myo_types::{Direction, MyoResult};
use tracing::{debug, warn};

/// A persisted snapshot of best-known parameters at a given generation.
#[derive(Debug, Clone, PartialEq)]
pub struct Checkpoint {
    pub generation: u64,
    pub fitness: f64,
    pub files: Vec<PathBuf>,
}

/// Append-only checkpoint log with greedy local pruning.
#[derive(Debug)]
pub struct OutputManager {
    folder: PathBuf,
    direction: Direction,
    /// Minimum fractional improvement a checkpoint must show against either
    /// neighbor to survive pruning.
    min_improvement: f64,
    log: Vec<Checkpoint>,
}

impl OutputManager {
    pub fn new(folder: PathBuf, direction: Direction, min_improvement: f64) -> Self {
        Self {
            folder,
            direction,
            min_improvement,
            log: Vec::new(),
        }
    }

    /// The run's output folder.
    pub fn folder(&self) -> &Path {
        &self.folder
    }

    /// Checkpoints currently retained, oldest first.
    pub fn checkpoints(&self) -> &[Checkpoint] {
        &self.log
    }

    /// Append a checkpoint, then evaluate the second-to-last entry for
    /// deletion.
    ///
    /// Deletion is best-effort: if any backing file cannot be removed, the
    /// log entry stays so no file reference is silently lost, and the run
    /// continues either way.
    pub fn record(&mut self, generation: u64, fitness: f64, files: Vec<PathBuf>) {
        self.log.push(Checkpoint {
            generation,
            fitness,
            files,
        });

        if self.log.len() < 3 {
            return;
        }

        let test = self.log.len() - 2;
        let imp1 = self.improvement_factor(self.log[test - 1].fitness, self.log[test].fitness);
        let imp2 = self.improvement_factor(self.log[test].fitness, self.log[test + 1].fitness);

        if imp1 - 1.0 < self.min_improvement && imp2 - 1.0 < self.min_improvement {
            debug!(
                generation = self.log[test].generation,
                imp1, imp2, "pruning redundant checkpoint"
            );
            let mut all_removed = true;
            for file in &self.log[test].files {
                if let Err(e) = fs::remove_file(file) {
                    warn!(file = %file.display(), error = %e, "failed to delete checkpoint file");
                    all_removed = false;
                }
            }
            if all_removed {
                self.log.remove(test);
            }
        }
    }

    /// Improvement factor of `new` over `old`, oriented so that > 1 means
    /// improvement regardless of direction.
    fn improvement_factor(&self, old: f64, new: f64) -> f64 {
        let ratio = new / old;
        if self.direction.is_minimizing() {
            1.0 / ratio
        } else {
            ratio
        }
    }
}

/// Create a uniquely named folder under `root` based on `signature`.
///
/// Never reuses an existing folder: collisions are resolved by suffixing
/// `_1`, `_2`, ...
pub fn create_unique_folder(root: &Path, signature: &str) -> MyoResult<PathBuf> {
    fs::create_dir_all(root)?;
    for attempt in 0u32.. {
        let candidate = if attempt == 0 {
            root.join(signature)
        } else {
            root.join(format!("{signature}_{attempt}"))
        };
        match fs::create_dir(&candidate) {
            Ok(()) => return Ok(candidate),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e.into()),
        }
    }
    unreachable!("u32 folder suffixes exhausted")
}
