//! Ordered parameter sets with a declare/update lifecycle.
//!
//! A [`ParamSet`] starts in declare mode while an objective wires up its
//! sub-components, is frozen to update mode before the optimization loop
//! begins, and is mutated thereafter only through the free-parameter vector.

use std::collections::HashMap;

use myo_types::{MyoResult, ParamError};

use crate::param::Parameter;

/// Lifecycle mode of a [`ParamSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamMode {
    /// New parameters may be registered; duplicate names are an error.
    Declare,
    /// Only existing parameters' values may change.
    Update,
}

/// An ordered mapping of named scalar parameters.
///
/// Free parameters appear in the optimization vector in declaration order;
/// that order is fixed once [`ParamSet::finalize`] switches the set to update
/// mode.
#[derive(Debug, Clone)]
pub struct ParamSet {
    params: Vec<Parameter>,
    index: HashMap<String, usize>,
    mode: ParamMode,
    prefix: String,
    free_count: usize,
}

impl ParamSet {
    pub fn new() -> Self {
        Self {
            params: Vec::new(),
            index: HashMap::new(),
            mode: ParamMode::Declare,
            prefix: String::new(),
            free_count: 0,
        }
    }

    pub fn mode(&self) -> ParamMode {
        self.mode
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Register a free parameter. Returns its index within the set.
    pub fn declare(&mut self, name: &str, init_mean: f64, init_std: f64) -> MyoResult<usize> {
        self.push(Parameter::free(self.scoped_name(name), init_mean, init_std))
    }

    /// Register a fixed parameter; it never enters the optimization vector.
    pub fn declare_fixed(&mut self, name: &str, value: f64) -> MyoResult<usize> {
        self.push(Parameter::fixed(self.scoped_name(name), value))
    }

    fn scoped_name(&self, name: &str) -> String {
        if self.prefix.is_empty() {
            name.to_string()
        } else {
            format!("{}{}", self.prefix, name)
        }
    }

    fn push(&mut self, param: Parameter) -> MyoResult<usize> {
        if self.mode != ParamMode::Declare {
            return Err(ParamError::InvalidMode {
                operation: format!("declare {}", param.name),
            }
            .into());
        }
        if self.index.contains_key(&param.name) {
            return Err(ParamError::DuplicateName { name: param.name }.into());
        }
        let idx = self.params.len();
        self.index.insert(param.name.clone(), idx);
        if param.is_free {
            self.free_count += 1;
        }
        self.params.push(param);
        Ok(idx)
    }

    /// Run `f` with every `declare` inside prefixed by `prefix` plus a `.`
    /// separator. Prefixes nest, so two structurally identical sub-objectives
    /// declared under different prefixes produce distinct names.
    pub fn with_prefix<R>(&mut self, prefix: &str, f: impl FnOnce(&mut Self) -> R) -> R {
        let saved = self.prefix.len();
        self.prefix.push_str(prefix);
        self.prefix.push('.');
        let result = f(self);
        self.prefix.truncate(saved);
        result
    }

    /// Freeze the set: no further declarations, free-parameter order and
    /// count are now fixed.
    pub fn finalize(&mut self) {
        self.mode = ParamMode::Update;
    }

    pub fn free_count(&self) -> usize {
        self.free_count
    }

    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.index.get(name).map(|&i| &self.params[i])
    }

    pub(crate) fn get_mut(&mut self, name: &str) -> Option<&mut Parameter> {
        let idx = *self.index.get(name)?;
        Some(&mut self.params[idx])
    }

    /// Iterate all declared parameters in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &Parameter> {
        self.params.iter()
    }

    /// Current values of the free parameters, in declaration order.
    pub fn free_values(&self) -> Vec<f64> {
        self.params
            .iter()
            .filter(|p| p.is_free)
            .map(|p| p.value)
            .collect()
    }

    /// Overwrite the free-parameter values from an optimization vector.
    pub fn set_free_values(&mut self, values: &[f64]) -> MyoResult<()> {
        if values.len() != self.free_count {
            return Err(ParamError::SizeMismatch {
                expected: self.free_count,
                actual: values.len(),
            }
            .into());
        }
        let mut it = values.iter();
        for param in self.params.iter_mut().filter(|p| p.is_free) {
            param.value = *it.next().expect("length checked above");
        }
        Ok(())
    }

    /// All declared parameter values in declaration order — the full vector
    /// an objective's `evaluate` consumes.
    pub fn full_values(&self) -> Vec<f64> {
        self.params.iter().map(|p| p.value).collect()
    }

    /// Build the full value vector for a candidate free vector without
    /// mutating the set. Used when candidates are evaluated in parallel.
    pub fn full_values_with(&self, free: &[f64]) -> MyoResult<Vec<f64>> {
        if free.len() != self.free_count {
            return Err(ParamError::SizeMismatch {
                expected: self.free_count,
                actual: free.len(),
            }
            .into());
        }
        let mut it = free.iter();
        Ok(self
            .params
            .iter()
            .map(|p| {
                if p.is_free {
                    *it.next().expect("length checked above")
                } else {
                    p.value
                }
            })
            .collect())
    }

    /// Overwrite the free parameters' init mean/std, e.g. from the strategy's
    /// current state for reporting.
    pub fn update_mean_std(&mut self, mean: &[f64], std: &[f64]) -> MyoResult<()> {
        if mean.len() != self.free_count || std.len() != self.free_count {
            return Err(ParamError::SizeMismatch {
                expected: self.free_count,
                actual: mean.len().min(std.len()),
            }
            .into());
        }
        for (i, param) in self.params.iter_mut().filter(|p| p.is_free).enumerate() {
            param.init_mean = mean[i];
            param.init_std = std[i];
        }
        Ok(())
    }

    /// Initial (mean, std) vectors over the free parameters.
    ///
    /// When `global_std` is set, std is recomputed uniformly as
    /// `factor * |mean| + offset`, overriding the per-parameter values.
    pub fn init_mean_std(&self, global_std: Option<(f64, f64)>) -> (Vec<f64>, Vec<f64>) {
        let mut mean = Vec::with_capacity(self.free_count);
        let mut std = Vec::with_capacity(self.free_count);
        for param in self.params.iter().filter(|p| p.is_free) {
            mean.push(param.init_mean);
            std.push(match global_std {
                Some((factor, offset)) => factor * param.init_mean.abs() + offset,
                None => param.init_std,
            });
        }
        (mean, std)
    }
}

impl Default for ParamSet {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_set() -> ParamSet {
        let mut ps = ParamSet::new();
        ps.declare("stance.kp", 1.0, 0.2).unwrap();
        ps.declare_fixed("body_mass", 72.0).unwrap();
        ps.declare("stance.kd", -0.5, 0.1).unwrap();
        ps.declare("swing.offset", 0.05, 0.01).unwrap();
        ps.finalize();
        ps
    }

    #[test]
    fn declaration_order_is_stable() {
        let ps = sample_set();
        assert_eq!(ps.len(), 4);
        assert_eq!(ps.free_count(), 3);
        let names: Vec<&str> = ps
            .iter()
            .filter(|p| p.is_free)
            .map(|p| p.name.as_str())
            .collect();
        assert_eq!(names, ["stance.kp", "stance.kd", "swing.offset"]);
    }

    #[test]
    fn duplicate_name_is_error() {
        let mut ps = ParamSet::new();
        ps.declare("x", 0.0, 1.0).unwrap();
        let err = ps.declare("x", 0.0, 1.0).unwrap_err();
        assert!(err.to_string().contains("Duplicate"));
    }

    #[test]
    fn declare_after_finalize_is_error() {
        let mut ps = sample_set();
        assert!(ps.declare("late", 0.0, 1.0).is_err());
        assert!(ps.declare_fixed("late_fixed", 0.0).is_err());
    }

    #[test]
    fn free_vector_round_trip_is_identity() {
        let mut ps = sample_set();
        let before = ps.free_values();
        ps.set_free_values(&before.clone()).unwrap();
        assert_eq!(ps.free_values(), before);
    }

    #[test]
    fn set_free_values_rejects_wrong_length() {
        let mut ps = sample_set();
        let err = ps.set_free_values(&[1.0, 2.0]).unwrap_err();
        assert!(err.to_string().contains("mismatch"));
    }

    #[test]
    fn fixed_params_never_enter_free_vector() {
        let mut ps = sample_set();
        ps.set_free_values(&[9.0, 8.0, 7.0]).unwrap();
        assert_eq!(ps.get("body_mass").unwrap().value, 72.0);
        assert_eq!(ps.full_values(), [9.0, 72.0, 8.0, 7.0]);
    }

    #[test]
    fn full_values_with_does_not_mutate() {
        let ps = sample_set();
        let full = ps.full_values_with(&[3.0, 2.0, 1.0]).unwrap();
        assert_eq!(full, [3.0, 72.0, 2.0, 1.0]);
        // original untouched
        assert_eq!(ps.free_values(), [1.0, -0.5, 0.05]);
    }

    #[test]
    fn scoped_prefixes_nest() {
        let mut ps = ParamSet::new();
        ps.with_prefix("left_leg", |ps| {
            ps.declare("kp", 1.0, 0.1).unwrap();
            ps.with_prefix("ankle", |ps| {
                ps.declare("kd", 0.2, 0.05).unwrap();
            });
        });
        ps.with_prefix("right_leg", |ps| {
            ps.declare("kp", 1.0, 0.1).unwrap();
        });
        assert!(ps.get("left_leg.kp").is_some());
        assert!(ps.get("left_leg.ankle.kd").is_some());
        assert!(ps.get("right_leg.kp").is_some());
        // prefix removed once the scope exits
        ps.declare("unscoped", 0.0, 1.0).unwrap();
        assert!(ps.get("unscoped").is_some());
    }

    #[test]
    fn global_std_override() {
        let ps = sample_set();
        let (mean, std) = ps.init_mean_std(Some((0.1, 0.01)));
        assert_eq!(mean, [1.0, -0.5, 0.05]);
        let expected: Vec<f64> = mean.iter().map(|m| 0.1 * m.abs() + 0.01).collect();
        assert_eq!(std, expected);

        let (_, per_param) = ps.init_mean_std(None);
        assert_eq!(per_param, [0.2, 0.1, 0.01]);
    }

    #[test]
    fn update_mean_std_touches_only_free() {
        let mut ps = sample_set();
        ps.update_mean_std(&[1.1, -0.4, 0.06], &[0.15, 0.08, 0.005])
            .unwrap();
        assert_eq!(ps.get("stance.kp").unwrap().init_mean, 1.1);
        assert_eq!(ps.get("body_mass").unwrap().init_mean, 72.0);
        assert!(ps.update_mean_std(&[0.0], &[1.0]).is_err());
    }
}
