use serde::{Deserialize, Serialize};

/// A single named scalar parameter.
///
/// Free parameters are part of the optimization vector; fixed parameters keep
/// their declared value for the whole run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    /// Unique name within its [`ParamSet`](crate::ParamSet), including any
    /// scope prefixes active at declaration time.
    pub name: String,
    /// Current value.
    pub value: f64,
    /// Whether this parameter participates in the optimization vector.
    pub is_free: bool,
    /// Initial search mean.
    pub init_mean: f64,
    /// Initial search std.
    pub init_std: f64,
}

impl Parameter {
    pub fn free(name: impl Into<String>, init_mean: f64, init_std: f64) -> Self {
        Self {
            name: name.into(),
            value: init_mean,
            is_free: true,
            init_mean,
            init_std,
        }
    }

    pub fn fixed(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value,
            is_free: false,
            init_mean: value,
            init_std: 0.0,
        }
    }
}
