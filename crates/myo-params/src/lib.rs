//! # myo-params
//!
//! Named optimization parameters for MyoSearch: ordered sets with a
//! declare/update lifecycle, free/fixed state, scoped name prefixing, and
//! `.par` checkpoint file import/export.

mod file;
mod param;
mod set;

pub use param::Parameter;
pub use set::{ParamMode, ParamSet};
