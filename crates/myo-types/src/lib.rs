//! # myo-types
//!
//! Core types for MyoSearch: fitness direction handling, the error taxonomy,
//! run configuration, and run lifecycle reports shared by every other crate.

mod config;
mod errors;
mod fitness;
mod report;

pub use config::RunConfig;
pub use errors::{MyoError, MyoResult, ParamError};
pub use fitness::Direction;
pub use report::{GenerationRecord, RunId, RunReport, RunState, StopReason};
