//! # myo-pool
//!
//! Pool scheduling for MyoSearch: run several independently seeded
//! optimizations over one objective and concentrate compute on the most
//! promising ones by stopping durably outperformed runs early.

mod reporter;
mod scheduler;

pub use reporter::{ChannelReporter, LogReporter, PoolEvent, PoolReporter};
pub use scheduler::{OptimizerPool, PoolConfig};
