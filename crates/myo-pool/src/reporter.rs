//! Reporting hooks for pool runs.

use crossbeam_channel::Sender;
use serde::{Deserialize, Serialize};
use tracing::info;

use myo_types::RunReport;

/// Events a pool emits for external consumption (logging, UI, orchestration).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PoolEvent {
    Started { members: usize },
    InstanceFinished { report: RunReport },
}

/// Observer of pool lifecycle events. All hooks default to no-ops.
pub trait PoolReporter: Send {
    fn on_pool_start(&self, _members: usize) {}
    fn on_instance_finished(&self, _report: &RunReport) {}
}

/// Logs pool events through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

impl PoolReporter for LogReporter {
    fn on_pool_start(&self, members: usize) {
        info!(members, "pool started");
    }

    fn on_instance_finished(&self, report: &RunReport) {
        info!(
            id = %report.id,
            state = ?report.state,
            reason = ?report.stop_reason,
            best = report.best_fitness,
            generations = report.generations,
            "pool instance finished"
        );
    }
}

/// Forwards pool events over a channel.
pub struct ChannelReporter {
    tx: Sender<PoolEvent>,
}

impl ChannelReporter {
    pub fn new(tx: Sender<PoolEvent>) -> Self {
        Self { tx }
    }
}

impl PoolReporter for ChannelReporter {
    fn on_pool_start(&self, members: usize) {
        let _ = self.tx.send(PoolEvent::Started { members });
    }

    fn on_instance_finished(&self, report: &RunReport) {
        let _ = self.tx.send(PoolEvent::InstanceFinished {
            report: report.clone(),
        });
    }
}
