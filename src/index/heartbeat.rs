//! Progress reporting for long-running construction.

use std::fmt;

use tracing::info;

/// Named phases of index construction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConstructionStep {
    /// Building and merging preindexes.
    Construct,
    /// Writing the output files.
    Finalize,
    /// Done.
    Finished,
}

impl ConstructionStep {
    /// Every step, in order.
    pub const ALL: [ConstructionStep; 3] = [
        ConstructionStep::Construct,
        ConstructionStep::Finalize,
        ConstructionStep::Finished,
    ];

    /// Upper-case step name.
    pub fn name(self) -> &'static str {
        match self {
            ConstructionStep::Construct => "CONSTRUCT",
            ConstructionStep::Finalize => "FINALIZE",
            ConstructionStep::Finished => "FINISHED",
        }
    }

    /// Position within [`ConstructionStep::ALL`].
    pub fn ordinal(self) -> usize {
        self as usize
    }
}

impl fmt::Display for ConstructionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Receives step transitions of one task.
pub trait TaskHeartbeat: Send + Sync {
    /// Marks entry into `step`.
    fn progress(&self, step: ConstructionStep);
}

/// Receives a free-form counter.
pub trait AdHocTaskHeartbeat: Send + Sync {
    /// Reports `current` of `total` units done under `label`.
    fn progress(&self, label: &str, current: u64, total: u64);
}

/// Progress sink for a whole process.
pub trait ProcessHeartbeat: Send + Sync {
    /// Heartbeat for the step sequence of `task`.
    fn create_task_heartbeat(&self, task: &str) -> Box<dyn TaskHeartbeat + '_>;

    /// Heartbeat for an ad-hoc counter of `task`.
    fn create_ad_hoc_heartbeat(&self, task: &str) -> Box<dyn AdHocTaskHeartbeat + '_>;
}

/// Reports progress as `tracing` events.
#[derive(Clone, Copy, Debug, Default)]
pub struct LoggingHeartbeat;

struct LoggingTask {
    task: String,
}

impl TaskHeartbeat for LoggingTask {
    fn progress(&self, step: ConstructionStep) {
        info!(task = %self.task, step = step.name(), "heartbeat.step");
    }
}

impl AdHocTaskHeartbeat for LoggingTask {
    fn progress(&self, label: &str, current: u64, total: u64) {
        info!(task = %self.task, label, current, total, "heartbeat.progress");
    }
}

impl ProcessHeartbeat for LoggingHeartbeat {
    fn create_task_heartbeat(&self, task: &str) -> Box<dyn TaskHeartbeat + '_> {
        Box::new(LoggingTask { task: task.to_owned() })
    }

    fn create_ad_hoc_heartbeat(&self, task: &str) -> Box<dyn AdHocTaskHeartbeat + '_> {
        Box::new(LoggingTask { task: task.to_owned() })
    }
}

/// Discards progress.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopHeartbeat;

impl TaskHeartbeat for NoopHeartbeat {
    fn progress(&self, _step: ConstructionStep) {}
}

impl AdHocTaskHeartbeat for NoopHeartbeat {
    fn progress(&self, _label: &str, _current: u64, _total: u64) {}
}

impl ProcessHeartbeat for NoopHeartbeat {
    fn create_task_heartbeat(&self, _task: &str) -> Box<dyn TaskHeartbeat + '_> {
        Box::new(NoopHeartbeat)
    }

    fn create_ad_hoc_heartbeat(&self, _task: &str) -> Box<dyn AdHocTaskHeartbeat + '_> {
        Box::new(NoopHeartbeat)
    }
}
