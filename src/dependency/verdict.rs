//! Reasons a queued job may not run yet.

use std::fmt;

use serde::Serialize;

use crate::types::JobName;

/// Why the gate is holding a queued job back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "jobs", rename_all = "snake_case")]
pub enum CauseOfBlockage {
    /// The item was queued too recently for its siblings to be queued too.
    WaitingToEnsureOtherJobsAreInQueue,

    /// Other jobs are still being triggered for the same event.
    WaitingForOtherJobsToTrigger,

    /// These dependencies are still building for the same event.
    DependentBuildIsBuilding(Vec<JobName>),
}

impl CauseOfBlockage {
    /// The dependencies holding the job back, if any.
    pub fn blocking_jobs(&self) -> &[JobName] {
        match self {
            CauseOfBlockage::DependentBuildIsBuilding(jobs) => jobs,
            _ => &[],
        }
    }
}

impl fmt::Display for CauseOfBlockage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CauseOfBlockage::WaitingToEnsureOtherJobsAreInQueue => {
                write!(f, "Waiting to ensure other dependent jobs are in the queue")
            }
            CauseOfBlockage::WaitingForOtherJobsToTrigger => {
                write!(f, "Waiting for other jobs to be triggered")
            }
            CauseOfBlockage::DependentBuildIsBuilding(jobs) => {
                write!(f, "Waiting for dependency builds to finish: ")?;
                for (i, job) in jobs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{job}")?;
                }
                Ok(())
            }
        }
    }
}
