//! Build identity and outcome as reported by the build system.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::{BuildNumber, JobName};

/// Final outcome of a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BuildResult {
    Success,
    Unstable,
    Failure,
    NotBuilt,
    Aborted,
}

impl fmt::Display for BuildResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BuildResult::Success => "SUCCESS",
            BuildResult::Unstable => "UNSTABLE",
            BuildResult::Failure => "FAILURE",
            BuildResult::NotBuilt => "NOT_BUILT",
            BuildResult::Aborted => "ABORTED",
        };
        f.write_str(s)
    }
}

/// A single build of a job.
///
/// `result` is `None` while the build is running.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BuildRef {
    pub job: JobName,
    pub number: BuildNumber,
    pub result: Option<BuildResult>,
}

impl BuildRef {
    /// A build that has started but not finished.
    pub fn running(job: impl Into<JobName>, number: u64) -> Self {
        BuildRef {
            job: job.into(),
            number: BuildNumber(number),
            result: None,
        }
    }

    /// A build that finished with `result`.
    pub fn finished(job: impl Into<JobName>, number: u64, result: BuildResult) -> Self {
        BuildRef {
            job: job.into(),
            number: BuildNumber(number),
            result: Some(result),
        }
    }

    pub fn is_building(&self) -> bool {
        self.result.is_none()
    }
}

impl fmt::Display for BuildRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.job, self.number)
    }
}
