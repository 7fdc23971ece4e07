//! Newtype wrappers for domain identifiers.
//!
//! These types keep change numbers, patchset numbers and job names from being
//! mixed up with one another and make signatures self-documenting.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The identity used to correlate an event with the builds it triggers.
///
/// Ordered by change number first, then patchset number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PatchSetKey {
    pub change: u64,
    pub patchset: u64,
}

impl PatchSetKey {
    pub fn new(change: u64, patchset: u64) -> Self {
        PatchSetKey { change, patchset }
    }
}

impl fmt::Display for PatchSetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.change, self.patchset)
    }
}

impl From<(u64, u64)> for PatchSetKey {
    fn from((change, patchset): (u64, u64)) -> Self {
        PatchSetKey { change, patchset }
    }
}

/// The full name of a downstream job that reacts to events.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobName(pub String);

impl JobName {
    pub fn new(s: impl Into<String>) -> Self {
        JobName(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for JobName {
    fn from(s: String) -> Self {
        JobName(s)
    }
}

impl From<&str> for JobName {
    fn from(s: &str) -> Self {
        JobName(s.to_string())
    }
}

/// A build number within a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BuildNumber(pub u64);

impl fmt::Display for BuildNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<u64> for BuildNumber {
    fn from(n: u64) -> Self {
        BuildNumber(n)
    }
}
