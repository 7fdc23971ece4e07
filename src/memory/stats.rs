//! Started-builds progress counter.

use serde::Serialize;
use std::fmt;

use crate::types::PatchSetKey;

/// How many of the builds triggered for a patchset have started.
///
/// Displays as `(started/total)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BuildsStartedStats {
    pub key: PatchSetKey,
    pub total: usize,
    pub started: usize,
}

impl BuildsStartedStats {
    pub fn new(key: PatchSetKey, total: usize, started: usize) -> Self {
        BuildsStartedStats {
            key,
            total,
            started,
        }
    }

    /// Like `Display`, with `offset` subtracted from the started count.
    pub fn display_with_offset(&self, offset: usize) -> String {
        format!("({}/{})", self.started.saturating_sub(offset), self.total)
    }
}

impl fmt::Display for BuildsStartedStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}/{})", self.started, self.total)
    }
}
