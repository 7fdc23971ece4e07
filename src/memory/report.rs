//! Point-in-time snapshot of the whole build memory, for diagnostics.

use serde::Serialize;

use crate::events::GerritEventType;
use crate::types::PatchSetKey;

use super::imprint::{Entry, MemoryImprint};

/// Every imprint and its entries, ordered by key.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BuildMemoryReport {
    pub imprints: Vec<ReportedImprint>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportedImprint {
    pub key: PatchSetKey,
    pub event_type: GerritEventType,
    pub project: String,
    pub entries: Vec<Entry>,
}

impl From<&MemoryImprint> for ReportedImprint {
    fn from(imprint: &MemoryImprint) -> Self {
        ReportedImprint {
            key: imprint.key(),
            event_type: imprint.event().event_type(),
            project: imprint.event().project().to_string(),
            entries: imprint.entries().to_vec(),
        }
    }
}

impl BuildMemoryReport {
    pub fn is_empty(&self) -> bool {
        self.imprints.is_empty()
    }

    pub fn get(&self, key: PatchSetKey) -> Option<&ReportedImprint> {
        self.imprints.iter().find(|i| i.key == key)
    }
}
