//! Build coordination ledger.
//!
//! [`BuildMemory`] records, per patchset, which jobs were triggered by an
//! event and how far each of them got. It is the one piece of state mutated
//! from several workers at once.
//!
//! # Locking
//!
//! A single mutex guards the whole map. Every operation fetches or creates
//! the imprint and mutates it under that lock, so `triggered`, `started` and
//! `completed` for the same key are serialized no matter which worker calls
//! them or in what order they arrive. No I/O happens while the lock is held.
//!
//! # Lifetime
//!
//! Imprints are created lazily by the first signal for a key and removed
//! with [`BuildMemory::take_if_all_completed`] once every build is done. The
//! check and the removal happen under one lock, so a job triggered
//! concurrently either lands in the imprint before it is judged complete or
//! starts a fresh one afterwards.

pub mod imprint;
pub mod report;
pub mod stats;

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use thiserror::Error;
use tracing::{trace, warn};

use crate::events::{GerritEvent, GerritEventType};
use crate::types::{BuildRef, JobName, PatchSetKey};

pub use imprint::{Entry, MemoryImprint};
pub use report::{BuildMemoryReport, ReportedImprint};
pub use stats::BuildsStartedStats;

/// Errors from ledger mutations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MemoryError {
    /// Only change-based events identify a patchset.
    #[error("{0} events do not refer to a patchset")]
    NotChangeBased(GerritEventType),
}

/// Result type for ledger mutations. The `Ok` value is the key touched.
pub type Result<T> = std::result::Result<T, MemoryError>;

/// The thread-safe build ledger.
#[derive(Debug, Default)]
pub struct BuildMemory {
    memory: Mutex<BTreeMap<PatchSetKey, MemoryImprint>>,
}

impl BuildMemory {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<PatchSetKey, MemoryImprint>> {
        self.memory.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs `f` on the imprint for `event`, creating it first if needed.
    fn with_imprint<R>(
        &self,
        event: &Arc<GerritEvent>,
        f: impl FnOnce(&mut MemoryImprint, bool) -> R,
    ) -> Result<(PatchSetKey, R)> {
        let key = event
            .patch_set_key()
            .ok_or(MemoryError::NotChangeBased(event.event_type()))?;
        let mut memory = self.lock();
        let mut created = false;
        let imprint = memory.entry(key).or_insert_with(|| {
            created = true;
            MemoryImprint::new(key, Arc::clone(event))
        });
        let out = f(imprint, created);
        Ok((key, out))
    }

    // ─── Mutations ────────────────────────────────────────────────────────────

    /// Records that `job` was scheduled in response to `event`.
    ///
    /// Triggering the same job twice keeps a single entry.
    pub fn triggered(&self, event: &Arc<GerritEvent>, job: &JobName) -> Result<PatchSetKey> {
        let (key, ()) = self.with_imprint(event, |imprint, _| {
            imprint.set_triggered(job, Utc::now());
        })?;
        trace!(%key, %job, "Job triggered");
        Ok(key)
    }

    /// Records that `job` was scheduled again for `event`, resetting its entry.
    ///
    /// When no imprint exists yet, `other_builds` (builds of sibling jobs for
    /// the same event) seed it so the completion check accounts for them.
    pub fn retriggered(
        &self,
        event: &Arc<GerritEvent>,
        job: &JobName,
        other_builds: &[BuildRef],
    ) -> Result<PatchSetKey> {
        let (key, ()) = self.with_imprint(event, |imprint, created| {
            let now = Utc::now();
            if created {
                for build in other_builds {
                    imprint.set_known_build(build, now);
                }
            }
            imprint.reset(job, now);
        })?;
        trace!(%key, %job, "Job retriggered");
        Ok(key)
    }

    /// Records that `build` started.
    pub fn started(&self, event: &Arc<GerritEvent>, build: &BuildRef) -> Result<PatchSetKey> {
        let (key, created) = self.with_imprint(event, |imprint, created| {
            imprint.set_started(build, Utc::now());
            created
        })?;
        if created {
            warn!(%key, %build, "Build started without being registered first");
        }
        Ok(key)
    }

    /// Records that `build` finished.
    ///
    /// Valid even when no `started` was seen for it.
    pub fn completed(&self, event: &Arc<GerritEvent>, build: &BuildRef) -> Result<PatchSetKey> {
        let (key, ()) = self.with_imprint(event, |imprint, _| {
            imprint.set_completed(build, Utc::now());
        })?;
        trace!(%key, %build, "Build completed");
        Ok(key)
    }

    /// Records that the queued `job` was cancelled before it ran.
    pub fn cancelled(&self, event: &Arc<GerritEvent>, job: &JobName) -> Result<PatchSetKey> {
        let (key, ()) = self.with_imprint(event, |imprint, _| {
            imprint.set_cancelled(job, Utc::now());
        })?;
        trace!(%key, %job, "Job cancelled");
        Ok(key)
    }

    /// Removes the imprint for `key`. Returns true if one existed.
    pub fn forget(&self, key: PatchSetKey) -> bool {
        self.lock().remove(&key).is_some()
    }

    /// Removes and returns the imprint for `key` if every build in it has
    /// completed. At most one caller gets a given imprint.
    pub fn take_if_all_completed(&self, key: PatchSetKey) -> Option<MemoryImprint> {
        let mut memory = self.lock();
        if !memory
            .get(&key)
            .is_some_and(MemoryImprint::is_all_builds_completed)
        {
            return None;
        }
        memory.remove(&key)
    }

    /// Removes `job` from every imprint, e.g. after the job was deleted.
    pub fn remove_job(&self, job: &JobName) {
        for imprint in self.lock().values_mut() {
            imprint.remove_job(job);
        }
    }

    pub fn set_entry_custom_url(&self, key: PatchSetKey, job: &JobName, url: String) -> bool {
        self.lock()
            .get_mut(&key)
            .is_some_and(|i| i.set_custom_url(job, url))
    }

    pub fn set_entry_unsuccessful_message(
        &self,
        key: PatchSetKey,
        job: &JobName,
        message: String,
    ) -> bool {
        self.lock()
            .get_mut(&key)
            .is_some_and(|i| i.set_unsuccessful_message(job, message))
    }

    // ─── Queries ──────────────────────────────────────────────────────────────

    /// False when `key` is unknown.
    pub fn is_all_builds_started(&self, key: PatchSetKey) -> bool {
        self.lock()
            .get(&key)
            .is_some_and(MemoryImprint::is_all_builds_started)
    }

    /// False when `key` is unknown.
    pub fn is_all_builds_completed(&self, key: PatchSetKey) -> bool {
        self.lock()
            .get(&key)
            .is_some_and(MemoryImprint::is_all_builds_completed)
    }

    pub fn builds_started_stats(&self, key: PatchSetKey) -> Option<BuildsStartedStats> {
        self.lock()
            .get(&key)
            .map(MemoryImprint::builds_started_stats)
    }

    pub fn status_report(&self, key: PatchSetKey) -> Option<String> {
        self.lock().get(&key).map(MemoryImprint::status_report)
    }

    pub fn is_triggered(&self, key: PatchSetKey, job: &JobName) -> bool {
        self.lock()
            .get(&key)
            .is_some_and(|i| i.entry(job).is_some())
    }

    /// True while `job` has an unfinished build for `key`, or is still
    /// waiting for one and has not been cancelled.
    pub fn is_building(&self, key: PatchSetKey, job: &JobName) -> bool {
        let memory = self.lock();
        let Some(entry) = memory.get(&key).and_then(|i| i.entry(job)) else {
            return false;
        };
        match entry.build {
            Some(_) => !entry.completed,
            None => !entry.cancelled,
        }
    }

    /// True while anything is remembered for `key`.
    pub fn is_building_any(&self, key: PatchSetKey) -> bool {
        self.lock().contains_key(&key)
    }

    pub fn builds(&self, key: PatchSetKey) -> Option<Vec<BuildRef>> {
        self.lock().get(&key).map(MemoryImprint::builds)
    }

    /// A copy of the imprint for `key`.
    pub fn imprint(&self, key: PatchSetKey) -> Option<MemoryImprint> {
        self.lock().get(&key).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// A snapshot of every imprint.
    pub fn report(&self) -> BuildMemoryReport {
        BuildMemoryReport {
            imprints: self.lock().values().map(ReportedImprint::from).collect(),
        }
    }
}
