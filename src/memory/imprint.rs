//! Per-patchset ledger records.
//!
//! A [`MemoryImprint`] holds the event that caused builds plus one [`Entry`]
//! per job that reacted to it. Imprints are only mutated through
//! [`super::BuildMemory`], which holds the lock; the mutators here are
//! crate-private for that reason.

use std::fmt::Write as _;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::events::GerritEvent;
use crate::types::{BuildRef, BuildResult, JobName, PatchSetKey};

use super::stats::BuildsStartedStats;

/// One job's progress for one event.
///
/// States: triggered (no build) → started (build known) → completed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Entry {
    pub job: JobName,
    pub build: Option<BuildRef>,
    pub completed: bool,
    pub cancelled: bool,
    pub custom_url: Option<String>,
    pub unsuccessful_message: Option<String>,
    pub triggered_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Entry {
    fn triggered(job: JobName, now: DateTime<Utc>) -> Self {
        Entry {
            job,
            build: None,
            completed: false,
            cancelled: false,
            custom_url: None,
            unsuccessful_message: None,
            triggered_at: now,
            started_at: None,
            completed_at: None,
        }
    }

    fn started(build: BuildRef, now: DateTime<Utc>) -> Self {
        let mut entry = Entry::triggered(build.job.clone(), now);
        entry.build = Some(build);
        entry.started_at = Some(now);
        entry
    }

    pub fn result(&self) -> Option<BuildResult> {
        self.build.as_ref().and_then(|b| b.result)
    }

    /// Completed with a known build whose result is `result`.
    fn completed_with(&self, result: BuildResult) -> bool {
        self.completed && self.result() == Some(result)
    }

    fn set_build(&mut self, build: Option<BuildRef>, now: DateTime<Utc>) {
        if build.is_some() {
            self.started_at = Some(now);
        }
        self.build = build;
    }

    fn set_completed(&mut self, completed: bool, now: DateTime<Utc>) {
        self.completed = completed;
        self.completed_at = completed.then_some(now);
    }
}

/// The ledger record for one patchset.
#[derive(Debug, Clone)]
pub struct MemoryImprint {
    key: PatchSetKey,
    event: Arc<GerritEvent>,
    entries: Vec<Entry>,
}

impl MemoryImprint {
    pub(crate) fn new(key: PatchSetKey, event: Arc<GerritEvent>) -> Self {
        MemoryImprint {
            key,
            event,
            entries: Vec::new(),
        }
    }

    pub fn key(&self) -> PatchSetKey {
        self.key
    }

    pub fn event(&self) -> &Arc<GerritEvent> {
        &self.event
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn entry(&self, job: &JobName) -> Option<&Entry> {
        self.entries.iter().find(|e| &e.job == job)
    }

    fn entry_mut(&mut self, job: &JobName) -> Option<&mut Entry> {
        self.entries.iter_mut().find(|e| &e.job == job)
    }

    // ─── Mutation (BuildMemory only) ──────────────────────────────────────────

    /// Adds a triggered entry unless one exists for `job`.
    pub(crate) fn set_triggered(&mut self, job: &JobName, now: DateTime<Utc>) {
        if self.entry(job).is_none() {
            self.entries.push(Entry::triggered(job.clone(), now));
        }
    }

    pub(crate) fn set_started(&mut self, build: &BuildRef, now: DateTime<Utc>) {
        match self.entry_mut(&build.job) {
            Some(entry) => entry.set_build(Some(build.clone()), now),
            None => self.entries.push(Entry::started(build.clone(), now)),
        }
    }

    /// Records the finished build and marks the entry completed.
    pub(crate) fn set_completed(&mut self, build: &BuildRef, now: DateTime<Utc>) {
        match self.entry_mut(&build.job) {
            Some(entry) => {
                if entry.build.is_none() {
                    entry.set_build(Some(build.clone()), now);
                } else {
                    entry.build = Some(build.clone());
                }
                entry.set_completed(true, now);
            }
            None => {
                let mut entry = Entry::started(build.clone(), now);
                entry.set_completed(true, now);
                self.entries.push(entry);
            }
        }
    }

    /// Records a build of another job seen before this imprint existed.
    pub(crate) fn set_known_build(&mut self, build: &BuildRef, now: DateTime<Utc>) {
        if build.is_building() {
            self.set_started(build, now);
        } else {
            self.set_completed(build, now);
        }
    }

    /// Puts `job` back into the triggered state.
    pub(crate) fn reset(&mut self, job: &JobName, now: DateTime<Utc>) {
        match self.entry_mut(job) {
            Some(entry) => {
                entry.set_build(None, now);
                entry.started_at = None;
                entry.cancelled = false;
                entry.set_completed(false, now);
            }
            None => self.entries.push(Entry::triggered(job.clone(), now)),
        }
    }

    pub(crate) fn set_cancelled(&mut self, job: &JobName, now: DateTime<Utc>) {
        self.set_triggered(job, now);
        if let Some(entry) = self.entry_mut(job) {
            entry.cancelled = true;
            entry.set_completed(true, now);
        }
    }

    pub(crate) fn set_custom_url(&mut self, job: &JobName, url: String) -> bool {
        match self.entry_mut(job) {
            Some(entry) => {
                entry.custom_url = Some(url);
                true
            }
            None => false,
        }
    }

    pub(crate) fn set_unsuccessful_message(&mut self, job: &JobName, message: String) -> bool {
        match self.entry_mut(job) {
            Some(entry) => {
                entry.unsuccessful_message = Some(message);
                true
            }
            None => false,
        }
    }

    pub(crate) fn remove_job(&mut self, job: &JobName) {
        self.entries.retain(|e| &e.job != job);
    }

    // ─── Queries ──────────────────────────────────────────────────────────────

    /// Every entry has a build identity.
    pub fn is_all_builds_started(&self) -> bool {
        self.entries.iter().all(|e| e.build.is_some())
    }

    pub fn is_all_builds_completed(&self) -> bool {
        self.entries.iter().all(|e| e.completed)
    }

    pub fn builds_started_stats(&self) -> BuildsStartedStats {
        let started = self.entries.iter().filter(|e| e.build.is_some()).count();
        BuildsStartedStats::new(self.key, self.entries.len(), started)
    }

    pub fn builds(&self) -> Vec<BuildRef> {
        self.entries.iter().filter_map(|e| e.build.clone()).collect()
    }

    /// One line per entry:
    /// `  Project/Build: [<job>]: [#<n>: <RESULT>] Completed: <bool>`.
    pub fn status_report(&self) -> String {
        let mut report = String::new();
        for entry in &self.entries {
            let _ = write!(report, "  Project/Build: [{}]: [", entry.job);
            match &entry.build {
                Some(build) => match build.result {
                    Some(result) => {
                        let _ = write!(report, "#{}: {}", build.number.0, result);
                    }
                    None => {
                        let _ = write!(report, "#{}: BUILDING", build.number.0);
                    }
                },
                None => report.push_str("XX: NULL"),
            }
            let _ = writeln!(report, "] Completed: {}", entry.completed);
        }
        report
    }

    // ─── Outcome verdicts ─────────────────────────────────────────────────────

    pub fn were_all_builds_successful(&self) -> bool {
        self.entries
            .iter()
            .all(|e| e.completed_with(BuildResult::Success))
    }

    pub fn were_any_builds_failed(&self) -> bool {
        self.entries
            .iter()
            .any(|e| e.completed_with(BuildResult::Failure))
    }

    pub fn were_any_builds_unstable(&self) -> bool {
        self.entries
            .iter()
            .any(|e| e.completed_with(BuildResult::Unstable))
    }

    /// Cancelled entries are not counted.
    pub fn were_all_builds_not_built(&self) -> bool {
        self.entries
            .iter()
            .filter(|e| !e.cancelled)
            .all(|e| e.completed_with(BuildResult::NotBuilt))
    }
}
