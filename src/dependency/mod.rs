//! Queue admission gate for jobs with dependencies.
//!
//! A job may declare other jobs it depends on. When several of them are
//! triggered by the same event, the gate holds the dependent job in the
//! scheduler's queue until every dependency has finished reacting to that
//! event.
//!
//! # Decision order
//!
//! 1. No triggering event, already buildable, or no resolvable dependencies: run
//! 2. Queued for less than the build-schedule delay: wait for siblings to queue
//! 3. The event's trigger scan is still in progress: wait for siblings to trigger
//! 4. Any dependency triggered and incomplete for the same patchset: blocked
//! 5. Otherwise: run
//!
//! The gate only reads shared state. A dependency that becomes triggered
//! just after a check was made is not noticed until the next check.

pub mod verdict;

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info};

use crate::events::{EventContext, GerritEvent, LifecycleListener, TriggerLifecycle};
use crate::types::{JobName, PatchSetKey};
use crate::worker::{GerritEventListener, ListenerResult};

pub use verdict::CauseOfBlockage;

/// Default time a dependent job waits in the queue before being considered.
pub const DEFAULT_BUILD_SCHEDULE_DELAY: Duration = Duration::from_secs(3);

/// Lookup of jobs known to the scheduler.
pub trait JobDirectory: Send + Sync {
    /// Resolves a configured name to a live job.
    fn resolve(&self, name: &str) -> Option<JobName>;

    /// The comma-separated dependency list configured for `job`, if any.
    fn dependency_names(&self, job: &JobName) -> Option<String>;
}

/// A fixed set of jobs and their dependency lists.
#[derive(Debug, Clone, Default)]
pub struct StaticJobDirectory {
    jobs: HashMap<String, Option<String>>,
}

impl StaticJobDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `name`, depending on the comma-separated `dependencies`.
    pub fn with_job(mut self, name: impl Into<String>, dependencies: Option<&str>) -> Self {
        self.jobs
            .insert(name.into(), dependencies.map(str::to_string));
        self
    }

    /// Builds a directory from `(job, dependencies)` pairs. Every job named
    /// as a dependency is known too, even if it has no entry of its own.
    pub fn from_dependencies<'a>(entries: impl IntoIterator<Item = &'a (String, String)>) -> Self {
        let mut directory = Self::new();
        for (job, dependencies) in entries {
            for dependency in dependencies.split(',').map(str::trim) {
                if !dependency.is_empty() {
                    directory.jobs.entry(dependency.to_string()).or_insert(None);
                }
            }
            directory
                .jobs
                .insert(job.clone(), Some(dependencies.clone()));
        }
        directory
    }
}

impl JobDirectory for StaticJobDirectory {
    fn resolve(&self, name: &str) -> Option<JobName> {
        self.jobs.contains_key(name).then(|| JobName::new(name))
    }

    fn dependency_names(&self, job: &JobName) -> Option<String> {
        self.jobs.get(job.as_str()).cloned().flatten()
    }
}

/// Answers whether a job is still working on a patchset.
pub trait DependencyOracle: Send + Sync {
    fn is_project_triggered_and_incomplete(&self, job: &JobName, key: PatchSetKey) -> bool;
}

/// A job waiting in the scheduler's queue.
#[derive(Debug, Clone)]
pub struct QueueItem {
    pub job: JobName,
    /// The event that triggered the job, if any.
    pub cause: Option<EventContext>,
    pub in_queue_since: Instant,
    /// Already cleared to run and only waiting for an executor.
    pub buildable: bool,
}

impl QueueItem {
    pub fn new(job: JobName, cause: Option<EventContext>) -> Self {
        QueueItem {
            job,
            cause,
            in_queue_since: Instant::now(),
            buildable: false,
        }
    }
}

/// Patchsets whose trigger scan is in progress.
type Triggering = Arc<Mutex<HashSet<PatchSetKey>>>;

pub struct DependencyGate {
    jobs: Arc<dyn JobDirectory>,
    oracle: Arc<dyn DependencyOracle>,
    triggering: Triggering,
    schedule_delay: Duration,
}

impl DependencyGate {
    pub fn new(jobs: Arc<dyn JobDirectory>, oracle: Arc<dyn DependencyOracle>) -> Self {
        DependencyGate {
            jobs,
            oracle,
            triggering: Arc::default(),
            schedule_delay: DEFAULT_BUILD_SCHEDULE_DELAY,
        }
    }

    pub fn with_schedule_delay(mut self, delay: Duration) -> Self {
        self.schedule_delay = delay;
        self
    }

    /// Decides whether `item` may run now. `None` means no objection.
    pub fn can_run(&self, item: &QueueItem) -> Option<CauseOfBlockage> {
        self.can_run_at(item, Instant::now())
    }

    /// Like [`can_run`](Self::can_run) as if the clock read `now`.
    pub fn can_run_at(&self, item: &QueueItem, now: Instant) -> Option<CauseOfBlockage> {
        let Some(key) = item.cause.as_ref().and_then(EventContext::key) else {
            debug!(job = %item.job, "Not triggered by a patchset event");
            return None;
        };
        if item.buildable {
            debug!(job = %item.job, "Item is already buildable");
            return None;
        }

        let dependencies = self.dependencies(&item.job);
        if dependencies.is_empty() {
            debug!(job = %item.job, "No dependencies");
            return None;
        }

        if now.saturating_duration_since(item.in_queue_since) < self.schedule_delay {
            debug!(job = %item.job, %key, "Waiting to ensure dependent jobs are in queue");
            return Some(CauseOfBlockage::WaitingToEnsureOtherJobsAreInQueue);
        }

        if self.is_triggering(key) {
            debug!(job = %item.job, %key, "Waiting while event is being triggered");
            return Some(CauseOfBlockage::WaitingForOtherJobsToTrigger);
        }

        let blocking: Vec<JobName> = dependencies
            .into_iter()
            .filter(|dep| self.oracle.is_project_triggered_and_incomplete(dep, key))
            .collect();
        if blocking.is_empty() {
            info!(job = %item.job, %key, "No active dependencies; job may build");
            None
        } else {
            Some(CauseOfBlockage::DependentBuildIsBuilding(blocking))
        }
    }

    /// Resolves the configured dependency list of `job`. Blank and unknown
    /// names are skipped.
    pub fn dependencies(&self, job: &JobName) -> Vec<JobName> {
        let Some(names) = self.jobs.dependency_names(job) else {
            return Vec::new();
        };
        names
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .filter_map(|name| {
                let resolved = self.jobs.resolve(name);
                if resolved.is_none() {
                    debug!(%job, dependency = name, "Unknown dependency job");
                }
                resolved
            })
            .collect()
    }

    pub fn is_triggering(&self, key: PatchSetKey) -> bool {
        self.triggering
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&key)
    }
}

/// Lifts the triggering barrier for one patchset when its scan is done.
struct ScanDone {
    triggering: Triggering,
    key: PatchSetKey,
    lifecycle: TriggerLifecycle,
    this: Mutex<Option<Arc<dyn LifecycleListener>>>,
}

impl LifecycleListener for ScanDone {
    fn trigger_scan_done(&self, _event: &GerritEvent) {
        debug!(key = %self.key, "Trigger scan done");
        self.triggering
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
        let this = self
            .this
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(this) = this {
            self.lifecycle.remove_listener(&this);
        }
    }
}

impl GerritEventListener for DependencyGate {
    /// Raises the triggering barrier for events that carry a lifecycle, the
    /// only ones whose scan end is reported.
    fn gerrit_event(&self, ctx: &EventContext) -> ListenerResult {
        let (Some(lifecycle), Some(key)) = (&ctx.lifecycle, ctx.key()) else {
            return Ok(());
        };
        debug!(%key, "Registering for trigger scan completion");

        let hook = Arc::new(ScanDone {
            triggering: Arc::clone(&self.triggering),
            key,
            lifecycle: lifecycle.clone(),
            this: Mutex::new(None),
        });
        let as_listener: Arc<dyn LifecycleListener> = hook.clone();
        *hook.this.lock().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&as_listener));
        lifecycle.add_listener(as_listener);

        self.triggering
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key);
        Ok(())
    }

    fn name(&self) -> &str {
        "dependency-gate"
    }
}
