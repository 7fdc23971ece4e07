//! Bridge from build-system callbacks to the build memory.
//!
//! The scheduler tells [`RunListener`] when a job is triggered, starts and
//! completes. The listener records it in [`BuildMemory`], fires the event's
//! lifecycle callbacks and queues outbound notifications. When the last job
//! for a patchset finishes, the imprint is forgotten.

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::dependency::DependencyOracle;
use crate::events::{EventContext, GerritEvent};
use crate::memory::{self, BuildMemory, BuildsStartedStats, MemoryImprint};
use crate::types::{BuildRef, JobName, PatchSetKey};
use crate::worker::{OutboundCommand, SendCommandQueue};

/// Outbound notifications about build progress.
pub trait Notifier: Send + Sync + 'static {
    fn build_started(
        &self,
        event: Arc<GerritEvent>,
        build: BuildRef,
        stats: BuildsStartedStats,
    ) -> impl Future<Output = ()> + Send;

    fn all_builds_completed(&self, imprint: MemoryImprint) -> impl Future<Output = ()> + Send;
}

/// Writes notifications to the log instead of sending them anywhere.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingNotifier;

impl Notifier for LoggingNotifier {
    async fn build_started(&self, event: Arc<GerritEvent>, build: BuildRef, stats: BuildsStartedStats) {
        info!(
            event = %event,
            build = %build,
            progress = %stats,
            "Build started"
        );
    }

    async fn all_builds_completed(&self, imprint: MemoryImprint) {
        let verdict = if imprint.were_all_builds_successful() {
            "successful"
        } else if imprint.were_any_builds_failed() {
            "failed"
        } else if imprint.were_any_builds_unstable() {
            "unstable"
        } else if imprint.were_all_builds_not_built() {
            "not built"
        } else {
            "mixed"
        };
        info!(
            key = %imprint.key(),
            verdict,
            report = %imprint.status_report().trim_end(),
            "All builds completed"
        );
    }
}

pub struct RunListener<N: Notifier> {
    memory: Arc<BuildMemory>,
    notifier: Arc<N>,
    send: Arc<SendCommandQueue>,
}

impl<N: Notifier> RunListener<N> {
    pub fn new(memory: Arc<BuildMemory>, notifier: N, send: Arc<SendCommandQueue>) -> Self {
        RunListener {
            memory,
            notifier: Arc::new(notifier),
            send,
        }
    }

    pub fn memory(&self) -> &Arc<BuildMemory> {
        &self.memory
    }

    /// `job` was scheduled because of `ctx`.
    pub fn on_triggered(&self, ctx: &EventContext, job: &JobName) -> memory::Result<()> {
        let key = self.memory.triggered(&ctx.event, job)?;
        debug!(%key, %job, "Job triggered");
        if let Some(lifecycle) = &ctx.lifecycle {
            lifecycle.fire_project_triggered(&ctx.event, job);
        }
        Ok(())
    }

    /// `job` was scheduled again for an event that may already have builds.
    pub fn on_retriggered(
        &self,
        ctx: &EventContext,
        job: &JobName,
        other_builds: &[BuildRef],
    ) -> memory::Result<()> {
        let key = self.memory.retriggered(&ctx.event, job, other_builds)?;
        debug!(%key, %job, "Job retriggered");
        if let Some(lifecycle) = &ctx.lifecycle {
            lifecycle.fire_project_triggered(&ctx.event, job);
        }
        Ok(())
    }

    pub fn on_started(&self, ctx: &EventContext, build: &BuildRef) -> memory::Result<()> {
        let key = self.memory.started(&ctx.event, build)?;
        debug!(%key, %build, "Build started");
        if let Some(lifecycle) = &ctx.lifecycle {
            lifecycle.fire_build_started(&ctx.event, build);
        }

        if let Some(stats) = self.memory.builds_started_stats(key) {
            let notifier = Arc::clone(&self.notifier);
            let event = Arc::clone(&ctx.event);
            let build = build.clone();
            let command = OutboundCommand::new(
                format!("build started {key} {build}"),
                async move { notifier.build_started(event, build, stats).await },
            );
            if let Err(e) = self.send.queue_command(command) {
                warn!(%key, error = %e, "Build started notification not queued");
            }
        }
        Ok(())
    }

    pub fn on_completed(&self, ctx: &EventContext, build: &BuildRef) -> memory::Result<()> {
        let key = self.memory.completed(&ctx.event, build)?;
        debug!(%key, %build, "Build completed");
        if let Some(lifecycle) = &ctx.lifecycle {
            lifecycle.fire_build_completed(&ctx.event, build);
        }
        self.complete_if_done(ctx, key);
        Ok(())
    }

    /// `job` was removed from the queue before it could build.
    pub fn on_cancelled(&self, ctx: &EventContext, job: &JobName) -> memory::Result<()> {
        let key = self.memory.cancelled(&ctx.event, job)?;
        debug!(%key, %job, "Job cancelled");
        self.complete_if_done(ctx, key);
        Ok(())
    }

    /// Fires the completion transition at most once per imprint.
    fn complete_if_done(&self, ctx: &EventContext, key: PatchSetKey) {
        let Some(imprint) = self.memory.take_if_all_completed(key) else {
            return;
        };

        info!(%key, "All builds completed");
        if let Some(lifecycle) = &ctx.lifecycle {
            lifecycle.fire_all_builds_completed(&ctx.event);
        }
        let notifier = Arc::clone(&self.notifier);
        let command = OutboundCommand::new(
            format!("all builds completed {key}"),
            async move { notifier.all_builds_completed(imprint).await },
        );
        if let Err(e) = self.send.queue_command(command) {
            error!(%key, error = %e, "Completion notification not queued");
        }
    }

    /// True if `job` was triggered for `key` and has not finished.
    ///
    /// A job counts as incomplete even before its build exists.
    pub fn is_project_triggered_and_incomplete(&self, job: &JobName, key: PatchSetKey) -> bool {
        self.memory.is_triggered(key, job) && self.memory.is_building(key, job)
    }
}

impl<N: Notifier> DependencyOracle for RunListener<N> {
    fn is_project_triggered_and_incomplete(&self, job: &JobName, key: PatchSetKey) -> bool {
        RunListener::is_project_triggered_and_incomplete(self, job, key)
    }
}
