//! Shared test fixtures and arbitrary generators for property-based testing.

use chrono::Utc;
use proptest::prelude::*;
use serde_json::json;

use crate::events::{
    Account, Approval, Change, ChangeBasedEvent, CommentAdded, EventContext, GerritEvent, PatchSet,
};
use crate::types::{BuildRef, BuildResult, JobName, PatchSetKey};

pub fn arb_patch_set_key() -> impl Strategy<Value = PatchSetKey> {
    (1u64..10_000, 1u64..50).prop_map(|(c, p)| PatchSetKey::new(c, p))
}

pub fn arb_job_name() -> impl Strategy<Value = JobName> {
    "[a-z][a-z0-9_-]{0,15}".prop_map(JobName::from)
}

pub fn arb_build_result() -> impl Strategy<Value = BuildResult> {
    prop_oneof![
        Just(BuildResult::Success),
        Just(BuildResult::Unstable),
        Just(BuildResult::Failure),
        Just(BuildResult::NotBuilt),
        Just(BuildResult::Aborted),
    ]
}

/// A change-based event body for `project` at `change`/`patchset`.
pub fn change_event(project: &str, change: u64, patchset: u64) -> ChangeBasedEvent {
    ChangeBasedEvent {
        change: Change {
            project: project.to_string(),
            branch: "master".to_string(),
            id: format!("I{change:040}"),
            number: change,
            subject: "Subject".to_string(),
            owner: Some(Account {
                name: Some("Owner".to_string()),
                email: Some("owner@example.com".to_string()),
            }),
            url: Some(format!("https://review.example.com/{change}")),
        },
        patchset: PatchSet {
            number: patchset,
            revision: "9".repeat(40),
            reference: format!("refs/changes/{:02}/{change}/{patchset}", change % 100),
            uploader: None,
        },
        provider: None,
        created_on: Utc::now(),
    }
}

pub fn comment_added(
    project: &str,
    change: u64,
    patchset: u64,
    approvals: &[(&str, &str)],
) -> CommentAdded {
    CommentAdded {
        base: change_event(project, change, patchset),
        author: None,
        comment: None,
        approvals: approvals
            .iter()
            .map(|(c, v)| Approval {
                category: c.to_string(),
                value: v.to_string(),
            })
            .collect(),
    }
}

/// A stream context for a patchset-created event.
pub fn patchset_context(change: u64, patchset: u64) -> EventContext {
    EventContext::new(GerritEvent::PatchsetCreated(change_event(
        "proj", change, patchset,
    )))
}

pub fn running(job: &str, number: u64) -> BuildRef {
    BuildRef::running(job, number)
}

pub fn finished(job: &str, number: u64, result: BuildResult) -> BuildRef {
    BuildRef::finished(job, number, result)
}

/// A `patchset-created` stream line. Numbers are sent as strings, as the
/// server does.
pub fn patchset_created_json(project: &str, branch: &str, change: u64, patchset: u64) -> String {
    json!({
        "type": "patchset-created",
        "change": {
            "project": project,
            "branch": branch,
            "id": "Iabcdef",
            "number": change.to_string(),
            "subject": "A change",
            "owner": { "name": "Owner", "email": "owner@example.com" },
            "url": format!("https://review.example.com/{change}")
        },
        "patchSet": {
            "number": patchset.to_string(),
            "revision": "9".repeat(40),
            "ref": format!("refs/changes/{:02}/{change}/{patchset}", change % 100),
            "uploader": { "name": "Uploader", "email": "up@example.com" }
        },
        "uploader": { "name": "Uploader", "email": "up@example.com" }
    })
    .to_string()
}

/// A `ref-updated` stream line.
pub fn ref_updated_json(project: &str, ref_name: &str) -> String {
    json!({
        "type": "ref-updated",
        "submitter": { "name": "Pusher", "email": "push@example.com" },
        "refUpdate": {
            "oldRev": "0".repeat(40),
            "newRev": "1".repeat(40),
            "refName": ref_name,
            "project": project
        }
    })
    .to_string()
}
