//! Stream event classifier.
//!
//! Turns one raw line from the event stream into a typed [`GerritEvent`].
//!
//! # Parsing Strategy
//!
//! 1. Blank lines and objects without a `type` field are not events
//! 2. The `type` field is matched case-insensitively against [`GerritEventType`]
//! 3. Unknown types return `Ok(None)` (ignored, not error)
//! 4. Malformed payloads return `Err` with details
//!
//! Callers on the dispatch path use [`classify`], which folds both "not
//! interesting" and "malformed" into `None` and only differs in what it logs.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, trace};

use super::model::{
    Account, Approval, Change, ChangeAbandoned, ChangeBasedEvent, ChangeMerged, CommentAdded,
    GerritEvent, GerritEventType, PatchSet, Provider, RefUpdate, RefUpdated,
};

/// Error type for event parsing failures.
#[derive(Debug, Error)]
pub enum ParseError {
    /// JSON deserialization failed (includes missing required fields).
    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// The line was valid JSON but not an object.
    #[error("expected a JSON object")]
    NotAnObject,

    /// Field has invalid value (e.g., a non-numeric change number).
    #[error("invalid field value for {field}: {value}")]
    InvalidField { field: &'static str, value: String },
}

/// Classifies a raw stream line.
///
/// `provider` is attached to change-based events. Returns `None` for blank,
/// uninteresting and malformed lines alike.
pub fn classify(line: &str, provider: Option<&Provider>) -> Option<GerritEvent> {
    match parse_event(line, provider) {
        Ok(Some(event)) => {
            trace!(event = %event, "Classified stream event");
            Some(event)
        }
        Ok(None) => {
            trace!("Ignoring uninteresting stream line");
            None
        }
        Err(e) => {
            debug!(error = %e, "Dropping malformed stream line");
            None
        }
    }
}

/// Parses a raw stream line into a typed event.
///
/// # Returns
///
/// * `Ok(Some(event))` - Successfully parsed a known event type
/// * `Ok(None)` - Blank line, missing `type`, or an unknown event type
/// * `Err(e)` - Malformed payload or missing required fields
///
/// # Examples
///
/// ```
/// use gerrit_events::events::{GerritEvent, parse_event};
///
/// let line = r#"{
///     "type": "patchset-created",
///     "change": {
///         "project": "P", "branch": "B", "id": "I1",
///         "number": "100", "subject": "Fix"
///     },
///     "patchSet": { "number": "2", "revision": "abc", "ref": "refs/changes/00/100/2" }
/// }"#;
///
/// let event = parse_event(line, None).unwrap().unwrap();
/// assert!(matches!(event, GerritEvent::PatchsetCreated(_)));
/// ```
pub fn parse_event(
    line: &str,
    provider: Option<&Provider>,
) -> Result<Option<GerritEvent>, ParseError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let value: serde_json::Value = serde_json::from_str(line)?;
    let Some(object) = value.as_object() else {
        return Err(ParseError::NotAnObject);
    };

    let Some(type_value) = object.get("type").and_then(|t| t.as_str()) else {
        return Ok(None);
    };
    let Some(event_type) = GerritEventType::find_by_type_value(type_value) else {
        return Ok(None);
    };

    let event = match event_type {
        GerritEventType::RefUpdated => GerritEvent::RefUpdated(parse_ref_updated(value)?),
        change_type => {
            let raw: RawChangeEventPayload = serde_json::from_value(value)?;
            build_change_event(change_type, raw, provider)?
        }
    };
    Ok(Some(event))
}

// ============================================================================
// Raw payload structures for deserialization
//
// These match the stream-events JSON structure. Numbers are sent as strings
// by most server versions, so they go through `RawNumber`.
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawNumber {
    Int(u64),
    Str(String),
}

impl RawNumber {
    fn parse(self, field: &'static str) -> Result<u64, ParseError> {
        match self {
            RawNumber::Int(n) => Ok(n),
            RawNumber::Str(s) => s
                .trim()
                .parse()
                .map_err(|_| ParseError::InvalidField { field, value: s }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawAccount {
    name: Option<String>,
    email: Option<String>,
}

impl From<RawAccount> for Account {
    fn from(raw: RawAccount) -> Self {
        Account {
            name: raw.name,
            email: raw.email,
        }
    }
}

fn created_on(epoch_seconds: Option<i64>) -> DateTime<Utc> {
    epoch_seconds
        .and_then(|s| DateTime::from_timestamp(s, 0))
        .unwrap_or_else(Utc::now)
}

// ============================================================================
// change-based events
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawChangeEventPayload {
    change: RawChange,
    #[serde(alias = "patchset")]
    patch_set: RawPatchSet,
    uploader: Option<RawAccount>,
    abandoner: Option<RawAccount>,
    submitter: Option<RawAccount>,
    author: Option<RawAccount>,
    reason: Option<String>,
    comment: Option<String>,
    #[serde(default)]
    approvals: Vec<RawApproval>,
    event_created_on: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct RawChange {
    project: String,
    branch: String,
    id: String,
    number: RawNumber,
    #[serde(default)]
    subject: String,
    owner: Option<RawAccount>,
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawPatchSet {
    number: RawNumber,
    revision: String,
    #[serde(rename = "ref")]
    reference: String,
    uploader: Option<RawAccount>,
}

#[derive(Debug, Deserialize)]
struct RawApproval {
    #[serde(rename = "type")]
    category: String,
    value: String,
}

fn build_change_event(
    event_type: GerritEventType,
    raw: RawChangeEventPayload,
    provider: Option<&Provider>,
) -> Result<GerritEvent, ParseError> {
    let change = Change {
        project: raw.change.project,
        branch: raw.change.branch,
        id: raw.change.id,
        number: raw.change.number.parse("change.number")?,
        subject: raw.change.subject,
        owner: raw.change.owner.map(Account::from),
        url: raw.change.url,
    };
    let patchset = PatchSet {
        number: raw.patch_set.number.parse("patchSet.number")?,
        revision: raw.patch_set.revision,
        reference: raw.patch_set.reference,
        uploader: raw.patch_set.uploader.or(raw.uploader).map(Account::from),
    };
    let base = ChangeBasedEvent {
        change,
        patchset,
        provider: provider.cloned(),
        created_on: created_on(raw.event_created_on),
    };

    let event = match event_type {
        GerritEventType::PatchsetCreated => GerritEvent::PatchsetCreated(base),
        GerritEventType::ChangeAbandoned => GerritEvent::ChangeAbandoned(ChangeAbandoned {
            base,
            abandoner: raw.abandoner.map(Account::from),
            reason: raw.reason,
        }),
        GerritEventType::ChangeMerged => GerritEvent::ChangeMerged(ChangeMerged {
            base,
            submitter: raw.submitter.map(Account::from),
        }),
        GerritEventType::CommentAdded => GerritEvent::CommentAdded(CommentAdded {
            base,
            author: raw.author.map(Account::from),
            comment: raw.comment,
            approvals: raw
                .approvals
                .into_iter()
                .map(|a| Approval {
                    category: a.category,
                    value: a.value,
                })
                .collect(),
        }),
        GerritEventType::RefUpdated => {
            return Err(ParseError::InvalidField {
                field: "type",
                value: event_type.to_string(),
            });
        }
    };
    Ok(event)
}

// ============================================================================
// ref-updated event
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRefUpdatedPayload {
    ref_update: RawRefUpdate,
    submitter: Option<RawAccount>,
    event_created_on: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRefUpdate {
    project: String,
    ref_name: String,
    old_rev: String,
    new_rev: String,
}

fn parse_ref_updated(value: serde_json::Value) -> Result<RefUpdated, ParseError> {
    let raw: RawRefUpdatedPayload = serde_json::from_value(value)?;
    Ok(RefUpdated {
        ref_update: RefUpdate {
            project: raw.ref_update.project,
            ref_name: raw.ref_update.ref_name,
            old_rev: raw.ref_update.old_rev,
            new_rev: raw.ref_update.new_rev,
        },
        submitter: raw.submitter.map(Account::from),
        created_on: created_on(raw.event_created_on),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{patchset_created_json, ref_updated_json};
    use crate::types::PatchSetKey;
    use serde_json::json;

    fn provider() -> Provider {
        Provider::new("gerrit", "review.example.com", 29418)
    }

    // ─── Change-based events ──────────────────────────────────────────────────

    #[test]
    fn parse_patchset_created() {
        let line = patchset_created_json("P", "B", 100, 2);
        let event = parse_event(&line, None).unwrap().unwrap();

        let GerritEvent::PatchsetCreated(e) = &event else {
            panic!("expected PatchsetCreated, got {event:?}");
        };
        assert_eq!(e.change.project, "P");
        assert_eq!(e.change.branch, "B");
        assert_eq!(e.change.number, 100);
        assert_eq!(e.patchset.number, 2);
        assert_eq!(event.patch_set_key(), Some(PatchSetKey::new(100, 2)));
    }

    #[test]
    fn provider_is_attached_to_change_based_events() {
        let line = patchset_created_json("P", "B", 1, 1);
        let event = parse_event(&line, Some(&provider())).unwrap().unwrap();
        assert_eq!(event.provider(), Some(&provider()));
    }

    #[test]
    fn numeric_fields_accept_json_numbers() {
        let line = json!({
            "type": "patchset-created",
            "change": {
                "project": "P", "branch": "B", "id": "I1",
                "number": 7, "subject": "s"
            },
            "patchSet": { "number": 3, "revision": "abc", "ref": "refs/changes/07/7/3" }
        })
        .to_string();

        let event = parse_event(&line, None).unwrap().unwrap();
        assert_eq!(event.patch_set_key(), Some(PatchSetKey::new(7, 3)));
    }

    #[test]
    fn legacy_patchset_key_is_accepted() {
        let line = json!({
            "type": "change-merged",
            "change": {
                "project": "P", "branch": "B", "id": "I1",
                "number": "8", "subject": "s"
            },
            "patchset": { "number": "1", "revision": "abc", "ref": "refs/changes/08/8/1" },
            "submitter": { "name": "Sub", "email": "sub@example.com" }
        })
        .to_string();

        let event = parse_event(&line, None).unwrap().unwrap();
        let GerritEvent::ChangeMerged(merged) = event else {
            panic!("expected ChangeMerged");
        };
        assert_eq!(merged.base.patchset.number, 1);
        assert_eq!(
            merged.submitter.and_then(|s| s.name).as_deref(),
            Some("Sub")
        );
    }

    #[test]
    fn type_discriminator_is_case_insensitive() {
        let line = patchset_created_json("P", "B", 1, 1).replace("patchset-created", "PatchSet-Created");
        assert!(matches!(
            parse_event(&line, None).unwrap(),
            Some(GerritEvent::PatchsetCreated(_))
        ));
    }

    #[test]
    fn parse_comment_added_with_approvals() {
        let line = json!({
            "type": "comment-added",
            "change": {
                "project": "P", "branch": "B", "id": "I1",
                "number": "5", "subject": "s",
                "owner": { "name": "Owner" }
            },
            "patchSet": { "number": "1", "revision": "abc", "ref": "refs/changes/05/5/1" },
            "author": { "name": "Reviewer", "email": "r@example.com" },
            "comment": "Looks good",
            "approvals": [
                { "type": "Code-Review", "value": "2" },
                { "type": "Verified", "value": "1" }
            ]
        })
        .to_string();

        let event = parse_event(&line, None).unwrap().unwrap();
        let GerritEvent::CommentAdded(comment) = event else {
            panic!("expected CommentAdded");
        };
        assert_eq!(comment.comment.as_deref(), Some("Looks good"));
        assert!(comment.matches_approval("Code-Review", "2"));
        assert_eq!(comment.approvals.len(), 2);
    }

    #[test]
    fn parse_change_abandoned() {
        let line = json!({
            "type": "change-abandoned",
            "change": {
                "project": "P", "branch": "B", "id": "I1",
                "number": "9", "subject": "s"
            },
            "patchSet": { "number": "4", "revision": "abc", "ref": "refs/changes/09/9/4" },
            "abandoner": { "name": "Quitter" },
            "reason": "superseded",
            "eventCreatedOn": 1_700_000_000
        })
        .to_string();

        let event = parse_event(&line, None).unwrap().unwrap();
        assert_eq!(event.created_on().timestamp(), 1_700_000_000);
        let GerritEvent::ChangeAbandoned(abandoned) = event else {
            panic!("expected ChangeAbandoned");
        };
        assert_eq!(abandoned.reason.as_deref(), Some("superseded"));
    }

    // ─── ref-updated ──────────────────────────────────────────────────────────

    #[test]
    fn parse_ref_updated_event() {
        let line = ref_updated_json("foo", "refs/heads/master");
        let event = parse_event(&line, Some(&provider())).unwrap().unwrap();

        let GerritEvent::RefUpdated(e) = &event else {
            panic!("expected RefUpdated");
        };
        assert_eq!(e.ref_update.project, "foo");
        assert_eq!(e.ref_update.ref_name, "refs/heads/master");
        assert!(event.provider().is_none());
    }

    // ─── Not interesting ──────────────────────────────────────────────────────

    #[test]
    fn unknown_type_is_not_an_event() {
        let line = json!({ "type": "reviewer-added", "change": {} }).to_string();
        assert!(parse_event(&line, None).unwrap().is_none());
    }

    #[test]
    fn missing_type_is_not_an_event() {
        let line = json!({ "change": {} }).to_string();
        assert!(parse_event(&line, None).unwrap().is_none());
    }

    #[test]
    fn blank_line_is_not_an_event() {
        assert!(parse_event("   ", None).unwrap().is_none());
    }

    // ─── Malformed ────────────────────────────────────────────────────────────

    #[test]
    fn truncated_json_is_an_error() {
        let result = parse_event(r#"{"type": "patchset-created", "change": {"#, None);
        assert!(matches!(result, Err(ParseError::JsonError(_))));
    }

    #[test]
    fn non_object_is_an_error() {
        assert!(matches!(parse_event("[1,2,3]", None), Err(ParseError::NotAnObject)));
    }

    #[test]
    fn non_numeric_change_number_is_an_error() {
        let line = patchset_created_json("P", "B", 1, 1).replace("\"1\"", "\"one\"");
        let result = parse_event(&line, None);
        assert!(matches!(
            result,
            Err(ParseError::InvalidField { field: "change.number", .. })
        ));
    }

    #[test]
    fn missing_patchset_is_an_error() {
        let line = json!({
            "type": "patchset-created",
            "change": {
                "project": "P", "branch": "B", "id": "I1",
                "number": "1", "subject": "s"
            }
        })
        .to_string();
        assert!(matches!(parse_event(&line, None), Err(ParseError::JsonError(_))));
    }

    #[test]
    fn classify_folds_errors_into_none() {
        assert!(classify("{not json", None).is_none());
        assert!(classify(&patchset_created_json("P", "B", 1, 1), None).is_some());
    }
}
