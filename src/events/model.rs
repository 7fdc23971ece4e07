//! Typed representations of review-server stream events.
//!
//! The server emits one JSON object per line. Only the kinds listed in
//! [`GerritEventType`] are modelled; anything else is dropped by the parser.
//!
//! # Event Kinds
//!
//! | Type discriminator | Variant | Change-based |
//! |--------------------|---------|--------------|
//! | `patchset-created` | [`GerritEvent::PatchsetCreated`] | yes |
//! | `change-abandoned` | [`GerritEvent::ChangeAbandoned`] | yes |
//! | `change-merged` | [`GerritEvent::ChangeMerged`] | yes |
//! | `comment-added` | [`GerritEvent::CommentAdded`] | yes |
//! | `ref-updated` | [`GerritEvent::RefUpdated`] | no |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::PatchSetKey;

/// Default SSH port of the review server.
pub const DEFAULT_SSH_PORT: u16 = 29418;

/// The kinds of events this crate understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GerritEventType {
    PatchsetCreated,
    ChangeAbandoned,
    ChangeMerged,
    CommentAdded,
    RefUpdated,
}

impl GerritEventType {
    pub const ALL: [GerritEventType; 5] = [
        GerritEventType::PatchsetCreated,
        GerritEventType::ChangeAbandoned,
        GerritEventType::ChangeMerged,
        GerritEventType::CommentAdded,
        GerritEventType::RefUpdated,
    ];

    /// The wire value of the `type` field.
    pub fn as_str(&self) -> &'static str {
        match self {
            GerritEventType::PatchsetCreated => "patchset-created",
            GerritEventType::ChangeAbandoned => "change-abandoned",
            GerritEventType::ChangeMerged => "change-merged",
            GerritEventType::CommentAdded => "comment-added",
            GerritEventType::RefUpdated => "ref-updated",
        }
    }

    /// Looks up a type by its wire value, ignoring ASCII case.
    pub fn find_by_type_value(value: &str) -> Option<GerritEventType> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(value))
    }
}

impl fmt::Display for GerritEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of the server an event came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Provider {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub scheme: String,
    pub version: Option<String>,
}

impl Provider {
    pub fn new(name: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Provider {
            name: name.into(),
            host: host.into(),
            port,
            scheme: "ssh".to_string(),
            version: None,
        }
    }

    pub fn with_version(mut self, version: Option<String>) -> Self {
        self.version = version;
        self
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}://{}:{})", self.name, self.scheme, self.host, self.port)
    }
}

/// A user on the review server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Account {
    pub name: Option<String>,
    pub email: Option<String>,
}

impl Account {
    /// `"Name <email>"` when both are known, otherwise whichever is present.
    pub fn name_and_email(&self) -> Option<String> {
        match (&self.name, &self.email) {
            (Some(n), Some(e)) => Some(format!("{n} <{e}>")),
            (Some(n), None) => Some(n.clone()),
            (None, Some(e)) => Some(format!("<{e}>")),
            (None, None) => None,
        }
    }
}

/// A change under review.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Change {
    pub project: String,
    pub branch: String,
    /// The stable Change-Id (`I...`).
    pub id: String,
    pub number: u64,
    pub subject: String,
    pub owner: Option<Account>,
    pub url: Option<String>,
}

/// One revision of a change.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PatchSet {
    pub number: u64,
    pub revision: String,
    #[serde(rename = "ref")]
    pub reference: String,
    pub uploader: Option<Account>,
}

/// A reference update pushed directly to the repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RefUpdate {
    pub project: String,
    pub ref_name: String,
    pub old_rev: String,
    pub new_rev: String,
}

/// A label vote attached to a comment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Approval {
    /// Label name, e.g. `Code-Review`.
    pub category: String,
    pub value: String,
}

/// Fields shared by every event that refers to a change and patchset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeBasedEvent {
    pub change: Change,
    pub patchset: PatchSet,
    pub provider: Option<Provider>,
    pub created_on: DateTime<Utc>,
}

impl ChangeBasedEvent {
    pub fn patch_set_key(&self) -> PatchSetKey {
        PatchSetKey::new(self.change.number, self.patchset.number)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeAbandoned {
    #[serde(flatten)]
    pub base: ChangeBasedEvent,
    pub abandoner: Option<Account>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeMerged {
    #[serde(flatten)]
    pub base: ChangeBasedEvent,
    pub submitter: Option<Account>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentAdded {
    #[serde(flatten)]
    pub base: ChangeBasedEvent,
    pub author: Option<Account>,
    pub comment: Option<String>,
    pub approvals: Vec<Approval>,
}

impl CommentAdded {
    /// Returns true if the comment carries a vote of exactly `value` on
    /// `category`. Label names compare case-insensitively.
    pub fn matches_approval(&self, category: &str, value: &str) -> bool {
        self.approvals
            .iter()
            .any(|a| a.category.eq_ignore_ascii_case(category) && a.value == value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefUpdated {
    pub ref_update: RefUpdate,
    pub submitter: Option<Account>,
    pub created_on: DateTime<Utc>,
}

/// A classified stream event.
///
/// Values are immutable once built by the classifier. Consumers share them
/// behind an `Arc` (see [`super::EventContext`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum GerritEvent {
    PatchsetCreated(ChangeBasedEvent),
    ChangeAbandoned(ChangeAbandoned),
    ChangeMerged(ChangeMerged),
    CommentAdded(CommentAdded),
    RefUpdated(RefUpdated),
}

impl GerritEvent {
    pub fn event_type(&self) -> GerritEventType {
        match self {
            GerritEvent::PatchsetCreated(_) => GerritEventType::PatchsetCreated,
            GerritEvent::ChangeAbandoned(_) => GerritEventType::ChangeAbandoned,
            GerritEvent::ChangeMerged(_) => GerritEventType::ChangeMerged,
            GerritEvent::CommentAdded(_) => GerritEventType::CommentAdded,
            GerritEvent::RefUpdated(_) => GerritEventType::RefUpdated,
        }
    }

    /// The change/patchset fields, for change-based kinds.
    pub fn change_based(&self) -> Option<&ChangeBasedEvent> {
        match self {
            GerritEvent::PatchsetCreated(e) => Some(e),
            GerritEvent::ChangeAbandoned(e) => Some(&e.base),
            GerritEvent::ChangeMerged(e) => Some(&e.base),
            GerritEvent::CommentAdded(e) => Some(&e.base),
            GerritEvent::RefUpdated(_) => None,
        }
    }

    pub fn patch_set_key(&self) -> Option<PatchSetKey> {
        self.change_based().map(ChangeBasedEvent::patch_set_key)
    }

    pub fn provider(&self) -> Option<&Provider> {
        self.change_based().and_then(|e| e.provider.as_ref())
    }

    pub fn created_on(&self) -> DateTime<Utc> {
        match self {
            GerritEvent::RefUpdated(e) => e.created_on,
            GerritEvent::PatchsetCreated(e) => e.created_on,
            GerritEvent::ChangeAbandoned(e) => e.base.created_on,
            GerritEvent::ChangeMerged(e) => e.base.created_on,
            GerritEvent::CommentAdded(e) => e.base.created_on,
        }
    }

    /// The project the event concerns.
    pub fn project(&self) -> &str {
        match self {
            GerritEvent::RefUpdated(e) => &e.ref_update.project,
            GerritEvent::PatchsetCreated(e) => &e.change.project,
            GerritEvent::ChangeAbandoned(e) => &e.base.change.project,
            GerritEvent::ChangeMerged(e) => &e.base.change.project,
            GerritEvent::CommentAdded(e) => &e.base.change.project,
        }
    }
}

impl fmt::Display for GerritEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GerritEvent::RefUpdated(e) => write!(
                f,
                "{} {}:{} {}",
                self.event_type(),
                e.ref_update.project,
                e.ref_update.ref_name,
                e.ref_update.new_rev
            ),
            other => match other.change_based() {
                Some(c) => write!(
                    f,
                    "{} {} change {} patchset {}",
                    other.event_type(),
                    c.change.project,
                    c.change.number,
                    c.patchset.number
                ),
                None => write!(f, "{}", other.event_type()),
            },
        }
    }
}
