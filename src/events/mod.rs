//! Review-server event model and classification.
//!
//! This module provides:
//! - Typed event definitions ([`GerritEvent`] and its payload structs)
//! - Line classification ([`parse_event`], [`classify`])
//! - The per-event trigger lifecycle companion ([`TriggerLifecycle`], [`EventContext`])

pub mod lifecycle;
pub mod model;
pub mod parser;

pub use lifecycle::{EventContext, LifecycleListener, TriggerLifecycle};
pub use model::{
    Account, Approval, Change, ChangeAbandoned, ChangeBasedEvent, ChangeMerged, CommentAdded,
    DEFAULT_SSH_PORT, GerritEvent, GerritEventType, PatchSet, Provider, RefUpdate, RefUpdated,
};
pub use parser::{ParseError, classify, parse_event};
