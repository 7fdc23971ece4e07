//! Gerrit Events - a persistent review-server event stream with build
//! coordination.
//!
//! This library reads change-review events from a long-lived connection,
//! classifies them, fans them out to listeners on a worker pool, tracks the
//! builds each event triggers, and gates dependent jobs until their
//! dependencies have finished for the same patchset.

pub mod config;
pub mod dependency;
pub mod events;
pub mod handler;
pub mod memory;
pub mod run_listener;
pub mod server;
pub mod stream;
pub mod types;
pub mod watchdog;
pub mod worker;

#[cfg(test)]
mod test_utils;
