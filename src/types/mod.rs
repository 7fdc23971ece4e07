//! Core value types shared across the event pipeline.
//!
//! These are small, copyable-where-possible identities used to correlate
//! events, jobs and builds.

pub mod build;
pub mod ids;

pub use build::{BuildRef, BuildResult};
pub use ids::{BuildNumber, JobName, PatchSetKey};
