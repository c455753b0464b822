//! Masher Runner
//!
//! Executes update pushes. A push moves the builds of a batch of updates to
//! their new build system tags, composes the affected repositories, publishes
//! them and tells the world.
//!
//! Architecture:
//! - Configuration: paths, commands and endpoints from environment or defaults
//! - Marker: the on-disk record that makes crashed pushes resumable
//! - Repositories: adapters for the build system, update store and mirror
//! - Services: composition, metadata, publishing, mirror sync, notifications
//! - Pipeline: the staged state machine of a single push
//! - Execution: the seam the orchestrator drives pushes through

pub mod config;
pub mod error;
pub mod execution;
pub mod marker;
pub mod pipeline;
pub mod repository;
pub mod service;

#[cfg(test)]
mod testing;

pub use config::MasherConfig;
pub use error::{PushError, Result};
pub use execution::{PushExecutor, PushServices, StandardPushExecutor};
pub use pipeline::PushPipeline;
