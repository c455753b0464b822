//! Data Transfer Objects for the daemon's HTTP surface
//!
//! DTOs are lightweight request/response bodies exchanged between the CLI
//! and the orchestrator daemon.

pub mod push;
