//! Core domain types
//!
//! This module contains the core domain structures used across masher services.
//! These types represent the fundamental business entities and are shared between
//! the orchestrator (queueing and reporting) and the runner (push execution).

pub mod buildsys;
pub mod push;
pub mod update;
