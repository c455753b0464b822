//! Masher Core
//!
//! Core types and abstractions for the update push masher.
//!
//! This crate contains:
//! - Domain types: Core business entities (Update, Release, PushRequest, etc.)
//! - DTOs: Data transfer objects for the daemon's HTTP surface

pub mod domain;
pub mod dto;
