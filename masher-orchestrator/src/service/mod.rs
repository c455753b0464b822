//! Service Module
//!
//! Business logic layer for the masher daemon.
//! The orchestrator owns the push queue; the push service adapts API
//! submissions to it.

pub mod orchestrator;
pub mod push;

// Re-export for convenience
pub use orchestrator::PushOrchestrator;
pub use push as push_service;
