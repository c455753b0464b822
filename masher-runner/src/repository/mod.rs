//! Repository layer
//!
//! Repositories are thin adapters over the external systems a push talks to:
//! the build system's tags and tasks, the update store, and the public mirror.
//! They contain no push logic.
//!
//! All repositories are trait-based to enable testing and mocking.

mod mirror;
mod tags;
mod updates;

// Re-export traits
pub use mirror::MirrorRepository;
pub use tags::BuildTagRepository;
pub use updates::UpdateRepository;

// Re-export implementations
pub use mirror::HttpMirrorRepository;
pub use tags::HttpBuildTagRepository;
pub use updates::JsonUpdateRepository;
