//! Service layer
//!
//! Services hold the work of the individual push stages: composing
//! repositories, generating update metadata, publishing trees, waiting for
//! mirrors and sending notifications. The pipeline sequences them.
//!
//! Services with external side effects are trait-based to enable testing and
//! dependency injection.

pub mod compose;
pub mod metadata;
pub mod notify;
pub mod publish;
pub mod sync;

// Re-export traits
pub use compose::RepoCompositor;
pub use metadata::MetadataGenerator;
pub use notify::NotificationSink;

// Re-export implementations
pub use compose::{ComposeOutput, MashCompositor};
pub use metadata::UpdateInfoGenerator;
pub use notify::{TracingNotifier, WebhookNotifier};
pub use publish::RepoPublisher;
pub use sync::{MirrorSyncWaiter, SyncOutcome};
