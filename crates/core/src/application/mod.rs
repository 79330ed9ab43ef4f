// Application Layer - Use Cases and Orchestration

pub mod admission;
pub mod artifact;
pub mod cancel;
pub mod cleanup;
pub mod constants;
pub mod lifecycle;
pub mod render;
pub mod validator;

// Re-exports
pub use admission::{AdmissionControl, AdmissionPermit};
pub use artifact::{extract_entry, ArtifactRetriever};
pub use cancel::{cancel_channel, CancelOnDrop, CancelSender, CancelToken};
pub use cleanup::CleanupGuard;
pub use lifecycle::{LifecycleManager, RuntimeHealth};
pub use render::{RenderConfig, RenderService, ServiceHealth};
pub use validator::validate;
