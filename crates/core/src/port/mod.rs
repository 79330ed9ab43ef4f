// Port Layer - Interfaces for external dependencies

pub mod container_runtime;
pub mod providers; // For deterministic testing

// Re-exports
pub use container_runtime::{
    ArchiveStream, ContainerRuntime, EnvironmentHandle, LaunchSpec, ResourceLimits, RuntimeError,
};
pub use providers::{IdProvider, SystemTimeProvider, TimeProvider, UuidProvider};
