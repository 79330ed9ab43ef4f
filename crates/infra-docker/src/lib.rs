// qrgen Infrastructure - Docker Adapter
// Implements: ContainerRuntime

pub mod docker_runtime;

pub use docker_runtime::DockerRuntime;
