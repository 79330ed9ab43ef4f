//! JSON-RPC API Layer
//!
//! JSON-RPC 2.0 server in front of the render service:
//! `qr.generate.v1`, `system.health.v1` and `GET /health`.

pub mod error;
pub mod handler;
pub mod server;
pub mod types;

pub use jsonrpsee::server::ServerHandle;
pub use server::{RpcServer, RpcServerConfig};
