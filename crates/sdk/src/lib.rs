//! qrgen SDK - Rust Client Library
//!
//! Typed client for the qrgen daemon's JSON-RPC API.
//!
//! # Example
//!
//! ```no_run
//! use qrgen_sdk::{GenerateRequest, QrgenClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = QrgenClient::connect("http://127.0.0.1:9530").await?;
//!
//!     let image = client
//!         .generate(GenerateRequest::new("https://example.com").box_size(8))
//!         .await?;
//!
//!     std::fs::write("qrcode.png", &image.bytes)?;
//!     println!("Job {} rendered in {}ms", image.job_id, image.duration_ms);
//!
//!     Ok(())
//! }
//! ```

mod client;
mod error;
mod types;

pub use client::QrgenClient;
pub use error::{Result, SdkError};
pub use types::{GenerateRequest, GeneratedImage, HealthStatus};
