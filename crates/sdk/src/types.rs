//! SDK Request/Response Types
//!
//! Mirrors the JSON-RPC types from the api-rpc crate.

use serde::{Deserialize, Serialize};

/// Parameters for `qr.generate.v1`. Unset options use the daemon's defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GenerateRequest {
    pub target: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fill_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub back_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub box_size: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub border: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_correction: Option<String>,
}

impl GenerateRequest {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            ..Default::default()
        }
    }

    pub fn fill_color(mut self, color: impl Into<String>) -> Self {
        self.fill_color = Some(color.into());
        self
    }

    pub fn back_color(mut self, color: impl Into<String>) -> Self {
        self.back_color = Some(color.into());
        self
    }

    pub fn box_size(mut self, size: i64) -> Self {
        self.box_size = Some(size);
        self
    }

    pub fn border(mut self, border: i64) -> Self {
        self.border = Some(border);
        self
    }

    /// One of L, M, Q, H
    pub fn error_correction(mut self, level: impl Into<String>) -> Self {
        self.error_correction = Some(level.into());
        self
    }
}

/// Response from generate as sent on the wire
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct GenerateResponse {
    pub job_id: String,
    pub content_type: String,
    pub image_base64: String,
    pub size_bytes: usize,
    pub duration_ms: i64,
}

/// A rendered image, decoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    pub job_id: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
    pub duration_ms: i64,
}

/// Response from `system.health.v1`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub runtime_reachable: bool,
    #[serde(default)]
    pub runtime_detail: Option<String>,
    pub version: String,
    pub uptime_seconds: u64,
    pub available_slots: usize,
    pub max_slots: usize,
}

impl HealthStatus {
    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}
