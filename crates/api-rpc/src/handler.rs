//! RPC Method Handlers

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use jsonrpsee::types::ErrorObjectOwned;
use qrgen_core::application::RenderService;
use qrgen_core::VERSION;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use crate::error::{job_error, to_rpc_error};
use crate::types::{GenerateRequest, GenerateResponse, HealthResponse};

/// RPC Handler with injected dependencies
pub struct RpcHandler {
    service: Arc<RenderService>,
    start_time: Instant,
}

impl RpcHandler {
    pub fn new(service: Arc<RenderService>) -> Self {
        Self {
            service,
            start_time: Instant::now(),
        }
    }

    /// qr.generate.v1
    pub async fn generate(
        &self,
        params: GenerateRequest,
    ) -> Result<GenerateResponse, ErrorObjectOwned> {
        let report = self
            .service
            .render(params.into())
            .await
            .map_err(to_rpc_error)?;

        // A cleanup failure is already logged by the service; the caller only
        // sees the job's own outcome.
        let artifact = report
            .outcome
            .map_err(|e| job_error(&report.job_id, &e))?;

        debug!(job_id = %report.job_id, size_bytes = artifact.len(), "Encoding artifact");

        Ok(GenerateResponse {
            job_id: report.job_id,
            content_type: artifact.content_type().to_string(),
            size_bytes: artifact.len(),
            image_base64: STANDARD.encode(artifact.bytes()),
            duration_ms: report.duration_ms,
        })
    }

    /// system.health.v1
    pub async fn health(&self) -> Result<HealthResponse, ErrorObjectOwned> {
        let health = self.service.health().await;

        Ok(HealthResponse {
            status: if health.runtime.reachable { "ok" } else { "degraded" }.to_string(),
            runtime_reachable: health.runtime.reachable,
            runtime_detail: health.runtime.detail,
            version: VERSION.to_string(),
            uptime_seconds: self.start_time.elapsed().as_secs(),
            available_slots: health.available_slots,
            max_slots: health.max_slots,
        })
    }
}
