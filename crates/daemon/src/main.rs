//! qrgen daemon - Main Entry Point
//!
//! Composition root: config, logging, Docker adapter, render service, RPC server.

mod config;
mod logging;

use anyhow::{anyhow, Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use qrgen_api_rpc::RpcServer;
use qrgen_core::application::{
    cancel_channel, AdmissionControl, LifecycleManager, RenderService,
};
use qrgen_core::port::{SystemTimeProvider, UuidProvider};
use qrgen_core::VERSION;
use qrgen_infra_docker::DockerRuntime;

use crate::config::DaemonConfig;

const SHUTDOWN_DRAIN: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Load configuration (fail fast, before anything is started)
    let config = DaemonConfig::from_env().context("Invalid configuration")?;

    // 2. Initialize logging
    let log_guard = logging::init(config.log_format, config.log_dir.as_deref())?;

    info!("qrgen daemon v{} starting...", VERSION);
    info!(
        worker_image = %config.worker_image,
        artifact_path = %config.artifact_path,
        memory_limit_bytes = config.memory_limit_bytes,
        max_concurrent_jobs = config.max_concurrent_jobs,
        job_timeout_ms = config.job_timeout.map(|d| d.as_millis() as u64),
        "Configuration loaded"
    );

    // 3. Container runtime + startup self-check
    let runtime = Arc::new(DockerRuntime::connect().context("Docker client setup failed")?);
    let lifecycle = Arc::new(LifecycleManager::new(
        runtime,
        config.worker_image.clone(),
        config.resource_limits(),
    ));

    let health = lifecycle.probe().await;
    if !health.reachable {
        warn!(
            detail = health.detail.as_deref().unwrap_or("unknown"),
            "Container runtime unreachable; jobs will fail until it is back"
        );
    } else {
        match lifecycle.image_available().await {
            Ok(true) => info!(image = %config.worker_image, "Worker image present"),
            Ok(false) => warn!(
                image = %config.worker_image,
                "Worker image not found; build it before submitting jobs"
            ),
            Err(e) => warn!(error = %e, "Could not inspect worker image"),
        }
    }

    // 4. Setup dependencies (DI wiring)
    let admission = Arc::new(AdmissionControl::new(
        config.max_concurrent_jobs,
        config.admission_timeout,
    ));
    let (cancel_tx, cancel) = cancel_channel();
    let service = Arc::new(RenderService::new(
        lifecycle,
        admission.clone(),
        Arc::new(UuidProvider),
        Arc::new(SystemTimeProvider),
        config.render_config(),
        cancel,
    ));

    // 5. Start JSON-RPC server
    let (rpc_handle, addr) = RpcServer::new(config.rpc_config(), service)
        .start()
        .await
        .map_err(|e| anyhow!("RPC server start failed: {}", e))?;

    info!(addr = %addr, "System ready. Press Ctrl+C to shutdown");

    // 6. Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received. Exiting gracefully...");

    // 7. Graceful shutdown: abort in-flight waits (their containers are
    // force-removed), stop accepting calls, then wait for slots to return.
    cancel_tx.cancel();
    if let Err(e) = rpc_handle.stop() {
        error!(error = %e, "RPC server stop failed");
    }
    if !admission.drain(SHUTDOWN_DRAIN).await {
        warn!(
            timeout_secs = SHUTDOWN_DRAIN.as_secs(),
            "In-flight jobs did not finish before the drain timeout"
        );
    }
    rpc_handle.stopped().await;

    info!("Shutdown complete.");
    log_guard.shutdown();

    Ok(())
}
