//! Logging setup: one registry with a console layer, an optional rolling
//! file layer and (behind the `telemetry` feature) an OTLP export layer.
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: filter directives (default: `qrgen=info`)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (e.g., http://localhost:4317)
//! - `OTEL_SERVICE_NAME`: service name (default: qrgen-daemon)

use anyhow::{anyhow, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::Layered;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};

use crate::config::LogFormat;

const DEFAULT_FILTER: &str = "qrgen=info";
const LOG_FILE_PREFIX: &str = "qrgen-daemon.log";

type BoxedLayer = Box<dyn Layer<Layered<EnvFilter, Registry>> + Send + Sync>;

/// Keeps background writers alive; flushes on drop
pub struct LogGuard {
    _file: Option<WorkerGuard>,
    #[cfg(feature = "telemetry")]
    tracer_provider: Option<opentelemetry_sdk::trace::TracerProvider>,
}

impl LogGuard {
    /// Flush pending spans to the collector
    #[cfg(feature = "telemetry")]
    pub fn shutdown(self) {
        if let Some(provider) = &self.tracer_provider {
            if let Err(e) = provider.shutdown() {
                tracing::warn!(error = %e, "OpenTelemetry shutdown failed");
            }
        }
    }

    #[cfg(not(feature = "telemetry"))]
    pub fn shutdown(self) {}
}

pub fn init(format: LogFormat, log_dir: Option<&Path>) -> Result<LogGuard> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(DEFAULT_FILTER))
        .map_err(|e| anyhow!("Failed to create env filter: {}", e))?;

    let mut layers: Vec<BoxedLayer> = Vec::new();

    layers.push(match format {
        // Production: JSON structured logging
        LogFormat::Json => fmt::layer().json().boxed(),
        // Development: Pretty formatting with colors
        LogFormat::Pretty => fmt::layer().pretty().boxed(),
    });

    let file_guard = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .map_err(|e| anyhow!("Failed to create log dir {}: {}", dir.display(), e))?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            layers.push(
                fmt::layer()
                    .json()
                    .with_ansi(false)
                    .with_writer(writer)
                    .boxed(),
            );
            Some(guard)
        }
        None => None,
    };

    #[cfg(feature = "telemetry")]
    let tracer_provider = match otel::layer()? {
        Some((layer, provider)) => {
            layers.push(layer);
            Some(provider)
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(layers)
        .try_init()
        .map_err(|e| anyhow!("Failed to install subscriber: {}", e))?;

    #[cfg(not(feature = "telemetry"))]
    if std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").is_ok() {
        tracing::warn!("OpenTelemetry endpoint set but feature 'telemetry' not enabled");
    }

    Ok(LogGuard {
        _file: file_guard,
        #[cfg(feature = "telemetry")]
        tracer_provider,
    })
}

#[cfg(feature = "telemetry")]
mod otel {
    use super::BoxedLayer;
    use anyhow::Result;
    use opentelemetry::trace::TracerProvider as _;
    use opentelemetry::KeyValue;
    use opentelemetry_otlp::WithExportConfig;
    use opentelemetry_sdk::trace::TracerProvider;
    use opentelemetry_sdk::Resource;
    use tracing_subscriber::Layer;

    const DEFAULT_SERVICE_NAME: &str = "qrgen-daemon";

    /// OTLP layer, if an endpoint is configured
    pub fn layer() -> Result<Option<(BoxedLayer, TracerProvider)>> {
        let Ok(endpoint) = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT") else {
            return Ok(None);
        };
        let service_name = std::env::var("OTEL_SERVICE_NAME")
            .unwrap_or_else(|_| DEFAULT_SERVICE_NAME.to_string());

        let exporter = opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .with_endpoint(&endpoint)
            .build()?;

        let provider = TracerProvider::builder()
            .with_batch_exporter(exporter, opentelemetry_sdk::runtime::Tokio)
            .with_resource(Resource::new(vec![KeyValue::new(
                "service.name",
                service_name.clone(),
            )]))
            .build();

        let tracer = provider.tracer(service_name);
        opentelemetry::global::set_tracer_provider(provider.clone());

        let layer = tracing_opentelemetry::layer().with_tracer(tracer).boxed();
        Ok(Some((layer, provider)))
    }
}
