//! qrgen Client Implementation

use crate::error::{Result, SdkError};
use crate::types::{GenerateRequest, GenerateResponse, GeneratedImage, HealthStatus};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use jsonrpsee::core::client::ClientT;
use jsonrpsee::core::params::ObjectParams;
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use jsonrpsee::rpc_params;
use std::time::Duration;

const METHOD_GENERATE: &str = "qr.generate.v1";
const METHOD_HEALTH: &str = "system.health.v1";

/// Covers the daemon's default admission wait plus job timeout
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// qrgen daemon client
///
/// # Example
///
/// ```no_run
/// use qrgen_sdk::QrgenClient;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = QrgenClient::connect("http://127.0.0.1:9530").await?;
/// println!("{}", client.health().await?.status);
/// # Ok(())
/// # }
/// ```
pub struct QrgenClient {
    client: HttpClient,
}

impl QrgenClient {
    /// Connect to the qrgen daemon
    ///
    /// # Arguments
    ///
    /// * `url` - RPC endpoint URL (e.g., `http://127.0.0.1:9530`)
    pub async fn connect(url: impl AsRef<str>) -> Result<Self> {
        Self::connect_with_timeout(url, DEFAULT_REQUEST_TIMEOUT).await
    }

    pub async fn connect_with_timeout(url: impl AsRef<str>, timeout: Duration) -> Result<Self> {
        let url = url.as_ref();

        let client = HttpClientBuilder::default()
            .request_timeout(timeout)
            .build(url)
            .map_err(|e| SdkError::Connection(format!("Failed to create client: {}", e)))?;

        Ok(Self { client })
    }

    /// Render one QR code
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use qrgen_sdk::{GenerateRequest, QrgenClient};
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// # let client = QrgenClient::connect("http://127.0.0.1:9530").await?;
    /// let image = client
    ///     .generate(GenerateRequest::new("hello").error_correction("H"))
    ///     .await?;
    /// assert_eq!(image.content_type, "image/png");
    /// # Ok(())
    /// # }
    /// ```
    pub async fn generate(&self, request: GenerateRequest) -> Result<GeneratedImage> {
        let response: GenerateResponse = self
            .client
            .request(METHOD_GENERATE, object_params(&request)?)
            .await?;

        let bytes = STANDARD
            .decode(response.image_base64.as_bytes())
            .map_err(|e| SdkError::InvalidResponse(format!("image is not base64: {}", e)))?;

        if bytes.len() != response.size_bytes {
            return Err(SdkError::InvalidResponse(format!(
                "image holds {} bytes, daemon reported {}",
                bytes.len(),
                response.size_bytes
            )));
        }

        Ok(GeneratedImage {
            job_id: response.job_id,
            content_type: response.content_type,
            bytes,
            duration_ms: response.duration_ms,
        })
    }

    /// Daemon and container runtime health
    pub async fn health(&self) -> Result<HealthStatus> {
        let status: HealthStatus = self.client.request(METHOD_HEALTH, rpc_params![]).await?;
        Ok(status)
    }
}

/// Send the request as named params
fn object_params(request: &GenerateRequest) -> Result<ObjectParams> {
    let mut params = ObjectParams::new();
    if let serde_json::Value::Object(map) = serde_json::to_value(request)? {
        for (key, value) in map {
            params.insert(&key, value)?;
        }
    }
    Ok(params)
}
