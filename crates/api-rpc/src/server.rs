//! JSON-RPC Server
//!
//! JSON-RPC 2.0 over HTTP. Binds to localhost by default.

use crate::error::validation_error;
use crate::handler::RpcHandler;
use crate::types::GenerateRequest;
use jsonrpsee::server::middleware::http::ProxyGetRequestLayer;
use jsonrpsee::server::{Server, ServerHandle};
use jsonrpsee::RpcModule;
use qrgen_core::application::RenderService;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

const DEFAULT_RPC_HOST: &str = "127.0.0.1";
pub const DEFAULT_RPC_PORT: u16 = 9530;

pub const METHOD_GENERATE: &str = "qr.generate.v1";
pub const METHOD_HEALTH: &str = "system.health.v1";
const HEALTH_PATH: &str = "/health";

/// RPC Server Configuration
#[derive(Debug, Clone)]
pub struct RpcServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for RpcServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_RPC_HOST.to_string(),
            port: DEFAULT_RPC_PORT,
        }
    }
}

/// RPC Server
pub struct RpcServer {
    config: RpcServerConfig,
    handler: Arc<RpcHandler>,
}

impl RpcServer {
    pub fn new(config: RpcServerConfig, service: Arc<RenderService>) -> Self {
        Self {
            config,
            handler: Arc::new(RpcHandler::new(service)),
        }
    }

    fn module(&self) -> Result<RpcModule<()>, String> {
        let mut module = RpcModule::new(());

        let handler = self.handler.clone();
        module
            .register_async_method(METHOD_GENERATE, move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let raw: serde_json::Value = params.parse()?;
                    let req = GenerateRequest::from_params(raw)
                        .map_err(|e| validation_error(&e))?;
                    handler.generate(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module
            .register_async_method(METHOD_HEALTH, move |_, _, _| {
                let handler = handler.clone();
                async move { handler.health().await }
            })
            .map_err(|e| e.to_string())?;

        Ok(module)
    }

    /// Start the JSON-RPC server
    ///
    /// Returns the handle and the bound address (port 0 picks a free port).
    pub async fn start(self) -> Result<(ServerHandle, SocketAddr), String> {
        let addr = format!("{}:{}", self.config.host, self.config.port);

        let health_proxy = ProxyGetRequestLayer::new(HEALTH_PATH, METHOD_HEALTH)
            .map_err(|e| format!("Invalid health route: {}", e))?;
        let middleware = tower::ServiceBuilder::new().layer(health_proxy);

        let server = Server::builder()
            .set_http_middleware(middleware)
            .build(&addr)
            .await
            .map_err(|e| format!("Failed to build server on {}: {}", addr, e))?;

        let local_addr = server
            .local_addr()
            .map_err(|e| format!("Failed to read bound address: {}", e))?;

        let module = self.module()?;

        info!(addr = %local_addr, "JSON-RPC server started");

        Ok((server.start(module), local_addr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::code;
    use jsonrpsee::core::client::ClientT;
    use jsonrpsee::core::params::ObjectParams;
    use jsonrpsee::core::ClientError;
    use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
    use jsonrpsee::rpc_params;
    use qrgen_core::application::{
        AdmissionControl, CancelToken, LifecycleManager, RenderConfig,
    };
    use qrgen_core::port::container_runtime::mocks::{
        rendered_bytes, MockBehavior, MockContainerRuntime,
    };
    use qrgen_core::port::providers::mocks::{SequentialIds, SteppingClock};
    use qrgen_core::port::ResourceLimits;
    use serde_json::Value;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    async fn start_with(runtime: Arc<MockContainerRuntime>) -> (ServerHandle, SocketAddr) {
        let lifecycle = Arc::new(LifecycleManager::new(
            runtime,
            "qrcode-worker:latest",
            ResourceLimits::default(),
        ));
        let service = Arc::new(RenderService::new(
            lifecycle,
            Arc::new(AdmissionControl::new(2, Duration::from_millis(100))),
            Arc::new(SequentialIds::default()),
            Arc::new(SteppingClock::new(0, 5)),
            RenderConfig::default(),
            CancelToken::never(),
        ));
        let config = RpcServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
        };
        RpcServer::new(config, service).start().await.unwrap()
    }

    fn client(addr: SocketAddr) -> HttpClient {
        HttpClientBuilder::default()
            .build(format!("http://{}", addr))
            .unwrap()
    }

    fn params(pairs: &[(&str, Value)]) -> ObjectParams {
        let mut params = ObjectParams::new();
        for (k, v) in pairs {
            params.insert(k, v).unwrap();
        }
        params
    }

    #[tokio::test]
    async fn test_generate_round_trip() {
        let runtime = Arc::new(MockContainerRuntime::new_rendering());
        let (handle, addr) = start_with(runtime.clone()).await;

        let res: Value = client(addr)
            .request(
                METHOD_GENERATE,
                params(&[("target", Value::from("https://example.com"))]),
            )
            .await
            .unwrap();

        assert_eq!(res["job_id"], "job-1");
        assert_eq!(res["content_type"], "image/png");
        let expected = rendered_bytes("https://example.com");
        assert_eq!(res["size_bytes"], expected.len());
        use base64::Engine;
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(res["image_base64"].as_str().unwrap())
            .unwrap();
        assert_eq!(decoded, expected);
        assert_eq!(runtime.live_count(), 0);

        handle.stop().unwrap();
    }

    #[tokio::test]
    async fn test_validation_error_code() {
        let runtime = Arc::new(MockContainerRuntime::new_rendering());
        let (handle, addr) = start_with(runtime.clone()).await;

        let err = client(addr)
            .request::<Value, _>(
                METHOD_GENERATE,
                params(&[
                    ("target", Value::from("x")),
                    ("error_correction", Value::from("Z")),
                ]),
            )
            .await
            .unwrap_err();

        match err {
            ClientError::Call(e) => {
                assert_eq!(e.code(), code::VALIDATION_ERROR);
                assert!(e.data().unwrap().get().contains("error_correction"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(runtime.launched_count(), 0);

        handle.stop().unwrap();
    }

    #[tokio::test]
    async fn test_mistyped_params_are_validation_errors() {
        let runtime = Arc::new(MockContainerRuntime::new_rendering());
        let (handle, addr) = start_with(runtime.clone()).await;
        let client = client(addr);

        for (pairs, field) in [
            (vec![("target", Value::from("x")), ("box_size", Value::from("10"))], "box_size"),
            (vec![("target", Value::from("x")), ("box_size", Value::from(1.5))], "box_size"),
            (vec![("target", Value::Null)], "target"),
        ] {
            let err = client
                .request::<Value, _>(METHOD_GENERATE, params(&pairs))
                .await
                .unwrap_err();

            match err {
                ClientError::Call(e) => {
                    assert_eq!(e.code(), code::VALIDATION_ERROR);
                    let data: Value = serde_json::from_str(e.data().unwrap().get()).unwrap();
                    assert_eq!(data["field"], field);
                }
                other => panic!("unexpected error: {:?}", other),
            }
        }
        assert_eq!(runtime.launched_count(), 0);

        handle.stop().unwrap();
    }

    #[tokio::test]
    async fn test_job_failure_code() {
        let runtime = Arc::new(MockContainerRuntime::new(MockBehavior::Exit(2)));
        let (handle, addr) = start_with(runtime.clone()).await;

        let err = client(addr)
            .request::<Value, _>(METHOD_GENERATE, params(&[("target", Value::from("x"))]))
            .await
            .unwrap_err();

        match err {
            ClientError::Call(e) => {
                assert_eq!(e.code(), code::JOB_FAILED);
                assert!(e.message().contains('2'));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(runtime.live_count(), 0);

        handle.stop().unwrap();
    }

    #[tokio::test]
    async fn test_health_method_and_get_route() {
        let runtime = Arc::new(MockContainerRuntime::new_rendering());
        runtime.set_reachable(false);
        let (handle, addr) = start_with(runtime).await;

        let res: Value = client(addr)
            .request(METHOD_HEALTH, rpc_params![])
            .await
            .unwrap();
        assert_eq!(res["status"], "degraded");
        assert_eq!(res["runtime_reachable"], false);
        assert_eq!(res["max_slots"], 2);

        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut raw = String::new();
        stream.read_to_string(&mut raw).await.unwrap();
        assert!(raw.starts_with("HTTP/1.1 200"), "got {}", raw);
        assert!(raw.contains("runtime_reachable"));

        handle.stop().unwrap();
    }
}
