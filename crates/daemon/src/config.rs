//! Daemon configuration, read once from the environment at startup

use anyhow::{bail, Result};
use qrgen_api_rpc::server::DEFAULT_RPC_PORT;
use qrgen_api_rpc::RpcServerConfig;
use qrgen_core::application::constants::{
    DEFAULT_ADMISSION_TIMEOUT, DEFAULT_ARTIFACT_PATH, DEFAULT_JOB_TIMEOUT,
    DEFAULT_MAX_CONCURRENT_JOBS, DEFAULT_MEMORY_LIMIT_BYTES, DEFAULT_PIDS_LIMIT,
    DEFAULT_WORKER_IMAGE,
};
use qrgen_core::application::RenderConfig;
use qrgen_core::port::ResourceLimits;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub mod vars {
    pub const RPC_HOST: &str = "QRGEN_RPC_HOST";
    pub const RPC_PORT: &str = "QRGEN_RPC_PORT";
    pub const WORKER_IMAGE: &str = "QRGEN_WORKER_IMAGE";
    pub const ARTIFACT_PATH: &str = "QRGEN_ARTIFACT_PATH";
    pub const MEMORY_LIMIT_MB: &str = "QRGEN_MEMORY_LIMIT_MB";
    pub const PIDS_LIMIT: &str = "QRGEN_PIDS_LIMIT";
    pub const MAX_CONCURRENT_JOBS: &str = "QRGEN_MAX_CONCURRENT_JOBS";
    pub const ADMISSION_TIMEOUT_MS: &str = "QRGEN_ADMISSION_TIMEOUT_MS";
    pub const JOB_TIMEOUT_MS: &str = "QRGEN_JOB_TIMEOUT_MS";
    pub const LOG_FORMAT: &str = "QRGEN_LOG_FORMAT";
    pub const LOG_DIR: &str = "QRGEN_LOG_DIR";
}

const DEFAULT_RPC_HOST: &str = "127.0.0.1";
const MIB: i64 = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{}' (pretty|json)", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub rpc_host: String,
    pub rpc_port: u16,
    pub worker_image: String,
    pub artifact_path: String,
    pub memory_limit_bytes: i64,
    /// None = no process limit
    pub pids_limit: Option<i64>,
    pub max_concurrent_jobs: usize,
    pub admission_timeout: Duration,
    /// None = wait for the worker indefinitely
    pub job_timeout: Option<Duration>,
    pub log_format: LogFormat,
    pub log_dir: Option<PathBuf>,
}

impl DaemonConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup (tests pass a map)
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let memory_limit_mb: i64 = parse_var(&get, vars::MEMORY_LIMIT_MB, DEFAULT_MEMORY_LIMIT_BYTES / MIB)?;
        if memory_limit_mb <= 0 {
            bail!("{} must be positive, got {}", vars::MEMORY_LIMIT_MB, memory_limit_mb);
        }

        let pids_limit: i64 = parse_var(&get, vars::PIDS_LIMIT, DEFAULT_PIDS_LIMIT)?;

        let max_concurrent_jobs: usize =
            parse_var(&get, vars::MAX_CONCURRENT_JOBS, DEFAULT_MAX_CONCURRENT_JOBS)?;
        if max_concurrent_jobs == 0 {
            bail!("{} must be at least 1", vars::MAX_CONCURRENT_JOBS);
        }

        let admission_timeout_ms: u64 = parse_var(
            &get,
            vars::ADMISSION_TIMEOUT_MS,
            DEFAULT_ADMISSION_TIMEOUT.as_millis() as u64,
        )?;
        let job_timeout_ms: u64 = parse_var(
            &get,
            vars::JOB_TIMEOUT_MS,
            DEFAULT_JOB_TIMEOUT.as_millis() as u64,
        )?;

        let artifact_path = get(vars::ARTIFACT_PATH).unwrap_or_else(|| DEFAULT_ARTIFACT_PATH.to_string());
        if !artifact_path.starts_with('/') {
            bail!("{} must be an absolute path, got '{}'", vars::ARTIFACT_PATH, artifact_path);
        }

        let log_format = match get(vars::LOG_FORMAT) {
            Some(raw) => raw
                .parse()
                .map_err(|e: String| anyhow::anyhow!("invalid {}: {}", vars::LOG_FORMAT, e))?,
            None => LogFormat::Pretty,
        };

        Ok(Self {
            rpc_host: get(vars::RPC_HOST).unwrap_or_else(|| DEFAULT_RPC_HOST.to_string()),
            rpc_port: parse_var(&get, vars::RPC_PORT, DEFAULT_RPC_PORT)?,
            worker_image: get(vars::WORKER_IMAGE).unwrap_or_else(|| DEFAULT_WORKER_IMAGE.to_string()),
            artifact_path,
            memory_limit_bytes: memory_limit_mb * MIB,
            pids_limit: (pids_limit > 0).then_some(pids_limit),
            max_concurrent_jobs,
            admission_timeout: Duration::from_millis(admission_timeout_ms),
            job_timeout: (job_timeout_ms > 0).then(|| Duration::from_millis(job_timeout_ms)),
            log_format,
            log_dir: get(vars::LOG_DIR).map(|d| PathBuf::from(shellexpand::tilde(&d).into_owned())),
        })
    }

    pub fn resource_limits(&self) -> ResourceLimits {
        ResourceLimits {
            memory_bytes: self.memory_limit_bytes,
            pids_limit: self.pids_limit,
            network_disabled: true,
        }
    }

    pub fn render_config(&self) -> RenderConfig {
        RenderConfig {
            artifact_path: self.artifact_path.clone(),
            job_timeout: self.job_timeout,
        }
    }

    pub fn rpc_config(&self) -> RpcServerConfig {
        RpcServerConfig {
            host: self.rpc_host.clone(),
            port: self.rpc_port,
        }
    }
}

fn parse_var<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| anyhow::anyhow!("invalid {}='{}': {}", key, raw, e)),
        None => Ok(default),
    }
}
