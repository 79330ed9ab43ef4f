//! SDK Error Types

use thiserror::Error;

/// SDK Result type
pub type Result<T> = std::result::Result<T, SdkError>;

/// Error codes returned by the daemon
pub mod code {
    pub const VALIDATION_ERROR: i32 = 4000;
    pub const THROTTLED: i32 = 4003;
    pub const INTERNAL_ERROR: i32 = 5000;
    pub const JOB_FAILED: i32 = 5002;
}

/// SDK Error
#[derive(Debug, Error)]
pub enum SdkError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("RPC error ({code}): {message}")]
    Rpc {
        code: i32,
        message: String,
        data: Option<serde_json::Value>,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Other error: {0}")]
    Other(String),
}

impl SdkError {
    /// Rejected by request validation (check `data.field`)
    pub fn is_validation(&self) -> bool {
        matches!(self, SdkError::Rpc { code: c, .. } if *c == code::VALIDATION_ERROR)
    }

    /// All worker slots stayed busy; safe to retry later
    pub fn is_throttled(&self) -> bool {
        matches!(self, SdkError::Rpc { code: c, .. } if *c == code::THROTTLED)
    }

    /// The render job itself failed
    pub fn is_job_failure(&self) -> bool {
        matches!(self, SdkError::Rpc { code: c, .. } if *c == code::JOB_FAILED)
    }

    /// Offending field of a validation error
    pub fn field(&self) -> Option<&str> {
        match self {
            SdkError::Rpc {
                data: Some(data), ..
            } => data.get("field").and_then(|v| v.as_str()),
            _ => None,
        }
    }
}

impl From<jsonrpsee::core::ClientError> for SdkError {
    fn from(e: jsonrpsee::core::ClientError) -> Self {
        match e {
            jsonrpsee::core::ClientError::Call(call_err) => SdkError::Rpc {
                code: call_err.code(),
                message: call_err.message().to_string(),
                data: call_err
                    .data()
                    .and_then(|raw| serde_json::from_str(raw.get()).ok()),
            },
            jsonrpsee::core::ClientError::Transport(e) => {
                SdkError::Transport(format!("Transport error: {}", e))
            }
            jsonrpsee::core::ClientError::RestartNeeded(_) => {
                SdkError::Connection("Connection restart needed".to_string())
            }
            jsonrpsee::core::ClientError::ParseError(e) => {
                SdkError::InvalidResponse(format!("Parse error: {}", e))
            }
            _ => SdkError::Other(e.to_string()),
        }
    }
}
