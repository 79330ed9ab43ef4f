//! RPC Error Types
//!
//! Maps application and job errors to JSON-RPC error codes.

use jsonrpsee::types::ErrorObjectOwned;
use qrgen_core::domain::{JobError, ValidationError};
use qrgen_core::error::AppError;
use serde_json::json;

/// RPC Error Codes
pub mod code {
    pub const VALIDATION_ERROR: i32 = 4000;
    pub const THROTTLED: i32 = 4003;
    pub const INTERNAL_ERROR: i32 = 5000;
    pub const JOB_FAILED: i32 = 5002;
}

/// Convert AppError to JSON-RPC ErrorObject
pub fn to_rpc_error(err: AppError) -> ErrorObjectOwned {
    match err {
        AppError::Validation(e) => validation_error(&e),
        AppError::Throttled(msg) => ErrorObjectOwned::owned(code::THROTTLED, msg, None::<()>),
        AppError::Internal(msg) => ErrorObjectOwned::owned(code::INTERNAL_ERROR, msg, None::<()>),
    }
}

pub fn validation_error(err: &ValidationError) -> ErrorObjectOwned {
    ErrorObjectOwned::owned(
        code::VALIDATION_ERROR,
        err.to_string(),
        Some(json!({ "field": err.field })),
    )
}

/// Every job failure kind shares one code; `data.kind` tells them apart
pub fn job_error(job_id: &str, err: &JobError) -> ErrorObjectOwned {
    ErrorObjectOwned::owned(
        code::JOB_FAILED,
        err.to_string(),
        Some(json!({ "job_id": job_id, "kind": err.kind() })),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_carries_field() {
        let err = to_rpc_error(AppError::Validation(ValidationError::new(
            "box_size",
            "must be between 1 and 50",
        )));

        assert_eq!(err.code(), code::VALIDATION_ERROR);
        assert!(err.message().contains("box_size"));
        let data: serde_json::Value = serde_json::from_str(err.data().unwrap().get()).unwrap();
        assert_eq!(data["field"], "box_size");
    }

    #[test]
    fn test_job_failures_share_one_code() {
        for e in [
            JobError::WorkerNonZeroExit { code: 1 },
            JobError::ArtifactMissing {
                path: "/app/qrcode.png".to_string(),
            },
            JobError::Timeout { after_ms: 10 },
        ] {
            let err = job_error("job-1", &e);
            assert_eq!(err.code(), code::JOB_FAILED);
            assert_eq!(err.message(), e.to_string());
        }
    }

    #[test]
    fn test_throttled() {
        let err = to_rpc_error(AppError::Throttled("busy".to_string()));
        assert_eq!(err.code(), code::THROTTLED);
    }

    #[test]
    fn test_internal() {
        let err = to_rpc_error(AppError::Internal("job task failed".to_string()));
        assert_eq!(err.code(), code::INTERNAL_ERROR);
        assert_eq!(err.message(), "job task failed");
    }
}
