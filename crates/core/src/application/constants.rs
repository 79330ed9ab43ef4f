// Engine constants (no magic values)
use std::time::Duration;

/// Worker image resolved on every launch
pub const DEFAULT_WORKER_IMAGE: &str = "qrcode-worker:latest";

/// Absolute path the worker writes its artifact to
pub const DEFAULT_ARTIFACT_PATH: &str = "/app/qrcode.png";

/// Memory cap per environment (128 MiB)
pub const DEFAULT_MEMORY_LIMIT_BYTES: i64 = 128 * 1024 * 1024;

/// Process cap per environment
pub const DEFAULT_PIDS_LIMIT: i64 = 64;

/// Environments allowed to exist at once
pub const DEFAULT_MAX_CONCURRENT_JOBS: usize = 4;

/// How long a job may wait for an admission permit (30s)
pub const DEFAULT_ADMISSION_TIMEOUT: Duration = Duration::from_secs(30);

/// Deadline for the worker to exit (60s)
pub const DEFAULT_JOB_TIMEOUT: Duration = Duration::from_secs(60);

/// Upper bound on a drained archive stream (32 MiB)
pub const MAX_ARCHIVE_BYTES: usize = 32 * 1024 * 1024;

/// QR byte-mode capacity at level L, version 40
pub const MAX_TARGET_BYTES: usize = 2953;

/// Module size bounds (pixels per module)
pub const BOX_SIZE_RANGE: std::ops::RangeInclusive<i64> = 1..=50;

/// Quiet-zone bounds (modules)
pub const BORDER_RANGE: std::ops::RangeInclusive<i64> = 0..=20;

/// Rendering defaults (those of the worker's QR library)
pub const DEFAULT_FILL_COLOR: &str = "black";
pub const DEFAULT_BACK_COLOR: &str = "white";
pub const DEFAULT_BOX_SIZE: u8 = 10;
pub const DEFAULT_BORDER: u8 = 4;

/// Labels stamped on every environment
pub const LABEL_MANAGED: &str = "qrgen.managed";
pub const LABEL_JOB_ID: &str = "qrgen.job_id";
