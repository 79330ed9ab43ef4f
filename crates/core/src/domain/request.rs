// Job Request Domain Model

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::domain::error::ValidationError;

/// Worker environment contract: keys the worker image reads at startup.
pub mod env_keys {
    pub const TARGET: &str = "URL_TO_GENERATE";
    pub const FILL_COLOR: &str = "QR_FILL_COLOR";
    pub const BACK_COLOR: &str = "QR_BACK_COLOR";
    pub const BOX_SIZE: &str = "QR_BOX_SIZE";
    pub const BORDER: &str = "QR_BORDER";
    pub const ERROR_CORRECTION: &str = "QR_ERROR_CORRECTION";
}

/// Error-correction level (redundancy tier of the rendered symbol)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ErrorCorrection {
    /// ~7% recoverable
    L,
    /// ~15% recoverable
    #[default]
    M,
    /// ~25% recoverable
    Q,
    /// ~30% recoverable
    H,
}

impl ErrorCorrection {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCorrection::L => "L",
            ErrorCorrection::M => "M",
            ErrorCorrection::Q => "Q",
            ErrorCorrection::H => "H",
        }
    }
}

impl fmt::Display for ErrorCorrection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ErrorCorrection {
    type Err = ValidationError;

    /// Accepts the four symbols, case-insensitive, surrounding whitespace ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "L" => Ok(ErrorCorrection::L),
            "M" => Ok(ErrorCorrection::M),
            "Q" => Ok(ErrorCorrection::Q),
            "H" => Ok(ErrorCorrection::H),
            _ => Err(ValidationError::new(
                "error_correction",
                format!("'{}' is not one of L, M, Q, H", s),
            )),
        }
    }
}

/// Rendering options forwarded to the worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderOptions {
    pub fill_color: String,
    pub back_color: String,
    pub box_size: u8,
    pub border: u8,
    pub error_correction: ErrorCorrection,
}

/// Unvalidated request as it arrives at the boundary.
///
/// Integers are signed so that negative values reach the validator
/// instead of failing deserialization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawJobRequest {
    pub target: String,
    #[serde(default)]
    pub fill_color: Option<String>,
    #[serde(default)]
    pub back_color: Option<String>,
    #[serde(default)]
    pub box_size: Option<i64>,
    #[serde(default)]
    pub border: Option<i64>,
    #[serde(default)]
    pub error_correction: Option<String>,
}

impl RawJobRequest {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            ..Default::default()
        }
    }
}

/// Validated, immutable job request.
///
/// Only constructed through [`crate::application::validator::validate`],
/// so every instance satisfies the bounds on box size, border and level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobRequest {
    target: String,
    options: RenderOptions,
}

impl JobRequest {
    pub(crate) fn new_unchecked(target: String, options: RenderOptions) -> Self {
        Self { target, options }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn options(&self) -> &RenderOptions {
        &self.options
    }

    /// Flat string map injected into the execution environment
    pub fn worker_env(&self) -> BTreeMap<String, String> {
        let o = &self.options;
        BTreeMap::from([
            (env_keys::TARGET.to_string(), self.target.clone()),
            (env_keys::FILL_COLOR.to_string(), o.fill_color.clone()),
            (env_keys::BACK_COLOR.to_string(), o.back_color.clone()),
            (env_keys::BOX_SIZE.to_string(), o.box_size.to_string()),
            (env_keys::BORDER.to_string(), o.border.to_string()),
            (
                env_keys::ERROR_CORRECTION.to_string(),
                o.error_correction.to_string(),
            ),
        ])
    }
}
