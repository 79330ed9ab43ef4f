//! RPC Request/Response Types

use qrgen_core::domain::{RawJobRequest, ValidationError};
use serde::Serialize;
use serde_json::{Map, Value};

/// qr.generate.v1 - Render one QR code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateRequest {
    pub target: String,
    pub fill_color: Option<String>,
    pub back_color: Option<String>,
    pub box_size: Option<i64>,
    pub border: Option<i64>,
    pub error_correction: Option<String>,
}

impl GenerateRequest {
    /// Read named params. A missing or mistyped field is reported by name;
    /// `null` counts as absent for optional fields.
    pub fn from_params(params: Value) -> Result<Self, ValidationError> {
        let mut map = match params {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            _ => {
                return Err(ValidationError::new(
                    "params",
                    "expected an object of named parameters",
                ))
            }
        };

        let target = optional_string(&mut map, "target")?
            .ok_or_else(|| ValidationError::new("target", "is required"))?;

        Ok(Self {
            target,
            fill_color: optional_string(&mut map, "fill_color")?,
            back_color: optional_string(&mut map, "back_color")?,
            box_size: optional_integer(&mut map, "box_size")?,
            border: optional_integer(&mut map, "border")?,
            error_correction: optional_string(&mut map, "error_correction")?,
        })
    }
}

fn optional_string(
    map: &mut Map<String, Value>,
    field: &'static str,
) -> Result<Option<String>, ValidationError> {
    match map.remove(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(other) => Err(mistyped(field, "a string", &other)),
    }
}

fn optional_integer(
    map: &mut Map<String, Value>,
    field: &'static str,
) -> Result<Option<i64>, ValidationError> {
    match map.remove(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => match n.as_i64() {
            Some(v) => Ok(Some(v)),
            None => Err(ValidationError::new(
                field,
                format!("must be an integer, got {}", n),
            )),
        },
        Some(other) => Err(mistyped(field, "an integer", &other)),
    }
}

fn mistyped(field: &'static str, expected: &str, got: &Value) -> ValidationError {
    let kind = match got {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    };
    ValidationError::new(field, format!("must be {}, got {}", expected, kind))
}

impl From<GenerateRequest> for RawJobRequest {
    fn from(req: GenerateRequest) -> Self {
        RawJobRequest {
            target: req.target,
            fill_color: req.fill_color,
            back_color: req.back_color,
            box_size: req.box_size,
            border: req.border,
            error_correction: req.error_correction,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerateResponse {
    pub job_id: String,
    pub content_type: String,
    /// Standard base64 of the image bytes
    pub image_base64: String,
    pub size_bytes: usize,
    pub duration_ms: i64,
}

/// system.health.v1
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// "ok" or "degraded"
    pub status: String,
    pub runtime_reachable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime_detail: Option<String>,
    pub version: String,
    pub uptime_seconds: u64,
    pub available_slots: usize,
    pub max_slots: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_named_params() {
        let req = GenerateRequest::from_params(json!({
            "target": "https://example.com",
            "box_size": 12,
            "fill_color": null,
            "error_correction": "q",
        }))
        .unwrap();

        assert_eq!(req.target, "https://example.com");
        assert_eq!(req.box_size, Some(12));
        assert_eq!(req.fill_color, None);
        assert_eq!(req.border, None);
        assert_eq!(req.error_correction.as_deref(), Some("q"));
    }

    #[test]
    fn test_mistyped_fields_are_named() {
        for (params, field) in [
            (json!({"target": "x", "box_size": "10"}), "box_size"),
            (json!({"target": "x", "box_size": 1.5}), "box_size"),
            (json!({"target": "x", "border": true}), "border"),
            (json!({"target": "x", "fill_color": 3}), "fill_color"),
            (json!({"target": null}), "target"),
            (json!({"target": 42}), "target"),
            (json!({}), "target"),
            (json!(["x"]), "params"),
        ] {
            let err = GenerateRequest::from_params(params.clone()).unwrap_err();
            assert_eq!(err.field, field, "params {}", params);
        }
    }

    #[test]
    fn test_integer_overflow_is_named() {
        let err = GenerateRequest::from_params(json!({"target": "x", "border": u64::MAX}))
            .unwrap_err();
        assert_eq!(err.field, "border");
        assert!(err.reason.contains("integer"));
    }
}
