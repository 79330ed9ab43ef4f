// Job Request Validator
// Pure function: no side effects, no resource allocation

use crate::application::constants::{
    BORDER_RANGE, BOX_SIZE_RANGE, DEFAULT_BACK_COLOR, DEFAULT_BORDER, DEFAULT_BOX_SIZE,
    DEFAULT_FILL_COLOR, MAX_TARGET_BYTES,
};
use crate::domain::{ErrorCorrection, JobRequest, RawJobRequest, RenderOptions, ValidationError};

/// Normalize and bounds-check a raw request.
///
/// Colors are opaque to the engine: whatever the caller sends is handed to
/// the worker, except that a blank value means "use the default".
pub fn validate(raw: RawJobRequest) -> Result<JobRequest, ValidationError> {
    let target = raw.target.trim();
    if target.is_empty() {
        return Err(ValidationError::new("target", "must not be empty"));
    }
    if target.len() > MAX_TARGET_BYTES {
        return Err(ValidationError::new(
            "target",
            format!(
                "{} bytes exceeds the {} byte capacity of a QR symbol",
                target.len(),
                MAX_TARGET_BYTES
            ),
        ));
    }

    let box_size = bounded("box_size", raw.box_size, BOX_SIZE_RANGE, DEFAULT_BOX_SIZE)?;
    let border = bounded("border", raw.border, BORDER_RANGE, DEFAULT_BORDER)?;

    let error_correction = match raw.error_correction.as_deref() {
        None => ErrorCorrection::default(),
        Some(s) => s.parse()?,
    };

    let options = RenderOptions {
        fill_color: color_or(raw.fill_color, DEFAULT_FILL_COLOR),
        back_color: color_or(raw.back_color, DEFAULT_BACK_COLOR),
        box_size,
        border,
        error_correction,
    };

    Ok(JobRequest::new_unchecked(target.to_string(), options))
}

fn bounded(
    field: &'static str,
    value: Option<i64>,
    range: std::ops::RangeInclusive<i64>,
    default: u8,
) -> Result<u8, ValidationError> {
    let Some(v) = value else {
        return Ok(default);
    };
    if !range.contains(&v) {
        return Err(ValidationError::new(
            field,
            format!(
                "{} is out of range [{}, {}]",
                v,
                range.start(),
                range.end()
            ),
        ));
    }
    // Both ranges fit in u8
    u8::try_from(v).map_err(|_| ValidationError::new(field, format!("{} does not fit", v)))
}

/// Non-blank colors reach the worker byte for byte
fn color_or(value: Option<String>, default: &str) -> String {
    match value {
        Some(c) if !c.trim().is_empty() => c,
        _ => default.to_string(),
    }
}
