// Central Error Type for the Application
//
// Job failures are not here: they travel as `JobReport::outcome`.

use thiserror::Error;

use crate::domain::ValidationError;

/// Application-level error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Throttled: {0}")]
    Throttled(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;
