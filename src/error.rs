use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use serde_json::json;
use thiserror::Error;

/// Failures raised by a GPIO backend while acquiring or configuring a line.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HardwareError {
    #[error("GPIO line {0} is unavailable")]
    Unavailable(u32),
    #[error("GPIO configuration failed: {0}")]
    ConfigFailed(String),
}

/// Fatal startup errors. Every variant is returned only after the resources
/// acquired so far have been released.
#[derive(Debug, Error)]
pub enum InitError {
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Hardware error: {0}")]
    Hardware(#[from] HardwareError),
    #[error("Failed to create property group: {0}")]
    GroupCreationFailed(String),
    #[error("Failed to attach interrupt: {0}")]
    InterruptAttachFailed(String),
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Property group not found: {0}")]
    NotFoundGroup(String),
    #[error("Attribute not found: {0}")]
    NotFoundAttribute(String),
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
    #[error("Invalid value: {0}")]
    InvalidValue(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("GPIO error: {0}")]
    Hardware(#[from] HardwareError),
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFoundGroup(_) | AppError::NotFoundAttribute(_) => StatusCode::NOT_FOUND,
            AppError::InvalidValue(_) => StatusCode::BAD_REQUEST,
            AppError::PermissionDenied(_) => StatusCode::FORBIDDEN,
            AppError::Config(_) | AppError::Hardware(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({ "error": self.to_string() }))
    }
}
