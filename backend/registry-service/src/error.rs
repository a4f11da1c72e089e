/// Error types for the registry service.
use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RegistryError>;

#[derive(Debug, Error)]
pub enum RegistryError {
    /// A different instance already holds this (service, instanceId) pair
    #[error("Instance already registered with a different address")]
    RegistrationConflict,

    /// No lease exists for the (service, instanceId) pair
    #[error("Instance not found")]
    InstanceNotFound,

    /// leaseDuration is zero or beyond the accepted maximum
    #[error("Invalid lease duration")]
    InvalidLeaseDuration,
}

impl ResponseError for RegistryError {
    fn status_code(&self) -> StatusCode {
        match self {
            RegistryError::RegistrationConflict => StatusCode::CONFLICT,
            RegistryError::InstanceNotFound => StatusCode::NOT_FOUND,
            RegistryError::InvalidLeaseDuration => StatusCode::BAD_REQUEST,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        HttpResponse::build(status).json(serde_json::json!({
            "error": self.to_string(),
            "status": status.as_u16(),
        }))
    }
}
