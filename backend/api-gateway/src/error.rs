/// Error types for the gateway.
use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use thiserror::Error;
use token_security::TokenError;

pub type Result<T> = std::result::Result<T, GatewayError>;

#[derive(Debug, Error)]
pub enum GatewayError {
    /// No configured prefix matches the request path
    #[error("No route matches the request path")]
    RouteNotFound,

    /// Protected route and no bearer token on the request
    #[error("Missing bearer token")]
    MissingToken,

    #[error("Invalid token")]
    Token(#[source] TokenError),

    /// Token verified but lacks a scope the route requires
    #[error("Insufficient scope")]
    InsufficientScope,

    /// No healthy instance, or every candidate failed
    #[error("Service unavailable")]
    DownstreamUnavailable,

    /// Every attempted instance exceeded the per-attempt deadline
    #[error("Downstream timed out")]
    DownstreamTimeout,

    #[error("Internal gateway error")]
    Internal(String),
}

impl From<TokenError> for GatewayError {
    fn from(e: TokenError) -> Self {
        match e {
            TokenError::Missing => GatewayError::MissingToken,
            TokenError::Internal(detail) => GatewayError::Internal(detail),
            other => GatewayError::Token(other),
        }
    }
}

impl ResponseError for GatewayError {
    fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::RouteNotFound => StatusCode::NOT_FOUND,
            GatewayError::MissingToken | GatewayError::Token(_) => StatusCode::UNAUTHORIZED,
            GatewayError::InsufficientScope => StatusCode::FORBIDDEN,
            GatewayError::DownstreamUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::DownstreamTimeout => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        // Internal detail stays in the logs, never in the response body.
        let message = match self {
            GatewayError::Internal(_) => "Internal gateway error".to_string(),
            other => other.to_string(),
        };
        HttpResponse::build(status).json(serde_json::json!({
            "error": message,
            "status": status.as_u16(),
        }))
    }
}
