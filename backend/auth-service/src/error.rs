use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use thiserror::Error;
use token_security::TokenError;

pub type Result<T> = std::result::Result<T, AuthError>;

#[derive(Debug, Error)]
pub enum AuthError {
    /// Unknown user or wrong password; the two are indistinguishable to the
    /// caller by design.
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("User already exists")]
    UserAlreadyExists,

    #[error("Password too weak: {0}")]
    WeakPassword(String),

    #[error("Refresh token is invalid")]
    InvalidRefreshToken,

    #[error("Refresh token has been revoked")]
    RefreshTokenRevoked,

    #[error("Refresh token has expired")]
    RefreshTokenExpired,

    #[error("Token error: {0}")]
    Token(#[from] TokenError),

    #[error("Storage error: {0}")]
    Storage(#[from] kv_store::StoreError),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ResponseError for AuthError {
    fn status_code(&self) -> StatusCode {
        match self {
            AuthError::InvalidCredentials
            | AuthError::InvalidRefreshToken
            | AuthError::RefreshTokenRevoked
            | AuthError::RefreshTokenExpired => StatusCode::UNAUTHORIZED,
            AuthError::UserAlreadyExists => StatusCode::CONFLICT,
            AuthError::WeakPassword(_) => StatusCode::BAD_REQUEST,
            AuthError::Token(TokenError::Internal(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            AuthError::Token(_) => StatusCode::UNAUTHORIZED,
            AuthError::Storage(_) | AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        // Internal detail never leaves the service; 5xx bodies are generic.
        let message = if status.is_server_error() {
            "Internal server error".to_string()
        } else {
            self.to_string()
        };
        HttpResponse::build(status).json(serde_json::json!({
            "error": message,
            "status": status.as_u16(),
        }))
    }
}
