/// HTTP surface of the auth service.
use crate::error::Result;
use crate::service::AuthService;
use crate::store::Role;
use actix_web::{web, HttpResponse};
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialsRequest {
    pub user_id: String,
    pub password: String,
    #[serde(default)]
    pub role: Option<Role>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health))
        .route("/register", web::post().to(register))
        .route("/login", web::post().to(login))
        .route("/refresh", web::post().to(refresh))
        .route("/revoke", web::post().to(revoke))
        .route("/guest", web::post().to(guest))
        .route("/keys", web::get().to(keys))
        .route("/keys/rotate", web::post().to(rotate_keys));
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "service": "auth-service",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn register(
    auth: web::Data<Arc<AuthService>>,
    body: web::Json<CredentialsRequest>,
) -> Result<HttpResponse> {
    let role = body.role.unwrap_or(Role::User);
    let pair = auth.register(&body.user_id, &body.password, role).await?;
    Ok(HttpResponse::Created().json(pair))
}

async fn login(
    auth: web::Data<Arc<AuthService>>,
    body: web::Json<CredentialsRequest>,
) -> Result<HttpResponse> {
    let pair = auth.login(&body.user_id, &body.password).await?;
    Ok(HttpResponse::Ok().json(pair))
}

async fn refresh(
    auth: web::Data<Arc<AuthService>>,
    body: web::Json<RefreshRequest>,
) -> Result<HttpResponse> {
    let pair = auth.refresh(&body.refresh_token).await?;
    Ok(HttpResponse::Ok().json(pair))
}

async fn revoke(
    auth: web::Data<Arc<AuthService>>,
    body: web::Json<RefreshRequest>,
) -> Result<HttpResponse> {
    auth.revoke(&body.refresh_token).await?;
    Ok(HttpResponse::NoContent().finish())
}

async fn guest(auth: web::Data<Arc<AuthService>>) -> Result<HttpResponse> {
    Ok(HttpResponse::Ok().json(auth.guest_token()?))
}

async fn keys(auth: web::Data<Arc<AuthService>>) -> HttpResponse {
    HttpResponse::Ok().json(auth.public_keys())
}

async fn rotate_keys(auth: web::Data<Arc<AuthService>>) -> Result<HttpResponse> {
    let key_id = auth.rotate_signing_key()?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "keyId": key_id })))
}
