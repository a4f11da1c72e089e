/// HTTP surface of the registry.
use crate::directory::{InstanceDirectory, RegisterOutcome};
use crate::error::Result;
use actix_web::{web, HttpResponse};
use registry_client::model::{RegisterRequest, RegisterResponse, StatusUpdateRequest};
use std::sync::Arc;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health))
        .route("/instances", web::post().to(register))
        .route("/instances/{service}", web::get().to(list_instances))
        .route("/instances/{service}/{id}/renew", web::put().to(renew))
        .route("/instances/{service}/{id}/status", web::put().to(set_status))
        .route("/instances/{service}/{id}", web::delete().to(deregister));
}

async fn health(directory: web::Data<Arc<InstanceDirectory>>) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "service": "registry-service",
        "version": env!("CARGO_PKG_VERSION"),
        "selfPreservation": directory.in_self_preservation(),
    }))
}

async fn register(
    directory: web::Data<Arc<InstanceDirectory>>,
    request: web::Json<RegisterRequest>,
) -> Result<HttpResponse> {
    match directory.register(&request)? {
        RegisterOutcome::Created { lease_id } => {
            Ok(HttpResponse::Created().json(RegisterResponse { lease_id }))
        }
        RegisterOutcome::Renewed { lease_id } => {
            Ok(HttpResponse::Ok().json(RegisterResponse { lease_id }))
        }
    }
}

async fn renew(
    directory: web::Data<Arc<InstanceDirectory>>,
    path: web::Path<(String, String)>,
) -> Result<HttpResponse> {
    let (service, instance_id) = path.into_inner();
    directory.renew(&service, &instance_id)?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "renewed": true })))
}

async fn set_status(
    directory: web::Data<Arc<InstanceDirectory>>,
    path: web::Path<(String, String)>,
    body: web::Json<StatusUpdateRequest>,
) -> Result<HttpResponse> {
    let (service, instance_id) = path.into_inner();
    directory.set_status(&service, &instance_id, body.status)?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "status": body.status })))
}

async fn deregister(
    directory: web::Data<Arc<InstanceDirectory>>,
    path: web::Path<(String, String)>,
) -> HttpResponse {
    let (service, instance_id) = path.into_inner();
    directory.deregister(&service, &instance_id);
    HttpResponse::NoContent().finish()
}

async fn list_instances(
    directory: web::Data<Arc<InstanceDirectory>>,
    service: web::Path<String>,
) -> HttpResponse {
    HttpResponse::Ok().json(directory.query(&service))
}
