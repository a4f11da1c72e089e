/// HTTP surface of the gateway: a health probe and the catch-all proxy
/// pipeline (route, authorize, select, forward).
use crate::auth::KeyCache;
use crate::balancer::Balancer;
use crate::config::RouteConfig;
use crate::error::Result;
use crate::proxy::{ForwardEngine, ProxiedRequest};
use crate::routing::RouteTable;
use crate::snapshot::SnapshotCache;
use actix_web::http::StatusCode;
use actix_web::{web, HttpRequest, HttpResponse};
use std::sync::Arc;
use token_security::Claims;
use tracing::debug;

/// Everything the request path reads. Built once at startup; all interior
/// state is refreshed through atomic swaps, never request-path locks.
pub struct GatewayState {
    pub routes: RouteTable,
    pub snapshot: Arc<SnapshotCache>,
    pub keys: Arc<KeyCache>,
    pub balancer: Arc<Balancer>,
    pub engine: ForwardEngine,
}

/// Hop-by-hop headers plus those the proxy owns; never forwarded in either
/// direction.
const STRIPPED_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "host",
    "content-length",
];

/// Identity headers are gateway-asserted; inbound copies are dropped so a
/// client cannot spoof a verified identity.
const IDENTITY_SUBJECT: &str = "x-auth-subject";
const IDENTITY_ROLES: &str = "x-auth-roles";

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health))
        .route("/{proxied:.*}", web::route().to(dispatch));
}

async fn health(state: web::Data<GatewayState>) -> HttpResponse {
    let view = state.snapshot.view();
    HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "service": "api-gateway",
        "version": env!("CARGO_PKG_VERSION"),
        "snapshotRefreshedAt": view.refreshed_at,
        "knownServices": view.services.len(),
    }))
}

async fn dispatch(
    state: web::Data<GatewayState>,
    req: HttpRequest,
    body: web::Bytes,
) -> Result<HttpResponse> {
    let route = state.routes.resolve(req.path())?;

    let authorization = req
        .headers()
        .get(actix_web::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    let claims = state.keys.authorize(authorization, route)?;

    let instances = state.snapshot.instances(&route.service);
    let candidates = state.balancer.order(&route.service, &instances);
    debug!(
        path = req.path(),
        service = %route.service,
        candidates = candidates.len(),
        "Dispatching request"
    );

    let proxied = build_proxied_request(&req, route, &body, claims.as_ref());
    let response = state
        .engine
        .forward(&state.balancer, &route.service, &candidates, &proxied)
        .await?;

    let status =
        StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut builder = HttpResponse::build(status);
    for (name, value) in &response.headers {
        if STRIPPED_HEADERS.contains(&name.as_str()) {
            continue;
        }
        builder.append_header((name.as_str(), value.as_slice()));
    }
    Ok(builder.body(response.body))
}

fn build_proxied_request(
    req: &HttpRequest,
    route: &RouteConfig,
    body: &web::Bytes,
    claims: Option<&Claims>,
) -> ProxiedRequest {
    let mut headers: Vec<(String, Vec<u8>)> = req
        .headers()
        .iter()
        .filter(|(name, _)| {
            let name = name.as_str();
            !STRIPPED_HEADERS.contains(&name)
                && name != IDENTITY_SUBJECT
                && name != IDENTITY_ROLES
        })
        .map(|(name, value)| (name.as_str().to_string(), value.as_bytes().to_vec()))
        .collect();

    if let Some(claims) = claims {
        headers.push((IDENTITY_SUBJECT.to_string(), claims.sub.as_bytes().to_vec()));
        headers.push((
            IDENTITY_ROLES.to_string(),
            claims.roles.join(",").into_bytes(),
        ));
    }

    let path = if route.strip_prefix {
        match req.path().strip_prefix(route.prefix.trim_end_matches('/')) {
            Some(rest) if !rest.is_empty() => rest,
            _ => "/",
        }
    } else {
        req.path()
    };
    let path_and_query = match req.uri().query() {
        Some(query) => format!("{path}?{query}"),
        None => path.to_string(),
    };

    ProxiedRequest {
        method: req.method().as_str().to_string(),
        path_and_query,
        headers,
        body: body.to_vec(),
    }
}
