//! HTTP entry points for the REST proxy surface: reads the ingress body
//! (bounded per spec.md §6), builds a `ProxyRequest`, and renders whatever
//! `ProxyPipeline::handle` returns as the egress response (spec.md §4.6).

use std::sync::Arc;
use std::time::Instant;

use actix_web::http::header::{HeaderName, HeaderValue};
use actix_web::http::StatusCode;
use actix_web::{web, HttpMessage, HttpRequest, HttpResponse};
use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use uuid::Uuid;

use crate::middleware::{JwtAuth, RateLimit};
use crate::models::error::GatewayError;
use crate::models::identity::ClientIdentity;
use crate::models::settings::JwtSettings;
use crate::services::metrics::MetricsCollector;
use crate::services::proxy::ProxyRequest;
use crate::services::rate_limiter::RateLimiter;
use crate::state::AppState;

/// Recommended minimum from spec.md §6; exceeding it surfaces `413`.
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

async fn read_body_capped(mut payload: web::Payload) -> Result<Bytes, GatewayError> {
    let mut buf = BytesMut::new();
    while let Some(chunk) = payload.next().await {
        let chunk = chunk.map_err(|_| GatewayError::MalformedRequest)?;
        if buf.len() + chunk.len() > MAX_BODY_BYTES {
            return Err(GatewayError::PayloadTooLarge);
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(buf.freeze())
}

fn peer_ip(req: &HttpRequest) -> String {
    req.connection_info().peer_addr().unwrap_or("unknown").to_string()
}

fn request_id_of(req: &HttpRequest) -> String {
    req.headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

/// Catch-all handler for every method and sub-path under a registered proxy
/// scope. Shared by all REST prefixes (spec.md §4.6's dispatch table) — the
/// actual service is resolved from the path by `ProxyPipeline`.
pub async fn proxy_any(
    req: HttpRequest,
    payload: web::Payload,
    state: web::Data<AppState>,
) -> Result<HttpResponse, GatewayError> {
    let start = Instant::now();
    let body = read_body_capped(payload).await?;

    let method = req.method().to_string();
    let path = req.path().to_string();
    let raw_query = req.query_string().to_string();
    let peer_ip = peer_ip(&req);
    let request_id = request_id_of(&req);
    let is_tls = req.connection_info().scheme() == "https";

    let identity = req
        .extensions()
        .get::<ClientIdentity>()
        .cloned()
        .unwrap_or_else(|| ClientIdentity::anonymous(peer_ip.clone()));

    let headers = req
        .headers()
        .iter()
        .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str().to_string(), v.to_string())))
        .collect();

    let proxy_req = ProxyRequest {
        method,
        path,
        raw_query,
        headers,
        body,
        peer_ip,
        request_id: request_id.clone(),
        identity,
        is_tls,
    };

    let response = state.proxy.handle(proxy_req).await?;

    let mut builder = HttpResponse::build(StatusCode::from_u16(response.status).unwrap_or(StatusCode::OK));
    for (name, value) in &response.headers {
        if let (Ok(name), Ok(value)) = (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
            builder.insert_header((name, value));
        }
    }
    builder
        .insert_header(("X-Cache", response.cache_status))
        .insert_header(("X-Proxy-Service", response.service.as_str()))
        .insert_header(("X-Request-ID", request_id))
        .insert_header(("X-Response-Time", format!("{:.2}", start.elapsed().as_secs_f64() * 1000.0)));
    Ok(builder.body(response.body))
}

/// `/api/v1/auth/*`: rate-limited only — the auth service's own endpoints
/// (login/register/token/refresh/jwks/oauth) must be reachable without a
/// bearer token in hand, per spec.md §6's public-prefix list.
pub fn configure_auth_proxy(cfg: &mut web::ServiceConfig, limiter: Arc<RateLimiter>, metrics: Arc<MetricsCollector>) {
    cfg.service(
        web::scope("/api/v1/auth")
            .wrap(RateLimit::new(limiter, metrics))
            .default_service(web::route().to(proxy_any)),
    );
}

/// `/api/v1/{works,tags,search}/*`: rate-limited, optional auth (valid
/// token promotes the identity, a missing/invalid one falls back to
/// anonymous rather than a hard 401), per spec.md §6's optional-auth list.
pub fn configure_optional_auth_proxy(
    cfg: &mut web::ServiceConfig,
    prefix: &'static str,
    limiter: Arc<RateLimiter>,
    metrics: Arc<MetricsCollector>,
    jwt: JwtSettings,
) {
    cfg.service(
        web::scope(prefix)
            .wrap(RateLimit::new(limiter, metrics))
            .wrap(JwtAuth::optional(jwt))
            .default_service(web::route().to(proxy_any)),
    );
}

/// `/api/v1/{my,users,series,collections,bookmarks,comments,pseuds}/*`:
/// rate-limited and auth required — a missing/invalid token is a hard 401
/// per spec.md §6's protected-prefix row.
pub fn configure_required_auth_proxy(
    cfg: &mut web::ServiceConfig,
    prefix: &'static str,
    limiter: Arc<RateLimiter>,
    metrics: Arc<MetricsCollector>,
    jwt: JwtSettings,
) {
    cfg.service(
        web::scope(prefix)
            .wrap(RateLimit::new(limiter, metrics))
            .wrap(JwtAuth::required(jwt))
            .default_service(web::route().to(proxy_any)),
    );
}
