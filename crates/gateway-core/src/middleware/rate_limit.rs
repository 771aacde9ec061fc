//! Rate-limiting middleware: reads the `ClientIdentity` installed by
//! `middleware::auth` (or derives an anonymous one from the peer address
//! when auth isn't in the chain ahead of it, e.g. the auth-service
//! prefixes), checks it against the KV-backed limiter, and attaches the
//! `X-RateLimit-*` headers to every response regardless of admission
//! (spec.md §4.4).

use std::rc::Rc;
use std::sync::Arc;
use std::task::{Context, Poll};

use actix_web::body::BoxBody;
use actix_web::dev::{Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::http::header::{HeaderName, HeaderValue};
use actix_web::{Error, HttpMessage, HttpResponse};
use futures_util::future::{ready, LocalBoxFuture, Ready};

use crate::models::identity::ClientIdentity;
use crate::services::metrics::MetricsCollector;
use crate::services::rate_limiter::RateLimiter;

pub struct RateLimit {
    limiter: Arc<RateLimiter>,
    metrics: Arc<MetricsCollector>,
}

impl RateLimit {
    pub fn new(limiter: Arc<RateLimiter>, metrics: Arc<MetricsCollector>) -> Self {
        RateLimit { limiter, metrics }
    }
}

impl<S, B> Transform<S, ServiceRequest> for RateLimit
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: actix_web::body::MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type Transform = RateLimitMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RateLimitMiddleware {
            service: Rc::new(service),
            limiter: self.limiter.clone(),
            metrics: self.metrics.clone(),
        }))
    }
}

pub struct RateLimitMiddleware<S> {
    service: Rc<S>,
    limiter: Arc<RateLimiter>,
    metrics: Arc<MetricsCollector>,
}

impl<S, B> Service<ServiceRequest> for RateLimitMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: actix_web::body::MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    actix_web::dev::forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        let limiter = self.limiter.clone();
        let metrics = self.metrics.clone();

        let identity = req
            .extensions()
            .get::<ClientIdentity>()
            .cloned()
            .unwrap_or_else(|| {
                let ip = req.connection_info().peer_addr().unwrap_or("unknown").to_string();
                ClientIdentity::anonymous(ip)
            });

        Box::pin(async move {
            let decision = limiter.check(&identity).await;

            if !decision.allowed {
                metrics.record_rate_limit_hit();
                let response = HttpResponse::TooManyRequests().json(serde_json::json!({
                    "error": "rate limit exceeded",
                    "tier": decision.tier.as_str(),
                    "limit": decision.limit,
                    "window": decision.window_secs,
                    "retry_after": decision.window_secs,
                }));
                let mut response = req.into_response(response).map_into_boxed_body();
                insert_rate_limit_headers(&mut response, &decision);
                return Ok(response);
            }

            let mut response = service.call(req).await?.map_into_boxed_body();
            insert_rate_limit_headers(&mut response, &decision);
            Ok(response)
        })
    }
}

fn insert_rate_limit_headers(response: &mut ServiceResponse<BoxBody>, decision: &crate::services::rate_limiter::RateLimitDecision) {
    let headers = response.headers_mut();
    let insert = |headers: &mut actix_web::http::header::HeaderMap, name: &'static str, value: String| {
        if let (Ok(name), Ok(value)) = (HeaderName::from_static(name), HeaderValue::from_str(&value)) {
            headers.insert(name, value);
        }
    };
    insert(headers, "x-ratelimit-limit", decision.limit.to_string());
    insert(headers, "x-ratelimit-remaining", decision.remaining.to_string());
    insert(headers, "x-ratelimit-reset", decision.reset.to_string());
    insert(headers, "x-ratelimit-tier", decision.tier.as_str().to_string());
}
