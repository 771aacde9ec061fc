//! Gateway error types and their HTTP response mapping.
//!
//! Every error surfaced to a client funnels through [`GatewayError`], which
//! implements [`actix_web::error::ResponseError`] so route handlers can
//! simply propagate with `?` and let Actix Web render the JSON envelope
//! described in the error-handling design.

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, HttpResponseBuilder};
use serde_json::json;

/// Errors produced anywhere in the request pipeline.
///
/// Each variant maps to exactly one row of the error-surface table: status
/// code, JSON body shape, and whether rate-limit headers are attached.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("request body could not be read or parsed")]
    MalformedRequest,

    #[error("authentication required")]
    Unauthorized,

    #[error("rate limit exceeded for tier {tier}")]
    RateLimitExceeded {
        tier: String,
        limit: u64,
        window: u64,
        retry_after: u64,
    },

    #[error("service {service} unavailable")]
    ServiceUnavailable { service: String, retry_after: u64 },

    #[error("upstream timeout calling {service}")]
    UpstreamTimeout { service: String },

    #[error("bad gateway calling {service}: {message}")]
    BadGateway { service: String, message: String },

    /// A backend responded, just not with a success code. The route layer
    /// passes the backend's status, headers, and body straight through
    /// rather than rendering this variant's `error_response` — see
    /// `services::proxy`.
    #[error("upstream returned an error status")]
    UpstreamError,

    #[error("request payload exceeds the configured limit")]
    PayloadTooLarge,
}

impl GatewayError {
    fn error_code(&self) -> &'static str {
        match self {
            GatewayError::MalformedRequest => "malformed_request",
            GatewayError::Unauthorized => "unauthorized",
            GatewayError::RateLimitExceeded { .. } => "rate_limit_exceeded",
            GatewayError::ServiceUnavailable { .. } => "service_unavailable",
            GatewayError::UpstreamTimeout { .. } => "upstream_timeout",
            GatewayError::BadGateway { .. } => "bad_gateway",
            GatewayError::UpstreamError => "upstream_error",
            GatewayError::PayloadTooLarge => "payload_too_large",
        }
    }
}

impl actix_web::error::ResponseError for GatewayError {
    fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::MalformedRequest => StatusCode::BAD_REQUEST,
            GatewayError::Unauthorized => StatusCode::UNAUTHORIZED,
            GatewayError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::UpstreamTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::BadGateway { .. } => StatusCode::BAD_GATEWAY,
            GatewayError::UpstreamError => StatusCode::BAD_GATEWAY,
            GatewayError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let mut builder = HttpResponseBuilder::new(self.status_code());
        let body = match self {
            GatewayError::RateLimitExceeded {
                tier,
                limit,
                window,
                retry_after,
            } => {
                builder.insert_header(("X-RateLimit-Tier", tier.as_str()));
                builder.insert_header(("X-RateLimit-Limit", limit.to_string()));
                builder.insert_header(("X-RateLimit-Remaining", "0"));
                json!({
                    "error": self.to_string(),
                    "tier": tier,
                    "limit": limit,
                    "window": window,
                    "retry_after": retry_after,
                })
            }
            GatewayError::ServiceUnavailable {
                service,
                retry_after,
            } => json!({
                "error": self.to_string(),
                "service": service,
                "code": self.error_code(),
                "retry_after": retry_after,
            }),
            GatewayError::UpstreamTimeout { service } => json!({
                "error": self.to_string(),
                "service": service,
                "code": self.error_code(),
            }),
            GatewayError::BadGateway { service, message } => json!({
                "error": self.to_string(),
                "service": service,
                "code": self.error_code(),
                "message": message,
            }),
            _ => json!({ "error": self.to_string() }),
        };
        builder.json(body)
    }
}
