//! Security and CORS response headers, both built on
//! `actix_web::middleware::DefaultHeaders`. Only the configuration surface
//! (`CORS_ALLOW_ALL`, `CORS_WILDCARD`, `FRONTEND_URL`) lives here; origin
//! policy itself is an operator decision made through those variables.
//! Kept as one function per concern rather than two near-duplicate
//! definitions of the same header-building logic.

use actix_web::middleware::DefaultHeaders;

use crate::models::settings::CorsSettings;

/// Baseline security headers applied to every response, independent of CORS
/// configuration.
pub fn security_headers() -> DefaultHeaders {
    DefaultHeaders::new()
        .add(("X-Content-Type-Options", "nosniff"))
        .add(("X-Frame-Options", "DENY"))
        .add(("Referrer-Policy", "strict-origin-when-cross-origin"))
}

/// CORS headers derived from `CorsSettings`. `allow_all`/`wildcard` both
/// request `*`; otherwise the configured `FRONTEND_URL` is echoed verbatim,
/// or CORS headers are omitted entirely if none of the three are set.
pub fn cors_headers(settings: &CorsSettings) -> DefaultHeaders {
    let origin = if settings.allow_all || settings.wildcard {
        "*".to_string()
    } else {
        settings.frontend_url.clone().unwrap_or_default()
    };

    let mut headers = DefaultHeaders::new()
        .add(("Access-Control-Allow-Methods", "GET, POST, PUT, PATCH, DELETE, OPTIONS"))
        .add(("Access-Control-Allow-Headers", "Content-Type, Authorization, X-Request-ID"));

    if !origin.is_empty() {
        headers = headers.add(("Access-Control-Allow-Origin", origin));
    }

    headers
}
