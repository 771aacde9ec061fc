//! Edge API Gateway Server
//!
//! High-performance HTTP/GraphQL gateway built with Rust and Actix Web,
//! fronting a fixed set of backend services behind per-instance circuit
//! breakers, a sliding-window rate limiter, and a static-asset cache.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use actix_web::{web, App, HttpServer};
use gateway_core::config;
use gateway_core::logs::configure_logger;
use gateway_core::middleware::security::{cors_headers, security_headers};
use gateway_core::models::service::{Service, ServiceName};
use gateway_core::models::settings::Settings;
use gateway_core::routes::{
    configure_auth_proxy, configure_graphql, configure_health, configure_metrics,
    configure_optional_auth_proxy, configure_required_auth_proxy, configure_status,
};
use gateway_core::services::health::HealthTracker;
use gateway_core::services::kv::{KvStore, RedisKvStore};
use gateway_core::services::proxy::ProxyPipeline;
use gateway_core::services::rate_limiter::RateLimiter;
use gateway_core::services::{MetricsCollector, ResponseCache};
use gateway_core::AppState;
use log::{error, info, warn};

/// Backend prefixes that require an already-valid token.
const REQUIRED_AUTH_PREFIXES: &[&str] = &[
    "/api/v1/my",
    "/api/v1/users",
    "/api/v1/series",
    "/api/v1/collections",
    "/api/v1/bookmarks",
    "/api/v1/comments",
    "/api/v1/pseuds",
];

/// Backend prefixes that accept an optional token.
const OPTIONAL_AUTH_PREFIXES: &[&str] = &["/api/v1/works", "/api/v1/tags", "/api/v1/search"];

const HEALTH_PROBE_INTERVAL: Duration = Duration::from_secs(15);

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    configure_logger();

    let settings: Settings = Settings::from_env();
    info!("Starting edge gateway v{}", env!("CARGO_PKG_VERSION"));

    match config::validate(&settings) {
        Ok(warnings) => {
            for w in &warnings {
                warn!("{w}");
            }
            info!("configuration validated with {} warning(s)", warnings.len());
        }
        Err(errors) => {
            for e in &errors {
                error!("{e}");
            }
            error!("configuration is invalid, refusing to start");
            std::process::exit(1);
        }
    }

    let client = reqwest::Client::builder()
        .pool_idle_timeout(Duration::from_secs(30))
        .pool_max_idle_per_host(32)
        .build()
        .expect("failed to build upstream HTTP client");

    let mut services_map = HashMap::new();
    services_map.insert(ServiceName::Auth, Arc::new(Service::new(ServiceName::Auth, settings.services.auth.clone())));
    services_map.insert(ServiceName::Work, Arc::new(Service::new(ServiceName::Work, settings.services.work.clone())));
    services_map.insert(ServiceName::Tag, Arc::new(Service::new(ServiceName::Tag, settings.services.tag.clone())));
    services_map.insert(ServiceName::Search, Arc::new(Service::new(ServiceName::Search, settings.services.search.clone())));

    let kv: Option<Arc<dyn KvStore>> = match RedisKvStore::connect(&settings.kv.url, settings.kv.password.as_deref()).await {
        Ok(store) => {
            info!("connected to rate-limit KV store at {}", settings.kv.url);
            Some(Arc::new(store))
        }
        Err(err) => {
            warn!("KV store unavailable ({err}); rate limiting will fail open");
            None
        }
    };

    let cache = Arc::new(ResponseCache::new());
    let metrics = Arc::new(MetricsCollector::new());
    let rate_limiter = Arc::new(RateLimiter::new(kv.clone()));
    let proxy = Arc::new(ProxyPipeline::new(client.clone(), services_map.clone(), cache.clone(), metrics.clone()));
    let health_tracker = Arc::new(HealthTracker::new(client, metrics.clone()));

    let probe_services: Arc<Vec<Arc<Service>>> = Arc::new(services_map.values().cloned().collect());
    {
        let tracker = health_tracker.clone();
        let probe_services = probe_services.clone();
        tokio::spawn(async move {
            tracker.run(probe_services, HEALTH_PROBE_INTERVAL).await;
        });
    }

    let app_state = AppState {
        services: services_map,
        proxy,
        health_tracker,
        metrics,
        rate_limiter,
        cache,
        jwt: settings.jwt.clone(),
        kv,
        mode: settings.mode,
        started_at: std::time::Instant::now(),
    };
    let app_data = web::Data::new(app_state);

    let port = settings.port;
    let cors = settings.cors.clone();
    let jwt = settings.jwt.clone();

    info!("listening on 0.0.0.0:{port}");

    let server = HttpServer::new(move || {
        let mut app = App::new()
            .app_data(app_data.clone())
            .app_data(web::PayloadConfig::new(10 * 1024 * 1024))
            .wrap(security_headers())
            .wrap(cors_headers(&cors))
            .configure(configure_health)
            .configure(configure_status)
            .configure(configure_metrics)
            .configure(configure_graphql)
            .configure(|cfg| configure_auth_proxy(cfg, app_data.rate_limiter.clone(), app_data.metrics.clone()));

        for prefix in OPTIONAL_AUTH_PREFIXES.iter().copied() {
            let limiter = app_data.rate_limiter.clone();
            let metrics = app_data.metrics.clone();
            let jwt = jwt.clone();
            app = app.configure(move |cfg| configure_optional_auth_proxy(cfg, prefix, limiter, metrics, jwt));
        }
        for prefix in REQUIRED_AUTH_PREFIXES.iter().copied() {
            let limiter = app_data.rate_limiter.clone();
            let metrics = app_data.metrics.clone();
            let jwt = jwt.clone();
            app = app.configure(move |cfg| configure_required_auth_proxy(cfg, prefix, limiter, metrics, jwt));
        }
        app
    })
    .bind(("0.0.0.0", port))?
    .client_request_timeout(Duration::from_secs(30))
    .shutdown_timeout(30)
    .run();

    match server.await {
        Ok(_) => info!("server stopped gracefully"),
        Err(e) => error!("server error: {e}"),
    }

    Ok(())
}
