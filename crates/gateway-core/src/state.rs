//! Shared application state wired up once at startup and handed to every
//! route handler via `actix_web::web::Data`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use crate::models::service::{Service, ServiceName};
use crate::models::settings::{GatewayMode, JwtSettings};
use crate::services::cache::ResponseCache;
use crate::services::health::HealthTracker;
use crate::services::kv::KvStore;
use crate::services::metrics::MetricsCollector;
use crate::services::proxy::ProxyPipeline;
use crate::services::rate_limiter::RateLimiter;

pub struct AppState {
    pub services: HashMap<ServiceName, Arc<Service>>,
    pub proxy: Arc<ProxyPipeline>,
    pub health_tracker: Arc<HealthTracker>,
    pub metrics: Arc<MetricsCollector>,
    pub rate_limiter: Arc<RateLimiter>,
    pub cache: Arc<ResponseCache>,
    pub jwt: JwtSettings,
    pub kv: Option<Arc<dyn KvStore>>,
    pub mode: GatewayMode,
    pub started_at: Instant,
}

impl AppState {
    /// Aggregate status across every service, for `GET /health`'s top-level
    /// `status` field: `outage` if every service is in outage, `healthy` if
    /// every service is fully healthy, `degraded` otherwise.
    pub fn aggregate_status(&self) -> &'static str {
        let statuses: Vec<&'static str> = self.services.values().map(|s| s.aggregate_status()).collect();
        if statuses.is_empty() || statuses.iter().all(|s| *s == "outage") {
            "outage"
        } else if statuses.iter().all(|s| *s == "healthy") {
            "healthy"
        } else {
            "degraded"
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
