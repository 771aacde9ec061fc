//! `GET /health` — always 200, reporting the gateway's own aggregate view
//! of backend health (spec.md §4.9, §6).

use actix_web::{web, HttpResponse};
use serde_json::json;

use crate::state::AppState;

async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let services: serde_json::Map<String, serde_json::Value> = state
        .services
        .values()
        .map(|svc| (svc.name.to_string(), json!(svc.aggregate_status())))
        .collect();

    HttpResponse::Ok().json(json!({
        "status": state.aggregate_status(),
        "gateway": "edge-gateway",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime": state.uptime_secs(),
        "version": env!("CARGO_PKG_VERSION"),
        "services": services,
    }))
}

pub fn configure_health(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health_check));
}
