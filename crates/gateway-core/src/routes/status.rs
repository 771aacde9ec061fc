//! `GET /status` — per-service instance health records and KV connectivity,
//! for operators rather than load balancers (spec.md §6).

use actix_web::{web, HttpResponse};
use serde_json::json;

use crate::state::AppState;

async fn status(state: web::Data<AppState>) -> HttpResponse {
    let mut services = serde_json::Map::new();
    for (name, service) in &state.services {
        let instances: Vec<serde_json::Value> = service
            .instances
            .iter()
            .map(|instance| {
                let health = instance.health.read().unwrap();
                json!({
                    "base_url": instance.base_url,
                    "is_healthy": health.is_healthy,
                    "last_check": health.last_check.to_rfc3339(),
                    "last_latency_ms": health.last_latency_ms,
                    "consecutive_errors": health.consecutive_errors,
                    "last_error": health.last_error,
                    "breaker_state": format!("{:?}", instance.breaker.state()),
                })
            })
            .collect();
        services.insert(
            name.to_string(),
            json!({
                "aggregate_status": service.aggregate_status(),
                "instances": instances,
            }),
        );
    }

    let kv_connected = match &state.kv {
        Some(kv) => kv.ping().await,
        None => false,
    };

    HttpResponse::Ok().json(json!({
        "gateway": "edge-gateway",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "kv_connected": kv_connected,
        "services": services,
    }))
}

pub fn configure_status(cfg: &mut web::ServiceConfig) {
    cfg.route("/status", web::get().to(status));
}
