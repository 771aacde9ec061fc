//! `GET /metrics` — Prometheus text exposition, rendered by
//! `services::metrics::MetricsCollector` (spec.md §4.8). The exposition
//! format itself is an external contract; this route only serves it.

use actix_web::{web, HttpResponse};

use crate::state::AppState;

async fn metrics(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(state.metrics.render())
}

pub fn configure_metrics(cfg: &mut web::ServiceConfig) {
    cfg.route("/metrics", web::get().to(metrics));
}
