//! Background health probing of backend instances.
//!
//! Probes run on an independent `tokio::time::interval` task per service so
//! the request path is never blocked waiting on a probe (spec.md §4.1).

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::models::service::Service;
use crate::services::metrics::MetricsCollector;

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

pub struct HealthTracker {
    client: reqwest::Client,
    metrics: Arc<MetricsCollector>,
}

impl HealthTracker {
    pub fn new(client: reqwest::Client, metrics: Arc<MetricsCollector>) -> Self {
        HealthTracker { client, metrics }
    }

    /// Probes one instance's `/health` endpoint and updates its health
    /// record. Transport failures and HTTP >= 400 are treated identically
    /// for liveness, per spec.md §4.1's failure policy.
    pub async fn probe_instance(&self, instance: &crate::models::service::Instance) {
        let url = format!("{}/health", instance.base_url.trim_end_matches('/'));
        let start = Instant::now();
        let outcome = tokio::time::timeout(PROBE_TIMEOUT, self.client.get(&url).send()).await;

        match outcome {
            Ok(Ok(resp)) if resp.status().is_success() => {
                let latency_ms = start.elapsed().as_millis() as u64;
                let was_healthy = instance.health.read().unwrap().is_healthy;
                instance.health.write().unwrap().record_success(latency_ms);
                if !was_healthy {
                    log::info!(target: "gateway::health", "{} recovered ({}ms)", instance.base_url, latency_ms);
                }
            }
            Ok(Ok(resp)) => {
                let status = resp.status();
                instance
                    .health
                    .write()
                    .unwrap()
                    .record_failure(format!("health probe returned {status}"));
                log::warn!(target: "gateway::health", "{} unhealthy: status {status}", instance.base_url);
            }
            Ok(Err(err)) => {
                instance.health.write().unwrap().record_failure(err.to_string());
                log::warn!(target: "gateway::health", "{} unhealthy: {err}", instance.base_url);
            }
            Err(_) => {
                instance.health.write().unwrap().record_failure("health probe timed out");
                log::warn!(target: "gateway::health", "{} unhealthy: probe timed out", instance.base_url);
            }
        }
    }

    /// Probes every instance of `service` concurrently, then publishes the
    /// resulting aggregate to the `service_health{service}` gauge (spec.md
    /// §4.8).
    pub async fn probe_service(&self, service: &Service) {
        let probes = service.instances.iter().map(|instance| self.probe_instance(instance));
        futures::future::join_all(probes).await;
        self.metrics.set_service_health(service.name.as_str(), service.aggregate_status());
    }

    /// Runs the probe loop forever, probing all services on every tick.
    /// Spawned once at startup; never returns.
    pub async fn run(self: Arc<Self>, services: Arc<Vec<Arc<Service>>>, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let probes = services.iter().map(|service| self.probe_service(service));
            futures::future::join_all(probes).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::service::ServiceName;

    #[tokio::test]
    async fn probe_marks_instance_unhealthy_on_connection_refused() {
        let tracker = HealthTracker::new(reqwest::Client::new(), Arc::new(MetricsCollector::new()));
        let service = Service::new(ServiceName::Work, vec!["http://127.0.0.1:1".into()]);
        tracker.probe_service(&service).await;
        assert!(!service.instances[0].health.read().unwrap().is_healthy);
        assert_eq!(service.instances[0].health.read().unwrap().consecutive_errors, 1);
    }

    #[tokio::test]
    async fn probe_marks_instance_healthy_on_200() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/health"))
            .respond_with(wiremock::ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let tracker = HealthTracker::new(reqwest::Client::new(), Arc::new(MetricsCollector::new()));
        let service = Service::new(ServiceName::Work, vec![server.uri()]);
        tracker.probe_service(&service).await;
        assert!(service.instances[0].health.read().unwrap().is_healthy);
    }

    #[tokio::test]
    async fn probe_service_publishes_the_aggregate_to_the_health_gauge() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/health"))
            .respond_with(wiremock::ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let metrics = Arc::new(MetricsCollector::new());
        let tracker = HealthTracker::new(reqwest::Client::new(), metrics.clone());
        let service = Service::new(ServiceName::Work, vec![server.uri()]);
        tracker.probe_service(&service).await;
        assert!(metrics.render().contains("service_health{service=\"work-service\"} 1"));
    }

    #[tokio::test]
    async fn probe_marks_instance_unhealthy_on_500() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/health"))
            .respond_with(wiremock::ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let tracker = HealthTracker::new(reqwest::Client::new(), Arc::new(MetricsCollector::new()));
        let service = Service::new(ServiceName::Work, vec![server.uri()]);
        tracker.probe_service(&service).await;
        assert!(!service.instances[0].health.read().unwrap().is_healthy);
    }
}
