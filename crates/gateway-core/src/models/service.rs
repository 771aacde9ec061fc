//! Backend service topology: the fixed set of logical services and their
//! instances, each carrying a health record and circuit breaker.

use std::sync::Arc;

use crate::services::circuit_breaker::CircuitBreaker;

/// One of the four fixed logical backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceName {
    Auth,
    Work,
    Tag,
    Search,
}

impl ServiceName {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceName::Auth => "auth-service",
            ServiceName::Work => "work-service",
            ServiceName::Tag => "tag-service",
            ServiceName::Search => "search-service",
        }
    }
}

impl std::fmt::Display for ServiceName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-instance liveness, latency, and error bookkeeping.
///
/// Mutated only by the health tracker's background probe and by the proxy
/// path on a completed upstream call.
#[derive(Debug, Clone)]
pub struct HealthRecord {
    pub is_healthy: bool,
    pub last_check: chrono::DateTime<chrono::Utc>,
    pub last_latency_ms: u64,
    pub consecutive_errors: u32,
    pub last_error: Option<String>,
}

impl Default for HealthRecord {
    fn default() -> Self {
        HealthRecord {
            is_healthy: true,
            last_check: chrono::Utc::now(),
            last_latency_ms: 0,
            consecutive_errors: 0,
            last_error: None,
        }
    }
}

impl HealthRecord {
    pub fn record_success(&mut self, latency_ms: u64) {
        self.is_healthy = true;
        self.last_latency_ms = latency_ms;
        self.consecutive_errors = 0;
        self.last_error = None;
        self.last_check = chrono::Utc::now();
    }

    pub fn record_failure(&mut self, error: impl Into<String>) {
        self.is_healthy = false;
        self.consecutive_errors += 1;
        self.last_error = Some(error.into());
        self.last_check = chrono::Utc::now();
    }
}

/// One network endpoint of a logical service. Immutable after startup apart
/// from its interior `health` and `breaker` state.
pub struct Instance {
    pub base_url: String,
    pub health: std::sync::RwLock<HealthRecord>,
    pub breaker: Arc<CircuitBreaker>,
}

impl Instance {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Instance {
            breaker: Arc::new(CircuitBreaker::new(base_url.clone())),
            base_url,
            health: std::sync::RwLock::new(HealthRecord::default()),
        }
    }

    pub fn is_admissible(&self) -> bool {
        self.health.read().unwrap().is_healthy && !self.breaker.is_open_now()
    }
}

/// A logical backend: a fixed, ordered set of instances.
pub struct Service {
    pub name: ServiceName,
    pub instances: Vec<Arc<Instance>>,
    next: std::sync::atomic::AtomicUsize,
}

impl Service {
    pub fn new(name: ServiceName, base_urls: Vec<String>) -> Self {
        let instances = base_urls.into_iter().map(|u| Arc::new(Instance::new(u))).collect();
        Service {
            name,
            instances,
            next: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// Aggregate status for `/health`/`/status`: `healthy` if every instance
    /// is admissible, `outage` if none are, `degraded` otherwise.
    pub fn aggregate_status(&self) -> &'static str {
        if self.instances.is_empty() {
            return "outage";
        }
        let healthy = self.instances.iter().filter(|i| i.is_admissible()).count();
        if healthy == self.instances.len() {
            "healthy"
        } else if healthy == 0 {
            "outage"
        } else {
            "degraded"
        }
    }

    /// Raw atomic cyclic index, shared across concurrent requests. Used by
    /// `services::selector` to advance the ring.
    pub fn next_index(&self) -> usize {
        self.next.fetch_add(1, std::sync::atomic::Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregate_status_healthy_when_all_admissible() {
        let svc = Service::new(ServiceName::Work, vec!["http://a".into(), "http://b".into()]);
        assert_eq!(svc.aggregate_status(), "healthy");
    }

    #[test]
    fn aggregate_status_outage_when_none_admissible() {
        let svc = Service::new(ServiceName::Work, vec!["http://a".into()]);
        svc.instances[0].health.write().unwrap().record_failure("down");
        assert_eq!(svc.aggregate_status(), "outage");
    }

    #[test]
    fn aggregate_status_degraded_when_some_admissible() {
        let svc = Service::new(ServiceName::Work, vec!["http://a".into(), "http://b".into()]);
        svc.instances[0].health.write().unwrap().record_failure("down");
        assert_eq!(svc.aggregate_status(), "degraded");
    }

    #[test]
    fn aggregate_status_outage_with_no_instances() {
        let svc = Service::new(ServiceName::Work, vec![]);
        assert_eq!(svc.aggregate_status(), "outage");
    }
}
