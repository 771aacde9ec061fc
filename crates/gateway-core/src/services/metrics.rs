//! Request metrics: counters, gauges, and a duration histogram, exposed in
//! Prometheus text exposition format from `/metrics`.
//!
//! Grounded on the teacher's `MetricsCollector` (flat `Arc<AtomicU64>`
//! counters, hand-rolled exposition text), generalized to the label-bearing
//! series spec.md §4.8 names. Label cardinality is bounded by construction:
//! `endpoint` is always the matched route pattern, never the raw request
//! path.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::RwLock;

const DURATION_BUCKETS: &[f64] = &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

#[derive(Default)]
struct Histogram {
    bucket_counts: Vec<AtomicU64>,
    sum_micros: AtomicU64,
    count: AtomicU64,
}

impl Histogram {
    fn new() -> Self {
        Histogram {
            bucket_counts: DURATION_BUCKETS.iter().map(|_| AtomicU64::new(0)).collect(),
            sum_micros: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    fn observe(&self, seconds: f64) {
        for (idx, bound) in DURATION_BUCKETS.iter().enumerate() {
            if seconds <= *bound {
                self.bucket_counts[idx].fetch_add(1, Ordering::Relaxed);
            }
        }
        self.sum_micros.fetch_add((seconds * 1_000_000.0) as u64, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
    }
}

/// Service/method/status-class-keyed counters plus process-wide gauges.
pub struct MetricsCollector {
    requests_total: RwLock<HashMap<(String, String, String), AtomicU64>>,
    cache_operations_total: RwLock<HashMap<(String, String), AtomicU64>>,
    rate_limit_hits_total: AtomicU64,
    graphql_operations_total: RwLock<HashMap<(String, String), AtomicU64>>,
    active_connections: AtomicI64,
    service_health: RwLock<HashMap<String, AtomicU64>>,
    request_duration: RwLock<HashMap<(String, String), Histogram>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        MetricsCollector {
            requests_total: RwLock::new(HashMap::new()),
            cache_operations_total: RwLock::new(HashMap::new()),
            rate_limit_hits_total: AtomicU64::new(0),
            graphql_operations_total: RwLock::new(HashMap::new()),
            active_connections: AtomicI64::new(0),
            service_health: RwLock::new(HashMap::new()),
            request_duration: RwLock::new(HashMap::new()),
        }
    }

    fn status_class(status: u16) -> &'static str {
        match status / 100 {
            2 => "2xx",
            3 => "3xx",
            4 => "4xx",
            5 => "5xx",
            _ => "other",
        }
    }

    pub fn record_request(&self, method: &str, endpoint: &str, status: u16, duration_secs: f64) {
        let key = (method.to_string(), endpoint.to_string(), Self::status_class(status).to_string());
        self.requests_total
            .write()
            .unwrap()
            .entry(key)
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);

        let duration_key = (method.to_string(), endpoint.to_string());
        let mut durations = self.request_duration.write().unwrap();
        durations.entry(duration_key).or_insert_with(Histogram::new).observe(duration_secs);
    }

    pub fn record_cache(&self, op: &str, result: &str) {
        let key = (op.to_string(), result.to_string());
        self.cache_operations_total
            .write()
            .unwrap()
            .entry(key)
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rate_limit_hit(&self) {
        self.rate_limit_hits_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_graphql_operation(&self, op_type: &str, name: &str) {
        let key = (op_type.to_string(), name.to_string());
        self.graphql_operations_total
            .write()
            .unwrap()
            .entry(key)
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_connections(&self) {
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn decrement_connections(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn set_service_health(&self, service: &str, status: &str) {
        let value = match status {
            "healthy" => 1,
            "degraded" => 0,
            _ => -1i64 as u64,
        };
        self.service_health
            .write()
            .unwrap()
            .entry(service.to_string())
            .or_insert_with(|| AtomicU64::new(0))
            .store(value, Ordering::Relaxed);
    }

    /// Renders the standard Prometheus text exposition format.
    pub fn render(&self) -> String {
        let mut out = String::new();

        writeln!(out, "# HELP requests_total Total HTTP requests processed").ok();
        writeln!(out, "# TYPE requests_total counter").ok();
        for ((method, endpoint, status_class), count) in self.requests_total.read().unwrap().iter() {
            writeln!(
                out,
                "requests_total{{method=\"{method}\",endpoint=\"{endpoint}\",status_class=\"{status_class}\"}} {}",
                count.load(Ordering::Relaxed)
            )
            .ok();
        }

        writeln!(out, "# HELP cache_operations_total Cache lookups and writes").ok();
        writeln!(out, "# TYPE cache_operations_total counter").ok();
        for ((op, result), count) in self.cache_operations_total.read().unwrap().iter() {
            writeln!(
                out,
                "cache_operations_total{{op=\"{op}\",result=\"{result}\"}} {}",
                count.load(Ordering::Relaxed)
            )
            .ok();
        }

        writeln!(out, "# HELP rate_limit_hits_total Requests denied by the rate limiter").ok();
        writeln!(out, "# TYPE rate_limit_hits_total counter").ok();
        writeln!(out, "rate_limit_hits_total {}", self.rate_limit_hits_total.load(Ordering::Relaxed)).ok();

        writeln!(out, "# HELP graphql_operations_total GraphQL facade dispatches").ok();
        writeln!(out, "# TYPE graphql_operations_total counter").ok();
        for ((op_type, name), count) in self.graphql_operations_total.read().unwrap().iter() {
            writeln!(
                out,
                "graphql_operations_total{{type=\"{op_type}\",name=\"{name}\"}} {}",
                count.load(Ordering::Relaxed)
            )
            .ok();
        }

        writeln!(out, "# HELP active_connections In-flight upstream connections").ok();
        writeln!(out, "# TYPE active_connections gauge").ok();
        writeln!(out, "active_connections {}", self.active_connections.load(Ordering::Relaxed)).ok();

        writeln!(out, "# HELP service_health Aggregate service health (1 healthy, 0 degraded, -1 outage)").ok();
        writeln!(out, "# TYPE service_health gauge").ok();
        for (service, value) in self.service_health.read().unwrap().iter() {
            writeln!(out, "service_health{{service=\"{service}\"}} {}", value.load(Ordering::Relaxed) as i64).ok();
        }

        writeln!(out, "# HELP request_duration_seconds Upstream request latency").ok();
        writeln!(out, "# TYPE request_duration_seconds histogram").ok();
        for ((method, endpoint), histogram) in self.request_duration.read().unwrap().iter() {
            // `bucket_counts[idx]` is already the cumulative "<= bound" count
            // (every matching bucket is incremented in `Histogram::observe`),
            // so render just reads it back rather than re-accumulating.
            for (idx, bound) in DURATION_BUCKETS.iter().enumerate() {
                let count = histogram.bucket_counts[idx].load(Ordering::Relaxed);
                writeln!(
                    out,
                    "request_duration_seconds_bucket{{method=\"{method}\",endpoint=\"{endpoint}\",le=\"{bound}\"}} {count}"
                )
                .ok();
            }
            writeln!(
                out,
                "request_duration_seconds_bucket{{method=\"{method}\",endpoint=\"{endpoint}\",le=\"+Inf\"}} {}",
                histogram.count.load(Ordering::Relaxed)
            )
            .ok();
            writeln!(
                out,
                "request_duration_seconds_sum{{method=\"{method}\",endpoint=\"{endpoint}\"}} {}",
                histogram.sum_micros.load(Ordering::Relaxed) as f64 / 1_000_000.0
            )
            .ok();
            writeln!(
                out,
                "request_duration_seconds_count{{method=\"{method}\",endpoint=\"{endpoint}\"}} {}",
                histogram.count.load(Ordering::Relaxed)
            )
            .ok();
        }

        out
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}
