//! Request Pipeline: ingress normalization, route dispatch, upstream call,
//! and egress rewrite (spec.md §4.6).
//!
//! Grounded on the teacher's `RouteHandler` in `services/http.rs`: a pooled
//! `reqwest::Client`, a static dispatch table, a header-filtering pass, and
//! an outer/inner call split so metrics wrap the whole request while the
//! inner call does the actual upstream dispatch. Header values cross the
//! actix-web/reqwest boundary as plain strings rather than typed header
//! objects, since the two crates pin different major versions of the
//! underlying `http` crate.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use actix_web::error::ResponseError;
use bytes::Bytes;

use crate::models::error::GatewayError;
use crate::models::identity::ClientIdentity;
use crate::models::service::{Service, ServiceName};
use crate::services::cache::{self, CacheEntry, ResponseCache};
use crate::services::circuit_breaker::CircuitBreakerError;
use crate::services::metrics::MetricsCollector;
use crate::services::selector;

const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(10);

const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
    "transfer-encoding",
    "upgrade",
    "host",
];

/// Static prefix → service dispatch table (spec.md §4.6). Longest matching
/// prefix wins; the user-scoped prefixes (`/api/v1/my`, etc.) all resolve to
/// `Work` with the full original path preserved, same as the service's own
/// `/api/v1/works/*` prefix.
const PREFIX_TABLE: &[(&str, ServiceName)] = &[
    ("/api/v1/auth", ServiceName::Auth),
    ("/api/v1/works", ServiceName::Work),
    ("/api/v1/tags", ServiceName::Tag),
    ("/api/v1/search", ServiceName::Search),
    ("/api/v1/my", ServiceName::Work),
    ("/api/v1/users", ServiceName::Work),
    ("/api/v1/series", ServiceName::Work),
    ("/api/v1/collections", ServiceName::Work),
    ("/api/v1/bookmarks", ServiceName::Work),
    ("/api/v1/comments", ServiceName::Work),
    ("/api/v1/pseuds", ServiceName::Work),
];

/// Maps a request path to the backend service that owns it, by longest
/// matching static prefix.
pub fn dispatch_service(path: &str) -> Option<ServiceName> {
    PREFIX_TABLE
        .iter()
        .filter(|(prefix, _)| path == *prefix || path.starts_with(&format!("{prefix}/")))
        .max_by_key(|(prefix, _)| prefix.len())
        .map(|(_, service)| *service)
}

fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP.contains(&name.to_ascii_lowercase().as_str())
}

pub struct ProxyRequest {
    pub method: String,
    pub path: String,
    pub raw_query: String,
    /// Already lower-cased header names, as received from the client.
    /// Client-supplied `x-user-id` is expected to have been stripped by the
    /// caller before this struct is built (spec.md §9's trust-boundary
    /// note) — the gateway only ever forwards the value derived from
    /// `identity`.
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    pub peer_ip: String,
    pub request_id: String,
    pub identity: ClientIdentity,
    pub is_tls: bool,
}

pub struct ProxyResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    pub service: ServiceName,
    pub cache_status: &'static str,
}

enum UpstreamCallError {
    Timeout,
    Transport(String),
    ServerError(UpstreamResponseData),
}

struct UpstreamResponseData {
    status: u16,
    headers: Vec<(String, String)>,
    body: Bytes,
}

pub struct ProxyPipeline {
    client: reqwest::Client,
    services: HashMap<ServiceName, Arc<Service>>,
    cache: Arc<ResponseCache>,
    metrics: Arc<MetricsCollector>,
}

impl ProxyPipeline {
    pub fn new(
        client: reqwest::Client,
        services: HashMap<ServiceName, Arc<Service>>,
        cache: Arc<ResponseCache>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        ProxyPipeline {
            client,
            services,
            cache,
            metrics,
        }
    }

    /// Outer entry point: wraps `dispatch` with connection-gauge and
    /// request-duration bookkeeping, mirroring the teacher's
    /// `handle_request`/`handle_request_internal` split.
    pub async fn handle(&self, req: ProxyRequest) -> Result<ProxyResponse, GatewayError> {
        self.metrics.increment_connections();
        let start = Instant::now();
        let method = req.method.clone();
        let endpoint = dispatch_service(&req.path)
            .map(|s| s.as_str().to_string())
            .unwrap_or_else(|| "unmatched".to_string());

        let result = self.dispatch(req).await;

        let status = match &result {
            Ok(resp) => resp.status,
            Err(err) => err.status_code().as_u16(),
        };
        self.metrics.record_request(&method, &endpoint, status, start.elapsed().as_secs_f64());
        self.metrics.decrement_connections();
        result
    }

    async fn dispatch(&self, req: ProxyRequest) -> Result<ProxyResponse, GatewayError> {
        let service_name = dispatch_service(&req.path).ok_or(GatewayError::MalformedRequest)?;

        let cacheable = req.method.eq_ignore_ascii_case("GET") && cache::is_static_asset(&req.path);
        let cache_key = cache::cache_key(service_name.as_str(), &req.path, &req.raw_query);

        if cacheable {
            if let Some(entry) = self.cache.get(&cache_key).await {
                self.metrics.record_cache("get", "hit");
                return Ok(ProxyResponse {
                    status: 200,
                    headers: vec![("content-type".to_string(), entry.content_type)],
                    body: Bytes::from(entry.bytes),
                    service: service_name,
                    cache_status: "HIT",
                });
            }
            self.metrics.record_cache("get", "miss");
        }

        let service = self.services.get(&service_name).ok_or_else(|| GatewayError::ServiceUnavailable {
            service: service_name.to_string(),
            retry_after: 30,
        })?;

        let instance = selector::select_instance(service).ok_or_else(|| GatewayError::ServiceUnavailable {
            service: service_name.to_string(),
            retry_after: 30,
        })?;

        // Tie-break per spec.md §4.2: if the selected instance's breaker is
        // already open, report unavailable without attempting the call.
        if instance.breaker.is_open_now() {
            return Err(GatewayError::ServiceUnavailable {
                service: service_name.to_string(),
                retry_after: 30,
            });
        }

        let url = build_upstream_url(&instance.base_url, &req.path, &req.raw_query);
        let headers = build_upstream_headers(&req);
        let method = parse_method(&req.method);
        let client = self.client.clone();
        let body = req.body.clone();

        let call_start = Instant::now();
        let call_result = instance
            .breaker
            .call(|| async move {
                let mut builder = client.request(method, &url);
                for (name, value) in &headers {
                    builder = builder.header(name, value);
                }
                if !body.is_empty() {
                    builder = builder.body(body.clone());
                }

                let outcome = tokio::time::timeout(UPSTREAM_TIMEOUT, builder.send()).await;
                match outcome {
                    Err(_) => Err(UpstreamCallError::Timeout),
                    Ok(Err(e)) => Err(UpstreamCallError::Transport(e.to_string())),
                    Ok(Ok(response)) => {
                        let status = response.status().as_u16();
                        let headers: Vec<(String, String)> = response
                            .headers()
                            .iter()
                            .filter_map(|(name, value)| {
                                value.to_str().ok().map(|v| (name.to_string(), v.to_string()))
                            })
                            .collect();
                        let bytes = response.bytes().await.unwrap_or_default();
                        let data = UpstreamResponseData { status, headers, body: bytes };
                        if status >= 500 {
                            Err(UpstreamCallError::ServerError(data))
                        } else {
                            Ok(data)
                        }
                    }
                }
            })
            .await;

        let latency_ms = call_start.elapsed().as_millis() as u64;

        match call_result {
            Ok(data) => {
                instance.health.write().unwrap().record_success(latency_ms);
                let response = build_proxy_response(data, service_name, "MISS");
                if cacheable && (200..300).contains(&response.status) {
                    self.cache
                        .put(
                            cache_key,
                            CacheEntry {
                                bytes: response.body.to_vec(),
                                content_type: content_type_of(&response.headers),
                            },
                        )
                        .await;
                }
                Ok(response)
            }
            Err(CircuitBreakerError::CircuitOpen) => Err(GatewayError::ServiceUnavailable {
                service: service_name.to_string(),
                retry_after: 30,
            }),
            Err(CircuitBreakerError::OperationFailed(UpstreamCallError::Timeout)) => {
                instance.health.write().unwrap().record_failure("upstream call timed out");
                Err(GatewayError::UpstreamTimeout {
                    service: service_name.to_string(),
                })
            }
            Err(CircuitBreakerError::OperationFailed(UpstreamCallError::Transport(message))) => {
                instance.health.write().unwrap().record_failure(message.clone());
                Err(GatewayError::BadGateway {
                    service: service_name.to_string(),
                    message,
                })
            }
            Err(CircuitBreakerError::OperationFailed(UpstreamCallError::ServerError(data))) => {
                instance
                    .health
                    .write()
                    .unwrap()
                    .record_failure(format!("upstream returned {}", data.status));
                // A 5xx passthrough is never cacheable, so unlike the Ok
                // branch above there is no cache write here.
                Ok(build_proxy_response(data, service_name, "MISS"))
            }
        }
    }
}

fn build_proxy_response(data: UpstreamResponseData, service: ServiceName, cache_status: &'static str) -> ProxyResponse {
    ProxyResponse {
        status: data.status,
        headers: data
            .headers
            .into_iter()
            .filter(|(name, _)| !is_hop_by_hop(name))
            .collect(),
        body: data.body,
        service,
        cache_status,
    }
}

fn content_type_of(headers: &[(String, String)]) -> String {
    headers
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case("content-type"))
        .map(|(_, value)| value.clone())
        .unwrap_or_else(|| "application/octet-stream".to_string())
}

fn build_upstream_url(base_url: &str, path: &str, raw_query: &str) -> String {
    let base = base_url.trim_end_matches('/');
    if raw_query.is_empty() {
        format!("{base}{path}")
    } else {
        format!("{base}{path}?{raw_query}")
    }
}

fn build_upstream_headers(req: &ProxyRequest) -> Vec<(String, String)> {
    let mut headers: Vec<(String, String)> = req
        .headers
        .iter()
        .filter(|(name, _)| !is_hop_by_hop(name) && !name.eq_ignore_ascii_case("x-user-id"))
        .cloned()
        .collect();

    let forwarded_for = match req.headers.iter().find(|(n, _)| n.eq_ignore_ascii_case("x-forwarded-for")) {
        Some((_, existing)) => format!("{existing}, {}", req.peer_ip),
        None => req.peer_ip.clone(),
    };
    headers.push(("x-forwarded-for".to_string(), forwarded_for));
    headers.push(("x-forwarded-proto".to_string(), if req.is_tls { "https" } else { "http" }.to_string()));
    if let Some((_, host)) = req.headers.iter().find(|(n, _)| n.eq_ignore_ascii_case("host")) {
        headers.push(("x-forwarded-host".to_string(), host.clone()));
    }
    headers.push(("x-gateway-request-id".to_string(), req.request_id.clone()));

    // X-User-ID is only ever set from the validated token claims, never
    // from a client-supplied header (spec.md §9's trust-boundary note).
    if let Some(user_id) = &req.identity.user_id {
        headers.push(("x-user-id".to_string(), user_id.clone()));
    }

    headers
}

fn parse_method(method: &str) -> reqwest::Method {
    reqwest::Method::from_bytes(method.as_bytes()).unwrap_or(reqwest::Method::GET)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatches_fixed_service_prefixes() {
        assert_eq!(dispatch_service("/api/v1/auth/login"), Some(ServiceName::Auth));
        assert_eq!(dispatch_service("/api/v1/works/123"), Some(ServiceName::Work));
        assert_eq!(dispatch_service("/api/v1/tags/search"), Some(ServiceName::Tag));
        assert_eq!(dispatch_service("/api/v1/search"), Some(ServiceName::Search));
    }

    #[test]
    fn dispatches_user_scoped_prefixes_to_work() {
        for path in [
            "/api/v1/my/dashboard",
            "/api/v1/users/42",
            "/api/v1/series/1",
            "/api/v1/collections/1",
            "/api/v1/bookmarks/1",
            "/api/v1/comments/1",
            "/api/v1/pseuds/1",
        ] {
            assert_eq!(dispatch_service(path), Some(ServiceName::Work), "path: {path}");
        }
    }

    #[test]
    fn unmatched_path_dispatches_to_none() {
        assert_eq!(dispatch_service("/favicon.ico"), None);
    }

    #[test]
    fn build_upstream_url_preserves_path_and_query() {
        assert_eq!(
            build_upstream_url("http://work:8080/", "/api/v1/works/1", "page=2"),
            "http://work:8080/api/v1/works/1?page=2"
        );
        assert_eq!(
            build_upstream_url("http://work:8080", "/api/v1/works/1", ""),
            "http://work:8080/api/v1/works/1"
        );
    }

    #[test]
    fn upstream_headers_strip_hop_by_hop_and_client_user_id() {
        let req = ProxyRequest {
            method: "GET".into(),
            path: "/api/v1/works".into(),
            raw_query: String::new(),
            headers: vec![
                ("connection".into(), "keep-alive".into()),
                ("x-user-id".into(), "client-supplied".into()),
                ("authorization".into(), "Bearer abc".into()),
            ],
            body: Bytes::new(),
            peer_ip: "1.2.3.4".into(),
            request_id: "req-1".into(),
            identity: ClientIdentity::authenticated(
                crate::models::identity::Tier::Public,
                "client-1",
                Some("user-9".into()),
                vec![],
                "1.2.3.4",
            ),
            is_tls: false,
        };
        let headers = build_upstream_headers(&req);
        assert!(!headers.iter().any(|(n, _)| n == "connection"));
        assert!(headers.iter().any(|(n, v)| n == "x-user-id" && v == "user-9"));
        assert!(headers.iter().any(|(n, v)| n == "authorization" && v == "Bearer abc"));
        assert!(headers.iter().any(|(n, v)| n == "x-forwarded-for" && v == "1.2.3.4"));
    }

    #[test]
    fn forwarded_for_appends_to_existing_chain() {
        let req = ProxyRequest {
            method: "GET".into(),
            path: "/api/v1/works".into(),
            raw_query: String::new(),
            headers: vec![("x-forwarded-for".into(), "9.9.9.9".into())],
            body: Bytes::new(),
            peer_ip: "1.2.3.4".into(),
            request_id: "req-1".into(),
            identity: ClientIdentity::anonymous("1.2.3.4"),
            is_tls: false,
        };
        let headers = build_upstream_headers(&req);
        let value = headers.iter().find(|(n, _)| n == "x-forwarded-for").unwrap();
        assert_eq!(value.1, "9.9.9.9, 1.2.3.4");
    }
}
