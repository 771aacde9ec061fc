//! GraphQL routing façade (spec.md §4.7): a routing shim, not an execution
//! engine. Classifies the operation by its leading keyword, string-matches
//! the query text against a small fixed vocabulary, and forwards to the
//! same `ProxyPipeline` the REST surface uses.

use actix_web::http::header::{HeaderName, HeaderValue};
use actix_web::http::StatusCode;
use actix_web::{web, HttpMessage, HttpRequest, HttpResponse};
use bytes::Bytes;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::models::identity::ClientIdentity;
use crate::services::proxy::ProxyRequest;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
struct GraphQlRequest {
    query: String,
    #[serde(default)]
    variables: Value,
    #[serde(rename = "operationName", default)]
    #[allow(dead_code)]
    operation_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OperationKind {
    Query,
    Mutation,
    Subscription,
}

/// The operation kind is the first non-whitespace keyword of the query
/// text; anything that isn't `mutation`/`subscription` defaults to `query`.
fn classify_operation(query: &str) -> OperationKind {
    let first_word = query
        .trim_start()
        .split(|c: char| c.is_whitespace() || c == '{' || c == '(')
        .next()
        .unwrap_or("")
        .to_ascii_lowercase();
    match first_word.as_str() {
        "mutation" => OperationKind::Mutation,
        "subscription" => OperationKind::Subscription,
        _ => OperationKind::Query,
    }
}

/// Query keyword → (response data key, REST path) lookup, checked in this
/// fixed order against the lowercased query text.
const QUERY_KEYWORDS: &[(&str, &str)] = &[
    ("works", "/api/v1/works"),
    ("tags", "/api/v1/tags"),
    ("search", "/api/v1/search"),
    ("user", "/api/v1/users"),
];

fn graphql_error(message: impl Into<String>) -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "errors": [{ "message": message.into() }],
        "data": Value::Null,
    }))
}

async fn dispatch_and_wrap(
    state: &AppState,
    method: &str,
    path: &str,
    body: Bytes,
    req: &HttpRequest,
    data_key: &str,
) -> HttpResponse {
    let peer_ip = req.connection_info().peer_addr().unwrap_or("unknown").to_string();
    let identity = req
        .extensions()
        .get::<ClientIdentity>()
        .cloned()
        .unwrap_or_else(|| ClientIdentity::anonymous(peer_ip.clone()));
    let request_id = uuid::Uuid::new_v4().to_string();
    let is_tls = req.connection_info().scheme() == "https";
    let headers = req
        .headers()
        .iter()
        .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str().to_string(), v.to_string())))
        .collect();

    let proxy_req = ProxyRequest {
        method: method.to_string(),
        path: path.to_string(),
        raw_query: String::new(),
        headers,
        body,
        peer_ip,
        request_id,
        identity,
        is_tls,
    };

    let response = match state.proxy.handle(proxy_req).await {
        Ok(r) => r,
        Err(err) => return actix_web::error::ResponseError::error_response(&err),
    };

    if (200..300).contains(&response.status) {
        let value: Value =
            serde_json::from_slice(&response.body).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&response.body).into_owned()));
        HttpResponse::Ok().json(json!({ "data": { data_key: value } }))
    } else {
        let mut builder = HttpResponse::build(StatusCode::from_u16(response.status).unwrap_or(StatusCode::BAD_GATEWAY));
        for (name, value) in &response.headers {
            if let (Ok(name), Ok(value)) = (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
                builder.insert_header((name, value));
            }
        }
        builder.body(response.body)
    }
}

/// Unpacks `variables.input.{email,password,username}` into the JSON body
/// the auth service expects, per spec.md §4.7.
fn mutation_body(variables: &Value) -> Bytes {
    let input = variables.get("input").cloned().unwrap_or(Value::Null);
    let mut body = serde_json::Map::new();
    for field in ["email", "password", "username"] {
        if let Some(v) = input.get(field) {
            body.insert(field.to_string(), v.clone());
        }
    }
    Bytes::from(serde_json::to_vec(&Value::Object(body)).unwrap_or_default())
}

async fn graphql_post(req: HttpRequest, payload: web::Bytes, state: web::Data<AppState>) -> HttpResponse {
    let parsed: Result<GraphQlRequest, _> = serde_json::from_slice(&payload);
    let gql = match parsed {
        Ok(g) => g,
        Err(_) => {
            return HttpResponse::BadRequest().json(json!({ "error": "request body could not be read or parsed" }));
        }
    };

    match classify_operation(&gql.query) {
        OperationKind::Subscription => {
            state.metrics.record_graphql_operation("subscription", "unsupported");
            HttpResponse::NotImplemented().json(json!({ "error": "GraphQL subscriptions are not implemented" }))
        }
        OperationKind::Query => {
            let lower = gql.query.to_ascii_lowercase();
            match QUERY_KEYWORDS.iter().find(|(keyword, _)| lower.contains(keyword)) {
                Some((key, path)) => {
                    state.metrics.record_graphql_operation("query", key);
                    dispatch_and_wrap(&state, "GET", path, Bytes::new(), &req, key).await
                }
                None => {
                    state.metrics.record_graphql_operation("query", "unmatched");
                    graphql_error("unrecognized query operation")
                }
            }
        }
        OperationKind::Mutation => {
            let lower = gql.query.to_ascii_lowercase();
            let action = if lower.contains("auth") && lower.contains("login") {
                Some("login")
            } else if lower.contains("auth") && lower.contains("register") {
                Some("register")
            } else {
                None
            };
            match action {
                Some(action) => {
                    state.metrics.record_graphql_operation("mutation", action);
                    let body = mutation_body(&gql.variables);
                    let path = format!("/api/v1/auth/{action}");
                    dispatch_and_wrap(&state, "POST", &path, body, &req, action).await
                }
                None => {
                    state.metrics.record_graphql_operation("mutation", "unmatched");
                    graphql_error("unrecognized mutation operation")
                }
            }
        }
    }
}

const PLAYGROUND_HTML: &str = r#"<!DOCTYPE html>
<html>
<head><title>GraphQL Playground</title></head>
<body>
<p>Dev-mode placeholder. POST your query to /graphql.</p>
</body>
</html>"#;

async fn graphql_playground(state: web::Data<AppState>) -> HttpResponse {
    if state.mode.is_release() {
        HttpResponse::NotFound().finish()
    } else {
        HttpResponse::Ok().content_type("text/html").body(PLAYGROUND_HTML)
    }
}

async fn graphql_ws() -> HttpResponse {
    HttpResponse::NotImplemented().json(json!({ "error": "GraphQL subscription transport is not implemented" }))
}

pub fn configure_graphql(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/graphql")
            .route(web::post().to(graphql_post))
            .route(web::get().to(graphql_playground)),
    )
    .route("/graphql/ws", web::get().to(graphql_ws));
}
