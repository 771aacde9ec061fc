//! End-to-end coverage of the GraphQL routing façade: keyword classification
//! dispatching through the same backend the REST surface uses.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use actix_web::{http::StatusCode, test, web, App};
use gateway_core::models::service::{Service, ServiceName};
use gateway_core::routes::configure_graphql;
use gateway_core::services::cache::ResponseCache;
use gateway_core::services::health::HealthTracker;
use gateway_core::services::metrics::MetricsCollector;
use gateway_core::services::proxy::ProxyPipeline;
use gateway_core::services::rate_limiter::RateLimiter;
use gateway_core::AppState;
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn build_app_state(work_url: String, auth_url: String, mode: gateway_core::models::settings::GatewayMode) -> web::Data<AppState> {
    let mut services = HashMap::new();
    services.insert(ServiceName::Work, Arc::new(Service::new(ServiceName::Work, vec![work_url])));
    services.insert(ServiceName::Auth, Arc::new(Service::new(ServiceName::Auth, vec![auth_url])));
    services.insert(ServiceName::Tag, Arc::new(Service::new(ServiceName::Tag, vec![])));
    services.insert(ServiceName::Search, Arc::new(Service::new(ServiceName::Search, vec![])));

    let cache = Arc::new(ResponseCache::new());
    let metrics = Arc::new(MetricsCollector::new());
    let client = reqwest::Client::new();
    let proxy = Arc::new(ProxyPipeline::new(client, services.clone(), cache.clone(), metrics.clone()));

    web::Data::new(AppState {
        services,
        proxy,
        health_tracker: Arc::new(HealthTracker::new(reqwest::Client::new(), metrics.clone())),
        metrics,
        rate_limiter: Arc::new(RateLimiter::new(None)),
        cache,
        jwt: gateway_core::models::settings::JwtSettings {
            secret: "integration-test-secret-value!!".into(),
            issuer: None,
            audience: None,
            required_claims: vec![],
        },
        kv: None,
        mode,
        started_at: Instant::now(),
    })
}

#[actix_web::test]
async fn works_query_forwards_to_work_service_and_wraps_data() {
    let work = MockServer::start().await;
    let auth = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/works"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": "1" }])))
        .mount(&work)
        .await;

    let state = build_app_state(work.uri(), auth.uri(), gateway_core::models::settings::GatewayMode::Debug);
    let app = test::init_service(App::new().app_data(state.clone()).configure(configure_graphql)).await;

    let req = test::TestRequest::post()
        .uri("/graphql")
        .set_json(json!({ "query": "query { works { id } }" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["data"]["works"], json!([{ "id": "1" }]));
}

#[actix_web::test]
async fn login_mutation_forwards_to_auth_service() {
    let work = MockServer::start().await;
    let auth = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "token": "abc" })))
        .mount(&auth)
        .await;

    let state = build_app_state(work.uri(), auth.uri(), gateway_core::models::settings::GatewayMode::Debug);
    let app = test::init_service(App::new().app_data(state.clone()).configure(configure_graphql)).await;

    let req = test::TestRequest::post()
        .uri("/graphql")
        .set_json(json!({
            "query": "mutation { authLogin(input: {}) }",
            "variables": { "input": { "email": "a@b.com", "password": "hunter2" } }
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["data"]["login"], json!({ "token": "abc" }));
}

#[actix_web::test]
async fn unmatched_query_returns_graphql_style_error() {
    let work = MockServer::start().await;
    let auth = MockServer::start().await;
    let state = build_app_state(work.uri(), auth.uri(), gateway_core::models::settings::GatewayMode::Debug);
    let app = test::init_service(App::new().app_data(state.clone()).configure(configure_graphql)).await;

    let req = test::TestRequest::post()
        .uri("/graphql")
        .set_json(json!({ "query": "query { somethingUnknown { id } }" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: Value = test::read_body_json(resp).await;
    assert!(body["errors"].is_array());
    assert!(body["data"].is_null());
}

#[actix_web::test]
async fn subscription_is_not_implemented() {
    let work = MockServer::start().await;
    let auth = MockServer::start().await;
    let state = build_app_state(work.uri(), auth.uri(), gateway_core::models::settings::GatewayMode::Debug);
    let app = test::init_service(App::new().app_data(state.clone()).configure(configure_graphql)).await;

    let req = test::TestRequest::post()
        .uri("/graphql")
        .set_json(json!({ "query": "subscription { onWorkUpdated { id } }" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_IMPLEMENTED);
}

#[actix_web::test]
async fn playground_is_hidden_in_release_mode() {
    let work = MockServer::start().await;
    let auth = MockServer::start().await;
    let state = build_app_state(work.uri(), auth.uri(), gateway_core::models::settings::GatewayMode::Release);
    let app = test::init_service(App::new().app_data(state.clone()).configure(configure_graphql)).await;

    let resp = test::call_service(&app, test::TestRequest::get().uri("/graphql").to_request()).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}
