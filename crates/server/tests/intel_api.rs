//! In-process API tests with mock intelligence services.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use argus_core::testing::{canned_report, MockIntelService};
use argus_core::{
    AuthConfig, AuthMethod, Config, IntelAggregator, IntelConfig, IntelService, NoneAuthenticator,
    ServerConfig, ServiceKey,
};
use argus_server::api::create_router;
use argus_server::state::AppState;

/// In-process server over a mock adapter set.
struct TestFixture {
    router: Router,
    mocks: Vec<Arc<MockIntelService>>,
}

impl TestFixture {
    /// One healthy mock per service.
    fn new() -> Self {
        Self::with_mocks(
            ServiceKey::ALL
                .iter()
                .map(|key| Arc::new(MockIntelService::ok(*key, canned_report(*key))))
                .collect(),
        )
    }

    fn with_mocks(mocks: Vec<Arc<MockIntelService>>) -> Self {
        let config = Config {
            auth: AuthConfig {
                method: AuthMethod::None,
                api_key: None,
            },
            server: ServerConfig::default(),
            intel: IntelConfig::default(),
        };

        let aggregator = Arc::new(IntelAggregator::with_services(
            mocks
                .iter()
                .map(|m| Arc::clone(m) as Arc<dyn IntelService>)
                .collect(),
        ));

        let state = Arc::new(AppState::new(
            config,
            Arc::new(NoneAuthenticator),
            aggregator,
        ));

        Self {
            router: create_router(state),
            mocks,
        }
    }

    fn total_calls(&self) -> usize {
        self.mocks.iter().map(|m| m.calls()).sum()
    }

    async fn get(&self, path: &str) -> (StatusCode, Value) {
        let response = self
            .router
            .clone()
            .oneshot(Request::get(path).body(Body::empty()).unwrap())
            .await
            .unwrap();
        Self::into_parts(response).await
    }

    async fn post(&self, path: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::post(path)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = self.router.clone().oneshot(request).await.unwrap();
        Self::into_parts(response).await
    }

    async fn into_parts(response: axum::response::Response) -> (StatusCode, Value) {
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, body)
    }
}

#[tokio::test]
async fn test_health_endpoint() {
    let fixture = TestFixture::new();
    let (status, body) = fixture.get("/api/v1/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_config_endpoint_is_sanitized() {
    let fixture = TestFixture::new();
    let (status, body) = fixture.get("/api/v1/config").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["auth"]["method"], "none");
    // Per-service credential state is booleans, never key material.
    let services = body["intel"]["services"].as_array().unwrap();
    assert_eq!(services.len(), 13);
    assert!(services.iter().all(|s| s["api_key_configured"].is_boolean()));
}

#[tokio::test]
async fn test_search_ip_returns_detection_and_results() {
    let fixture = TestFixture::new();
    let (status, body) = fixture
        .post("/api/v1/intel/search", json!({"query": "8.8.8.8"}))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["detection"]["type"], "ip");
    assert_eq!(body["detection"]["confidence"], 1.0);

    let results = body["results"].as_object().unwrap();
    assert!(results.contains_key("shodan"));
    assert!(results.contains_key("greyNoise"));
    assert!(results.contains_key("abuseIpdb"));
    assert!(!results.contains_key("hibp"));
    assert!(body.get("errors").is_none());
}

#[tokio::test]
async fn test_search_empty_query_is_client_error() {
    let fixture = TestFixture::new();
    let (status, body) = fixture
        .post("/api/v1/intel/search", json!({"query": "   "}))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("empty"));
    // The engine was never invoked.
    assert_eq!(fixture.total_calls(), 0);
}

#[tokio::test]
async fn test_search_missing_query_field_is_client_error() {
    let fixture = TestFixture::new();
    let (status, _body) = fixture.post("/api/v1/intel/search", json!({})).await;
    // Axum rejects the body before the handler runs.
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(fixture.total_calls(), 0);
}

#[tokio::test]
async fn test_search_unknown_indicator_reports_general_error() {
    let fixture = TestFixture::new();
    let (status, body) = fixture
        .post("/api/v1/intel/search", json!({"query": "??? what is this ???"}))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["detection"]["type"], "unknown");
    assert_eq!(body["detection"]["confidence"], 0.0);
    assert!(body["errors"]["general"].is_string());
    assert_eq!(fixture.total_calls(), 0);
}

#[tokio::test]
async fn test_search_partial_failure_keeps_http_success() {
    let mocks: Vec<Arc<MockIntelService>> = ServiceKey::ALL
        .iter()
        .map(|key| {
            if *key == ServiceKey::Shodan {
                Arc::new(MockIntelService::err(
                    *key,
                    argus_core::ServiceError::Api("HTTP 502: bad gateway".to_string()),
                ))
            } else {
                Arc::new(MockIntelService::ok(*key, canned_report(*key)))
            }
        })
        .collect();
    let fixture = TestFixture::with_mocks(mocks);

    let (status, body) = fixture
        .post("/api/v1/intel/search", json!({"query": "8.8.8.8"}))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["errors"]["shodan"].as_str().unwrap().contains("502"));
    assert!(body["results"].get("shodan").is_none());
    assert!(body["results"]["greyNoise"].is_object());
}

#[tokio::test]
async fn test_list_services() {
    let fixture = TestFixture::new();
    let (status, body) = fixture.get("/api/v1/intel/services").await;

    assert_eq!(status, StatusCode::OK);
    let services = body["services"].as_array().unwrap();
    assert_eq!(services.len(), 13);

    let crtsh = services
        .iter()
        .find(|s| s["service"] == "crt-sh")
        .unwrap();
    assert_eq!(crtsh["response_key"], "crtSh");
    assert_eq!(crtsh["requires_api_key"], false);
    assert_eq!(crtsh["rate_limit_per_minute"], 20);
}

#[tokio::test]
async fn test_metrics_endpoint_exposes_prometheus_text() {
    let fixture = TestFixture::new();
    // Drive one request through the metrics middleware so the counters have
    // samples to encode.
    let _ = fixture.get("/api/v1/health").await;
    let response = fixture
        .router
        .clone()
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("argus_http_requests_total"));
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let fixture = TestFixture::new();
    let (status, _body) = fixture.get("/api/v1/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
