//! End-to-end behaviour of the gateway against a mocked CRM.

use crm_gateway::{EntityRequest, Gateway, GatewayConfig, GatewayError, Method, RequestOptions};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config(server: &MockServer) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.upstream.base_url = Some(server.uri().parse().unwrap());
    config.upstream.api_key = "test-key".to_string();
    config.upstream.timeout = Duration::from_secs(2);
    config.retry.base_delay = Duration::from_millis(10);
    config.cache.no_cache = vec!["Lead".to_string()];
    config.warmup.enabled = false;
    config
}

#[tokio::test]
async fn test_cached_entity_reaches_upstream_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/Product/p1"))
        .and(header("X-Api-Key", "test-key"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"id": "p1", "name": "Widget"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let gateway = Gateway::new(config(&server)).unwrap();

    for _ in 0..3 {
        let product = gateway.perform_request("/Product/p1", RequestOptions::get()).await.unwrap();
        assert_eq!(product["name"], "Widget");
    }
}

#[tokio::test]
async fn test_no_cache_entity_reaches_upstream_every_time() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/Lead"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"list": [], "total": 0})))
        .expect(3)
        .mount(&server)
        .await;

    let gateway = Gateway::new(config(&server)).unwrap();

    for _ in 0..3 {
        gateway.perform_request("/Lead", RequestOptions::get()).await.unwrap();
    }
    assert!(gateway.cache().keys().await.is_empty());
}

#[tokio::test]
async fn test_concurrent_identical_reads_collapse() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/Account"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"list": [{"id": "a1"}], "total": 1}))
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let gateway = Arc::new(Gateway::new(config(&server)).unwrap());

    let handles: Vec<_> = (0..10)
        .map(|_| {
            let gateway = Arc::clone(&gateway);
            tokio::spawn(async move { gateway.list_all("Account").await })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap()["total"], 1);
    }
}

#[tokio::test]
async fn test_client_error_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/Product/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "Not Found"})))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = Gateway::new(config(&server)).unwrap();

    match gateway.get_by_id("Product", "missing").await {
        Err(GatewayError::Client { status, detail }) => {
            assert_eq!(status, 404);
            assert_eq!(detail["message"], "Not Found");
        }
        other => panic!("expected client error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_server_errors_are_retried_then_surfaced() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/Product"))
        .respond_with(ResponseTemplate::new(503).set_body_string("Service Unavailable"))
        .expect(3)
        .mount(&server)
        .await;

    let gateway = Gateway::new(config(&server)).unwrap();

    match gateway.list_all("Product").await {
        Err(GatewayError::Server { status, detail }) => {
            assert_eq!(status, 503);
            assert_eq!(detail, json!("Service Unavailable"));
        }
        other => panic!("expected server error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_transient_failure_recovers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/Product/p2"))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/Product/p2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "p2"})))
        .mount(&server)
        .await;

    let gateway = Gateway::new(config(&server)).unwrap();
    let product = gateway.get_by_id("Product", "p2").await.unwrap();
    assert_eq!(product["id"], "p2");
}

#[tokio::test]
async fn test_slow_upstream_surfaces_as_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/Product"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"list": [], "total": 0}))
                .set_delay(Duration::from_secs(2)),
        )
        .expect(2)
        .mount(&server)
        .await;

    let mut config = config(&server);
    config.upstream.timeout = Duration::from_millis(200);
    config.retry.max_attempts = 2;
    let gateway = Gateway::new(config).unwrap();

    let result = gateway.list_all("Product").await;
    assert!(matches!(result, Err(GatewayError::Timeout { timeout_ms: 200 })));
}

#[tokio::test]
async fn test_typed_requests_carry_query_parameters() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/Account"))
        .and(query_param("where[0][type]", "equals"))
        .and(query_param("where[0][attribute]", "industry"))
        .and(query_param("where[0][value]", "Retail"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"list": [{"id": "a1"}], "total": 1})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let gateway = Gateway::new(config(&server)).unwrap();
    let request = EntityRequest::field_filter("Account", "industry", json!("Retail"));

    gateway.fetch(request.clone()).await.unwrap();
    gateway.fetch(request).await.unwrap();

    // The raw form of the same query shares the cache entry
    gateway
        .perform_request(
            "/Account",
            RequestOptions::get()
                .with_query("where[0][type]", "equals")
                .with_query("where[0][attribute]", "industry")
                .with_query("where[0][value]", "Retail"),
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_write_invalidates_cached_reads() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/Product"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"list": [], "total": 0})))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/api/v1/Product/p1"))
        .and(body_json(json!({"name": "Renamed"})))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"id": "p1", "name": "Renamed"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let gateway = Gateway::new(config(&server)).unwrap();

    gateway.list_all("Product").await.unwrap();
    gateway.list_all("Product").await.unwrap();

    let updated = gateway
        .perform_request(
            "/Product/p1",
            RequestOptions::new(Method::PUT).with_body(json!({"name": "Renamed"})),
        )
        .await
        .unwrap();
    assert_eq!(updated["name"], "Renamed");

    gateway.list_all("Product").await.unwrap();
}

#[tokio::test]
async fn test_empty_success_body_is_null() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/api/v1/Product/p1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = Gateway::new(config(&server)).unwrap();
    let result = gateway
        .perform_request("/Product/p1", RequestOptions::new(Method::DELETE))
        .await
        .unwrap();

    assert!(result.is_null());
}
