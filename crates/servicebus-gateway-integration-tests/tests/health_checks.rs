//! Integration tests for health, readiness and metrics endpoints

mod common;

use axum::http::StatusCode;
use common::TestApp;

/// Verify that health endpoint returns JSON naming the bound queue
#[tokio::test]
async fn test_health_endpoint_response_structure() {
    // Arrange
    let app = TestApp::in_memory().await;

    // Act
    let response = app.get("/health").await;

    // Assert
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()["content-type"].to_str().unwrap().to_string();
    assert!(
        content_type.contains("application/json"),
        "Content-Type should be application/json, got: {}",
        content_type
    );

    let body = common::body_json(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["queue"], "orders");
    assert!(body["timestamp"].is_string());
}

/// Verify that readiness endpoint reports ready
#[tokio::test]
async fn test_readiness_endpoint_reports_ready() {
    // Arrange
    let app = TestApp::in_memory().await;

    // Act
    let (status, body) = app.get_json("/ready").await;

    // Assert
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ready"], true);
}

/// Verify that broker operations show up in the metrics output
#[tokio::test]
async fn test_metrics_endpoint_counts_broker_operations() {
    // Arrange
    let app = TestApp::in_memory().await;
    app.publish("/servicebus", "counted", &[]).await;
    app.get("/servicebus/receive").await;
    app.get("/servicebus/receive").await;

    // Act
    let response = app.get("/metrics").await;

    // Assert
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains(
        r#"servicebus_gateway_broker_operations_total{operation="send",outcome="success"} 1"#
    ));
    assert!(text.contains(
        r#"servicebus_gateway_broker_operations_total{operation="receive",outcome="success"} 1"#
    ));
    assert!(text.contains(
        r#"servicebus_gateway_broker_operations_total{operation="receive",outcome="empty"} 1"#
    ));
}
