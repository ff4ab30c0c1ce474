//! Router tests against the in-memory transport.

use super::*;
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use servicebus_runtime::{QueueConfig, QueueName};
use tower::ServiceExt; // For `oneshot`

async fn test_app() -> Router {
    let queue = QueueName::new("orders".to_string()).unwrap();
    let gateway = BrokerGateway::connect(&QueueConfig::in_memory(queue))
        .await
        .unwrap()
        .with_receive_timeout(chrono::Duration::milliseconds(50));

    let state = AppState::new(
        ServiceConfig::default(),
        Arc::new(gateway),
        ServiceMetrics::new().unwrap(),
    );
    create_router(state)
}

async fn get(app: &Router, uri: &str) -> Response {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    app.clone().oneshot(request).await.unwrap()
}

async fn post_json(app: &Router, uri: &str, body: serde_json::Value) -> Response {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    app.clone().oneshot(request).await.unwrap()
}

async fn publish(app: &Router, uri: &str, payload: &str, tags: &[&str]) {
    let response = post_json(
        app,
        uri,
        serde_json::json!({ "payload": payload, "tags": tags }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
}

async fn body_json(response: Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_text(response: Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

// ============================================================================
// Health and metrics
// ============================================================================

mod observability {
    use super::*;

    #[tokio::test]
    async fn test_health_reports_bound_queue() {
        let app = test_app().await;

        let response = get(&app, "/health").await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["queue"], "orders");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn test_ready_returns_true() {
        let app = test_app().await;

        let response = get(&app, "/ready").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["ready"], true);
    }

    #[tokio::test]
    async fn test_metrics_exposes_broker_and_http_counters() {
        let app = test_app().await;
        get(&app, "/servicebus/receive").await;

        let response = get(&app, "/metrics").await;
        assert_eq!(response.status(), StatusCode::OK);

        let text = body_text(response).await;
        assert!(text.contains("servicebus_gateway_broker_operations_total"));
        assert!(text.contains(r#"operation="receive""#));
        assert!(text.contains(r#"path="/servicebus/receive""#));
    }

    #[tokio::test]
    async fn test_correlation_id_is_echoed() {
        let app = test_app().await;
        let request = Request::builder()
            .uri("/health")
            .header(CORRELATION_ID_HEADER, "test-correlation-123")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(
            response.headers()[CORRELATION_ID_HEADER],
            "test-correlation-123"
        );
    }

    #[tokio::test]
    async fn test_correlation_id_is_generated_when_missing() {
        let app = test_app().await;

        let response = get(&app, "/health").await;
        let generated = response.headers()[CORRELATION_ID_HEADER].to_str().unwrap();
        assert!(uuid::Uuid::parse_str(generated).is_ok());
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let app = test_app().await;
        assert_eq!(get(&app, "/servicebus/nope").await.status(), StatusCode::NOT_FOUND);
    }
}

// ============================================================================
// Publish and receive
// ============================================================================

mod receive {
    use super::*;

    #[tokio::test]
    async fn test_publish_returns_message_id() {
        let app = test_app().await;

        let response = post_json(
            &app,
            "/servicebus",
            serde_json::json!({ "payload": "hello", "tags": [] }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["status"], "published");
        assert!(!body["message_id"].as_str().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_raw_publish_then_receive_returns_payload() {
        let app = test_app().await;
        publish(&app, "/servicebus", "hello", &[]).await;

        let response = get(&app, "/servicebus/receive").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, serde_json::json!("hello"));
    }

    #[tokio::test]
    async fn test_raw_publish_carries_tags_as_property() {
        let app = test_app().await;
        publish(&app, "/servicebus", "hello", &["a", "b"]).await;

        let body = body_json(get(&app, "/servicebus/receive?metadata=true").await).await;
        assert_eq!(body["body"], "hello");
        assert_eq!(body["metadata"]["properties"]["tags"], "a,b");
        assert_eq!(
            body["metadata"]["content_type"],
            servicebus_gateway_core::gateway::TEXT_CONTENT_TYPE
        );
    }

    #[tokio::test]
    async fn test_typed_publish_then_typed_receive_with_metadata() {
        let app = test_app().await;
        publish(&app, "/servicebus/typed", "hello", &["a", "b"]).await;

        let response = get(&app, "/servicebus/receive-typed?metadata=true").await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["body"]["text"], "hello");
        assert_eq!(body["body"]["tags"], serde_json::json!(["a", "b"]));
        assert_eq!(body["metadata"]["sequence_number"], 1);
        assert_eq!(body["metadata"]["content_type"], "application/json");
    }

    #[tokio::test]
    async fn test_receive_on_empty_queue_is_no_content() {
        let app = test_app().await;

        assert_eq!(
            get(&app, "/servicebus/receive").await.status(),
            StatusCode::NO_CONTENT
        );
        assert_eq!(
            get(&app, "/servicebus/receive-typed").await.status(),
            StatusCode::NO_CONTENT
        );
    }

    #[tokio::test]
    async fn test_receive_messages_on_empty_queue_is_empty_list() {
        let app = test_app().await;

        let response = get(&app, "/servicebus/receive-messages?max=5").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_receive_messages_respects_max_and_consumes() {
        let app = test_app().await;
        for payload in ["one", "two", "three"] {
            publish(&app, "/servicebus", payload, &[]).await;
        }

        let first = body_json(get(&app, "/servicebus/receive-messages?max=2").await).await;
        assert_eq!(first, serde_json::json!(["one", "two"]));

        let rest = body_json(get(&app, "/servicebus/receive-messages").await).await;
        assert_eq!(rest, serde_json::json!(["three"]));
    }

    #[tokio::test]
    async fn test_receive_typed_messages_decodes_each() {
        let app = test_app().await;
        publish(&app, "/servicebus/typed", "x", &["1"]).await;
        publish(&app, "/servicebus/typed", "y", &[]).await;

        let body = body_json(get(&app, "/servicebus/receive-typed-messages").await).await;
        assert_eq!(
            body,
            serde_json::json!([
                { "text": "x", "tags": ["1"] },
                { "text": "y", "tags": [] },
            ])
        );
    }

    #[tokio::test]
    async fn test_typed_receive_of_raw_text_is_422() {
        let app = test_app().await;
        publish(&app, "/servicebus", "not json", &[]).await;

        let response = get(&app, "/servicebus/receive-typed").await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body_json(response).await["status"], 422);
    }

    #[tokio::test]
    async fn test_zero_batch_size_is_400() {
        let app = test_app().await;

        let response = get(&app, "/servicebus/receive-messages?max=0").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_publish_without_payload_is_rejected() {
        let app = test_app().await;

        let response = post_json(&app, "/servicebus", serde_json::json!({ "tags": [] })).await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}

// ============================================================================
// Peek
// ============================================================================

mod peek {
    use super::*;

    #[tokio::test]
    async fn test_peek_messages_requires_start() {
        let app = test_app().await;

        assert_eq!(
            get(&app, "/servicebus/peek-messages?max=5").await.status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            get(&app, "/servicebus/peek-typed-messages").await.status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[tokio::test]
    async fn test_malformed_query_uses_json_error_body() {
        let app = test_app().await;

        let response = get(&app, "/servicebus/peek-messages?start=first&max=5").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = body_json(response).await;
        assert_eq!(body["status"], 400);
        assert!(body["error"]
            .as_str()
            .unwrap()
            .starts_with("Invalid request:"));
        assert!(body["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_peek_messages_leaves_queue_unchanged() {
        let app = test_app().await;
        publish(&app, "/servicebus", "one", &[]).await;
        publish(&app, "/servicebus", "two", &[]).await;

        let first = body_json(get(&app, "/servicebus/peek-messages?start=0").await).await;
        let second = body_json(get(&app, "/servicebus/peek-messages?start=0").await).await;
        assert_eq!(first, serde_json::json!(["one", "two"]));
        assert_eq!(first, second);

        let received = body_json(get(&app, "/servicebus/receive-messages").await).await;
        assert_eq!(received, serde_json::json!(["one", "two"]));
    }

    #[tokio::test]
    async fn test_peek_by_sequence() {
        let app = test_app().await;
        publish(&app, "/servicebus", "one", &[]).await;
        publish(&app, "/servicebus", "two", &[]).await;

        let body = body_json(get(&app, "/servicebus/peek?start=2&metadata=true").await).await;
        assert_eq!(body["body"], "two");
        assert_eq!(body["metadata"]["sequence_number"], 2);

        assert_eq!(
            get(&app, "/servicebus/peek?start=99").await.status(),
            StatusCode::NO_CONTENT
        );
    }

    #[tokio::test]
    async fn test_peek_without_start_returns_oldest() {
        let app = test_app().await;
        publish(&app, "/servicebus", "one", &[]).await;
        publish(&app, "/servicebus", "two", &[]).await;

        let body = body_json(get(&app, "/servicebus/peek").await).await;
        assert_eq!(body, serde_json::json!("one"));
    }

    #[tokio::test]
    async fn test_peek_typed_messages_from_start() {
        let app = test_app().await;
        publish(&app, "/servicebus/typed", "a", &[]).await;
        publish(&app, "/servicebus/typed", "b", &[]).await;
        publish(&app, "/servicebus/typed", "c", &[]).await;

        let body = body_json(
            get(&app, "/servicebus/peek-typed-messages?start=2&max=10").await,
        )
        .await;
        let texts: Vec<&str> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v["text"].as_str().unwrap())
            .collect();
        assert_eq!(texts, vec!["b", "c"]);
    }

    #[tokio::test]
    async fn test_peek_typed_on_empty_queue_is_no_content() {
        let app = test_app().await;

        assert_eq!(
            get(&app, "/servicebus/peek-typed").await.status(),
            StatusCode::NO_CONTENT
        );
    }
}
