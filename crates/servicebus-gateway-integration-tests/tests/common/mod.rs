//! Common test utilities for the gateway integration tests
//!
//! This module provides:
//! - A router wired to a fresh in-memory queue
//! - Request helpers returning status and decoded JSON

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    response::Response,
    Router,
};
use servicebus_gateway_api::{create_router, AppState, ServiceConfig, ServiceMetrics};
use servicebus_gateway_core::BrokerGateway;
use servicebus_runtime::{QueueConfig, QueueName, SequenceNumber};
use std::sync::Arc;
use tower::ServiceExt;

/// Router plus the gateway behind it, so tests can inspect the queue directly
#[allow(dead_code)]
pub struct TestApp {
    pub router: Router,
    pub gateway: Arc<BrokerGateway>,
}

#[allow(dead_code)]
impl TestApp {
    /// App over a new in-memory queue named `orders`
    pub async fn in_memory() -> Self {
        let queue = QueueName::new("orders".to_string()).unwrap();
        let gateway = BrokerGateway::connect(&QueueConfig::in_memory(queue))
            .await
            .unwrap()
            .with_receive_timeout(chrono::Duration::milliseconds(50));

        Self::with_gateway(Arc::new(gateway))
    }

    pub fn with_gateway(gateway: Arc<BrokerGateway>) -> Self {
        let state = AppState::new(
            ServiceConfig::default(),
            gateway.clone(),
            ServiceMetrics::new().unwrap(),
        );

        Self {
            router: create_router(state),
            gateway,
        }
    }

    pub async fn get(&self, uri: &str) -> Response {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        self.router.clone().oneshot(request).await.unwrap()
    }

    pub async fn get_json(&self, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = self.get(uri).await;
        let status = response.status();
        (status, body_json(response).await)
    }

    pub async fn post_json(&self, uri: &str, body: serde_json::Value) -> Response {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.router.clone().oneshot(request).await.unwrap()
    }

    /// Publish through `/servicebus` or `/servicebus/typed` and return the message ID
    pub async fn publish(&self, uri: &str, payload: &str, tags: &[&str]) -> String {
        let response = self
            .post_json(uri, serde_json::json!({ "payload": payload, "tags": tags }))
            .await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        body["message_id"].as_str().unwrap().to_string()
    }

    /// Messages currently in the queue, read without consuming them
    ///
    /// Pages through the queue in batches no larger than the gateway allows.
    pub async fn queue_length(&self) -> usize {
        let page_size = self.gateway.max_batch_size();
        let mut start = 0;
        let mut count = 0;
        loop {
            let page = self
                .gateway
                .peek_many(page_size, SequenceNumber::new(start))
                .await
                .unwrap();
            match page.last() {
                Some(last) => {
                    count += page.len();
                    start = last.message().sequence_number.value() + 1;
                }
                None => return count,
            }
        }
    }
}

/// Decode a response body as JSON; an empty body decodes as `null`
#[allow(dead_code)]
pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    if bytes.is_empty() {
        return serde_json::Value::Null;
    }
    serde_json::from_slice(&bytes).unwrap()
}
