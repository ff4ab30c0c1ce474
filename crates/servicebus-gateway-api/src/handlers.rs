//! Route handlers.
//!
//! Single-message reads answer `204 No Content` when nothing is available.
//! Batch reads always answer with a JSON array in the order the broker
//! delivered the messages.

use crate::{
    errors::ApiError,
    presentation::MessageView,
    responses::{
        BatchParams, HealthResponse, PeekBatchParams, PeekParams, PublishRequest,
        PublishResponse, ReadParams, ReadinessResponse,
    },
    AppState,
};
use axum::{
    extract::{FromRequestParts, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use bytes::Bytes;
use serde::Serialize;
use servicebus_gateway_core::{gateway::TEXT_CONTENT_TYPE, Envelope, GatewayError, TaggedText};
use servicebus_runtime::{Message, MessageId, SequenceNumber};
use std::future::Future;
use std::time::Instant;
use tracing::instrument;

/// Application property carrying the comma-joined tags of a raw publish
pub const TAGS_PROPERTY: &str = "tags";

/// Query string extractor whose rejections use the JSON error body
#[derive(Debug, FromRequestParts)]
#[from_request(via(Query), rejection(ApiError))]
pub struct ApiQuery<T>(pub T);

// ============================================================================
// Publish
// ============================================================================

/// Publish the payload string verbatim
#[instrument(skip(state, request), fields(tags = request.tags.len()))]
pub async fn publish_raw(
    State(state): State<AppState>,
    Json(request): Json<PublishRequest>,
) -> Result<Json<PublishResponse>, ApiError> {
    let mut message =
        Message::new(Bytes::from(request.payload)).with_content_type(TEXT_CONTENT_TYPE);
    if !request.tags.is_empty() {
        message = message.with_property(TAGS_PROPERTY.to_string(), request.tags.join(","));
    }

    let message_id = observe(&state, "send", state.gateway.publish_message(message)).await?;
    Ok(Json(PublishResponse::published(message_id)))
}

/// Publish the payload and tags as a JSON [`TaggedText`]
#[instrument(skip(state, request), fields(tags = request.tags.len()))]
pub async fn publish_typed(
    State(state): State<AppState>,
    Json(request): Json<PublishRequest>,
) -> Result<Json<PublishResponse>, ApiError> {
    let payload = TaggedText::new(request.payload, request.tags);

    let message_id = observe(&state, "send", state.gateway.publish(&payload)).await?;
    Ok(Json(PublishResponse::published(message_id)))
}

// ============================================================================
// Receive
// ============================================================================

#[instrument(skip(state))]
pub async fn receive(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<ReadParams>,
) -> Result<Response, ApiError> {
    let envelope = observe(&state, "receive", state.gateway.receive_one()).await?;
    Ok(single(envelope, params.metadata))
}

#[instrument(skip(state))]
pub async fn receive_messages(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<BatchParams>,
) -> Result<Response, ApiError> {
    let envelopes = observe(&state, "receive", state.gateway.receive_many(params.max)).await?;
    Ok(batch(envelopes, params.metadata))
}

#[instrument(skip(state))]
pub async fn receive_typed(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<ReadParams>,
) -> Result<Response, ApiError> {
    let envelope = observe(
        &state,
        "receive",
        state.gateway.receive_one_as::<TaggedText>(),
    )
    .await?;
    Ok(single(envelope, params.metadata))
}

#[instrument(skip(state))]
pub async fn receive_typed_messages(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<BatchParams>,
) -> Result<Response, ApiError> {
    let envelopes = observe(
        &state,
        "receive",
        state.gateway.receive_many_as::<TaggedText>(params.max),
    )
    .await?;
    Ok(batch(envelopes, params.metadata))
}

// ============================================================================
// Peek
// ============================================================================

#[instrument(skip(state))]
pub async fn peek(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<PeekParams>,
) -> Result<Response, ApiError> {
    let start = params.start.map(SequenceNumber::new);
    let envelope = observe(&state, "peek", state.gateway.peek_one(start)).await?;
    Ok(single(envelope, params.metadata))
}

#[instrument(skip(state))]
pub async fn peek_messages(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<PeekBatchParams>,
) -> Result<Response, ApiError> {
    let start = SequenceNumber::new(params.start);
    let envelopes = observe(&state, "peek", state.gateway.peek_many(params.max, start)).await?;
    Ok(batch(envelopes, params.metadata))
}

#[instrument(skip(state))]
pub async fn peek_typed(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<PeekParams>,
) -> Result<Response, ApiError> {
    let start = params.start.map(SequenceNumber::new);
    let envelope = observe(
        &state,
        "peek",
        state.gateway.peek_one_as::<TaggedText>(start),
    )
    .await?;
    Ok(single(envelope, params.metadata))
}

#[instrument(skip(state))]
pub async fn peek_typed_messages(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<PeekBatchParams>,
) -> Result<Response, ApiError> {
    let start = SequenceNumber::new(params.start);
    let envelopes = observe(
        &state,
        "peek",
        state.gateway.peek_many_as::<TaggedText>(params.max, start),
    )
    .await?;
    Ok(batch(envelopes, params.metadata))
}

// ============================================================================
// Health and metrics
// ============================================================================

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now(),
        queue: state.gateway.queue().to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// The gateway is connected before the router is built
pub async fn ready() -> Json<ReadinessResponse> {
    Json(ReadinessResponse {
        ready: true,
        timestamp: chrono::Utc::now(),
    })
}

pub async fn metrics(State(state): State<AppState>) -> Result<String, ApiError> {
    state.metrics.encode().map_err(|e| ApiError::Internal {
        message: format!("Failed to encode metrics: {}", e),
    })
}

// ============================================================================
// Helpers
// ============================================================================

fn single<T: Serialize>(envelope: Option<Envelope<T>>, include_metadata: bool) -> Response {
    match envelope {
        Some(envelope) => {
            Json(MessageView::from_envelope(envelope, include_metadata)).into_response()
        }
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

fn batch<T: Serialize>(envelopes: Vec<Envelope<T>>, include_metadata: bool) -> Response {
    Json(MessageView::from_envelopes(envelopes, include_metadata)).into_response()
}

/// Results that can come back without a message
trait Outcome {
    fn is_empty(&self) -> bool {
        false
    }
}

impl Outcome for MessageId {}

impl<T> Outcome for Option<T> {
    fn is_empty(&self) -> bool {
        self.is_none()
    }
}

impl<T> Outcome for Vec<T> {
    fn is_empty(&self) -> bool {
        Vec::is_empty(self)
    }
}

/// Run one gateway call and record its outcome and latency
async fn observe<T, F>(state: &AppState, operation: &str, call: F) -> Result<T, GatewayError>
where
    T: Outcome,
    F: Future<Output = Result<T, GatewayError>>,
{
    let start = Instant::now();
    let result = call.await;

    let outcome = match &result {
        Ok(value) if value.is_empty() => "empty",
        Ok(_) => "success",
        Err(_) => "error",
    };
    state
        .metrics
        .record_broker_operation(operation, outcome, start.elapsed());

    result
}
