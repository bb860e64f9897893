//! Channel inspection and publish endpoints.

use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use relay_common::{EventId, Message};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use crate::channel::registry::ConnectionId;
use crate::channel::{Channel, PublishReceipt};
use crate::error::{ApiError, ApiErrorBody, FieldError};
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/channels", get(list_channels))
        .route("/channels/{name}", get(get_channel))
        .route("/channels/{name}/messages", post(publish_message))
        .route("/channels/{name}/retry", post(send_retry_hint))
}

fn lookup(state: &AppState, name: &str) -> Result<Channel, ApiError> {
    state
        .channels
        .get(name)
        .ok_or_else(|| ApiError::not_found("Channel not found"))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ChannelStats {
    pub name: String,
    /// Live connections.
    pub connections: usize,
    /// Events currently stored for replay.
    pub history: usize,
    /// Maximum events stored for replay.
    pub history_size: usize,
}

impl From<&Channel> for ChannelStats {
    fn from(channel: &Channel) -> Self {
        Self {
            name: channel.name().to_string(),
            connections: channel.connection_count(),
            history: channel.history_len(),
            history_size: channel.options().history_size,
        }
    }
}

// ---------------------------------------------------------------------------
// GET /api/v1/channels
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/api/v1/channels",
    tag = "Channels",
    responses(
        (status = 200, description = "All hosted channels", body = Vec<ChannelStats>),
    ),
)]
pub async fn list_channels(State(state): State<AppState>) -> Json<Vec<ChannelStats>> {
    Json(state.channels.list().iter().map(ChannelStats::from).collect())
}

// ---------------------------------------------------------------------------
// GET /api/v1/channels/:name
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/api/v1/channels/{name}",
    tag = "Channels",
    params(("name" = String, Path, description = "Channel name")),
    responses(
        (status = 200, description = "Channel stats", body = ChannelStats),
        (status = 404, description = "Channel not found", body = ApiErrorBody),
    ),
)]
pub async fn get_channel(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<ChannelStats>, ApiError> {
    let channel = lookup(&state, &name)?;
    Ok(Json(ChannelStats::from(&channel)))
}

// ---------------------------------------------------------------------------
// POST /api/v1/channels/:name/messages
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct PublishRequest {
    /// String payloads are sent verbatim; other JSON values are rendered as
    /// text (or JSON when the channel has JSON encoding on).
    #[serde(default)]
    #[schema(value_type = Object)]
    pub data: Value,
    /// Replay id. Unset, `0` or `""` means the message is live-only.
    #[schema(value_type = Option<String>)]
    pub id: Option<EventId>,
    pub event: Option<String>,
    /// Reconnect delay hint in milliseconds.
    pub retry: Option<u64>,
    /// Deliver only to these connections and skip history.
    pub connections: Option<Vec<u64>>,
}

#[utoipa::path(
    post,
    path = "/api/v1/channels/{name}/messages",
    tag = "Channels",
    params(("name" = String, Path, description = "Channel name")),
    request_body = PublishRequest,
    responses(
        (status = 202, description = "Message queued", body = PublishReceipt),
        (status = 400, description = "Validation error", body = ApiErrorBody),
        (status = 404, description = "Channel not found", body = ApiErrorBody),
    ),
)]
pub async fn publish_message(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(body): Json<PublishRequest>,
) -> Result<(StatusCode, Json<PublishReceipt>), ApiError> {
    let channel = lookup(&state, &name)?;

    // Field values become single wire lines; a line break would split them.
    let mut errors = Vec::new();
    if body.event.as_deref().is_some_and(has_line_break) {
        errors.push(FieldError {
            field: "event".to_string(),
            message: "Event name must not contain line breaks".to_string(),
        });
    }
    if let Some(EventId::Token(token)) = &body.id {
        if has_line_break(token) {
            errors.push(FieldError {
                field: "id".to_string(),
                message: "Event id must not contain line breaks".to_string(),
            });
        }
    }
    if !errors.is_empty() {
        return Err(ApiError::validation(errors));
    }

    let message = Message {
        data: body.data,
        id: body.id,
        event: body.event,
        retry: body.retry,
    };

    let receipt = match body.connections {
        Some(targets) => {
            let targets: Vec<ConnectionId> = targets.into_iter().map(ConnectionId::from).collect();
            channel.publish_to(&message, &targets)
        }
        None => channel.publish(&message),
    };

    Ok((StatusCode::ACCEPTED, Json(receipt)))
}

fn has_line_break(value: &str) -> bool {
    value.contains(['\n', '\r'])
}

// ---------------------------------------------------------------------------
// POST /api/v1/channels/:name/retry
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct RetryHintRequest {
    /// New reconnect delay in milliseconds.
    pub retry: u64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RetryHintResponse {
    pub delivered: usize,
}

#[utoipa::path(
    post,
    path = "/api/v1/channels/{name}/retry",
    tag = "Channels",
    params(("name" = String, Path, description = "Channel name")),
    request_body = RetryHintRequest,
    responses(
        (status = 202, description = "Retry hint sent", body = RetryHintResponse),
        (status = 400, description = "Validation error", body = ApiErrorBody),
        (status = 404, description = "Channel not found", body = ApiErrorBody),
    ),
)]
pub async fn send_retry_hint(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(body): Json<RetryHintRequest>,
) -> Result<(StatusCode, Json<RetryHintResponse>), ApiError> {
    let channel = lookup(&state, &name)?;

    if body.retry == 0 {
        return Err(ApiError::validation(vec![FieldError {
            field: "retry".to_string(),
            message: "Retry must be at least 1ms".to_string(),
        }]));
    }

    let delivery = channel.retry_hint(Duration::from_millis(body.retry));
    Ok((
        StatusCode::ACCEPTED,
        Json(RetryHintResponse {
            delivered: delivery.delivered,
        }),
    ))
}
