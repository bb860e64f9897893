//! Event-stream endpoint: turns an HTTP request into a channel connection.

use std::collections::HashMap;

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;

use crate::error::ApiError;
use crate::AppState;

use super::handshake::{stream_headers, HandshakeRequest, CONNECTION_ID_HEADER};
use super::hub::{Channel, ConnectOutcome};

pub fn router() -> Router<AppState> {
    Router::new().route(
        "/channels/{name}/events",
        get(stream_events).options(preflight),
    )
}

fn lookup(state: &AppState, name: &str) -> Result<Channel, ApiError> {
    state
        .channels
        .get(name)
        .ok_or_else(|| ApiError::not_found("Channel not found"))
}

async fn stream_events(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    method: Method,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let channel = lookup(&state, &name)?;
    let request = HandshakeRequest::new(method, headers, query);

    let stream = match channel.connect(&request) {
        ConnectOutcome::Accepted(stream) => stream,
        ConnectOutcome::Rejected => return Err(ApiError::forbidden("Origin not allowed")),
    };

    let mut response_headers = stream_headers();
    response_headers.extend(channel.access().response_headers(&request));
    response_headers.insert(
        HeaderName::from_static(CONNECTION_ID_HEADER),
        HeaderValue::from(stream.id().as_u64()),
    );

    Ok((response_headers, Body::from_stream(stream)).into_response())
}

async fn preflight(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let channel = lookup(&state, &name)?;
    let request = HandshakeRequest::new(Method::OPTIONS, headers, query);
    if !channel.access().allows(&request) {
        return Err(ApiError::forbidden("Origin not allowed"));
    }

    Ok((
        StatusCode::NO_CONTENT,
        channel.access().response_headers(&request),
    )
        .into_response())
}
