pub mod channels;
pub mod health;

use axum::Router;
use utoipa::OpenApi;

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(crate::channel::server::router())
        .nest("/api/v1", channels::router())
}

#[derive(OpenApi)]
#[openapi(
    paths(
        // Health
        health::health,
        // Channels
        channels::list_channels,
        channels::get_channel,
        channels::publish_message,
        channels::send_retry_hint,
    ),
    components(
        schemas(
            // Error types
            crate::error::ApiErrorBody,
            crate::error::ApiErrorDetail,
            crate::error::FieldError,
            // Route request/response types
            health::HealthResponse,
            channels::ChannelStats,
            channels::PublishRequest,
            channels::RetryHintRequest,
            channels::RetryHintResponse,
            crate::channel::PublishReceipt,
        )
    ),
    tags(
        (name = "Health", description = "Health check"),
        (name = "Channels", description = "Channel stats and publishing"),
    )
)]
pub struct ApiDoc;
