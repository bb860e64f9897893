use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::serve::ListenerExt;
use axum::Router;
use tokio::net::TcpSocket;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use relay_api::channel::ChannelMap;
use relay_api::config::Config;
use relay_api::AppState;

#[tokio::main]
async fn main() {
    // Load .env file (silently skip if missing; env vars may be set externally)
    if dotenvy::dotenv().is_err() {
        let env_path = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(env_path);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    let port = config.port;

    let state = AppState::new(config).expect("invalid channel configuration");
    tracing::info!(
        channels = ?state.config.channels,
        history_size = state.config.history_size,
        ping_interval_ms = state.config.ping_interval.as_millis() as u64,
        "relay-api configured"
    );

    let channels = state.channels.clone();
    let app = Router::new()
        .merge(relay_api::routes::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "relay-api listening");

    // Accepted sockets inherit SO_KEEPALIVE from the listener. Streams are
    // long-lived, so no idle timeout is applied anywhere.
    let socket = TcpSocket::new_v4().expect("failed to create socket");
    socket.set_reuseaddr(true).expect("failed to set SO_REUSEADDR");
    socket.set_keepalive(true).expect("failed to set SO_KEEPALIVE");
    socket.bind(addr).expect("failed to bind");
    let listener = socket
        .listen(1024)
        .expect("failed to listen")
        .tap_io(|tcp| {
            if let Err(err) = tcp.set_nodelay(true) {
                tracing::warn!(?err, "failed to set TCP_NODELAY");
            }
        });

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(channels))
        .await
        .expect("server error");
}

async fn shutdown_signal(channels: Arc<ChannelMap>) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(?err, "failed to listen for shutdown signal");
        return;
    }
    tracing::info!(channels = channels.len(), "shutting down, closing event streams");
    channels.shutdown().await;
}
