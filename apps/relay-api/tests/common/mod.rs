#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;
use futures_util::{Stream, StreamExt};
use tokio::time;

use relay_api::config::Config;
use relay_api::AppState;

/// Build a config from explicit variables on top of test defaults: two
/// channels and a keep-alive slow enough to stay out of the way.
pub fn test_config(vars: &[(&str, &str)]) -> Config {
    let mut all: HashMap<String, String> = HashMap::from([
        ("CHANNELS".to_string(), "news,alerts".to_string()),
        ("PING_INTERVAL_MS".to_string(), "60000".to_string()),
    ]);
    for (k, v) in vars {
        all.insert(k.to_string(), v.to_string());
    }
    Config::from_lookup(|name| all.get(name).cloned())
}

/// Build a test AppState with the default test channels.
pub async fn test_state() -> AppState {
    test_state_with(&[]).await
}

pub async fn test_state_with(vars: &[(&str, &str)]) -> AppState {
    AppState::new(test_config(vars)).expect("valid test config")
}

/// Full router with state applied.
pub fn app(state: AppState) -> Router {
    relay_api::routes::router().with_state(state)
}

pub async fn test_app() -> (Router, AppState) {
    let state = test_state().await;
    (app(state.clone()), state)
}

/// Start an actual TCP server for event-stream testing. The server runs in
/// the background.
pub async fn start_server(state: AppState) -> SocketAddr {
    let app = app(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    addr
}

/// Read chunks from `stream` until the accumulated text contains `needle`.
/// Returns everything read so far.
pub async fn read_until<S, B, E>(stream: &mut S, buffer: &mut String, needle: &str) -> String
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: std::fmt::Debug,
{
    time::timeout(Duration::from_secs(5), async {
        while !buffer.contains(needle) {
            let chunk = stream
                .next()
                .await
                .expect("stream ended early")
                .expect("stream read error");
            buffer.push_str(std::str::from_utf8(chunk.as_ref()).expect("utf-8 frame"));
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {needle:?}, got {buffer:?}"));
    buffer.clone()
}

/// Poll `check` until it holds or a few seconds pass.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        time::sleep(Duration::from_millis(20)).await;
    }
    check()
}
