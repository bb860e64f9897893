use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::Method;
use relay_common::Message;

use crate::channel::cors::{AccessControl, CorsPolicy, Unrestricted};
use crate::channel::options::{ChannelOptions, DEFAULT_HISTORY_SIZE, DEFAULT_PING_INTERVAL};

/// Relay API configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port the HTTP server binds to.
    pub port: u16,
    /// Channels created at startup.
    pub channels: Vec<String>,
    /// Replayable events kept per channel.
    pub history_size: usize,
    /// Keep-alive comment interval.
    pub ping_interval: Duration,
    /// Reconnect delay hint sent on every handshake.
    pub retry: Option<Duration>,
    /// Serialize non-string payloads as JSON.
    pub json_encode: bool,
    /// JSON array of messages used to warm-start every channel's history.
    pub history_seed_file: Option<PathBuf>,
    /// Cross-origin policy. `None` means no cross-origin gate at all.
    pub cors: Option<CorsConfig>,
}

#[derive(Debug, Clone)]
pub struct CorsConfig {
    pub origins: Vec<String>,
    pub methods: Vec<Method>,
    pub headers: Vec<String>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Panics with a descriptive message if a variable is malformed.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let cors = var("CORS_ORIGINS").map(|origins| CorsConfig {
            origins: split_list(&origins),
            methods: var("CORS_METHODS")
                .map(|m| {
                    split_list(&m)
                        .iter()
                        .map(|method| parse_or_panic::<Method>("CORS_METHODS", method))
                        .collect()
                })
                .unwrap_or_else(|| vec![Method::GET, Method::HEAD]),
            headers: var("CORS_HEADERS")
                .map(|h| split_list(&h))
                .unwrap_or_else(|| vec!["Last-Event-ID".to_string()]),
        });

        Self {
            port: var("PORT")
                .map(|v| parse_or_panic("PORT", &v))
                .unwrap_or(4010),
            channels: var("CHANNELS")
                .map(|v| split_list(&v))
                .unwrap_or_else(|| vec!["events".to_string()]),
            history_size: var("HISTORY_SIZE")
                .map(|v| parse_or_panic("HISTORY_SIZE", &v))
                .unwrap_or(DEFAULT_HISTORY_SIZE),
            ping_interval: var("PING_INTERVAL_MS")
                .map(|v| Duration::from_millis(parse_or_panic("PING_INTERVAL_MS", &v)))
                .unwrap_or(DEFAULT_PING_INTERVAL),
            retry: var("RETRY_TIMEOUT_MS")
                .map(|v| Duration::from_millis(parse_or_panic("RETRY_TIMEOUT_MS", &v))),
            json_encode: var("JSON_ENCODE")
                .map(|v| parse_bool("JSON_ENCODE", &v))
                .unwrap_or(false),
            history_seed_file: var("HISTORY_SEED_FILE").map(PathBuf::from),
            cors,
        }
    }

    /// Options for the channel `name`, seeded with `history`.
    pub fn channel_options(&self, name: &str, history: Vec<Message>) -> ChannelOptions {
        ChannelOptions {
            name: name.to_string(),
            history_size: self.history_size,
            history,
            retry: self.retry,
            ping_interval: self.ping_interval,
            json_encode: self.json_encode,
        }
    }

    /// Read the warm-start history file, if one is configured.
    ///
    /// Panics if the file is unreadable or not a JSON array of messages.
    pub fn load_seed_history(&self) -> Vec<Message> {
        let Some(path) = &self.history_seed_file else {
            return Vec::new();
        };
        let raw = std::fs::read_to_string(path)
            .unwrap_or_else(|e| panic!("failed to read HISTORY_SEED_FILE {}: {e}", path.display()));
        serde_json::from_str(&raw).unwrap_or_else(|e| {
            panic!("HISTORY_SEED_FILE {} is not a message list: {e}", path.display())
        })
    }

    pub fn access_control(&self) -> Arc<dyn AccessControl> {
        match &self.cors {
            Some(cors) => Arc::new(CorsPolicy::new(
                cors.origins.clone(),
                cors.methods.clone(),
                cors.headers.clone(),
            )),
            None => Arc::new(Unrestricted),
        }
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_or_panic<T: FromStr>(name: &str, raw: &str) -> T {
    raw.trim()
        .parse()
        .unwrap_or_else(|_| panic!("{name} has an invalid value: {raw:?}"))
}

fn parse_bool(name: &str, raw: &str) -> bool {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => panic!("{name} must be a boolean, got {raw:?}"),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults() {
        let config = config(&[]);
        assert_eq!(config.port, 4010);
        assert_eq!(config.channels, vec!["events"]);
        assert_eq!(config.history_size, DEFAULT_HISTORY_SIZE);
        assert_eq!(config.ping_interval, DEFAULT_PING_INTERVAL);
        assert!(config.retry.is_none());
        assert!(!config.json_encode);
        assert!(config.cors.is_none());
        assert!(config.load_seed_history().is_empty());
    }

    #[test]
    fn reads_every_option() {
        let config = config(&[
            ("PORT", "9000"),
            ("CHANNELS", "news, alerts,,"),
            ("HISTORY_SIZE", "25"),
            ("PING_INTERVAL_MS", "1500"),
            ("RETRY_TIMEOUT_MS", "3000"),
            ("JSON_ENCODE", "true"),
            ("CORS_ORIGINS", "https://a.example,https://b.example"),
            ("CORS_METHODS", "GET"),
        ]);

        assert_eq!(config.port, 9000);
        assert_eq!(config.channels, vec!["news", "alerts"]);
        assert_eq!(config.history_size, 25);
        assert_eq!(config.ping_interval, Duration::from_millis(1500));
        assert_eq!(config.retry, Some(Duration::from_millis(3000)));
        assert!(config.json_encode);

        let cors = config.cors.as_ref().unwrap();
        assert_eq!(cors.origins, vec!["https://a.example", "https://b.example"]);
        assert_eq!(cors.methods, vec![Method::GET]);
        assert_eq!(cors.headers, vec!["Last-Event-ID"]);

        let opts = config.channel_options("news", Vec::new());
        assert_eq!(opts.name, "news");
        assert_eq!(opts.history_size, 25);
        assert!(opts.validate().is_ok());
    }

    #[test]
    #[should_panic(expected = "HISTORY_SIZE")]
    fn malformed_numbers_panic() {
        config(&[("HISTORY_SIZE", "lots")]);
    }

    #[test]
    #[should_panic(expected = "JSON_ENCODE")]
    fn malformed_bool_panics() {
        config(&[("JSON_ENCODE", "maybe")]);
    }

    #[test]
    fn loads_seed_history_file() {
        let path = std::env::temp_dir().join(format!("relay-seed-{}.json", std::process::id()));
        std::fs::write(&path, r#"[{"id": 1, "data": "a"}, {"id": -2, "data": "b"}]"#).unwrap();

        let config = config(&[("HISTORY_SEED_FILE", path.to_str().unwrap())]);
        let history = config.load_seed_history();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(history.len(), 2);
        assert_eq!(history[1].data, serde_json::json!("b"));
        assert_eq!(history[1].id.as_ref().map(ToString::to_string).as_deref(), Some("-2"));
    }
}
