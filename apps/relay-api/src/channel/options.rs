use std::time::Duration;

use relay_common::Message;

use super::error::ChannelError;

pub const DEFAULT_HISTORY_SIZE: usize = 500;
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(20);

/// Per-channel settings.
#[derive(Debug, Clone)]
pub struct ChannelOptions {
    /// Display name, used in logs and the HTTP API.
    pub name: String,
    /// Maximum number of replayable events kept.
    pub history_size: usize,
    /// Messages used to warm-start history, oldest first.
    pub history: Vec<Message>,
    /// Reconnect delay hint written during the handshake.
    pub retry: Option<Duration>,
    /// Interval of the keep-alive comment.
    pub ping_interval: Duration,
    /// Serialize non-string payloads as JSON.
    pub json_encode: bool,
}

impl ChannelOptions {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            history_size: DEFAULT_HISTORY_SIZE,
            history: Vec::new(),
            retry: None,
            ping_interval: DEFAULT_PING_INTERVAL,
            json_encode: false,
        }
    }

    pub fn validate(&self) -> Result<(), ChannelError> {
        if self.history_size == 0 {
            return Err(ChannelError::Configuration(
                "history size must be at least 1".to_string(),
            ));
        }
        if self.ping_interval.is_zero() {
            return Err(ChannelError::Configuration(
                "ping interval must be greater than zero".to_string(),
            ));
        }
        if self.retry.is_some_and(|r| r.as_millis() == 0) {
            return Err(ChannelError::Configuration(
                "retry hint must be at least 1ms".to_string(),
            ));
        }
        Ok(())
    }

    pub(crate) fn retry_ms(&self) -> Option<u64> {
        self.retry.map(|r| r.as_millis() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let opts = ChannelOptions::new("news");
        assert_eq!(opts.history_size, DEFAULT_HISTORY_SIZE);
        assert_eq!(opts.ping_interval, DEFAULT_PING_INTERVAL);
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn rejects_zero_capacity_and_interval() {
        let mut opts = ChannelOptions::new("news");
        opts.history_size = 0;
        assert!(matches!(opts.validate(), Err(ChannelError::Configuration(_))));

        let mut opts = ChannelOptions::new("news");
        opts.ping_interval = Duration::ZERO;
        assert!(matches!(opts.validate(), Err(ChannelError::Configuration(_))));

        let mut opts = ChannelOptions::new("news");
        opts.retry = Some(Duration::from_micros(10));
        assert!(matches!(opts.validate(), Err(ChannelError::Configuration(_))));
    }
}
