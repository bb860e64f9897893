//! Named channels hosted by this process.

use dashmap::DashMap;
use futures_util::future::join_all;

use super::hub::Channel;

/// Shared lookup of channels by name.
///
/// Uses `DashMap` for shard-level concurrency; each `Channel` guards its own
/// state.
#[derive(Default)]
pub struct ChannelMap {
    channels: DashMap<String, Channel>,
}

impl ChannelMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a channel under its name, replacing any previous one.
    pub fn insert(&self, channel: Channel) -> Option<Channel> {
        self.channels.insert(channel.name().to_string(), channel)
    }

    pub fn get(&self, name: &str) -> Option<Channel> {
        self.channels.get(name).map(|entry| entry.value().clone())
    }

    /// All channels, sorted by name.
    pub fn list(&self) -> Vec<Channel> {
        let mut channels: Vec<Channel> = self.channels.iter().map(|e| e.value().clone()).collect();
        channels.sort_by(|a, b| a.name().cmp(b.name()));
        channels
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Stop every channel's beat and wait for all of their connections to
    /// close.
    pub async fn shutdown(&self) {
        let closing: Vec<_> = self.list().iter().map(Channel::shutdown).collect();
        join_all(closing).await;
    }
}

#[cfg(test)]
mod tests {
    use super::super::options::ChannelOptions;
    use super::*;

    #[tokio::test]
    async fn insert_get_list() {
        let map = ChannelMap::new();
        map.insert(Channel::new(ChannelOptions::new("b")).unwrap());
        map.insert(Channel::new(ChannelOptions::new("a")).unwrap());

        assert_eq!(map.len(), 2);
        assert!(map.get("a").is_some());
        assert!(map.get("missing").is_none());
        let names: Vec<String> = map.list().iter().map(|c| c.name().to_string()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn shutdown_stops_every_beat() {
        let map = ChannelMap::new();
        map.insert(Channel::new(ChannelOptions::new("a")).unwrap());
        map.shutdown().await;
        assert!(!map.get("a").unwrap().stop_beat());
    }
}
