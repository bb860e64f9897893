pub mod channel;
pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use channel::{Channel, ChannelError, ChannelMap};
use config::Config;

/// Shared application state available to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub channels: Arc<ChannelMap>,
}

impl AppState {
    /// Build the state, creating every configured channel.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(config: Config) -> Result<Self, ChannelError> {
        let channels = ChannelMap::new();
        let seed = config.load_seed_history();
        let access = config.access_control();

        for name in &config.channels {
            let channel = Channel::with_collaborators(
                config.channel_options(name, seed.clone()),
                access.clone(),
                Arc::new(channel::events::TracingObserver),
            )?;
            channels.insert(channel);
        }

        Ok(Self {
            config: Arc::new(config),
            channels: Arc::new(channels),
        })
    }
}
