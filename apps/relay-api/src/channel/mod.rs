//! Broadcast channels: connection registry, replay history, and the HTTP
//! event-stream endpoint.

pub mod cors;
pub mod error;
pub mod events;
pub mod handshake;
pub mod history;
pub mod hub;
pub mod map;
pub mod options;
pub mod registry;
pub mod server;

pub use error::ChannelError;
pub use hub::{Channel, ConnectOutcome, PublishReceipt};
pub use map::ChannelMap;
pub use options::ChannelOptions;
