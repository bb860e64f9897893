use std::fmt;

use super::registry::ConnectionId;

/// Failures raised by the channel core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// Invalid channel options, reported at construction.
    Configuration(String),
    /// A write to one connection failed because its stream is gone.
    TransportWrite { connection_id: ConnectionId },
}

impl fmt::Display for ChannelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration(reason) => write!(f, "invalid channel configuration: {reason}"),
            Self::TransportWrite { connection_id } => {
                write!(f, "write to connection {connection_id} failed")
            }
        }
    }
}

impl std::error::Error for ChannelError {}
