//! Channel lifecycle notifications.

use relay_common::Message;

use super::handshake::HandshakeRequest;
use super::hub::Channel;
use super::registry::{Connection, ConnectionId, Delivery};

/// Receives connect, disconnect and message notifications.
///
/// Called synchronously on the thread doing the work and never while the
/// channel's internal lock is held. Implementations that need to do async
/// work should hand off to a queue.
pub trait ChannelObserver: Send + Sync {
    fn on_connect(
        &self,
        _channel: &Channel,
        _request: &HandshakeRequest,
        _connection: &Connection,
    ) {
    }

    fn on_disconnect(&self, _channel: &Channel, _connection_id: ConnectionId) {}

    fn on_message(&self, _channel: &Channel, _message: &Message, _delivery: &Delivery) {}
}

/// Logs every notification through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl ChannelObserver for TracingObserver {
    fn on_connect(&self, channel: &Channel, request: &HandshakeRequest, connection: &Connection) {
        tracing::info!(
            channel = %channel.name(),
            connection_id = %connection.id(),
            origin = request.origin().unwrap_or("-"),
            connections = channel.connection_count(),
            "client connected"
        );
    }

    fn on_disconnect(&self, channel: &Channel, connection_id: ConnectionId) {
        tracing::info!(
            channel = %channel.name(),
            %connection_id,
            connections = channel.connection_count(),
            "client disconnected"
        );
    }

    fn on_message(&self, channel: &Channel, message: &Message, delivery: &Delivery) {
        tracing::debug!(
            channel = %channel.name(),
            id = ?message.id,
            event = ?message.event,
            delivered = delivery.delivered,
            dropped = delivery.failures.len(),
            "message published"
        );
    }
}
