//! Live connection set for a channel.
//!
//! A [`Connection`] is the write half handed to the registry; the matching
//! [`ConnectionStream`] is the read half the HTTP layer turns into a response
//! body. Writes are queued and never awaited.

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_util::future::join_all;
use futures_util::Stream;
use tokio::sync::mpsc;

use super::error::ChannelError;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique, monotonically increasing connection identifier. Registry
/// order is id order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl From<u64> for ConnectionId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug)]
enum Outbound {
    Frame(Bytes),
    Close,
}

/// Write half of a client stream.
#[derive(Debug, Clone)]
pub struct Connection {
    id: ConnectionId,
    tx: mpsc::UnboundedSender<Outbound>,
}

impl Connection {
    /// Open a new stream pair.
    pub fn open() -> (Connection, ConnectionStream) {
        let id = ConnectionId::next();
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Connection { id, tx },
            ConnectionStream {
                id,
                rx,
                close_hooks: Vec::new(),
            },
        )
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Queue a frame. Fails only when the read half is gone.
    pub fn write(&self, frame: Bytes) -> Result<(), ChannelError> {
        self.tx
            .send(Outbound::Frame(frame))
            .map_err(|_| ChannelError::TransportWrite {
                connection_id: self.id,
            })
    }

    /// Ask the stream to end after the frames already queued.
    pub fn close(&self) {
        let _ = self.tx.send(Outbound::Close);
    }

    /// Resolves once the read half has ended or been dropped.
    pub fn closed(&self) -> impl Future<Output = ()> + Send + 'static {
        let tx = self.tx.clone();
        async move { tx.closed().await }
    }

    #[cfg(test)]
    pub(crate) fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Callback run when a stream ends or is dropped. May run more than once for
/// the same stream, so it must be idempotent.
pub type CloseHook = Arc<dyn Fn(ConnectionId) + Send + Sync>;

/// Read half of a client stream; yields frames until closed.
pub struct ConnectionStream {
    id: ConnectionId,
    rx: mpsc::UnboundedReceiver<Outbound>,
    close_hooks: Vec<CloseHook>,
}

impl ConnectionStream {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Register a callback for when this stream ends or is dropped.
    pub fn on_close(&mut self, hook: CloseHook) {
        self.close_hooks.push(hook);
    }

    fn fire_close_hooks(&self) {
        for hook in &self.close_hooks {
            hook(self.id);
        }
    }

    /// Frames queued so far, without waiting.
    #[cfg(test)]
    pub(crate) fn drain_ready(&mut self) -> Vec<Bytes> {
        let mut frames = Vec::new();
        while let Ok(outbound) = self.rx.try_recv() {
            match outbound {
                Outbound::Frame(frame) => frames.push(frame),
                Outbound::Close => break,
            }
        }
        frames
    }
}

impl Stream for ConnectionStream {
    type Item = Result<Bytes, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.rx.poll_recv(cx) {
            Poll::Ready(Some(Outbound::Frame(frame))) => Poll::Ready(Some(Ok(frame))),
            Poll::Ready(Some(Outbound::Close)) | Poll::Ready(None) => {
                self.rx.close();
                self.fire_close_hooks();
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for ConnectionStream {
    fn drop(&mut self) {
        self.fire_close_hooks();
    }
}

/// Outcome of writing one frame to many connections.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub delivered: usize,
    /// Writes that failed. Those connections are already removed from the
    /// registry.
    pub failures: Vec<ChannelError>,
}

impl Delivery {
    /// Connections removed because their write failed.
    pub fn dropped(&self) -> impl Iterator<Item = ConnectionId> + '_ {
        self.failures.iter().filter_map(|err| match err {
            ChannelError::TransportWrite { connection_id } => Some(*connection_id),
            ChannelError::Configuration(_) => None,
        })
    }

    fn fail(&mut self, err: ChannelError) {
        self.failures.push(err);
    }
}

/// Order-preserving set of live connections.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: BTreeMap<ConnectionId, Connection>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, connection: Connection) {
        self.connections.insert(connection.id(), connection);
    }

    /// Remove a connection. Removing an unknown or already-removed id is a
    /// no-op and returns `None`.
    pub fn remove(&mut self, id: ConnectionId) -> Option<Connection> {
        self.connections.remove(&id)
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, id: ConnectionId) -> bool {
        self.connections.contains_key(&id)
    }

    pub fn count(&self) -> usize {
        self.connections.len()
    }

    #[cfg(test)]
    pub(crate) fn ids(&self) -> Vec<ConnectionId> {
        self.connections.keys().copied().collect()
    }

    /// Write `frame` to every connection in registry order. A failed write
    /// removes that connection and delivery continues with the rest.
    pub fn broadcast(&mut self, frame: &Bytes) -> Delivery {
        let mut delivery = Delivery::default();
        for connection in self.connections.values() {
            match connection.write(frame.clone()) {
                Ok(()) => delivery.delivered += 1,
                Err(err) => delivery.fail(err),
            }
        }
        self.prune(&delivery);
        delivery
    }

    /// Write `frame` only to `targets` that are still registered.
    pub fn send_to(&mut self, targets: &[ConnectionId], frame: &Bytes) -> Delivery {
        let mut delivery = Delivery::default();
        for id in targets {
            let Some(connection) = self.connections.get(id) else {
                continue;
            };
            match connection.write(frame.clone()) {
                Ok(()) => delivery.delivered += 1,
                Err(err) => delivery.fail(err),
            }
        }
        self.prune(&delivery);
        delivery
    }

    fn prune(&mut self, delivery: &Delivery) {
        for id in delivery.dropped() {
            self.connections.remove(&id);
        }
    }

    /// Close every connection. The returned future resolves once all of
    /// them have ended, or immediately if none are live.
    pub fn close_all(&self) -> impl Future<Output = ()> + Send + 'static {
        let waits: Vec<_> = self
            .connections
            .values()
            .map(|connection| {
                connection.close();
                connection.closed()
            })
            .collect();
        async move {
            join_all(waits).await;
        }
    }
}
