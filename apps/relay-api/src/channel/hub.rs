//! The channel orchestrator: handshake and replay for new clients, publish
//! fan-out, and the keep-alive beat.

use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use relay_common::{frame, EventId, Message};
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use super::cors::{AccessControl, Unrestricted};
use super::error::ChannelError;
use super::events::{ChannelObserver, TracingObserver};
use super::handshake::HandshakeRequest;
use super::history::HistoryBuffer;
use super::options::ChannelOptions;
use super::registry::{Connection, ConnectionId, ConnectionRegistry, ConnectionStream, Delivery};

/// Result of [`Channel::connect`].
pub enum ConnectOutcome {
    /// The client joined; stream the returned frames to it.
    Accepted(ConnectionStream),
    /// The access policy turned the client away. Nothing was registered.
    Rejected,
}

/// What happened to a single publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, utoipa::ToSchema)]
pub struct PublishReceipt {
    /// Connections the frame was queued on.
    pub delivered: usize,
    /// Whether the frame was kept for replay.
    pub stored: bool,
}

/// Registry and history share one lock so that a joining client's replay
/// and an ordinary broadcast can never interleave.
struct ChannelState {
    history: HistoryBuffer,
    connections: ConnectionRegistry,
}

struct Inner {
    options: ChannelOptions,
    access: Arc<dyn AccessControl>,
    observer: Arc<dyn ChannelObserver>,
    state: Mutex<ChannelState>,
    beat: Mutex<Option<JoinHandle<()>>>,
}

/// One broadcast domain. Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct Channel {
    inner: Arc<Inner>,
}

impl Channel {
    /// Create a channel with no cross-origin gate that logs its lifecycle.
    ///
    /// Must be called from within a tokio runtime: the keep-alive beat is
    /// started here.
    pub fn new(options: ChannelOptions) -> Result<Self, ChannelError> {
        Self::with_collaborators(options, Arc::new(Unrestricted), Arc::new(TracingObserver))
    }

    pub fn with_collaborators(
        options: ChannelOptions,
        access: Arc<dyn AccessControl>,
        observer: Arc<dyn ChannelObserver>,
    ) -> Result<Self, ChannelError> {
        options.validate()?;
        let runtime = Handle::try_current().map_err(|_| {
            ChannelError::Configuration(
                "channels must be created inside a tokio runtime".to_string(),
            )
        })?;

        let mut history = HistoryBuffer::new(options.history_size);
        history.seed(options.history.iter().filter_map(|message| {
            message
                .replay_id()
                .map(|id| (id.clone(), frame::format(message, options.json_encode)))
        }));

        let inner = Arc::new(Inner {
            state: Mutex::new(ChannelState {
                history,
                connections: ConnectionRegistry::new(),
            }),
            options,
            access,
            observer,
            beat: Mutex::new(None),
        });

        let beat = start_beat(Arc::downgrade(&inner), inner.options.ping_interval, &runtime);
        *inner.beat.lock() = Some(beat);

        tracing::debug!(
            channel = %inner.options.name,
            history_size = inner.options.history_size,
            ping_interval_ms = inner.options.ping_interval.as_millis() as u64,
            "channel created"
        );

        Ok(Self { inner })
    }

    pub fn name(&self) -> &str {
        &self.inner.options.name
    }

    pub fn options(&self) -> &ChannelOptions {
        &self.inner.options
    }

    pub fn access(&self) -> &dyn AccessControl {
        self.inner.access.as_ref()
    }

    pub fn connection_count(&self) -> usize {
        self.inner.state.lock().connections.count()
    }

    pub fn history_len(&self) -> usize {
        self.inner.state.lock().history.len()
    }

    /// Stored frames newer than `last_id`, oldest first.
    pub fn missed_since(&self, last_id: &EventId) -> Vec<Bytes> {
        self.inner.state.lock().history.missed_since(last_id)
    }

    /// Admit a client.
    ///
    /// Writes the handshake, registers the connection and, when the client
    /// asked to resume, replays the frames it missed to it alone. All of
    /// that happens before any later publish can reach the connection.
    pub fn connect(&self, request: &HandshakeRequest) -> ConnectOutcome {
        if !self.inner.access.allows(request) {
            tracing::debug!(
                channel = %self.name(),
                origin = request.origin().unwrap_or("-"),
                "connection rejected by access policy"
            );
            return ConnectOutcome::Rejected;
        }

        let (connection, mut stream) = Connection::open();
        let weak = Arc::downgrade(&self.inner);
        stream.on_close(Arc::new(move |id| {
            if let Some(inner) = weak.upgrade() {
                Channel { inner }.disconnect(id);
            }
        }));

        let handshake = frame::handshake(self.inner.options.retry_ms(), request.wants_padding());
        let resume_id = request.resume_id();

        let replayed = {
            let mut state = self.inner.state.lock();
            // The read half is still in hand, so these writes cannot fail.
            let _ = connection.write(handshake);
            state.connections.add(connection.clone());

            match &resume_id {
                Some(last_id) => {
                    let missed = state.history.missed_since(last_id);
                    let count = missed.len();
                    for frame in missed {
                        let _ = connection.write(frame);
                    }
                    count
                }
                None => 0,
            }
        };

        if let Some(last_id) = &resume_id {
            tracing::debug!(
                channel = %self.name(),
                connection_id = %connection.id(),
                last_event_id = %last_id,
                replayed,
                "replayed missed events"
            );
        }

        self.inner.observer.on_connect(self, request, &connection);
        ConnectOutcome::Accepted(stream)
    }

    /// Remove a connection. Safe to call any number of times; only the call
    /// that actually removes it notifies the observer.
    pub fn disconnect(&self, connection_id: ConnectionId) -> bool {
        let removed = self
            .inner
            .state
            .lock()
            .connections
            .remove(connection_id)
            .is_some();
        if removed {
            self.inner.observer.on_disconnect(self, connection_id);
        }
        removed
    }

    /// Format once, store if the message carries a set id, and broadcast to
    /// every live connection.
    pub fn publish(&self, message: &Message) -> PublishReceipt {
        let frame = frame::format(message, self.inner.options.json_encode);

        let (delivery, stored) = {
            let mut state = self.inner.state.lock();
            let stored = match message.replay_id() {
                Some(id) => state.history.append(id, frame.clone()),
                None => false,
            };
            (state.connections.broadcast(&frame), stored)
        };

        self.report_dropped(&delivery);
        self.inner.observer.on_message(self, message, &delivery);

        PublishReceipt {
            delivered: delivery.delivered,
            stored,
        }
    }

    /// Deliver to `targets` only. History is left untouched.
    pub fn publish_to(&self, message: &Message, targets: &[ConnectionId]) -> PublishReceipt {
        let frame = frame::format(message, self.inner.options.json_encode);
        let delivery = self.inner.state.lock().connections.send_to(targets, &frame);
        self.report_dropped(&delivery);

        PublishReceipt {
            delivered: delivery.delivered,
            stored: false,
        }
    }

    /// Tell every client to use a new reconnect delay.
    pub fn retry_hint(&self, retry: Duration) -> Delivery {
        self.broadcast(frame::retry_directive(retry.as_millis() as u64))
    }

    /// Send one keep-alive comment to every client.
    pub fn tick(&self) -> Delivery {
        self.broadcast(frame::keep_alive())
    }

    /// Close every connection. The future resolves once all streams ended.
    pub fn close(&self) -> impl Future<Output = ()> + Send + 'static {
        let done = self.inner.state.lock().connections.close_all();
        tracing::debug!(channel = %self.name(), "closing all connections");
        done
    }

    /// Stop the keep-alive beat. Returns `false` if it was already stopped.
    pub fn stop_beat(&self) -> bool {
        match self.inner.beat.lock().take() {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Stop the beat and close every connection.
    pub fn shutdown(&self) -> impl Future<Output = ()> + Send + 'static {
        self.stop_beat();
        self.close()
    }

    fn broadcast(&self, frame: Bytes) -> Delivery {
        let delivery = self.inner.state.lock().connections.broadcast(&frame);
        self.report_dropped(&delivery);
        delivery
    }

    fn report_dropped(&self, delivery: &Delivery) {
        for err in &delivery.failures {
            tracing::debug!(channel = %self.name(), %err, "dropping connection");
        }
        for connection_id in delivery.dropped() {
            self.inner.observer.on_disconnect(self, connection_id);
        }
    }
}

fn start_beat(inner: Weak<Inner>, period: Duration, runtime: &Handle) -> JoinHandle<()> {
    runtime.spawn(async move {
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let Some(inner) = inner.upgrade() else {
                break;
            };
            Channel { inner }.tick();
        }
    })
}
