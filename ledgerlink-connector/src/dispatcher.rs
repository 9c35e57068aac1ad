//! # Event Dispatcher
//!
//! The `Dispatcher` is a background worker that owns the node's confirmation
//! stream and fans every confirmed transaction out to the registered listeners.
//!
//! ## Delivery
//! Events are handled strictly one at a time, in the order the node confirmed
//! them. For each event the dispatcher takes a fresh [`SubscriptionRegistry`]
//! snapshot and invokes the listeners in registration order. A failing or
//! panicking listener is logged and skipped.
//!
//! ## Connection lifecycle
//! ```text
//! Idle ──open──▶ Streaming ──lost──▶ Reconnecting ──open──▶ Streaming
//!                                        │
//!                                        └─policy exhausted─▶ Failed
//! ```
//! `Streaming` is reported once the node has acknowledged the subscription, so
//! anything confirmed from then on reaches the listeners. The dispatcher
//! remembers the cursor of the last delivered confirmation (or, before the
//! first one, the node's tip or its empty genesis) and asks the node to replay
//! everything after it when reconnecting, dropping anything it has already
//! seen. `Stopped` is entered on shutdown from any state.

use crate::{
    config::{ConnectorConfig, ReconnectConfig},
    error::Error,
    events::{try_decode_frame, ConfirmationEvent, StreamFrame},
    protocol::{self, StreamStart, SubscribeRequest},
    registry::SubscriptionRegistry,
    transport::{FrameStream, Method, Transport},
};
use futures::StreamExt;
use std::{
    fmt,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::Arc,
};
use tokio::{
    sync::{mpsc, watch},
    time::sleep,
};

/// The observable state of the confirmation stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not yet connected.
    Idle,
    /// Receiving confirmations.
    Streaming,
    /// The stream was lost; `attempt` counts reconnection attempts so far.
    Reconnecting { attempt: u32 },
    /// The reconnection policy is exhausted. Nothing will be delivered until a
    /// new dispatcher takes over.
    Failed,
    /// Shut down on request.
    Stopped,
}

impl ConnectionState {
    /// Whether the dispatcher that reported this state has exited.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionState::Failed | ConnectionState::Stopped)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Idle => f.write_str("idle"),
            ConnectionState::Streaming => f.write_str("streaming"),
            ConnectionState::Reconnecting { attempt } => write!(f, "reconnecting (attempt {attempt})"),
            ConnectionState::Failed => f.write_str("connection lost"),
            ConnectionState::Stopped => f.write_str("stopped"),
        }
    }
}

/// Defines commands that can be sent to the Dispatcher task.
#[derive(Debug)]
pub enum DispatcherCommand {
    Shutdown,
}

#[derive(Clone, Debug)]
pub struct DispatcherHandle {
    command_tx: mpsc::Sender<DispatcherCommand>,
}

impl DispatcherHandle {
    pub async fn stop(&self) {
        if self
            .command_tx
            .send(DispatcherCommand::Shutdown)
            .await
            .is_err()
        {
            tracing::debug!("Failed to send shutdown to dispatcher: it may already be down");
        }
    }
}

/// Why a streaming session ended.
enum SessionEnd {
    Shutdown,
    Lost(String),
}

/// A background worker that routes confirmations from the node to listeners.
pub struct Dispatcher {
    transport: Arc<dyn Transport>,
    registry: Arc<SubscriptionRegistry>,
    policy: ReconnectConfig,
    command_rx: mpsc::Receiver<DispatcherCommand>,
    state_tx: Arc<watch::Sender<ConnectionState>>,
    /// Where the next subscription starts. `Live` only until the node first
    /// reports its tip.
    start: StreamStart,
}

impl Dispatcher {
    /// Creates a new `Dispatcher`.
    ///
    /// `start` lets a replacement dispatcher continue exactly where a previous
    /// one stopped. A zero command buffer is raised to one.
    pub fn new(
        transport: Arc<dyn Transport>,
        registry: Arc<SubscriptionRegistry>,
        config: &ConnectorConfig,
        state_tx: Arc<watch::Sender<ConnectionState>>,
        start: StreamStart,
    ) -> (Self, DispatcherHandle) {
        let buffer = config.channels.dispatcher_command_buffer.max(1);
        let (command_tx, command_rx) = mpsc::channel(buffer);
        let dispatcher = Self {
            transport,
            registry,
            policy: config.reconnect.clone(),
            command_rx,
            state_tx,
            start,
        };
        (dispatcher, DispatcherHandle { command_tx })
    }

    /// Runs the dispatcher until shutdown or until the reconnection policy is
    /// exhausted. Returns where a successor should resume.
    pub async fn run(mut self) -> StreamStart {
        tracing::info!("Dispatcher started. Opening confirmation stream...");
        self.set_state(ConnectionState::Idle);
        let mut attempt = 0u32;

        loop {
            let open = open_stream(self.transport.clone(), self.start);
            let opened = tokio::select! {
                biased;
                _ = self.command_rx.recv() => break,
                opened = open => opened,
            };

            match opened {
                Ok(stream) => {
                    match self.stream_session(stream, &mut attempt).await {
                        SessionEnd::Shutdown => break,
                        SessionEnd::Lost(reason) => {
                            tracing::warn!(start = ?self.start, "Confirmation stream lost: {}", reason);
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(attempt, "Failed to open confirmation stream: {}", e);
                }
            }

            attempt += 1;
            if attempt > self.policy.max_attempts {
                tracing::error!(
                    max_attempts = self.policy.max_attempts,
                    "Reconnection attempts exhausted. Confirmation delivery has stopped."
                );
                self.set_state(ConnectionState::Failed);
                return self.start;
            }

            self.set_state(ConnectionState::Reconnecting { attempt });
            let delay = self.policy.backoff(attempt);
            tracing::info!(attempt, ?delay, "Reconnecting to confirmation stream");
            tokio::select! {
                biased;
                _ = self.command_rx.recv() => break,
                _ = sleep(delay) => {}
            }
        }

        tracing::info!("Dispatcher shutting down.");
        self.set_state(ConnectionState::Stopped);
        self.start
    }

    /// Consumes one established stream until it ends or shutdown is requested.
    /// The node's subscription acknowledgement resets the attempt counter.
    async fn stream_session(&mut self, mut stream: FrameStream, attempt: &mut u32) -> SessionEnd {
        loop {
            tokio::select! {
                biased;
                // A closed command channel means the owning client is gone.
                _ = self.command_rx.recv() => return SessionEnd::Shutdown,
                frame = stream.next() => match frame {
                    Some(Ok(bytes)) => match try_decode_frame(&bytes) {
                        Ok(frame) => {
                            if matches!(frame, StreamFrame::Subscribed { .. }) {
                                *attempt = 0;
                                self.set_state(ConnectionState::Streaming);
                            }
                            self.handle_frame(frame);
                        }
                        Err(e) => return SessionEnd::Lost(e.to_string()),
                    },
                    Some(Err(e)) => return SessionEnd::Lost(e.to_string()),
                    None => return SessionEnd::Lost("stream closed by node".to_string()),
                },
            }
        }
    }

    fn handle_frame(&mut self, frame: StreamFrame) {
        match frame {
            StreamFrame::Subscribed { tip } => {
                tracing::debug!(?tip, start = ?self.start, "Subscribed to confirmations");
                if self.start == StreamStart::Live {
                    // An empty ledger has no tip; replaying from genesis then
                    // covers everything confirmed after this point.
                    self.start = tip.map_or(StreamStart::Genesis, StreamStart::After);
                }
            }
            StreamFrame::Confirmed(event) => self.dispatch(event),
        }
    }

    /// Delivers one confirmation to every listener registered right now.
    fn dispatch(&mut self, event: ConfirmationEvent) {
        let cursor = event.cursor();
        if matches!(self.start, StreamStart::After(last) if cursor <= last) {
            tracing::debug!(%cursor, "Skipping confirmation that was already delivered");
            return;
        }
        self.start = StreamStart::After(cursor);

        let txid = event.transaction.id();
        let listeners = self.registry.snapshot();
        tracing::debug!(%txid, %cursor, listeners = listeners.len(), "Dispatching confirmation");

        for (handle, listener) in listeners {
            match catch_unwind(AssertUnwindSafe(|| listener.process(&event.transaction))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!(%handle, %txid, "Listener failed to process transaction: {}", e);
                }
                Err(_) => {
                    tracing::warn!(%handle, %txid, "Listener panicked while processing transaction");
                }
            }
        }
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            tracing::info!(from = %previous, to = %state, "Connection state changed");
        }
    }
}

async fn open_stream(
    transport: Arc<dyn Transport>,
    start: StreamStart,
) -> Result<FrameStream, Error> {
    let request = protocol::encode(&SubscribeRequest { start })?;
    Ok(transport
        .open_stream(Method::SubscribeConfirmations, request)
        .await?)
}
