//! # Ledger Client
//!
//! [`LedgerClient`] is the public entry point of the connector. It owns the
//! [`RequestGateway`] for unary calls, the [`SubscriptionRegistry`] and the
//! background [`Dispatcher`] that delivers confirmations to listeners.
//!
//! The transport is injected, so tests and applications decide how the node is
//! reached:
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use ledgerlink_connector::{client::LedgerClient, config::ConnectorConfig, testing::InMemoryNode};
//! # async fn demo() -> ledgerlink_connector::Result<()> {
//! let node = Arc::new(InMemoryNode::new());
//! let client = LedgerClient::connect(node, ConnectorConfig::default()).await?;
//! let height = client.chain_height().await?;
//! # Ok(()) }
//! ```

use crate::{
    config::ConnectorConfig,
    dispatcher::{ConnectionState, Dispatcher, DispatcherHandle},
    error::{Error, Result},
    gateway::RequestGateway,
    protocol::StreamStart,
    listener::{ListenerHandle, TransactionListener},
    registry::SubscriptionRegistry,
    transaction::{Transaction, TransactionId},
    transport::Transport,
};
use std::sync::Arc;
use tokio::{
    sync::{watch, Mutex},
    task::JoinHandle,
};

/// The dispatcher currently serving this client.
struct DispatcherSlot {
    handle: DispatcherHandle,
    task: JoinHandle<StreamStart>,
}

/// A client for a remote ledger node.
pub struct LedgerClient {
    gateway: RequestGateway,
    registry: Arc<SubscriptionRegistry>,
    transport: Arc<dyn Transport>,
    config: Arc<ConnectorConfig>,
    state_tx: Arc<watch::Sender<ConnectionState>>,
    state_rx: watch::Receiver<ConnectionState>,
    dispatcher: Mutex<DispatcherSlot>,
}

impl LedgerClient {
    /// Creates a client and spawns its dispatcher onto the current tokio runtime.
    ///
    /// Returns before the confirmation feed is subscribed: transactions
    /// confirmed until the state first becomes [`ConnectionState::Streaming`]
    /// are not delivered. Use [`LedgerClient::connect`] to wait for that.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a tokio runtime.
    pub fn new(transport: Arc<dyn Transport>, config: ConnectorConfig) -> Self {
        let config = Arc::new(config);
        let registry = Arc::new(SubscriptionRegistry::new());
        let (state_tx, state_rx) = watch::channel(ConnectionState::Idle);
        let state_tx = Arc::new(state_tx);

        let slot = spawn_dispatcher(
            &transport,
            &registry,
            &config,
            &state_tx,
            StreamStart::Live,
        );
        let gateway = RequestGateway::new(transport.clone(), config.request.clone());

        Self {
            gateway,
            registry,
            transport,
            config,
            state_tx,
            state_rx,
            dispatcher: Mutex::new(slot),
        }
    }

    /// Creates a client and waits until its confirmation feed is subscribed,
    /// so every transaction confirmed after this returns reaches the listeners
    /// registered at that time.
    ///
    /// # Errors
    ///
    /// [`Error::Connection`] if the reconnection policy is exhausted before the
    /// node acknowledges the subscription.
    pub async fn connect(transport: Arc<dyn Transport>, config: ConnectorConfig) -> Result<Self> {
        let client = Self::new(transport, config);
        let state = client
            .wait_for_state(|state| *state == ConnectionState::Streaming || state.is_terminal())
            .await;
        if state == ConnectionState::Streaming {
            return Ok(client);
        }
        client.shutdown().await;
        Err(Error::Connection(format!(
            "confirmation stream unavailable: {state}"
        )))
    }

    /// Returns the node's current chain height.
    pub async fn chain_height(&self) -> Result<u64> {
        self.gateway.chain_height().await
    }

    /// Looks up a transaction. `Ok(None)` means the node has no record of it.
    pub async fn get_transaction(&self, id: TransactionId) -> Result<Option<Transaction>> {
        self.gateway.get_transaction(id).await
    }

    /// Submits a transaction. Returns on acknowledgement, not on confirmation;
    /// register a listener to learn about the confirmation.
    pub async fn send_transaction(&self, tx: &Transaction) -> Result<()> {
        self.gateway.send_transaction(tx).await
    }

    /// Registers a listener for confirmed transactions.
    ///
    /// Registration always succeeds, even when the connection is lost; the
    /// listener simply receives nothing until delivery resumes.
    pub fn register_transaction_listener(
        &self,
        listener: Arc<dyn TransactionListener>,
    ) -> ListenerHandle {
        self.registry.register(listener)
    }

    /// Removes a registration. After this returns, no new delivery will reach
    /// the listener through this handle. Returns `false` for unknown handles.
    pub fn remove_transaction_listener(&self, handle: ListenerHandle) -> bool {
        self.registry.unregister(handle)
    }

    pub fn listener_count(&self) -> usize {
        self.registry.len()
    }

    /// The current state of the confirmation stream.
    pub fn connection_state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// A receiver that observes every state change of the confirmation stream.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Waits until the connection state satisfies `predicate` and returns it.
    pub async fn wait_for_state<F>(&self, mut predicate: F) -> ConnectionState
    where
        F: FnMut(&ConnectionState) -> bool,
    {
        let mut rx = self.state_rx.clone();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let state = match rx.wait_for(|state| predicate(state)).await {
            Ok(state) => *state,
            Err(_) => self.connection_state(),
        };
        state
    }

    /// Replaces a dispatcher that gave up with a fresh one, which resumes after
    /// the last confirmation the old one delivered.
    ///
    /// Returns `false` (and does nothing) unless the state is
    /// [`ConnectionState::Failed`].
    pub async fn restart_dispatcher(&self) -> bool {
        let mut slot = self.dispatcher.lock().await;
        if self.connection_state() != ConnectionState::Failed {
            return false;
        }

        let start = match (&mut slot.task).await {
            Ok(start) => start,
            Err(e) => {
                tracing::error!("Previous dispatcher task ended abnormally: {}", e);
                StreamStart::Live
            }
        };

        tracing::info!(?start, "Starting a new dispatcher");
        *slot = spawn_dispatcher(
            &self.transport,
            &self.registry,
            &self.config,
            &self.state_tx,
            start,
        );
        true
    }

    /// Stops the dispatcher and waits for it to exit. The state ends as
    /// [`ConnectionState::Stopped`], also when the dispatcher had already
    /// failed. Unary calls already in flight on other tasks complete normally.
    pub async fn shutdown(self) {
        let slot = self.dispatcher.into_inner();
        slot.handle.stop().await;
        if let Err(e) = slot.task.await {
            tracing::error!("Dispatcher task ended abnormally: {}", e);
        }
        self.state_tx.send_replace(ConnectionState::Stopped);
        tracing::info!("Ledger client shut down.");
    }
}

fn spawn_dispatcher(
    transport: &Arc<dyn Transport>,
    registry: &Arc<SubscriptionRegistry>,
    config: &ConnectorConfig,
    state_tx: &Arc<watch::Sender<ConnectionState>>,
    start: StreamStart,
) -> DispatcherSlot {
    let (dispatcher, handle) = Dispatcher::new(
        transport.clone(),
        registry.clone(),
        config,
        state_tx.clone(),
        start,
    );
    let task = tokio::spawn(dispatcher.run());
    DispatcherSlot { handle, task }
}
