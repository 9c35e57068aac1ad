#![allow(dead_code)]

use ledgerlink_connector::{
    config::ConnectorConfig, Address, ConnectionState, LedgerClient, ListenerError, Transaction,
    TransactionId, TransactionInput, TransactionListener, TransactionOutput,
};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

/// How long a test waits for an expected signal before failing.
pub const WAIT: Duration = Duration::from_secs(5);

/// A configuration with short timeouts and a fast reconnect policy.
pub fn fast_config(max_attempts: u32) -> ConnectorConfig {
    let mut config = ConnectorConfig::default();
    config.request.timeout_ms = 500;
    config.request.max_retries = 0;
    config.request.retry_delay_ms = 10;
    config.reconnect.max_attempts = max_attempts;
    config.reconnect.base_delay_ms = 10;
    config.reconnect.max_delay_ms = 50;
    config
}

pub fn random_address() -> Address {
    Address::from_bytes(rand::random::<[u8; 20]>())
}

/// A fresh generation transaction paying to a new address.
pub fn new_transaction() -> Transaction {
    Transaction::builder()
        .input(TransactionInput::generation())
        .output(TransactionOutput::pay_to(random_address(), 0))
        .build()
        .unwrap()
}

/// Records every invocation and reports it on a channel.
pub struct RecordingListener {
    calls: AtomicUsize,
    delivered: mpsc::UnboundedSender<TransactionId>,
}

impl RecordingListener {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<TransactionId>) {
        let (delivered, rx) = mpsc::unbounded_channel();
        let listener = Arc::new(Self {
            calls: AtomicUsize::new(0),
            delivered,
        });
        (listener, rx)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl TransactionListener for RecordingListener {
    fn process(&self, tx: &Transaction) -> Result<(), ListenerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let _ = self.delivered.send(tx.id());
        Ok(())
    }
}

/// Waits for the next delivery reported by a [`RecordingListener`].
pub async fn next_delivery(rx: &mut mpsc::UnboundedReceiver<TransactionId>) -> TransactionId {
    timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for a delivery")
        .expect("listener channel closed")
}

pub async fn wait_for(client: &LedgerClient, expected: ConnectionState) {
    timeout(WAIT, client.wait_for_state(|state| *state == expected))
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for state {expected}"));
}

pub async fn wait_for_reconnecting(client: &LedgerClient) {
    timeout(
        WAIT,
        client.wait_for_state(|state| matches!(state, ConnectionState::Reconnecting { .. })),
    )
    .await
    .expect("timed out waiting for the dispatcher to reconnect");
}
