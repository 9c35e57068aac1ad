//! # In-Memory Ledger Node
//!
//! A [`Transport`] that answers every request from an in-process ledger. It is
//! meant for tests and demos: it confirms each submitted transaction in its own
//! block immediately, serves the confirmation feed with replay, and can
//! simulate network faults.

use crate::{
    events::{ConfirmationEvent, Cursor, StreamFrame},
    protocol::{self, StreamStart, SubscribeRequest},
    transaction::{Address, OutPoint, Transaction, TransactionId, TransactionInput, TransactionOutput},
    transport::{FrameStream, Method, Transport, TransportError},
};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::{
    collections::{HashMap, HashSet},
    sync::{Mutex, MutexGuard},
};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

type FrameSender = mpsc::UnboundedSender<Result<Vec<u8>, TransportError>>;

struct NodeState {
    /// `blocks[h - 1]` holds the transactions confirmed at height `h`.
    blocks: Vec<Vec<Transaction>>,
    index: HashMap<TransactionId, Cursor>,
    spent: HashSet<OutPoint>,
    subscribers: Vec<FrameSender>,
    reachable: bool,
    failing_stream_opens: u32,
    stream_opens: u64,
}

impl NodeState {
    fn height(&self) -> u64 {
        self.blocks.len() as u64
    }

    fn tip(&self) -> Option<Cursor> {
        self.blocks
            .last()
            .map(|block| Cursor::new(self.height(), block.len().saturating_sub(1) as u32))
    }

    fn lookup(&self, id: &TransactionId) -> Option<&Transaction> {
        let cursor = self.index.get(id)?;
        self.blocks
            .get((cursor.height - 1) as usize)?
            .get(cursor.position as usize)
    }

    fn output_exists(&self, source: &OutPoint) -> bool {
        self.lookup(&source.txid)
            .is_some_and(|tx| (source.index as usize) < tx.outputs().len())
    }

    /// Checks a block against the ledger without modifying it.
    fn validate(&self, block: &[Transaction]) -> Result<(), TransportError> {
        let mut spending = HashSet::new();
        let mut seen = HashSet::new();
        for tx in block {
            if self.index.contains_key(&tx.id()) || !seen.insert(tx.id()) {
                return Err(TransportError::Rejected(format!(
                    "transaction {} is already known",
                    tx.id()
                )));
            }
            if tx.outputs().is_empty() {
                return Err(TransportError::Rejected(format!(
                    "transaction {} has no outputs",
                    tx.id()
                )));
            }
            if tx.outputs().iter().any(|o| o.amount < 0) {
                return Err(TransportError::Rejected(format!(
                    "transaction {} pays a negative amount",
                    tx.id()
                )));
            }
            for input in tx.inputs() {
                let source = input.source;
                if source.is_generation() {
                    continue;
                }
                if !self.output_exists(&source) {
                    return Err(TransportError::Rejected(format!(
                        "input {}:{} of {} does not exist",
                        source.txid,
                        source.index,
                        tx.id()
                    )));
                }
                if self.spent.contains(&source) || !spending.insert(source) {
                    return Err(TransportError::Rejected(format!(
                        "input {}:{} of {} is already spent",
                        source.txid,
                        source.index,
                        tx.id()
                    )));
                }
            }
        }
        Ok(())
    }

    fn append(&mut self, block: Vec<Transaction>) -> Vec<ConfirmationEvent> {
        let height = self.height() + 1;
        let events: Vec<_> = block
            .iter()
            .enumerate()
            .map(|(position, tx)| ConfirmationEvent {
                transaction: tx.clone(),
                height,
                position: position as u32,
            })
            .collect();

        for event in &events {
            self.index.insert(event.transaction.id(), event.cursor());
            self.spent.extend(
                event
                    .transaction
                    .inputs()
                    .iter()
                    .map(|input| input.source)
                    .filter(|source| !source.is_generation()),
            );
        }
        self.blocks.push(block);
        events
    }

    /// Every confirmation strictly after `after`, or all of them for `None`.
    fn events_after(&self, after: Option<Cursor>) -> Vec<ConfirmationEvent> {
        self.blocks
            .iter()
            .enumerate()
            .flat_map(|(i, block)| {
                let height = i as u64 + 1;
                block
                    .iter()
                    .enumerate()
                    .map(move |(position, tx)| ConfirmationEvent {
                        transaction: tx.clone(),
                        height,
                        position: position as u32,
                    })
            })
            .filter(|event| after.map_or(true, |after| event.cursor() > after))
            .collect()
    }

    /// Sends a frame to every live subscriber, forgetting closed ones.
    fn publish(&mut self, frame: &[u8]) {
        self.subscribers
            .retain(|subscriber| subscriber.send(Ok(frame.to_vec())).is_ok());
    }
}

/// An in-process ledger node.
pub struct InMemoryNode {
    state: Mutex<NodeState>,
}

impl Default for InMemoryNode {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryNode {
    /// Creates a node whose ledger holds a single genesis block, so the chain
    /// height starts at 1.
    pub fn new() -> Self {
        let genesis = Transaction::from_parts(
            vec![TransactionInput::generation()],
            vec![TransactionOutput::pay_to(Address::from_bytes([0u8; 20]), 0)],
        );

        let node = Self::empty();
        node.lock().append(vec![genesis]);
        node
    }

    /// Creates a node with no blocks at all: height 0 and no tip.
    pub fn empty() -> Self {
        let state = NodeState {
            blocks: Vec::new(),
            index: HashMap::new(),
            spent: HashSet::new(),
            subscribers: Vec::new(),
            reachable: true,
            failing_stream_opens: 0,
            stream_opens: 0,
        };

        Self {
            state: Mutex::new(state),
        }
    }

    fn lock(&self) -> MutexGuard<'_, NodeState> {
        // A panic while holding the lock cannot leave the ledger half-written:
        // `append` only runs after `validate` succeeded.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn chain_height(&self) -> u64 {
        self.lock().height()
    }

    pub fn transaction(&self, id: &TransactionId) -> Option<Transaction> {
        self.lock().lookup(id).cloned()
    }

    /// Confirms a single transaction in a new block, bypassing reachability.
    pub fn confirm(&self, tx: Transaction) -> Result<Cursor, TransportError> {
        self.confirm_block(vec![tx])?
            .pop()
            .ok_or_else(|| TransportError::Rejected("empty block".to_string()))
    }

    /// Confirms several transactions in one block, in the given order. Either
    /// all of them are confirmed or none is.
    pub fn confirm_block(&self, block: Vec<Transaction>) -> Result<Vec<Cursor>, TransportError> {
        if block.is_empty() {
            return Err(TransportError::Rejected("empty block".to_string()));
        }

        let mut state = self.lock();
        state.validate(&block)?;
        let events = state.append(block);

        let mut cursors = Vec::with_capacity(events.len());
        for event in events {
            cursors.push(event.cursor());
            let frame = encode(&StreamFrame::Confirmed(event))?;
            state.publish(&frame);
        }
        tracing::debug!(height = state.height(), "Confirmed block");
        Ok(cursors)
    }

    /// While unreachable, every call and stream open fails with
    /// [`TransportError::Unavailable`]. Established streams are not affected;
    /// see [`InMemoryNode::drop_streams`].
    pub fn set_reachable(&self, reachable: bool) {
        self.lock().reachable = reachable;
    }

    /// Breaks every open confirmation stream.
    pub fn drop_streams(&self) {
        let subscribers = std::mem::take(&mut self.lock().subscribers);
        for subscriber in subscribers {
            let _ = subscriber.send(Err(TransportError::Unavailable(
                "stream dropped by node".to_string(),
            )));
        }
    }

    /// Makes the next `count` stream opens fail.
    pub fn fail_next_stream_opens(&self, count: u32) {
        self.lock().failing_stream_opens = count;
    }

    /// Number of confirmation streams currently open.
    pub fn subscriber_count(&self) -> usize {
        let mut state = self.lock();
        state.subscribers.retain(|subscriber| !subscriber.is_closed());
        state.subscribers.len()
    }

    /// Number of successful stream opens so far.
    pub fn stream_opens(&self) -> u64 {
        self.lock().stream_opens
    }

    fn ensure_reachable(&self) -> Result<(), TransportError> {
        if self.lock().reachable {
            Ok(())
        } else {
            Err(TransportError::Unavailable("node is unreachable".to_string()))
        }
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, TransportError> {
    protocol::encode(value).map_err(|e| TransportError::Malformed(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, TransportError> {
    protocol::decode(bytes).map_err(|e| TransportError::Malformed(e.to_string()))
}

#[async_trait]
impl Transport for InMemoryNode {
    async fn unary_call(
        &self,
        method: Method,
        request: Vec<u8>,
    ) -> Result<Vec<u8>, TransportError> {
        self.ensure_reachable()?;
        match method {
            Method::ChainHeight => {
                decode::<()>(&request)?;
                encode(&self.chain_height())
            }
            Method::GetTransaction => {
                let id: TransactionId = decode(&request)?;
                encode(&self.transaction(&id))
            }
            Method::SendTransaction => {
                let tx: Transaction = decode(&request)?;
                self.confirm(tx)?;
                encode(&())
            }
            Method::SubscribeConfirmations => Err(TransportError::Malformed(format!(
                "{method} is a streaming method"
            ))),
        }
    }

    async fn open_stream(
        &self,
        method: Method,
        request: Vec<u8>,
    ) -> Result<FrameStream, TransportError> {
        if method != Method::SubscribeConfirmations {
            return Err(TransportError::Malformed(format!(
                "{method} is not a streaming method"
            )));
        }
        let SubscribeRequest { start } = decode(&request)?;

        let mut state = self.lock();
        if !state.reachable {
            return Err(TransportError::Unavailable("node is unreachable".to_string()));
        }
        if state.failing_stream_opens > 0 {
            state.failing_stream_opens -= 1;
            return Err(TransportError::Unavailable(
                "stream endpoint refused the connection".to_string(),
            ));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let mut frames = vec![StreamFrame::Subscribed { tip: state.tip() }];
        let replay = match start {
            StreamStart::Live => Vec::new(),
            StreamStart::Genesis => state.events_after(None),
            StreamStart::After(after) => state.events_after(Some(after)),
        };
        frames.extend(replay.into_iter().map(StreamFrame::Confirmed));
        for frame in &frames {
            // The receiver is still in scope, so this cannot fail.
            let _ = tx.send(Ok(encode(frame)?));
        }

        state.subscribers.push(tx);
        state.stream_opens += 1;
        Ok(Box::pin(UnboundedReceiverStream::new(rx)))
    }
}
