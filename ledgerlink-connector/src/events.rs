use crate::error::Result;
use crate::protocol;
use crate::transaction::Transaction;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The position of a confirmation in the node's total order: the block height
/// and the index of the transaction inside that block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Cursor {
    pub height: u64,
    pub position: u32,
}

impl Cursor {
    pub fn new(height: u64, position: u32) -> Self {
        Self { height, position }
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.height, self.position)
    }
}

/// A transaction the node has included in the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationEvent {
    pub transaction: Transaction,
    pub height: u64,
    pub position: u32,
}

impl ConfirmationEvent {
    pub fn cursor(&self) -> Cursor {
        Cursor::new(self.height, self.position)
    }
}

/// One frame of the confirmation feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreamFrame {
    /// Sent once when the stream opens. `tip` is the last confirmation the node
    /// knew about at that moment, `None` for an empty ledger.
    Subscribed { tip: Option<Cursor> },
    Confirmed(ConfirmationEvent),
}

pub fn try_decode_frame(bytes: &[u8]) -> Result<StreamFrame> {
    protocol::decode(bytes)
}
