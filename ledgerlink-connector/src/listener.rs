//! # Transaction Listeners
//!
//! The capability a caller hands to the client to be told about confirmed
//! transactions, and the handle that identifies one registration of it.

use crate::{error::ListenerError, transaction::Transaction};
use std::fmt;

/// A callback invoked once per confirmed transaction.
///
/// Listeners run synchronously on the dispatcher task, one after the other, so
/// a slow listener delays delivery to every listener registered after it.
/// Returning an error only gets logged; it never stops delivery.
pub trait TransactionListener: Send + Sync {
    fn process(&self, tx: &Transaction) -> Result<(), ListenerError>;
}

impl<F> TransactionListener for F
where
    F: Fn(&Transaction) -> Result<(), ListenerError> + Send + Sync,
{
    fn process(&self, tx: &Transaction) -> Result<(), ListenerError> {
        self(tx)
    }
}

/// Identifies one registration. Registering the same listener twice gives two
/// distinct handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerHandle(pub(crate) u64);

impl fmt::Display for ListenerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener#{}", self.0)
    }
}
