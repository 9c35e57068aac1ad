//! A client-side runtime for talking to a remote ledger node.
//!
//! This crate submits transactions, queries chain state, and keeps a live
//! subscription to newly confirmed transactions, delivering each one to every
//! locally registered listener.
//!
//! # Key Components
//!
//! *   [`client::LedgerClient`]: The main entry point. Wraps the request gateway,
//!     the listener registry and the background dispatcher behind one API.
//! *   [`transaction`]: The immutable, content-addressed transaction model and
//!     its builder.
//! *   [`transport`]: The contract a network binding implements. The gRPC binding
//!     lives in the `ledgerlink-grpc` crate.
//! *   [`dispatcher`]: The worker that owns the confirmation stream, reconnects
//!     with backoff and fans events out to listeners.
//! *   [`testing::InMemoryNode`]: An in-process node for tests and demos.
pub mod client;
/// Defines configuration structures for the connector.
pub mod config;
pub mod dispatcher;
pub mod error;
/// Confirmation events and the frames of the confirmation feed.
pub mod events;
pub mod gateway;
pub mod listener;
/// Wire payload encoding.
pub mod protocol;
pub mod registry;
pub mod testing;
pub mod transaction;
pub mod transport;

pub use client::LedgerClient;
pub use dispatcher::ConnectionState;
pub use error::{Error, ListenerError, Result, ValidationError};
pub use listener::{ListenerHandle, TransactionListener};
pub use transaction::{
    Address, OutPoint, Transaction, TransactionBuilder, TransactionId, TransactionInput,
    TransactionOutput,
};
