//! # Transport Channel
//!
//! The contract the connector consumes from the network layer. A transport
//! offers unary request/response calls and one server-to-client stream, both
//! carrying opaque byte payloads encoded by [`crate::protocol`].
//!
//! Implementations live outside this crate (`ledgerlink-grpc`) or in
//! [`crate::testing`] for in-process use.

use async_trait::async_trait;
use futures::Stream;
use std::fmt;
use std::pin::Pin;
use thiserror::Error;

/// The remote procedures a ledger node exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    ChainHeight,
    GetTransaction,
    SendTransaction,
    SubscribeConfirmations,
}

impl Method {
    /// The name used on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::ChainHeight => "ChainHeight",
            Method::GetTransaction => "GetTransaction",
            Method::SendTransaction => "SendTransaction",
            Method::SubscribeConfirmations => "SubscribeConfirmations",
        }
    }

    /// Resolves a wire name back to a method.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "ChainHeight" => Some(Method::ChainHeight),
            "GetTransaction" => Some(Method::GetTransaction),
            "SendTransaction" => Some(Method::SendTransaction),
            "SubscribeConfirmations" => Some(Method::SubscribeConfirmations),
            _ => None,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failures a transport reports. The gateway maps these onto [`crate::Error`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The endpoint could not be reached or the connection broke.
    #[error("transport unavailable: {0}")]
    Unavailable(String),

    /// The node understood the request and refused it.
    #[error("request rejected: {0}")]
    Rejected(String),

    /// The exchange violated the protocol.
    #[error("malformed exchange: {0}")]
    Malformed(String),
}

/// A stream of raw frames from a server-streaming call.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, TransportError>> + Send>>;

/// A bidirectional RPC connection to a ledger node.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Performs a single request/response exchange.
    async fn unary_call(&self, method: Method, request: Vec<u8>)
        -> Result<Vec<u8>, TransportError>;

    /// Opens a server-to-client stream. The stream ends (or yields an error)
    /// when the underlying connection is lost.
    async fn open_stream(
        &self,
        method: Method,
        request: Vec<u8>,
    ) -> Result<FrameStream, TransportError>;
}
