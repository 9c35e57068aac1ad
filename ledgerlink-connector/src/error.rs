use crate::transport::TransportError;
use thiserror::Error;

/// The error type returned by every request made through the connector.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The transport is unreachable or broke mid-call. Retryable.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The node answered with something that could not be understood.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The transaction content was rejected, locally or by the node.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

/// Reasons a transaction is refused.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("transaction has no outputs")]
    NoOutputs,

    #[error("output {index} has negative amount {amount}")]
    NegativeAmount { index: usize, amount: i64 },

    #[error("sum of output amounts overflows")]
    AmountOverflow,

    /// The node refused the transaction (e.g. it spends an unknown output).
    #[error("rejected by node: {0}")]
    Rejected(String),
}

/// A failure reported by a [`TransactionListener`](crate::listener::TransactionListener).
///
/// It describes a local processing problem of the listener, never a protocol
/// problem, and is only ever logged by the dispatcher.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct ListenerError(pub String);

impl From<String> for ListenerError {
    fn from(message: String) -> Self {
        Self(message)
    }
}

impl From<&str> for ListenerError {
    fn from(message: &str) -> Self {
        Self(message.to_string())
    }
}

/// Maps transport failures onto the public error taxonomy.
impl From<TransportError> for Error {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Unavailable(reason) => Error::Connection(reason),
            TransportError::Rejected(reason) => {
                Error::Validation(ValidationError::Rejected(reason))
            }
            TransportError::Malformed(reason) => Error::Protocol(reason),
        }
    }
}

impl From<bincode::error::DecodeError> for Error {
    fn from(err: bincode::error::DecodeError) -> Self {
        Error::Protocol(format!("undecodable payload: {err}"))
    }
}

impl From<bincode::error::EncodeError> for Error {
    fn from(err: bincode::error::EncodeError) -> Self {
        Error::Protocol(format!("unencodable payload: {err}"))
    }
}

/// Result type alias for connector operations.
pub type Result<T> = std::result::Result<T, Error>;
