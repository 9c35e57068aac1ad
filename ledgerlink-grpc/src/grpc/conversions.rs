//! Mapping between gRPC status codes and the connector's transport errors.
//!
//! Neither type belongs to this crate, so these are plain functions rather than
//! `From` impls.

use ledgerlink_connector::transport::TransportError;
use tonic::{Code, Status};

/// Classifies a status returned by the node.
pub fn status_to_transport(status: Status) -> TransportError {
    let message = status.message().to_string();
    match status.code() {
        Code::Unavailable
        | Code::DeadlineExceeded
        | Code::Cancelled
        | Code::Aborted
        | Code::Unknown => TransportError::Unavailable(message),
        Code::InvalidArgument | Code::FailedPrecondition | Code::AlreadyExists => {
            TransportError::Rejected(message)
        }
        _ => TransportError::Malformed(message),
    }
}

/// The status a node reports for a transport-level failure.
pub fn transport_to_status(err: TransportError) -> Status {
    match err {
        TransportError::Unavailable(message) => Status::unavailable(message),
        TransportError::Rejected(message) => Status::failed_precondition(message),
        TransportError::Malformed(message) => Status::internal(message),
    }
}
