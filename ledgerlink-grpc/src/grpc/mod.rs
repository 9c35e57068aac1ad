//! # gRPC Transport
//!
//! Carries the connector's opaque request and frame payloads over the
//! `LedgerNode` service defined in `proto/ledger.proto`.
//!
//! - [`GrpcTransport`] is the client side: it implements the connector's
//!   [`Transport`](ledgerlink_connector::transport::Transport) contract with one
//!   channel to the node's unary port and one to its streaming port.
//! - [`NodeServer`] is the server side: it exposes any `Transport`, typically
//!   the connector's in-memory node, as a `LedgerNode` service.

mod client;
pub mod conversions;
mod server;

pub use client::GrpcTransport;
pub use server::{NodeServer, NodeService};

/// Generated protobuf code.
pub mod proto {
    tonic::include_proto!("ledgerlink.node.v1");
}
