use super::{
    conversions::status_to_transport,
    proto::{ledger_node_client::LedgerNodeClient, StreamRequest, UnaryRequest},
};
use crate::error::GrpcError;
use async_trait::async_trait;
use futures::StreamExt;
use ledgerlink_connector::{
    config::NodeConfig,
    transport::{FrameStream, Method, Transport, TransportError},
};
use std::time::Duration;
use tonic::transport::{Channel, Endpoint};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// A [`Transport`] backed by a remote `LedgerNode` gRPC service.
///
/// Channels connect lazily, so construction never touches the network and an
/// unreachable node surfaces as [`TransportError::Unavailable`] on first use.
#[derive(Clone)]
pub struct GrpcTransport {
    unary: LedgerNodeClient<Channel>,
    stream: LedgerNodeClient<Channel>,
}

impl GrpcTransport {
    pub fn connect_lazy(node: &NodeConfig) -> Result<Self, GrpcError> {
        let unary = lazy_channel(node.unary_endpoint())?;
        let stream = lazy_channel(node.stream_endpoint())?;
        tracing::debug!(
            unary = %node.unary_endpoint(),
            stream = %node.stream_endpoint(),
            "gRPC transport configured"
        );
        Ok(Self {
            unary: LedgerNodeClient::new(unary),
            stream: LedgerNodeClient::new(stream),
        })
    }
}

fn lazy_channel(uri: String) -> Result<Channel, GrpcError> {
    let endpoint = Endpoint::from_shared(uri.clone())
        .map_err(|source| GrpcError::InvalidEndpoint { uri, source })?;
    Ok(endpoint.connect_timeout(CONNECT_TIMEOUT).connect_lazy())
}

#[async_trait]
impl Transport for GrpcTransport {
    async fn unary_call(&self, method: Method, request: Vec<u8>) -> Result<Vec<u8>, TransportError> {
        let mut client = self.unary.clone();
        let response = client
            .invoke(UnaryRequest {
                method: method.as_str().to_string(),
                payload: request,
            })
            .await
            .map_err(status_to_transport)?;
        Ok(response.into_inner().payload)
    }

    async fn open_stream(
        &self,
        method: Method,
        request: Vec<u8>,
    ) -> Result<FrameStream, TransportError> {
        let mut client = self.stream.clone();
        let response = client
            .subscribe(StreamRequest {
                method: method.as_str().to_string(),
                payload: request,
            })
            .await
            .map_err(status_to_transport)?;

        let frames = response
            .into_inner()
            .map(|item| item.map(|frame| frame.payload).map_err(status_to_transport));
        Ok(Box::pin(frames))
    }
}
