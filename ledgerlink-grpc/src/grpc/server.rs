use super::{
    conversions::transport_to_status,
    proto::{
        ledger_node_server::{LedgerNode, LedgerNodeServer},
        StreamFrame, StreamRequest, UnaryRequest, UnaryResponse,
    },
};
use crate::error::GrpcError;
use futures::{Stream, StreamExt};
use ledgerlink_connector::transport::{Method, Transport};
use std::{net::SocketAddr, pin::Pin, sync::Arc, time::Duration};
use tokio::{net::TcpListener, sync::watch, task::JoinHandle};
use tokio_stream::wrappers::TcpListenerStream;
use tonic::{transport::Server, Request, Response, Status};

/// How long [`NodeServer::stop`] waits for open streams to drain.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Serves a [`Transport`] as the `LedgerNode` gRPC service.
#[derive(Clone)]
pub struct NodeService {
    transport: Arc<dyn Transport>,
}

impl NodeService {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }
}

fn parse_method(name: &str) -> Result<Method, GrpcError> {
    Method::from_name(name).ok_or_else(|| GrpcError::UnknownMethod(name.to_string()))
}

#[tonic::async_trait]
impl LedgerNode for NodeService {
    type SubscribeStream = Pin<Box<dyn Stream<Item = Result<StreamFrame, Status>> + Send>>;

    async fn invoke(
        &self,
        request: Request<UnaryRequest>,
    ) -> Result<Response<UnaryResponse>, Status> {
        let req = request.into_inner();
        let method = parse_method(&req.method)?;
        tracing::debug!(%method, "Invoke");

        let payload = self
            .transport
            .unary_call(method, req.payload)
            .await
            .map_err(transport_to_status)?;
        Ok(Response::new(UnaryResponse { payload }))
    }

    async fn subscribe(
        &self,
        request: Request<StreamRequest>,
    ) -> Result<Response<Self::SubscribeStream>, Status> {
        let req = request.into_inner();
        let method = parse_method(&req.method)?;
        tracing::info!(%method, "Opening confirmation stream");

        let frames = self
            .transport
            .open_stream(method, req.payload)
            .await
            .map_err(transport_to_status)?;
        let stream = frames.map(|item| {
            item.map(|payload| StreamFrame { payload })
                .map_err(transport_to_status)
        });
        Ok(Response::new(Box::pin(stream)))
    }
}

/// A running `LedgerNode` server listening on a unary and a streaming port.
pub struct NodeServer {
    unary_addr: SocketAddr,
    stream_addr: SocketAddr,
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl NodeServer {
    /// Binds both ports and starts serving. Port `0` picks a free port; the
    /// actual addresses are available from [`unary_addr`](Self::unary_addr)
    /// and [`stream_addr`](Self::stream_addr).
    pub async fn start(
        transport: Arc<dyn Transport>,
        unary_addr: SocketAddr,
        stream_addr: SocketAddr,
    ) -> Result<Self, GrpcError> {
        let service = NodeService::new(transport);
        let (shutdown_tx, _) = watch::channel(false);

        let unary = bind(unary_addr).await?;
        let stream = bind(stream_addr).await?;
        let unary_addr = local_addr(&unary, unary_addr)?;
        let stream_addr = local_addr(&stream, stream_addr)?;

        let tasks = vec![
            spawn_server(service.clone(), unary, &shutdown_tx),
            spawn_server(service, stream, &shutdown_tx),
        ];
        tracing::info!(%unary_addr, %stream_addr, "Ledger node gRPC server listening");

        Ok(Self {
            unary_addr,
            stream_addr,
            shutdown_tx,
            tasks,
        })
    }

    pub fn unary_addr(&self) -> SocketAddr {
        self.unary_addr
    }

    pub fn stream_addr(&self) -> SocketAddr {
        self.stream_addr
    }

    /// Signals both servers to stop. Connections still open after a short
    /// grace period are dropped.
    pub async fn stop(self) {
        self.shutdown_tx.send_replace(true);
        for mut task in self.tasks {
            if tokio::time::timeout(DRAIN_TIMEOUT, &mut task).await.is_err() {
                tracing::warn!("gRPC server did not drain in time, aborting");
                task.abort();
            }
        }
        tracing::info!("Ledger node gRPC server stopped.");
    }
}

async fn bind(addr: SocketAddr) -> Result<TcpListener, GrpcError> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| GrpcError::Bind { addr, source })
}

fn local_addr(listener: &TcpListener, addr: SocketAddr) -> Result<SocketAddr, GrpcError> {
    listener
        .local_addr()
        .map_err(|source| GrpcError::Bind { addr, source })
}

fn spawn_server(
    service: NodeService,
    listener: TcpListener,
    shutdown_tx: &watch::Sender<bool>,
) -> JoinHandle<()> {
    let mut shutdown_rx = shutdown_tx.subscribe();
    tokio::spawn(async move {
        let signal = async move {
            let _ = shutdown_rx.wait_for(|stop| *stop).await;
        };
        if let Err(e) = Server::builder()
            .add_service(LedgerNodeServer::new(service))
            .serve_with_incoming_shutdown(TcpListenerStream::new(listener), signal)
            .await
        {
            tracing::error!("gRPC server failed: {}", e);
        }
    })
}
