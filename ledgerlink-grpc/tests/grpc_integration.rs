use ledgerlink_connector::{
    config::{ConnectorConfig, NodeConfig},
    testing::InMemoryNode,
    Address, ConnectionState, Error, LedgerClient, ListenerError, Transaction, TransactionId,
    TransactionInput, TransactionOutput, ValidationError,
};
use ledgerlink_connector::transport::TransportError;
use ledgerlink_grpc::grpc::{
    conversions::status_to_transport,
    proto::{ledger_node_client::LedgerNodeClient, UnaryRequest},
    GrpcTransport, NodeServer,
};
use std::{
    net::{Ipv4Addr, SocketAddr},
    sync::Arc,
    time::Duration,
};
use tokio::{sync::mpsc, time::timeout};

const WAIT: Duration = Duration::from_secs(10);

/// Holds the test environment components.
struct TestEnvironment {
    node: Arc<InMemoryNode>,
    server: NodeServer,
    client: LedgerClient,
}

impl TestEnvironment {
    /// Starts an in-memory node behind a gRPC server on free ports and a
    /// client connected to it.
    async fn start() -> Self {
        let node = Arc::new(InMemoryNode::new());
        let any_port = SocketAddr::from((Ipv4Addr::LOCALHOST, 0));
        let server = NodeServer::start(node.clone(), any_port, any_port)
            .await
            .expect("Failed to start gRPC server");

        let config = client_config(NodeConfig {
            host: "127.0.0.1".to_string(),
            unary_port: server.unary_addr().port(),
            stream_port: server.stream_addr().port(),
        });
        let transport = GrpcTransport::connect_lazy(&config.node).unwrap();
        let client = timeout(WAIT, LedgerClient::connect(Arc::new(transport), config))
            .await
            .expect("timed out connecting")
            .expect("confirmation stream did not open");

        Self {
            node,
            server,
            client,
        }
    }

    async fn stop(self) {
        self.client.shutdown().await;
        self.server.stop().await;
    }
}

fn client_config(node: NodeConfig) -> ConnectorConfig {
    let mut config = ConnectorConfig::default();
    config.node = node;
    config.request.timeout_ms = 2_000;
    config.request.max_retries = 0;
    config.reconnect.max_attempts = 100;
    config.reconnect.base_delay_ms = 10;
    config.reconnect.max_delay_ms = 50;
    config
}

fn new_transaction() -> Transaction {
    Transaction::builder()
        .input(TransactionInput::generation())
        .output(TransactionOutput::pay_to(
            Address::from_bytes(rand::random::<[u8; 20]>()),
            10,
        ))
        .build()
        .unwrap()
}

/// Registers a listener that forwards every confirmed id to a channel.
fn forward_confirmations(client: &LedgerClient) -> mpsc::UnboundedReceiver<TransactionId> {
    let (tx, rx) = mpsc::unbounded_channel();
    client.register_transaction_listener(Arc::new(
        move |confirmed: &Transaction| -> Result<(), ListenerError> {
            let _ = tx.send(confirmed.id());
            Ok(())
        },
    ));
    rx
}

async fn next_delivery(rx: &mut mpsc::UnboundedReceiver<TransactionId>) -> TransactionId {
    timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for a delivery")
        .expect("listener channel closed")
}

async fn wait_for(client: &LedgerClient, expected: ConnectionState) {
    timeout(WAIT, client.wait_for_state(|state| *state == expected))
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for state {expected}"));
}

#[tokio::test]
async fn test_submit_confirm_and_read_back() {
    let env = TestEnvironment::start().await;
    let mut confirmed = forward_confirmations(&env.client);

    let height = env.client.chain_height().await.unwrap();
    let tx = new_transaction();
    env.client.send_transaction(&tx).await.unwrap();

    assert_eq!(next_delivery(&mut confirmed).await, tx.id());
    assert_eq!(env.client.chain_height().await.unwrap(), height + 1);
    assert_eq!(env.client.get_transaction(tx.id()).await.unwrap(), Some(tx));
    assert_eq!(
        env.client.get_transaction(TransactionId::INVALID).await,
        Ok(None)
    );

    env.stop().await;
}

#[tokio::test]
async fn test_rejection_crosses_the_wire_as_validation_error() {
    let env = TestEnvironment::start().await;

    let orphan = Transaction::builder()
        .input(TransactionInput::spend(new_transaction().id(), 0))
        .output(TransactionOutput::pay_to(Address::from_bytes([7; 20]), 1))
        .build()
        .unwrap();
    let err = env.client.send_transaction(&orphan).await.unwrap_err();
    assert!(matches!(err, Error::Validation(ValidationError::Rejected(_))));

    env.stop().await;
}

#[tokio::test]
async fn test_stream_drop_is_recovered_without_gaps() {
    let env = TestEnvironment::start().await;
    let mut confirmed = forward_confirmations(&env.client);

    let before = new_transaction();
    env.client.send_transaction(&before).await.unwrap();
    assert_eq!(next_delivery(&mut confirmed).await, before.id());

    env.node.set_reachable(false);
    env.node.drop_streams();
    timeout(
        WAIT,
        env.client
            .wait_for_state(|state| matches!(state, ConnectionState::Reconnecting { .. })),
    )
    .await
    .expect("dispatcher did not notice the dropped stream");

    let missed = new_transaction();
    env.node.confirm(missed.clone()).unwrap();
    env.node.set_reachable(true);
    wait_for(&env.client, ConnectionState::Streaming).await;

    assert_eq!(next_delivery(&mut confirmed).await, missed.id());
    assert!(confirmed.try_recv().is_err());

    env.stop().await;
}

#[tokio::test]
async fn test_unreachable_node_is_a_connection_error() {
    // Reserve a port and release it so nothing listens there.
    let listener = tokio::net::TcpListener::bind((Ipv4Addr::LOCALHOST, 0))
        .await
        .unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let mut config = client_config(NodeConfig {
        host: "127.0.0.1".to_string(),
        unary_port: port,
        stream_port: port,
    });
    config.reconnect.max_attempts = 1;
    let transport = GrpcTransport::connect_lazy(&config.node).unwrap();
    let client = LedgerClient::new(Arc::new(transport), config);

    assert!(matches!(client.chain_height().await, Err(Error::Connection(_))));
    wait_for(&client, ConnectionState::Failed).await;

    client.shutdown().await;
}

#[tokio::test]
async fn test_unknown_method_is_unimplemented() {
    let env = TestEnvironment::start().await;

    let mut raw = LedgerNodeClient::connect(format!("http://{}", env.server.unary_addr()))
        .await
        .expect("Failed to connect to gRPC server");
    let status = raw
        .invoke(UnaryRequest {
            method: "Rewind".to_string(),
            payload: Vec::new(),
        })
        .await
        .unwrap_err();

    assert_eq!(status.code(), tonic::Code::Unimplemented);
    assert!(matches!(
        status_to_transport(status),
        TransportError::Malformed(_)
    ));

    env.stop().await;
}
