pub mod cli;
pub mod config;
pub mod error;
pub mod grpc;

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use config::{load_config, CliConfig};
use grpc::{GrpcTransport, NodeServer};
use ledgerlink_connector::{
    config::NodeConfig, testing::InMemoryNode, Address, ConnectionState, LedgerClient,
    ListenerError, Transaction, TransactionId, TransactionInput, TransactionOutput,
};
use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::Arc,
};
use tokio::signal;

/// The main entry point for the `ledgerlink` binary.
/// This function handles CLI parsing, configuration, and command execution.
pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config_from_cli(cli.config.as_deref())?;
    ledgerlink_logger::init(&config.log)?;
    tracing::debug!("Configuration loaded: {:#?}", &config);

    match cli.command {
        Commands::Devnode => run_devnode(&config.connector.node).await,
        command => run_client(command, config).await,
    }
}

/// Loads the configuration file if one was given, defaults otherwise.
fn load_config_from_cli(path: Option<&str>) -> Result<CliConfig> {
    match path {
        Some(config_path) => {
            eprintln!("Loading configuration from '{}'", config_path);
            load_config(config_path)
        }
        None => Ok(CliConfig::default()),
    }
}

async fn run_client(command: Commands, config: CliConfig) -> Result<()> {
    let transport = Arc::new(GrpcTransport::connect_lazy(&config.connector.node)?);
    let client = match command {
        // Only the feed needs to be subscribed before the command runs.
        Commands::Watch => LedgerClient::connect(transport, config.connector).await?,
        _ => LedgerClient::new(transport, config.connector),
    };

    let outcome = execute(&client, command).await;
    client.shutdown().await;
    outcome
}

async fn execute(client: &LedgerClient, command: Commands) -> Result<()> {
    match command {
        Commands::Height => {
            println!("{}", client.chain_height().await?);
        }
        Commands::GetTx { id } => {
            let id: TransactionId = id.parse().context("Invalid transaction id")?;
            match client.get_transaction(id).await? {
                Some(tx) => println!("{:#?}", tx),
                None => println!("Transaction {} not found", id),
            }
        }
        Commands::Send { pay_to, amount } => {
            let address: Address = pay_to.parse().context("Invalid address")?;
            let tx = Transaction::builder()
                .input(TransactionInput::generation())
                .output(TransactionOutput::pay_to(address, amount))
                .build()?;
            client.send_transaction(&tx).await?;
            println!("{}", tx.id());
        }
        Commands::Watch => watch(client).await?,
        Commands::Devnode => bail!("devnode does not connect to a node"),
    }
    Ok(())
}

/// Prints confirmations until Ctrl+C, or fails once the stream is lost for good.
async fn watch(client: &LedgerClient) -> Result<()> {
    client.register_transaction_listener(Arc::new(
        |tx: &Transaction| -> Result<(), ListenerError> {
            println!("{} outputs={} total={}", tx.id(), tx.outputs().len(), tx.total_output());
            Ok(())
        },
    ));

    tokio::select! {
        result = signal::ctrl_c() => {
            result.context("Failed to listen for shutdown signal")?;
            tracing::info!("Received Ctrl+C, stopping.");
            Ok(())
        }
        _ = client.wait_for_state(|state| *state == ConnectionState::Failed) => {
            Err(anyhow!("{}", ConnectionState::Failed))
        }
    }
}

/// Serves an in-memory ledger until Ctrl+C.
async fn run_devnode(node: &NodeConfig) -> Result<()> {
    let ip: IpAddr = node
        .host
        .parse()
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));
    let server = NodeServer::start(
        Arc::new(InMemoryNode::new()),
        SocketAddr::new(ip, node.unary_port),
        SocketAddr::new(ip, node.stream_port),
    )
    .await?;

    match signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        Err(err) => {
            tracing::error!(error = %err, "Failed to listen for shutdown signal.");
        }
    }
    server.stop().await;
    Ok(())
}
