use clap::{Parser, Subcommand};

/// Command-line client for a LedgerLink node.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the configuration TOML file.
    /// If not provided, default values will be used.
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the node's current chain height.
    Height,
    /// Look up a transaction by its hex id.
    GetTx {
        id: String,
    },
    /// Submit a generation transaction paying `amount` to an address.
    Send {
        /// Hex-encoded 20-byte address.
        #[arg(long)]
        pay_to: String,
        #[arg(long, default_value_t = 0)]
        amount: i64,
    },
    /// Print every newly confirmed transaction until interrupted.
    Watch,
    /// Run an in-memory ledger node on the configured ports.
    Devnode,
}
