use serde::{Deserialize, Serialize};
use std::time::Duration;

/// The top-level configuration for the `ledgerlink-connector` library.
///
/// This struct aggregates the node endpoints, per-request behaviour and the
/// reconnection policy of the event dispatcher. It is typically deserialized
/// from a configuration file and passed to [`LedgerClient`] on construction.
///
/// [`LedgerClient`]: crate::client::LedgerClient
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ConnectorConfig {
    #[serde(default)]
    pub node: NodeConfig,
    #[serde(default)]
    pub request: RequestConfig,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
    #[serde(default)]
    pub channels: ChannelConfig,
}

/// Where the ledger node listens. Unary calls and the confirmation stream are
/// served on separate ports.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct NodeConfig {
    pub host: String,
    pub unary_port: u16,
    pub stream_port: u16,
}

/// Behaviour of unary requests issued by the request gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RequestConfig {
    /// Upper bound for a single call, in milliseconds.
    pub timeout_ms: u64,
    /// How many times an idempotent read is retried after a connection error.
    pub max_retries: u32,
    /// Pause between two attempts of the same read, in milliseconds.
    pub retry_delay_ms: u64,
}

/// Reconnection policy of the dispatcher's confirmation stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ReconnectConfig {
    /// Consecutive failed attempts after which the dispatcher gives up.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

/// Defines capacities for the MPSC channels within the connector.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ChannelConfig {
    /// The buffer capacity for the command channel to the dispatcher.
    pub dispatcher_command_buffer: usize,
}

impl NodeConfig {
    fn endpoint(&self, port: u16) -> String {
        format!("http://{}:{}", self.host, port)
    }

    /// URI of the request/response endpoint.
    pub fn unary_endpoint(&self) -> String {
        self.endpoint(self.unary_port)
    }

    /// URI of the streaming endpoint.
    pub fn stream_endpoint(&self) -> String {
        self.endpoint(self.stream_port)
    }
}

impl RequestConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl ReconnectConfig {
    /// Exponential backoff for the given 1-based attempt, capped at `max_delay_ms`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let delay = self
            .base_delay_ms
            .saturating_mul(1u64 << exponent)
            .min(self.max_delay_ms);
        Duration::from_millis(delay)
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            unary_port: 30303,
            stream_port: 31315,
        }
    }
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 5_000,
            max_retries: 2,
            retry_delay_ms: 200,
        }
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            base_delay_ms: 250,
            max_delay_ms: 10_000,
        }
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            dispatcher_command_buffer: 16,
        }
    }
}
