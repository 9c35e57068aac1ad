//! # Request Gateway
//!
//! Issues the unary calls of the client (chain height, transaction lookup and
//! submission) over a [`Transport`] and maps transport failures onto the
//! connector's [`Error`] taxonomy.
//!
//! Nothing is cached: every call re-queries the node, which stays the only
//! source of truth.

use crate::{
    config::RequestConfig,
    error::{Error, Result},
    protocol,
    transaction::{Transaction, TransactionId},
    transport::{Method, Transport},
};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use tokio::time::{sleep, timeout};

pub struct RequestGateway {
    transport: Arc<dyn Transport>,
    config: RequestConfig,
    /// Highest chain height observed so far, used to detect regressions.
    observed_height: AtomicU64,
}

impl RequestGateway {
    pub fn new(transport: Arc<dyn Transport>, config: RequestConfig) -> Self {
        Self {
            transport,
            config,
            observed_height: AtomicU64::new(0),
        }
    }

    /// Returns the node's current chain height.
    ///
    /// # Errors
    ///
    /// [`Error::Connection`] if the node is unreachable after retries,
    /// [`Error::Protocol`] if the answer cannot be decoded.
    pub async fn chain_height(&self) -> Result<u64> {
        let response = self
            .call_with_retry(Method::ChainHeight, protocol::encode(&())?)
            .await?;
        let height: u64 = protocol::decode(&response)?;

        let previous = self.observed_height.fetch_max(height, Ordering::AcqRel);
        if height < previous {
            tracing::warn!(
                height,
                previous,
                "Node reported a chain height lower than previously observed"
            );
        }
        Ok(height)
    }

    /// Looks up a transaction by id.
    ///
    /// Returns `Ok(None)` when the node has no such transaction. The sentinel
    /// [`TransactionId::INVALID`] is answered locally and always yields `None`.
    pub async fn get_transaction(&self, id: TransactionId) -> Result<Option<Transaction>> {
        if id.is_invalid() {
            return Ok(None);
        }

        let response = self
            .call_with_retry(Method::GetTransaction, protocol::encode(&id)?)
            .await?;
        let found: Option<Transaction> = protocol::decode(&response)?;

        match found {
            Some(tx) if tx.id() != id => Err(Error::Protocol(format!(
                "requested transaction {} but node returned {}",
                id,
                tx.id()
            ))),
            other => Ok(other),
        }
    }

    /// Submits a transaction for inclusion. Returns once the node has
    /// acknowledged receipt, which says nothing about confirmation.
    ///
    /// Submission is never retried by the gateway.
    pub async fn send_transaction(&self, tx: &Transaction) -> Result<()> {
        let response = self
            .call(Method::SendTransaction, protocol::encode(tx)?)
            .await?;
        protocol::decode::<()>(&response)?;
        tracing::debug!(txid = %tx.id(), "Transaction acknowledged by node");
        Ok(())
    }

    /// A single call bounded by the configured timeout.
    async fn call(&self, method: Method, request: Vec<u8>) -> Result<Vec<u8>> {
        match timeout(
            self.config.timeout(),
            self.transport.unary_call(method, request),
        )
        .await
        {
            Ok(result) => result.map_err(Error::from),
            Err(_) => Err(Error::Connection(format!(
                "{} timed out after {} ms",
                method, self.config.timeout_ms
            ))),
        }
    }

    /// Retries connection errors of idempotent reads.
    async fn call_with_retry(&self, method: Method, request: Vec<u8>) -> Result<Vec<u8>> {
        let mut attempt = 0u32;
        loop {
            match self.call(method, request.clone()).await {
                Err(Error::Connection(reason)) if attempt < self.config.max_retries => {
                    attempt += 1;
                    tracing::warn!(
                        %method,
                        attempt,
                        max_retries = self.config.max_retries,
                        "Connection error, retrying: {}",
                        reason
                    );
                    sleep(self.config.retry_delay()).await;
                }
                other => return other,
            }
        }
    }
}
