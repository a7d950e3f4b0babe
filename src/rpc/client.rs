//! JSON-RPC client submitting locally signed stable token transfers.

use super::tx::{transfer_calldata, CeloLegacyTx};
use super::{PendingTransaction, TransactionClient, TransferJob, TxHash};
use crate::account::{Account, Address};
use crate::config::DEFAULT_TRANSFER_COMMENT;
use crate::error::{Error, Result};
use alloy_provider::{Provider, RootProvider};
use async_trait::async_trait;
use std::fmt::Display;
use std::future::IntoFuture;
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// Default per-request timeout in seconds.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Default receipt polling interval in milliseconds.
const DEFAULT_RECEIPT_POLL_MS: u64 = 1000;

/// Gas limit for a stable token transfer paid in that token.
const TRANSFER_GAS_LIMIT: u64 = 200_000;

/// Configuration for [`RpcClient`].
#[derive(Debug, Clone)]
pub struct RpcClientConfig {
    /// JSON-RPC endpoint.
    pub url: String,
    /// Token contract receiving the transfers and paying fees.
    pub stable_token: Address,
    /// Comment attached to every transfer.
    pub comment: String,
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// Interval between receipt polls.
    pub receipt_poll_interval: Duration,
}

impl RpcClientConfig {
    /// Settings for `url` with default timings and comment.
    #[must_use]
    pub fn new(url: impl Into<String>, stable_token: Address) -> Self {
        Self {
            url: url.into(),
            stable_token,
            comment: DEFAULT_TRANSFER_COMMENT.to_owned(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            receipt_poll_interval: Duration::from_millis(DEFAULT_RECEIPT_POLL_MS),
        }
    }

    /// Replace the transfer comment.
    #[must_use]
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }
}

/// Pick the hash to track after submission.
///
/// The node's answer wins: a receipt is only ever indexed under the hash the
/// node assigned.
fn reconcile_hash(computed: TxHash, returned: TxHash) -> TxHash {
    if computed != returned {
        warn!("node reported hash {returned}, computed {computed}; tracking the node's");
    }
    returned
}

/// A JSON-RPC connection to one node.
pub struct RpcClient {
    config: RpcClientConfig,
    provider: RootProvider,
    chain_id: OnceCell<u64>,
}

impl RpcClient {
    /// Create a client; no request is made until first use.
    ///
    /// # Errors
    ///
    /// Returns `Error::Rpc` if the endpoint is not a valid URL.
    pub fn new(config: RpcClientConfig) -> Result<Self> {
        let url = config
            .url
            .parse::<reqwest::Url>()
            .map_err(|e| Error::Rpc(format!("Invalid RPC URL {}: {e}", config.url)))?;
        Ok(Self {
            provider: RootProvider::new_http(url),
            config,
            chain_id: OnceCell::new(),
        })
    }

    /// Endpoint this client talks to.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.config.url
    }

    /// Await one provider call under the request timeout.
    async fn timed<F, T, E>(&self, method: &str, call: F) -> Result<T>
    where
        F: IntoFuture<Output = std::result::Result<T, E>>,
        E: Display,
    {
        trace!("rpc -> {method}");
        match tokio::time::timeout(self.config.request_timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(Error::Rpc(format!("{method}: {e}"))),
            Err(_) => Err(Error::Rpc(format!(
                "{method}: no response within {:?}",
                self.config.request_timeout
            ))),
        }
    }

    /// Chain id of the connected node, fetched once.
    ///
    /// # Errors
    ///
    /// Returns `Error::Rpc` if the node cannot be queried.
    pub async fn chain_id(&self) -> Result<u64> {
        self.chain_id
            .get_or_try_init(|| self.timed("eth_chainId", self.provider.get_chain_id()))
            .await
            .copied()
    }

    async fn build_and_send(&self, from: &Account, job: &TransferJob) -> Result<TxHash> {
        let chain_id = self.chain_id().await?;
        let nonce = self
            .timed(
                "eth_getTransactionCount",
                self.provider.get_transaction_count(from.address()).pending(),
            )
            .await?;
        let gas_price = self
            .timed("eth_gasPrice", self.provider.get_gas_price())
            .await?;

        let tx = CeloLegacyTx {
            nonce,
            gas_price,
            gas: TRANSFER_GAS_LIMIT,
            fee_currency: Some(self.config.stable_token),
            gateway_fee_recipient: None,
            gateway_fee: 0,
            to: self.config.stable_token,
            value: 0,
            data: transfer_calldata(job.recipient, job.amount, &self.config.comment),
        };
        let signed = tx.sign(from.signing_key(), chain_id)?;

        let pending = self
            .timed(
                "eth_sendRawTransaction",
                self.provider.send_raw_transaction(&signed.raw),
            )
            .await?;
        Ok(reconcile_hash(signed.hash, *pending.tx_hash()))
    }

    /// Whether `hash` is mined; `None` while it is still pending.
    async fn mined_status(&self, hash: TxHash) -> Result<Option<bool>> {
        let receipt = self
            .timed(
                "eth_getTransactionReceipt",
                self.provider.get_transaction_receipt(hash),
            )
            .await?;
        Ok(receipt.map(|r| r.status()))
    }
}

impl std::fmt::Debug for RpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcClient")
            .field("url", &self.config.url)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl TransactionClient for RpcClient {
    async fn send_transfer(&self, from: &Account, job: &TransferJob) -> Result<PendingTransaction> {
        let hash = self
            .build_and_send(from, job)
            .await
            .map_err(|e| Error::Submission(e.to_string()))?;
        debug!(
            "transfer from {} to {} amount {}: {hash}",
            from.address(),
            job.recipient,
            job.amount
        );
        Ok(PendingTransaction::new(hash))
    }

    async fn wait_mined(
        &self,
        pending: &PendingTransaction,
        cancel: &CancellationToken,
    ) -> Result<()> {
        loop {
            let status = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(Error::Cancelled),
                r = self.mined_status(pending.hash) => {
                    r.map_err(|e| Error::Confirmation(e.to_string()))?
                }
            };

            match status {
                Some(true) => {
                    trace!(
                        "{} mined after {:?}",
                        pending.hash,
                        pending.submitted_at.elapsed()
                    );
                    return Ok(());
                }
                Some(false) => {
                    return Err(Error::Confirmation(format!(
                        "transaction {} reverted",
                        pending.hash
                    )));
                }
                None => {}
            }

            crate::group::sleep_or_cancel(cancel, self.config.receipt_poll_interval).await?;
        }
    }
}
