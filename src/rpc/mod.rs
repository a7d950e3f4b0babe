//! Transaction submission clients.
//!
//! The load bot talks to the network through [`TransactionClient`]: submit a
//! signed transfer, then wait until it is mined. [`RpcClient`] implements it
//! over JSON-RPC/HTTP; tests substitute in-memory clients.

mod client;
pub mod tx;

pub use alloy_primitives::TxHash;
pub use client::{RpcClient, RpcClientConfig};

use crate::account::{Account, Address};
use crate::error::Result;
use async_trait::async_trait;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// A value transfer to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferJob {
    /// Recipient address.
    pub recipient: Address,
    /// Amount in token base units.
    pub amount: u128,
}

/// A submitted transaction awaiting confirmation.
#[derive(Debug, Clone)]
pub struct PendingTransaction {
    /// Transaction hash.
    pub hash: TxHash,
    /// When it was handed to the client.
    pub submitted_at: Instant,
}

impl PendingTransaction {
    /// Track `hash`, submitted now.
    #[must_use]
    pub fn new(hash: TxHash) -> Self {
        Self {
            hash,
            submitted_at: Instant::now(),
        }
    }
}

/// A pooled connection able to submit signed transfers.
///
/// One client may be shared by several accounts, so implementations must be
/// safe for concurrent use. A single account never has two calls in flight.
#[async_trait]
pub trait TransactionClient: Send + Sync {
    /// Sign `job` with `from`'s key and submit it.
    ///
    /// # Errors
    ///
    /// Returns `Error::Submission` if the transaction cannot be built or is
    /// rejected.
    async fn send_transfer(&self, from: &Account, job: &TransferJob) -> Result<PendingTransaction>;

    /// Block until `pending` is mined or `cancel` fires.
    ///
    /// # Errors
    ///
    /// Returns `Error::Confirmation` if the receipt cannot be obtained or
    /// reports failure, `Error::Cancelled` if `cancel` fires first.
    async fn wait_mined(
        &self,
        pending: &PendingTransaction,
        cancel: &CancellationToken,
    ) -> Result<()>;
}
