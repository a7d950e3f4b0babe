//! Choosing the next transfer for a load worker.

use crate::account::Address;
use crate::rpc::TransferJob;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Source of transfer jobs shared by every worker.
///
/// Called once per transaction, from many workers concurrently.
pub trait TransferPicker: Send + Sync {
    /// The next transfer to submit.
    fn next_transfer(&self) -> TransferJob;
}

impl<F> TransferPicker for F
where
    F: Fn() -> TransferJob + Send + Sync,
{
    fn next_transfer(&self) -> TransferJob {
        self()
    }
}

/// Sends a fixed amount to a uniformly random recipient.
pub struct RandomRecipient<R = StdRng> {
    recipients: Vec<Address>,
    amount: u128,
    rng: Mutex<R>,
}

impl RandomRecipient<StdRng> {
    /// Picker seeded from OS entropy.
    #[must_use]
    pub fn new(recipients: Vec<Address>, amount: u128) -> Self {
        Self::with_rng(recipients, amount, StdRng::from_entropy())
    }

    /// Picker with a fixed seed, for reproducible runs.
    #[must_use]
    pub fn seeded(recipients: Vec<Address>, amount: u128, seed: u64) -> Self {
        Self::with_rng(recipients, amount, StdRng::seed_from_u64(seed))
    }
}

impl<R: Rng + Send> RandomRecipient<R> {
    /// Picker drawing from `rng`.
    pub fn with_rng(recipients: Vec<Address>, amount: u128, rng: R) -> Self {
        Self {
            recipients,
            amount,
            rng: Mutex::new(rng),
        }
    }

    /// Candidate recipients.
    pub fn recipients(&self) -> &[Address] {
        &self.recipients
    }
}

impl<R: Rng + Send> TransferPicker for RandomRecipient<R> {
    fn next_transfer(&self) -> TransferJob {
        // An empty recipient list sends to the zero address.
        let recipient = if self.recipients.is_empty() {
            Address::ZERO
        } else {
            let i = self.rng.lock().gen_range(0..self.recipients.len());
            self.recipients[i]
        };
        TransferJob {
            recipient,
            amount: self.amount,
        }
    }
}

impl<R> std::fmt::Debug for RandomRecipient<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RandomRecipient")
            .field("recipients", &self.recipients.len())
            .field("amount", &self.amount)
            .finish_non_exhaustive()
    }
}
