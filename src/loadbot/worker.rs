//! One paced submit-and-confirm loop per account.

use super::{LoadStats, TransferPicker};
use crate::account::Account;
use crate::error::{Error, Result};
use crate::group::sleep_or_cancel;
use crate::rpc::TransactionClient;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Where a worker is in its loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Not started.
    Idle,
    /// Submitting a transfer.
    Submitting,
    /// Waiting for the transfer to be mined.
    WaitingForConfirmation,
    /// Sleeping until the next send slot.
    Pacing,
    /// Stopped by cancellation.
    Canceled,
    /// Stopped by a submission or confirmation error.
    Failed,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Submitting => "submitting",
            Self::WaitingForConfirmation => "waiting-for-confirmation",
            Self::Pacing => "pacing",
            Self::Canceled => "canceled",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Time to sleep before the next send, given when the previous one started.
///
/// Zero when the slot is already due; a slow confirmation eats into the
/// pacing interval rather than adding to it.
#[must_use]
pub fn pacing_delay(sent_at: Instant, now: Instant, delay: Duration) -> Duration {
    (sent_at + delay).saturating_duration_since(now)
}

/// Keep `e` if it already has the right category, otherwise wrap it.
fn categorize(e: Error, wrap: fn(String) -> Error) -> Error {
    match e {
        Error::Cancelled | Error::Submission(_) | Error::Confirmation(_) => e,
        other => wrap(other.to_string()),
    }
}

/// Load loop for a single account.
pub struct LoadWorker {
    index: usize,
    account: Account,
    client: Arc<dyn TransactionClient>,
    picker: Arc<dyn TransferPicker>,
    delay: Duration,
    stats: Arc<LoadStats>,
    state: WorkerState,
}

impl LoadWorker {
    /// Worker for `account`, sending one transfer every `delay`.
    pub fn new(
        index: usize,
        account: Account,
        client: Arc<dyn TransactionClient>,
        picker: Arc<dyn TransferPicker>,
        delay: Duration,
        stats: Arc<LoadStats>,
    ) -> Self {
        Self {
            index,
            account,
            client,
            picker,
            delay,
            stats,
            state: WorkerState::Idle,
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> WorkerState {
        self.state
    }

    fn transition(&mut self, next: WorkerState) {
        trace!("worker {}: {} -> {next}", self.index, self.state);
        self.state = next;
    }

    fn stop(&mut self, e: Error) -> Error {
        if e.is_cancelled() {
            self.transition(WorkerState::Canceled);
        } else {
            debug!("worker {} ({}) failed: {e}", self.index, self.account.address());
            self.transition(WorkerState::Failed);
        }
        e
    }

    /// Submit, confirm and pace until `cancel` fires or a call fails.
    ///
    /// Never returns `Ok`.
    ///
    /// # Errors
    ///
    /// `Error::Submission` or `Error::Confirmation` on the first failed
    /// transfer, `Error::Cancelled` once `cancel` fires.
    pub async fn run(&mut self, cancel: &CancellationToken) -> Result<()> {
        loop {
            if cancel.is_cancelled() {
                return Err(self.stop(Error::Cancelled));
            }

            let sent_at = Instant::now();
            let job = self.picker.next_transfer();

            self.transition(WorkerState::Submitting);
            let submitted = tokio::select! {
                biased;
                () = cancel.cancelled() => Err(Error::Cancelled),
                r = self.client.send_transfer(&self.account, &job) => r,
            };
            let pending = match submitted {
                Ok(p) => p,
                Err(e) => return Err(self.stop(categorize(e, Error::Submission))),
            };
            self.stats.record_submitted();

            self.transition(WorkerState::WaitingForConfirmation);
            if let Err(e) = self.client.wait_mined(&pending, cancel).await {
                return Err(self.stop(categorize(e, Error::Confirmation)));
            }
            self.stats.record_confirmed();

            let pause = pacing_delay(sent_at, Instant::now(), self.delay);
            if pause.is_zero() {
                continue;
            }
            self.transition(WorkerState::Pacing);
            if let Err(e) = sleep_or_cancel(cancel, pause).await {
                return Err(self.stop(e));
            }
        }
    }
}

impl fmt::Debug for LoadWorker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadWorker")
            .field("index", &self.index)
            .field("account", &self.account.address())
            .field("delay", &self.delay)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
