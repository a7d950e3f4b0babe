//! Paced transfer load against a running network.
//!
//! The bot runs one worker per account. Each worker sends a transfer, waits
//! for it to be mined, then sleeps until its next send slot. Slots are
//! spaced so that all workers together approach the target rate:
//!
//! ```text
//! delay   = trunc(accounts * 1000 / tps) ms * damping
//! stagger = delay / accounts
//! ```
//!
//! Workers start `stagger` apart so their sends interleave instead of
//! bursting. Clients come from a pool of at most [`CLIENT_CAP`] connections,
//! assigned round-robin by account index.

mod picker;
mod worker;

pub use picker::{RandomRecipient, TransferPicker};
pub use worker::{pacing_delay, LoadWorker, WorkerState};

use crate::account::Account;
use crate::error::{Error, Result};
use crate::group::{sleep_or_cancel, TaskGroup};
use crate::rpc::TransactionClient;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Factor applied to the per-account delay so the achieved rate lands
/// close to the target despite submission and confirmation overhead.
pub const DEFAULT_PACING_DAMPING: f64 = 0.95;

/// Upper bound on pooled clients.
pub const CLIENT_CAP: usize = 100;

/// Builds one pooled client.
pub type ClientFactory = Arc<dyn Fn() -> Result<Arc<dyn TransactionClient>> + Send + Sync>;

/// Number of pooled clients for a requested count.
#[must_use]
pub fn client_pool_size(requested: usize) -> usize {
    requested.min(CLIENT_CAP)
}

/// Timing and pool size derived from the load settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    /// Interval between sends of one account.
    pub account_delay: Duration,
    /// Interval between worker launches.
    pub launch_stagger: Duration,
    /// Number of pooled clients.
    pub pool_size: usize,
}

impl Schedule {
    /// Derive the schedule for `accounts` workers.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if there are no accounts, the rate is zero,
    /// the client count is zero, or `damping` is not a positive number.
    pub fn compute(
        accounts: usize,
        transactions_per_second: u32,
        client_count: usize,
        damping: f64,
    ) -> Result<Self> {
        if accounts == 0 {
            return Err(Error::Config("load bot needs at least one account".into()));
        }
        if transactions_per_second == 0 {
            return Err(Error::Config("transactions per second must be positive".into()));
        }
        if !(damping.is_finite() && damping > 0.0) {
            return Err(Error::Config(format!("invalid pacing damping {damping}")));
        }
        let pool_size = client_pool_size(client_count);
        if pool_size == 0 {
            return Err(Error::Config("client count must be positive".into()));
        }

        let accounts_u64 = accounts as u64;
        let base_ms = accounts_u64 * 1000 / u64::from(transactions_per_second);
        // Truncated to whole milliseconds after damping.
        #[allow(
            clippy::cast_precision_loss,
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss
        )]
        let account_delay = Duration::from_millis((base_ms as f64 * damping) as u64);
        let launch_stagger = account_delay / u32::try_from(accounts).unwrap_or(u32::MAX);

        Ok(Self {
            account_delay,
            launch_stagger,
            pool_size,
        })
    }
}

/// Counters shared by every worker.
#[derive(Debug, Default)]
pub struct LoadStats {
    submitted: AtomicU64,
    confirmed: AtomicU64,
}

impl LoadStats {
    /// Record an accepted submission.
    pub fn record_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a mined transfer.
    pub fn record_confirmed(&self) {
        self.confirmed.fetch_add(1, Ordering::Relaxed);
    }

    /// Transfers accepted by a node.
    #[must_use]
    pub fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::Relaxed)
    }

    /// Transfers mined.
    #[must_use]
    pub fn confirmed(&self) -> u64 {
        self.confirmed.load(Ordering::Relaxed)
    }
}

/// Everything needed to start a load run.
pub struct LoadBotConfig {
    /// Sending accounts, one worker each.
    pub accounts: Vec<Account>,
    /// Amount per transfer for the default picker.
    pub amount: u128,
    /// Target aggregate rate.
    pub transactions_per_second: u32,
    /// Requested client pool size, capped at [`CLIENT_CAP`].
    pub client_count: usize,
    /// Pacing damping factor.
    pub damping: f64,
    /// Client constructor.
    pub client_factory: ClientFactory,
    /// Transfer source; defaults to [`RandomRecipient`] over the accounts.
    pub picker: Option<Arc<dyn TransferPicker>>,
}

impl std::fmt::Debug for LoadBotConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadBotConfig")
            .field("accounts", &self.accounts.len())
            .field("amount", &self.amount)
            .field("transactions_per_second", &self.transactions_per_second)
            .field("client_count", &self.client_count)
            .field("damping", &self.damping)
            .finish_non_exhaustive()
    }
}

/// A configured load run.
pub struct LoadBot {
    config: LoadBotConfig,
    schedule: Schedule,
    stats: Arc<LoadStats>,
}

impl LoadBot {
    /// Validate `config` and derive its schedule.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` for settings [`Schedule::compute`] rejects.
    pub fn new(config: LoadBotConfig) -> Result<Self> {
        let schedule = Schedule::compute(
            config.accounts.len(),
            config.transactions_per_second,
            config.client_count,
            config.damping,
        )?;
        Ok(Self {
            config,
            schedule,
            stats: Arc::new(LoadStats::default()),
        })
    }

    /// The derived schedule.
    #[must_use]
    pub fn schedule(&self) -> Schedule {
        self.schedule
    }

    /// Shared counters, live while the bot runs.
    #[must_use]
    pub fn stats(&self) -> Arc<LoadStats> {
        Arc::clone(&self.stats)
    }

    /// Run until `cancel` fires or a worker fails.
    ///
    /// # Errors
    ///
    /// Any client factory error before workers start, then the first worker
    /// failure, or `Error::Cancelled` after cancellation.
    pub async fn run(self, cancel: &CancellationToken) -> Result<()> {
        let Self {
            config,
            schedule,
            stats,
        } = self;

        let picker = config.picker.unwrap_or_else(|| -> Arc<dyn TransferPicker> {
            let recipients = config.accounts.iter().map(Account::address).collect();
            Arc::new(RandomRecipient::new(recipients, config.amount))
        });

        let mut pool = Vec::with_capacity(schedule.pool_size);
        for _ in 0..schedule.pool_size {
            pool.push((config.client_factory)()?);
        }

        info!(
            "Starting load bot: {} accounts, {} tx/s, {} clients, delay {:?}",
            config.accounts.len(),
            config.transactions_per_second,
            schedule.pool_size,
            schedule.account_delay
        );

        let mut group = TaskGroup::new("loadbot", cancel);
        let token = group.token();
        for (index, account) in config.accounts.into_iter().enumerate() {
            if sleep_or_cancel(&token, schedule.launch_stagger).await.is_err() {
                debug!("load bot stopped after launching {index} workers");
                break;
            }
            let client = Arc::clone(&pool[index % schedule.pool_size]);
            let picker = Arc::clone(&picker);
            let stats = Arc::clone(&stats);
            let delay = schedule.account_delay;
            group.spawn(move |cancel| async move {
                let mut worker = LoadWorker::new(index, account, client, picker, delay, stats);
                worker.run(&cancel).await
            });
        }

        let result = group.wait().await;
        let (submitted, confirmed) = (stats.submitted(), stats.confirmed());
        match &result {
            Ok(()) | Err(Error::Cancelled) => {
                info!("Load bot stopped: {submitted} submitted, {confirmed} confirmed");
            }
            Err(e) => {
                warn!("Load bot failed after {submitted} submitted, {confirmed} confirmed: {e}");
            }
        }
        result
    }
}

/// Validate `config` and run the bot until `cancel` fires or a worker fails.
///
/// # Errors
///
/// See [`LoadBot::new`] and [`LoadBot::run`].
pub async fn start(cancel: &CancellationToken, config: LoadBotConfig) -> Result<()> {
    LoadBot::new(config)?.run(cancel).await
}
