//! Load bot tests against fake transaction clients.
//!
//! All timing tests run on a paused clock, so send instants are exact.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use super::harness::{developers, FakeClientOptions, FakeClientPool};
use localnet::loadbot::{self, LoadBot, LoadBotConfig, DEFAULT_PACING_DAMPING};
use localnet::{Account, Address, Error, TransactionClient, TransferJob, TransferPicker};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

fn config(
    accounts: Vec<Account>,
    tps: u32,
    clients: usize,
    pool: &FakeClientPool,
) -> LoadBotConfig {
    LoadBotConfig {
        accounts,
        amount: 10_000_000,
        transactions_per_second: tps,
        client_count: clients,
        damping: DEFAULT_PACING_DAMPING,
        client_factory: pool.factory(),
        picker: None,
    }
}

fn fast_confirm() -> FakeClientOptions {
    FakeClientOptions {
        confirm_after: Duration::from_millis(100),
        ..FakeClientOptions::default()
    }
}

/// Run `bot` until `after` has elapsed on the test clock.
async fn run_for(bot: LoadBot, after: Duration) -> localnet::Result<()> {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(after).await;
        trigger.cancel();
    });
    bot.run(&cancel).await
}

fn gaps(instants: &[Instant]) -> Vec<Duration> {
    instants.windows(2).map(|w| w[1] - w[0]).collect()
}

#[test]
fn test_reference_schedule() {
    let pool = FakeClientPool::new(fast_confirm());
    let bot = LoadBot::new(config(developers(10), 5, 10, &pool)).unwrap();
    let schedule = bot.schedule();
    assert_eq!(schedule.account_delay, Duration::from_millis(1900));
    assert_eq!(schedule.launch_stagger, Duration::from_millis(190));
    assert_eq!(schedule.pool_size, 10);
    assert_eq!(pool.len(), 0, "clients are only created by run");
}

#[test]
fn test_invalid_settings_rejected() {
    let pool = FakeClientPool::new(fast_confirm());
    let zero_clients = LoadBot::new(config(developers(3), 5, 0, &pool));
    assert!(matches!(zero_clients, Err(Error::Config(_))));
    let zero_rate = LoadBot::new(config(developers(3), 0, 1, &pool));
    assert!(matches!(zero_rate, Err(Error::Config(_))));
    let no_accounts = LoadBot::new(config(Vec::new(), 5, 1, &pool));
    assert!(matches!(no_accounts, Err(Error::Config(_))));
}

#[tokio::test(start_paused = true)]
async fn test_client_pool_capped_at_100() {
    let pool = FakeClientPool::new(fast_confirm());
    let bot = LoadBot::new(config(developers(3), 3, 250, &pool)).unwrap();
    assert_eq!(bot.schedule().pool_size, 100);

    let err = run_for(bot, Duration::from_millis(500)).await.unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(pool.len(), 100);
}

#[tokio::test(start_paused = true)]
async fn test_accounts_assigned_round_robin() {
    let accounts = developers(7);
    let addresses: Vec<Address> = accounts.iter().map(Account::address).collect();
    let pool = FakeClientPool::new(fast_confirm());
    let bot = LoadBot::new(config(accounts, 7, 3, &pool)).unwrap();

    let _ = run_for(bot, Duration::from_secs(3)).await;

    assert_eq!(pool.len(), 3);
    for k in 0..3 {
        let mut expected: Vec<Address> = (0..7)
            .filter(|i| i % 3 == k)
            .map(|i| addresses[i])
            .collect();
        expected.sort();
        assert_eq!(pool.client(k).senders(), expected, "client {k}");
    }
}

#[tokio::test(start_paused = true)]
async fn test_workers_launch_staggered() {
    let accounts = developers(10);
    let addresses: Vec<Address> = accounts.iter().map(Account::address).collect();
    let pool = FakeClientPool::new(fast_confirm());
    let bot = LoadBot::new(config(accounts, 5, 10, &pool)).unwrap();

    let t0 = Instant::now();
    let _ = run_for(bot, Duration::from_secs(2)).await;

    for (i, address) in addresses.iter().enumerate() {
        let first = pool.client(i).sends_from(*address)[0];
        // Every launch, the first included, waits one stagger.
        let slot = u32::try_from(i + 1).unwrap();
        assert_eq!(first - t0, Duration::from_millis(190) * slot);
    }
}

#[tokio::test(start_paused = true)]
async fn test_sends_paced_per_account() {
    let accounts = developers(2);
    let addresses: Vec<Address> = accounts.iter().map(Account::address).collect();
    let pool = FakeClientPool::new(fast_confirm());
    let bot = LoadBot::new(config(accounts, 1, 1, &pool)).unwrap();
    assert_eq!(bot.schedule().account_delay, Duration::from_millis(1900));

    let t0 = Instant::now();
    let err = run_for(bot, Duration::from_secs(6)).await.unwrap_err();
    assert!(err.is_cancelled());

    let client = pool.client(0);
    let first = client.sends_from(addresses[0]);
    let second = client.sends_from(addresses[1]);
    assert_eq!(first.len(), 3);
    assert_eq!(second.len(), 3);
    assert_eq!(first[0] - t0, Duration::from_millis(950));
    assert_eq!(second[0] - t0, Duration::from_millis(1900));
    assert!(gaps(&first).iter().all(|g| *g == Duration::from_millis(1900)));
    assert!(gaps(&second).iter().all(|g| *g == Duration::from_millis(1900)));
}

#[tokio::test(start_paused = true)]
async fn test_slow_confirmation_sends_without_sleeping() {
    let accounts = developers(2);
    let address = accounts[0].address();
    let pool = FakeClientPool::new(FakeClientOptions {
        confirm_after: Duration::from_millis(2500),
        ..FakeClientOptions::default()
    });
    let bot = LoadBot::new(config(accounts, 1, 1, &pool)).unwrap();

    let _ = run_for(bot, Duration::from_secs(6)).await;

    let sends = pool.client(0).sends_from(address);
    assert_eq!(sends.len(), 3);
    assert!(gaps(&sends).iter().all(|g| *g == Duration::from_millis(2500)));
}

#[tokio::test(start_paused = true)]
async fn test_submission_failure_stops_all_workers() {
    let pool = FakeClientPool::new(FakeClientOptions {
        confirm_after: Duration::from_millis(100),
        fail_send_after: Some(5),
        ..FakeClientOptions::default()
    });
    let bot = LoadBot::new(config(developers(3), 3, 1, &pool)).unwrap();
    let stats = bot.stats();

    let err = bot.run(&CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, Error::Submission(_)));
    assert_eq!(stats.submitted(), 5);
    assert_eq!(pool.total_sends(), 5);
}

#[tokio::test(start_paused = true)]
async fn test_confirmation_failure_is_fatal() {
    let pool = FakeClientPool::new(FakeClientOptions {
        confirm_after: Duration::from_millis(100),
        fail_confirm: true,
        ..FakeClientOptions::default()
    });
    let bot = LoadBot::new(config(developers(4), 4, 2, &pool)).unwrap();
    let stats = bot.stats();

    let err = bot.run(&CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, Error::Confirmation(_)));
    assert_eq!(stats.confirmed(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_launch_stops_remaining_workers() {
    let accounts = developers(10);
    let first = accounts[0].address();
    let pool = FakeClientPool::new(fast_confirm());
    let bot = LoadBot::new(config(accounts, 5, 10, &pool)).unwrap();

    // First worker starts at 190ms, the second would at 380ms.
    let err = run_for(bot, Duration::from_millis(250)).await.unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(pool.total_sends(), 1);
    assert_eq!(pool.client(0).senders(), vec![first]);
}

#[tokio::test]
async fn test_client_factory_error_returned() {
    let mut cfg = config(developers(2), 2, 2, &FakeClientPool::new(fast_confirm()));
    cfg.client_factory = Arc::new(|| -> localnet::Result<Arc<dyn TransactionClient>> {
        Err(Error::Rpc("connection refused".into()))
    });
    let err = loadbot::start(&CancellationToken::new(), cfg).await.unwrap_err();
    assert!(matches!(err, Error::Rpc(_)));
}

#[tokio::test(start_paused = true)]
async fn test_custom_picker_is_used() {
    struct Fixed(Address);
    impl TransferPicker for Fixed {
        fn next_transfer(&self) -> TransferJob {
            TransferJob {
                recipient: self.0,
                amount: 1,
            }
        }
    }

    let sink = Address::repeat_byte(0xee);
    let pool = FakeClientPool::new(fast_confirm());
    let mut cfg = config(developers(3), 3, 1, &pool);
    cfg.picker = Some(Arc::new(Fixed(sink)));

    let _ = run_for(LoadBot::new(cfg).unwrap(), Duration::from_secs(3)).await;

    let recipients = pool.client(0).recipients();
    assert!(!recipients.is_empty());
    assert!(recipients.iter().all(|r| *r == sink));
}

#[tokio::test(start_paused = true)]
async fn test_default_picker_sends_to_known_accounts() {
    let accounts = developers(4);
    let addresses: Vec<Address> = accounts.iter().map(Account::address).collect();
    let pool = FakeClientPool::new(fast_confirm());

    let _ = run_for(
        LoadBot::new(config(accounts, 4, 1, &pool)).unwrap(),
        Duration::from_secs(5),
    )
    .await;

    let recipients = pool.client(0).recipients();
    assert!(recipients.len() >= 4);
    assert!(recipients.iter().all(|r| addresses.contains(r)));
}

#[tokio::test(start_paused = true)]
async fn test_cancel_before_first_stagger_sends_nothing() {
    let pool = FakeClientPool::new(fast_confirm());
    let bot = LoadBot::new(config(developers(10), 5, 10, &pool)).unwrap();

    let err = run_for(bot, Duration::from_millis(100)).await.unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(pool.total_sends(), 0);
    assert_eq!(pool.len(), 10, "clients are created before launching");
}
