//! Distribution engine behaviour against the in-memory ledger.

use ledger_tps_benchmark::{
    DistributionEngine, DistributionSettings, KeySupply, StatsAggregator,
};
use ledger_tps_ledger::{Account, FeeParams, LedgerError, Transfer, U256};
use ledger_tps_ledger_memory::{test_account, MemoryLedger, Operation};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

fn settings(balance_limit: u64, pending_tx_limit: u64) -> DistributionSettings {
    DistributionSettings {
        balance_limit: U256::from(balance_limit),
        fees: FeeParams {
            gas_limit: 21_000,
            gas_price: 1,
        },
        pending_tx_limit,
        max_concurrent_branches: 64,
        shutdown_grace: Duration::from_secs(120),
    }
}

fn keys(seeds: std::ops::RangeInclusive<u8>) -> KeySupply {
    KeySupply::preloaded(seeds.map(test_account).collect::<Vec<Account>>())
}

fn sent_from(submissions: &[Transfer], account: &Account) -> Vec<Transfer> {
    submissions
        .iter()
        .filter(|t| t.from == account.address())
        .cloned()
        .collect()
}

#[tokio::test]
async fn test_root_splits_balance_with_increasing_nonces() {
    let root = test_account(1);
    let ledger = Arc::new(MemoryLedger::new().with_balance(root.address(), 1_000_000u64));
    let stats = Arc::new(StatsAggregator::default());
    let engine = DistributionEngine::new(
        Arc::clone(&ledger),
        keys(2..=3),
        Arc::clone(&stats),
        settings(0, 400),
    );

    let root_address = root.address();
    let report = engine.run(root, CancellationToken::new()).await;

    let submissions = ledger.submissions();
    let root_sends: Vec<_> = submissions
        .iter()
        .filter(|t| t.from == root_address)
        .collect();
    assert_eq!(root_sends.len(), 2);
    assert_eq!(root_sends[0].nonce, 0);
    assert_eq!(root_sends[1].nonce, 1);
    assert!(root_sends.iter().all(|t| t.amount == U256::from(500_000)));
    assert_eq!(root_sends[0].to, test_account(2).address());
    assert_eq!(root_sends[1].to, test_account(3).address());
    assert_eq!(ledger.balance(root_address), U256::ZERO);

    // Both children start branches but find the key supply empty.
    assert_eq!(report.branches, 3);
    assert_eq!(report.sends, 2);
    assert_eq!(report.spawned, 2);
    assert_eq!(report.aborted, 2);

    let snapshot = stats.snapshot();
    assert_eq!(snapshot.finished, 2);
    assert_eq!(snapshot.pending, 0);
}

#[tokio::test]
async fn test_branch_below_floor_sends_nothing() {
    let root = test_account(1);
    let ledger = Arc::new(MemoryLedger::new().with_balance(root.address(), 99u64));
    let stats = Arc::new(StatsAggregator::default());
    let engine = DistributionEngine::new(
        Arc::clone(&ledger),
        keys(2..=5),
        Arc::clone(&stats),
        settings(100, 400),
    );

    let report = engine.run(root, CancellationToken::new()).await;

    assert_eq!(report.branches, 1);
    assert_eq!(report.below_floor, 1);
    assert_eq!(report.sends, 0);
    assert_eq!(report.spawned, 0);
    assert_eq!(ledger.calls(Operation::Submit), 0);
    assert_eq!(ledger.calls(Operation::Nonce), 0);
    assert_eq!(stats.snapshot().submitted, 0);
}

#[tokio::test]
async fn test_full_tree_stops_at_balance_floor() {
    let root = test_account(1);
    let ledger = Arc::new(MemoryLedger::new().with_balance(root.address(), 1_000_000u64));
    let stats = Arc::new(StatsAggregator::default());
    let engine = DistributionEngine::new(
        Arc::clone(&ledger),
        KeySupply::spawn(16).unwrap(),
        Arc::clone(&stats),
        settings(100_000, 400),
    );

    let root_address = root.address();
    let report = engine.run(root, CancellationToken::new()).await;

    // 1_000_000 -> 2 x 450_000 -> 4 x 175_000 -> 8 x 37_500 (below floor)
    assert_eq!(report.branches, 15);
    assert_eq!(report.sends, 14);
    assert_eq!(report.spawned, 14);
    assert_eq!(report.below_floor, 8);
    assert_eq!(report.aborted, 0);
    assert_eq!(report.throttled, 0);

    let amounts: Vec<U256> = ledger.submissions().iter().map(|t| t.amount).collect();
    assert_eq!(
        amounts.iter().filter(|a| **a == U256::from(450_000)).count(),
        2
    );
    assert_eq!(
        amounts.iter().filter(|a| **a == U256::from(175_000)).count(),
        4
    );
    assert_eq!(
        amounts.iter().filter(|a| **a == U256::from(37_500)).count(),
        8
    );
    assert_eq!(ledger.balance(root_address), U256::from(100_000));

    let snapshot = stats.snapshot();
    assert_eq!(snapshot.finished, 14);
    assert_eq!(snapshot.pending, 0);
}

#[tokio::test]
async fn test_single_worker_pool_still_completes_tree() {
    let root = test_account(1);
    let ledger = Arc::new(MemoryLedger::new().with_balance(root.address(), 1_000_000u64));
    let engine = DistributionEngine::new(
        Arc::clone(&ledger),
        KeySupply::spawn(4).unwrap(),
        Arc::new(StatsAggregator::default()),
        DistributionSettings {
            max_concurrent_branches: 1,
            ..settings(100_000, 400)
        },
    );

    let report = engine.run(root, CancellationToken::new()).await;

    assert_eq!(report.branches, 15);
    assert_eq!(report.sends, 14);
}

#[tokio::test]
async fn test_pending_ceiling_suppresses_recursion() {
    let root = test_account(1);
    let root_address = root.address();
    let stats = Arc::new(StatsAggregator::default());

    // One transfer from elsewhere stays pending for the whole run.
    stats.record_submitted();

    // Another lands just as the root funds its second child.
    let hook_stats = Arc::clone(&stats);
    let ledger = Arc::new(
        MemoryLedger::new()
            .with_balance(root_address, 100u64)
            .on_submit(move |transfer| {
                if transfer.from == root_address && transfer.nonce == 1 {
                    hook_stats.record_submitted();
                }
            }),
    );

    let engine = DistributionEngine::new(
        Arc::clone(&ledger),
        keys(2..=9),
        Arc::clone(&stats),
        settings(0, 1),
    );
    let report = engine.run(root, CancellationToken::new()).await;

    let submissions = ledger.submissions();
    let root_sends: Vec<_> = submissions
        .iter()
        .filter(|t| t.from == root_address)
        .collect();
    assert_eq!(root_sends.len(), 2);
    assert!(root_sends.iter().all(|t| t.amount == U256::from(50)));

    // First child: pending was exactly 1 after confirmation, so it recursed.
    let recursed = root_sends[0].to;
    assert_eq!(
        submissions.iter().filter(|t| t.from == recursed).count(),
        2
    );

    // Second child: pending was 2, so it never became a branch.
    let throttled = root_sends[1].to;
    assert!(submissions.iter().all(|t| t.from != throttled));

    assert_eq!(report.branches, 2);
    assert_eq!(report.spawned, 1);
    assert_eq!(report.throttled, 3);
    assert_eq!(stats.pending(), 2);
}

#[tokio::test]
async fn test_submit_failure_aborts_branch_without_pending() {
    let root = test_account(1);
    let ledger = Arc::new(MemoryLedger::new().with_balance(root.address(), 1_000u64));
    ledger.inject_failures(
        Operation::Submit,
        1,
        LedgerError::Rejected("insufficient funds for gas".into()),
    );
    let stats = Arc::new(StatsAggregator::default());
    let engine = DistributionEngine::new(
        Arc::clone(&ledger),
        keys(2..=5),
        Arc::clone(&stats),
        settings(0, 400),
    );

    let report = engine.run(root, CancellationToken::new()).await;

    assert_eq!(report.aborted, 1);
    assert_eq!(report.sends, 0);
    assert!(ledger.submissions().is_empty());

    let snapshot = stats.snapshot();
    assert_eq!(snapshot.send_failures, 1);
    assert_eq!(snapshot.pending, 0);
    assert_eq!(snapshot.submitted, 0);
}

#[tokio::test]
async fn test_confirmation_failure_releases_pending() {
    let root = test_account(1);
    let ledger = Arc::new(MemoryLedger::new().with_balance(root.address(), 1_000u64));
    ledger.inject_failures(
        Operation::Confirm,
        1,
        LedgerError::Reverted(Default::default()),
    );
    let stats = Arc::new(StatsAggregator::default());
    let engine = DistributionEngine::new(
        Arc::clone(&ledger),
        keys(2..=5),
        Arc::clone(&stats),
        settings(0, 400),
    );

    let root_address = root.address();
    let report = engine.run(root, CancellationToken::new()).await;

    assert_eq!(report.branches, 1);
    assert_eq!(report.aborted, 1);
    assert_eq!(report.sends, 1);
    assert_eq!(sent_from(&ledger.submissions(), &test_account(1)).len(), 1);
    assert_eq!(ledger.submissions()[0].from, root_address);

    let snapshot = stats.snapshot();
    assert_eq!(snapshot.pending, 0);
    assert_eq!(snapshot.finished, 0);
    assert_eq!(snapshot.confirmation_failures, 1);
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_drains_in_flight_confirmation() {
    let cancel = CancellationToken::new();
    let root = test_account(1);

    let on_send = cancel.clone();
    let ledger = Arc::new(
        MemoryLedger::new()
            .with_balance(root.address(), 1_000_000u64)
            .with_confirmation_delay(Duration::from_secs(5))
            .on_submit(move |_| on_send.cancel()),
    );
    let stats = Arc::new(StatsAggregator::default());
    let engine = DistributionEngine::new(
        Arc::clone(&ledger),
        keys(2..=9),
        Arc::clone(&stats),
        settings(0, 400),
    );

    let start = Instant::now();
    let report = engine.run(root, cancel).await;

    assert_eq!(start.elapsed(), Duration::from_secs(5));
    assert_eq!(ledger.submissions().len(), 1);
    assert_eq!(report.sends, 1);
    assert_eq!(report.spawned, 0);
    assert_eq!(report.cancelled, 1);
    assert_eq!(report.abandoned, 0);

    let snapshot = stats.snapshot();
    assert_eq!(snapshot.finished, 1);
    assert_eq!(snapshot.pending, 0);
}

#[tokio::test(start_paused = true)]
async fn test_drain_gives_up_after_grace() {
    let cancel = CancellationToken::new();
    let root = test_account(1);

    let on_send = cancel.clone();
    let ledger = Arc::new(
        MemoryLedger::new()
            .with_balance(root.address(), 1_000_000u64)
            .with_confirmation_delay(Duration::from_secs(600))
            .on_submit(move |_| on_send.cancel()),
    );
    let stats = Arc::new(StatsAggregator::default());
    let engine = DistributionEngine::new(
        Arc::clone(&ledger),
        keys(2..=9),
        Arc::clone(&stats),
        DistributionSettings {
            shutdown_grace: Duration::from_secs(10),
            ..settings(0, 400)
        },
    );

    let start = Instant::now();
    let report = engine.run(root, cancel).await;

    assert_eq!(start.elapsed(), Duration::from_secs(10));
    assert_eq!(report.abandoned, 1);
    assert_eq!(report.branches, 0);
    assert_eq!(stats.pending(), 1);
}

#[tokio::test]
async fn test_cancelled_before_start_sends_nothing() {
    let root = test_account(1);
    let ledger = Arc::new(MemoryLedger::new().with_balance(root.address(), 1_000_000u64));
    let engine = DistributionEngine::new(
        Arc::clone(&ledger),
        keys(2..=9),
        Arc::new(StatsAggregator::default()),
        settings(0, 400),
    );

    let cancel = CancellationToken::new();
    cancel.cancel();
    let report = engine.run(root, cancel).await;

    assert!(ledger.submissions().is_empty());
    assert_eq!(report.sends, 0);
}
