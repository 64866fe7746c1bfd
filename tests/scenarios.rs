//! End-to-end scenarios driven through the full service: file-backed store,
//! replaying engine, command channel, and the balance projection.

use std::collections::HashMap;
use std::path::Path;
use tempfile::TempDir;
use walletcore::{
    AccountId, EventEnvelope, EventType, TransactionId, TransferCommand, WalletConfig,
    WalletService,
};

fn account(s: &str) -> AccountId {
    AccountId::try_new(s).expect("valid account id")
}

fn txn(s: &str) -> TransactionId {
    TransactionId::try_new(s).expect("valid transaction id")
}

fn transfer(id: &str, from: &str, to: &str, amount: i64) -> TransferCommand {
    TransferCommand {
        transaction_id: txn(id),
        from_account: account(from),
        to_account: account(to),
        amount,
    }
}

fn config_in(dir: &TempDir) -> WalletConfig {
    WalletConfig::new(dir.path().join("events.log"))
}

async fn start(
    dir: &TempDir,
    seeds: &[(&str, i64)],
) -> WalletService {
    let seeds: Vec<(AccountId, i64)> = seeds
        .iter()
        .map(|(name, balance)| (account(name), *balance))
        .collect();
    WalletService::start(config_in(dir), seeds)
        .await
        .expect("service starts")
}

#[tokio::test]
async fn business_validation_stops_at_insufficient_funds() {
    let dir = tempfile::tempdir().expect("temp dir");
    let service = start(&dir, &[("sender", 100), ("receiver", 0)]).await;
    let handle = service.handle();

    let mut deducted = 0;
    let mut credited = 0;
    let mut failed = 0;
    for i in 1..=10 {
        let response = handle
            .transfer(transfer(&format!("txn-{i}"), "sender", "receiver", 20))
            .await
            .expect("transfer");
        assert!(response.success);
        for tag in &response.events {
            match tag {
                EventType::MoneyDeducted => deducted += 1,
                EventType::MoneyCredited => credited += 1,
                EventType::TransactionFailed => failed += 1,
            }
        }
    }

    assert_eq!((deducted, credited, failed), (5, 5, 5));

    let read_model = service.read_model();
    assert_eq!(read_model.get_balance(&account("sender")), (0, true));
    assert_eq!(read_model.get_balance(&account("receiver")), (100, true));

    service.shutdown().await;
}

#[tokio::test]
async fn duplicate_submission_is_an_idempotent_no_op() {
    let dir = tempfile::tempdir().expect("temp dir");
    let service = start(&dir, &[("alice", 1_000), ("bob", 0)]).await;
    let handle = service.handle();

    let first = handle
        .transfer(transfer("txn-X", "alice", "bob", 100))
        .await
        .expect("first submission");
    assert!(first.success);
    assert_eq!(first.events.len(), 2);

    let second = handle
        .transfer(transfer("txn-X", "alice", "bob", 100))
        .await
        .expect("second submission");
    assert!(second.success);
    assert!(second.events.is_empty());

    let read_model = service.read_model();
    assert_eq!(read_model.get_balance(&account("alice")), (900, true));
    assert_eq!(read_model.get_balance(&account("bob")), (100, true));

    service.shutdown().await;
}

#[tokio::test]
async fn replay_reproduces_the_exact_balances() {
    let dir = tempfile::tempdir().expect("temp dir");
    let seeds = [("alice", 1_000), ("bob", 500), ("charlie", 200)];

    let service = start(&dir, &seeds).await;
    let handle = service.handle();
    for command in [
        transfer("txn-1", "alice", "bob", 100),
        transfer("txn-2", "bob", "charlie", 50),
        transfer("txn-3", "charlie", "alice", 30),
        transfer("txn-4", "alice", "charlie", 200),
    ] {
        let response = handle.transfer(command).await.expect("transfer");
        assert!(response.success);
    }

    let recorded: HashMap<AccountId, i64> = service.read_model().get_all_balances();
    let recorded_total = service.read_model().get_total_balance();
    service.shutdown().await;

    // Fresh process: same log, same seeds.
    let restarted = start(&dir, &seeds).await;
    let replayed = restarted.read_model();
    assert_eq!(replayed.get_all_balances(), recorded);
    assert_eq!(replayed.get_total_balance(), recorded_total);
    restarted.shutdown().await;
}

#[tokio::test]
async fn self_transfer_is_rejected_and_balance_unchanged() {
    let dir = tempfile::tempdir().expect("temp dir");
    let service = start(&dir, &[("x", 500)]).await;

    let response = service
        .handle()
        .transfer(transfer("txn-Y", "x", "x", 10))
        .await
        .expect("transfer");
    assert!(response.success);
    assert_eq!(response.events, vec![EventType::TransactionFailed]);

    assert_eq!(service.read_model().get_balance(&account("x")), (500, true));
    service.shutdown().await;
}

#[tokio::test]
async fn total_balance_is_conserved_under_churn() {
    let dir = tempfile::tempdir().expect("temp dir");
    let service = start(&dir, &[("a", 1_000), ("b", 2_000), ("c", 3_000)]).await;
    let handle = service.handle();
    let accounts = ["a", "b", "c"];

    assert_eq!(service.read_model().get_total_balance(), 6_000);

    for i in 0..100usize {
        let response = handle
            .transfer(transfer(
                &format!("txn-{i}"),
                accounts[i % 3],
                accounts[(i + 1) % 3],
                10 + (i as i64) % 50,
            ))
            .await
            .expect("transfer");
        assert!(response.success);
    }

    let summary = service.read_model().summary();
    assert_eq!(summary.total_balance, 6_000);
    assert_eq!(summary.account_count, 3);
    service.shutdown().await;
}

#[tokio::test]
async fn effects_survive_an_ungraceful_stop() {
    let dir = tempfile::tempdir().expect("temp dir");
    let seeds = [("alice", 1_000), ("bob", 0)];

    let service = start(&dir, &seeds).await;
    let handle = service.handle();
    for id in ["txn-1", "txn-2", "txn-3"] {
        let response = handle
            .transfer(transfer(id, "alice", "bob", 100))
            .await
            .expect("transfer");
        assert_eq!(response.events.len(), 2);
    }

    // No graceful shutdown: every acknowledged command was fsynced, so
    // dropping the process state loses nothing.
    drop(handle);
    drop(service);

    let restarted = start(&dir, &seeds).await;
    let read_model = restarted.read_model();
    assert_eq!(read_model.get_balance(&account("alice")), (700, true));
    assert_eq!(read_model.get_balance(&account("bob")), (300, true));

    // All three ids are still deduplicated after replay.
    for id in ["txn-1", "txn-2", "txn-3"] {
        let response = restarted
            .handle()
            .transfer(transfer(id, "alice", "bob", 100))
            .await
            .expect("resubmission");
        assert!(response.success);
        assert!(response.events.is_empty());
    }
    restarted.shutdown().await;
}

#[tokio::test]
async fn concurrent_callers_are_serialized_by_the_channel() {
    let dir = tempfile::tempdir().expect("temp dir");
    let service = start(&dir, &[("hub", 10_000)]).await;

    let mut tasks = Vec::new();
    for caller in 0..4 {
        let handle = service.handle();
        tasks.push(tokio::spawn(async move {
            for i in 0..10 {
                let response = handle
                    .transfer(transfer(
                        &format!("txn-{caller}-{i}"),
                        "hub",
                        "spoke",
                        10,
                    ))
                    .await
                    .expect("transfer");
                assert!(response.success);
                assert_eq!(response.events.len(), 2);
            }
        }));
    }
    for task in tasks {
        task.await.expect("caller task");
    }

    let read_model = service.read_model();
    assert_eq!(read_model.get_balance(&account("hub")), (9_600, true));
    assert_eq!(read_model.get_balance(&account("spoke")), (400, true));
    assert_eq!(read_model.get_total_balance(), 10_000);
    service.shutdown().await;
}

#[tokio::test]
async fn log_is_ordered_envelopes_with_deduction_before_credit() {
    let dir = tempfile::tempdir().expect("temp dir");
    let service = start(&dir, &[("alice", 1_000)]).await;
    let handle = service.handle();

    for (id, amount) in [("txn-1", 100), ("txn-2", 2_000), ("txn-3", 50)] {
        handle
            .transfer(transfer(id, "alice", "bob", amount))
            .await
            .expect("transfer");
    }
    service.shutdown().await;

    let log_path = dir.path().join("events.log");
    let positions = read_log_positions(&log_path);

    // txn-1 and txn-3 succeeded: deduction strictly before credit.
    for id in ["txn-1", "txn-3"] {
        let tags = &positions[id];
        assert_eq!(
            tags,
            &vec![EventType::MoneyDeducted, EventType::MoneyCredited],
            "transaction {id}"
        );
    }
    // txn-2 failed exactly once, with no paired events.
    assert_eq!(positions["txn-2"], vec![EventType::TransactionFailed]);
}

/// Parses the raw log and groups event tags by transaction id, in log order.
fn read_log_positions(path: &Path) -> HashMap<String, Vec<EventType>> {
    let content = std::fs::read_to_string(path).expect("readable log");
    let mut positions: HashMap<String, Vec<EventType>> = HashMap::new();
    for line in content.lines() {
        let envelope = EventEnvelope::from_line(line).expect("valid envelope line");
        let tag = EventType::from_tag(&envelope.event_type).expect("known tag");
        let event = envelope.into_event().expect("valid event");
        positions
            .entry(event.transaction_id().to_string())
            .or_default()
            .push(tag);
    }
    positions
}
