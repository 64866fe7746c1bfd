//! The command channel: ordered delivery into the single-writer worker loop.
//!
//! [`spawn`] moves the engine into a dedicated worker task that consumes a
//! bounded command channel one request at a time. The ordering invariant is
//! structural: there is exactly one consumer, so the order commands leave
//! the channel *is* the order their events appear in the log, in engine
//! state, and in every subscriber's observation.
//!
//! The engine's lifecycle maps onto the channel:
//!
//! - **Initializing**: before [`spawn`], while the service replays the log;
//!   no channel exists, so no command can arrive.
//! - **Running**: the worker consumes commands until every
//!   [`WalletHandle`] clone is dropped.
//! - **Stopped**: the worker drains requests already in the channel,
//!   closes the event store, and exits.
//!
//! Backpressure: the channel is bounded by
//! [`ChannelCapacity`](crate::config::ChannelCapacity). When it is full,
//! both [`WalletHandle::transfer`] and [`WalletHandle::publish`] block until
//! the worker catches up; commands are never silently dropped.

use crate::codec::EventEnvelope;
use crate::command::{CommandResponse, TransferCommand};
use crate::config::ChannelCapacity;
use crate::engine::WalletEngine;
use crate::errors::CommandError;
use crate::store::EventStore;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;

struct CommandRequest {
    command: TransferCommand,
    reply: Option<oneshot::Sender<Result<CommandResponse, CommandError>>>,
}

/// Cloneable submission handle for the wallet engine.
///
/// All clones feed the same worker loop. When the last clone is dropped the
/// engine drains outstanding commands, closes its store, and stops.
#[derive(Clone)]
pub struct WalletHandle {
    commands: mpsc::Sender<CommandRequest>,
    events: broadcast::Sender<EventEnvelope>,
}

impl WalletHandle {
    /// Submits a command and waits for the engine's acknowledgment.
    ///
    /// `Ok` covers business success, business failure (one
    /// `TransactionFailed` event), and idempotent duplicates (no events).
    /// `Err` is a system failure: the command did not take effect.
    pub async fn transfer(&self, command: TransferCommand) -> Result<CommandResponse, CommandError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(CommandRequest {
                command,
                reply: Some(reply_tx),
            })
            .await
            .map_err(|_| CommandError::ChannelClosed)?;
        reply_rx.await.map_err(|_| CommandError::ChannelClosed)?
    }

    /// Like [`transfer`](Self::transfer) with a caller-supplied timeout.
    ///
    /// On expiry the caller gets [`CommandError::Timeout`], but a command in
    /// progress is not cancellable: the engine still runs it to completion.
    pub async fn transfer_with_timeout(
        &self,
        command: TransferCommand,
        timeout: Duration,
    ) -> Result<CommandResponse, CommandError> {
        match tokio::time::timeout(timeout, self.transfer(command)).await {
            Ok(result) => result,
            Err(_) => Err(CommandError::Timeout),
        }
    }

    /// Submits a command without waiting for its outcome.
    ///
    /// Delivery into the channel is still guaranteed (or an error is
    /// returned); processing failures are logged by the engine.
    pub async fn publish(&self, command: TransferCommand) -> Result<(), CommandError> {
        self.commands
            .send(CommandRequest {
                command,
                reply: None,
            })
            .await
            .map_err(|_| CommandError::ChannelClosed)
    }

    /// Subscribes to the outbound event bus.
    ///
    /// Envelopes are identical in form to the on-disk log lines.
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.events.subscribe()
    }
}

/// Starts the single-writer worker loop for `engine`.
///
/// Returns the submission handle and the worker's join handle. The worker
/// runs until every [`WalletHandle`] clone is dropped, then drains the
/// channel and closes the store, on every exit path.
pub fn spawn<S>(engine: WalletEngine<S>, capacity: ChannelCapacity) -> (WalletHandle, JoinHandle<()>)
where
    S: EventStore + Send + Sync + 'static,
{
    let (commands, mut requests) = mpsc::channel::<CommandRequest>(capacity.into());
    let events = engine.events_sender();

    let worker = tokio::spawn(async move {
        tracing::info!("wallet engine worker started");
        while let Some(CommandRequest { command, reply }) = requests.recv().await {
            let response = engine
                .process(command)
                .await
                .map(CommandResponse::acknowledged)
                .map_err(CommandError::from);
            if let Some(reply) = reply {
                // The caller may have timed out and dropped its receiver.
                let _ = reply.send(response);
            }
        }
        if let Err(error) = engine.close().await {
            tracing::error!(%error, "failed to close event store during shutdown");
        }
        tracing::info!("wallet engine worker stopped");
    });

    (WalletHandle { commands, events }, worker)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventType;
    use crate::store::InMemoryEventStore;
    use crate::types::{AccountId, TransactionId};
    use std::sync::Arc;

    fn account(s: &str) -> AccountId {
        AccountId::try_new(s).expect("valid account id")
    }

    fn transfer(id: &str, from: &str, to: &str, amount: i64) -> TransferCommand {
        TransferCommand {
            transaction_id: TransactionId::try_new(id).expect("valid transaction id"),
            from_account: account(from),
            to_account: account(to),
            amount,
        }
    }

    fn capacity(n: usize) -> ChannelCapacity {
        ChannelCapacity::try_new(n).expect("valid capacity")
    }

    async fn started_engine(balances: &[(&str, i64)]) -> WalletEngine<Arc<InMemoryEventStore>> {
        let engine = WalletEngine::new(Arc::new(InMemoryEventStore::new()));
        for (name, balance) in balances {
            engine.seed_balance(account(name), *balance).await;
        }
        engine
    }

    #[tokio::test]
    async fn transfer_acknowledges_with_event_tags() {
        let engine = started_engine(&[("alice", 1_000)]).await;
        let (handle, worker) = spawn(engine, capacity(8));

        let response = handle
            .transfer(transfer("t1", "alice", "bob", 100))
            .await
            .expect("transfer");
        assert!(response.success);
        assert_eq!(
            response.events,
            vec![EventType::MoneyDeducted, EventType::MoneyCredited]
        );

        drop(handle);
        worker.await.expect("worker");
    }

    #[tokio::test]
    async fn duplicate_transfer_acknowledges_empty() {
        let engine = started_engine(&[("alice", 1_000)]).await;
        let (handle, worker) = spawn(engine, capacity(8));

        let first = handle
            .transfer(transfer("t1", "alice", "bob", 100))
            .await
            .expect("first");
        assert_eq!(first.events.len(), 2);

        let second = handle
            .transfer(transfer("t1", "alice", "bob", 100))
            .await
            .expect("second");
        assert!(second.success);
        assert!(second.events.is_empty());

        drop(handle);
        worker.await.expect("worker");
    }

    #[tokio::test]
    async fn interleaved_submissions_are_totally_ordered() {
        let store = Arc::new(InMemoryEventStore::new());
        let engine = WalletEngine::new(Arc::clone(&store));
        engine.seed_balance(account("alice"), 1_000).await;
        let (handle, worker) = spawn(engine, capacity(8));

        // Fire-and-forget followed by request/reply: the ack of the second
        // command implies the first was fully processed before it.
        handle
            .publish(transfer("t1", "alice", "bob", 100))
            .await
            .expect("publish");
        let response = handle
            .transfer(transfer("t2", "alice", "bob", 50))
            .await
            .expect("transfer");
        assert!(response.success);

        drop(handle);
        worker.await.expect("worker");

        let events = store.load_all().await.expect("load");
        let ids: Vec<_> = events
            .iter()
            .map(|event| event.transaction_id().to_string())
            .collect();
        assert_eq!(ids, vec!["t1", "t1", "t2", "t2"]);
    }

    #[tokio::test]
    async fn shutdown_drains_queued_commands_and_closes_the_store() {
        let store = Arc::new(InMemoryEventStore::new());
        let engine = WalletEngine::new(Arc::clone(&store));
        engine.seed_balance(account("alice"), 1_000).await;
        let (handle, worker) = spawn(engine, capacity(8));

        for i in 0..3 {
            handle
                .publish(transfer(&format!("t{i}"), "alice", "bob", 10))
                .await
                .expect("publish");
        }
        drop(handle);
        worker.await.expect("worker");

        // All three commands were processed before the worker exited, and
        // the store no longer accepts appends.
        let events = store.load_all().await.expect("load");
        assert_eq!(events.len(), 6);
        let error = store
            .append_batch(&events[..1])
            .await
            .expect_err("store must be closed");
        assert!(matches!(error, crate::store::StoreError::Closed));
    }

    #[tokio::test]
    async fn aborted_worker_surfaces_channel_closed() {
        let engine = started_engine(&[("alice", 1_000)]).await;
        let (handle, worker) = spawn(engine, capacity(8));

        worker.abort();
        let _ = worker.await;

        let error = handle
            .transfer(transfer("t1", "alice", "bob", 100))
            .await
            .expect_err("channel must be closed");
        assert!(matches!(error, CommandError::ChannelClosed));
    }

    #[tokio::test]
    async fn timeout_expires_without_an_acknowledgment() {
        // A handle whose channel has no consumer: the reply never arrives.
        let (commands, _requests) = mpsc::channel(1);
        let (events, _) = broadcast::channel(1);
        let handle = WalletHandle { commands, events };

        let error = handle
            .transfer_with_timeout(
                transfer("t1", "alice", "bob", 100),
                Duration::from_millis(20),
            )
            .await
            .expect_err("must time out");
        assert!(matches!(error, CommandError::Timeout));
    }

    #[tokio::test]
    async fn bus_subscription_sees_processed_events() {
        let engine = started_engine(&[("alice", 1_000)]).await;
        let (handle, worker) = spawn(engine, capacity(8));
        let mut events = handle.subscribe();

        handle
            .transfer(transfer("t1", "alice", "bob", 100))
            .await
            .expect("transfer");

        assert_eq!(
            events.recv().await.expect("envelope").event_type,
            "MoneyDeducted"
        );
        assert_eq!(
            events.recv().await.expect("envelope").event_type,
            "MoneyCredited"
        );

        drop(handle);
        worker.await.expect("worker");
    }
}
