//! The deterministic wallet state machine.
//!
//! The engine is split into two layers:
//!
//! - [`WalletState`] is the pure core: `decide` turns a command into events
//!   and `apply` folds an event into state. Both are synchronous,
//!   deterministic, and free of side effects: no clock, no randomness, no
//!   I/O. `apply` is shared verbatim between live processing and replay,
//!   which is what makes state reconstruction bit-identical.
//! - [`WalletEngine`] wraps the state with the event store, registered
//!   handlers, and the outbound event bus, and runs the persist-then-apply
//!   protocol: events are durable before they touch in-memory state, and
//!   state is updated before any subscriber observes the events.
//!
//! The engine is a single logical writer. [`process`](WalletEngine::process)
//! is only ever invoked from the command channel's worker loop (see
//! [`channel`](crate::channel)), and one write-lock region spans the
//! idempotency check, validation, store append, and apply, so no two
//! commands can interleave their events in the log or in state.

use crate::codec::EventEnvelope;
use crate::command::TransferCommand;
use crate::event::{
    EventType, MoneyCredited, MoneyDeducted, TransactionFailed, WalletEvent,
};
use crate::store::{EventStore, StoreError};
use crate::types::{AccountId, TransactionId};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

/// Capacity of the outbound event bus. Slow subscribers past this many
/// undelivered envelopes start lagging (the log, not the bus, is the source
/// of truth).
const EVENT_BUS_CAPACITY: usize = 1024;

/// Error type returned by event handlers.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// A synchronous subscriber invoked for every event, in order, after the
/// event is persisted and applied.
///
/// Handler failures are logged and swallowed: they never fail an
/// already-persisted command.
pub type EventHandler = Box<dyn Fn(&WalletEvent) -> Result<(), HandlerError> + Send + Sync>;

/// The canonical in-memory wallet state: balances plus the set of processed
/// transaction ids.
///
/// Absent accounts have a balance of zero. State is mutated exclusively by
/// [`apply`](WalletState::apply); it is destroyed on process termination and
/// reconstituted by replaying the event log.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WalletState {
    balances: HashMap<AccountId, i64>,
    processed: HashSet<TransactionId>,
}

impl WalletState {
    /// Creates an empty state: no accounts, no processed transactions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decides which events a command produces, without mutating state.
    ///
    /// Validation order is fixed and the first failure wins:
    ///
    /// 1. duplicate transaction id → no events,
    /// 2. non-positive amount → `TransactionFailed`,
    /// 3. self-transfer → `TransactionFailed`,
    /// 4. insufficient funds → `TransactionFailed`,
    /// 5. otherwise → `MoneyDeducted` then `MoneyCredited`, in that order.
    pub fn decide(&self, command: &TransferCommand) -> Vec<WalletEvent> {
        if self.processed.contains(&command.transaction_id) {
            return Vec::new();
        }

        if command.amount <= 0 {
            return vec![TransactionFailed {
                transaction_id: command.transaction_id.clone(),
                from_account: command.from_account.clone(),
                reason: "amount must be positive".to_string(),
            }
            .into()];
        }

        if command.from_account == command.to_account {
            return vec![TransactionFailed {
                transaction_id: command.transaction_id.clone(),
                from_account: command.from_account.clone(),
                reason: "cannot transfer to same account".to_string(),
            }
            .into()];
        }

        if self.balance_of(&command.from_account) < command.amount {
            return vec![TransactionFailed {
                transaction_id: command.transaction_id.clone(),
                from_account: command.from_account.clone(),
                reason: "insufficient funds".to_string(),
            }
            .into()];
        }

        vec![
            MoneyDeducted {
                transaction_id: command.transaction_id.clone(),
                account: command.from_account.clone(),
                amount: command.amount,
            }
            .into(),
            MoneyCredited {
                transaction_id: command.transaction_id.clone(),
                account: command.to_account.clone(),
                amount: command.amount,
            }
            .into(),
        ]
    }

    /// Folds one event into state.
    ///
    /// The deduction marks the transaction id processed for the whole pair;
    /// failure events mark their id without touching balances.
    pub fn apply(&mut self, event: &WalletEvent) {
        match event {
            WalletEvent::MoneyDeducted(deducted) => {
                *self.balances.entry(deducted.account.clone()).or_insert(0) -= deducted.amount;
                self.processed.insert(deducted.transaction_id.clone());
            }
            WalletEvent::MoneyCredited(credited) => {
                *self.balances.entry(credited.account.clone()).or_insert(0) += credited.amount;
            }
            WalletEvent::TransactionFailed(failed) => {
                self.processed.insert(failed.transaction_id.clone());
            }
        }
    }

    /// Folds a sequence of events into state, in order.
    pub fn apply_all(&mut self, events: &[WalletEvent]) {
        for event in events {
            self.apply(event);
        }
    }

    /// The balance of `account`; absent accounts are zero.
    pub fn balance_of(&self, account: &AccountId) -> i64 {
        self.balances.get(account).copied().unwrap_or(0)
    }

    /// A snapshot copy of all balances.
    pub fn all_balances(&self) -> HashMap<AccountId, i64> {
        self.balances.clone()
    }

    /// The sum of all balances.
    pub fn total_balance(&self) -> i64 {
        self.balances.values().sum()
    }

    /// Whether `transaction_id` has already been observed.
    pub fn is_processed(&self, transaction_id: &TransactionId) -> bool {
        self.processed.contains(transaction_id)
    }

    /// Sets an account's balance directly, bypassing the event log.
    ///
    /// Out-of-band initialization only: the same seeds must be applied
    /// before every replay, or reconstructed state will not match the
    /// originating node. The service wiring only seeds before replay.
    pub fn seed_balance(&mut self, account: AccountId, balance: i64) {
        self.balances.insert(account, balance);
    }
}

/// The single-writer wallet engine.
///
/// Owns the canonical [`WalletState`], persists events through its store,
/// and fans processed events out to registered handlers and the broadcast
/// event bus. Balance reads may run concurrently with command processing;
/// they observe consistent individual entries.
///
/// Commands whose transaction id was consumed by a `TransactionFailed`
/// event can never succeed later under the same id, even if the cause
/// (e.g. insufficient funds) is remedied; retries need a fresh id.
pub struct WalletEngine<S> {
    state: Arc<RwLock<WalletState>>,
    store: S,
    handlers: Vec<EventHandler>,
    events_tx: broadcast::Sender<EventEnvelope>,
}

impl<S: EventStore> WalletEngine<S> {
    /// Creates an engine with empty state over the given store.
    pub fn new(store: S) -> Self {
        let (events_tx, _) = broadcast::channel(EVENT_BUS_CAPACITY);
        Self {
            state: Arc::new(RwLock::new(WalletState::new())),
            store,
            handlers: Vec::new(),
            events_tx,
        }
    }

    /// Registers a synchronous handler invoked for every processed event in
    /// order. Registration happens during wiring, before the engine starts
    /// consuming commands.
    pub fn register_handler(&mut self, handler: EventHandler) {
        self.handlers.push(handler);
    }

    /// Subscribes to the outbound event bus.
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.events_tx.subscribe()
    }

    pub(crate) fn events_sender(&self) -> broadcast::Sender<EventEnvelope> {
        self.events_tx.clone()
    }

    /// Seeds one account balance. See [`WalletState::seed_balance`].
    pub async fn seed_balance(&self, account: AccountId, balance: i64) {
        self.state.write().await.seed_balance(account, balance);
    }

    /// Seeds several account balances before replay.
    pub async fn seed_balances(&self, balances: impl IntoIterator<Item = (AccountId, i64)>) {
        let mut state = self.state.write().await;
        for (account, balance) in balances {
            state.seed_balance(account, balance);
        }
    }

    /// Rebuilds state by replaying every event in the store, returning the
    /// replayed events so other projections can be rebuilt from the same
    /// scan.
    ///
    /// Takes `&mut self` to pin replay to the wiring phase: once the engine
    /// is shared with the worker loop, no further replay is possible.
    pub async fn replay(&mut self) -> Result<Vec<WalletEvent>, StoreError> {
        let events = self.store.load_all().await?;
        let mut state = self.state.write().await;
        state.apply_all(&events);
        tracing::info!(
            events = events.len(),
            accounts = state.balances.len(),
            "wallet engine state rebuilt from event log"
        );
        Ok(events)
    }

    /// Processes one transfer command: idempotency check, validation,
    /// durable append, state application, then subscriber notification.
    ///
    /// Returns the tags of the emitted events; an empty vector means the
    /// command was an idempotent duplicate. `Err` means a system failure
    /// (store or codec): nothing was persisted and state is untouched.
    pub async fn process(&self, command: TransferCommand) -> Result<Vec<EventType>, StoreError> {
        // One exclusion region spans check → validate → persist → apply, so
        // readers never observe a half-applied transfer and no two commands
        // interleave their events.
        let mut state = self.state.write().await;

        if state.is_processed(&command.transaction_id) {
            tracing::debug!(
                transaction_id = %command.transaction_id,
                "duplicate transaction, skipping"
            );
            return Ok(Vec::new());
        }

        let events = state.decide(&command);

        if let Err(error) = self.store.append_batch(&events).await {
            tracing::error!(
                transaction_id = %command.transaction_id,
                %error,
                "failed to persist events, command aborted"
            );
            return Err(error);
        }

        state.apply_all(&events);
        drop(state);

        self.notify_handlers(&events);
        self.publish(&events);

        Ok(events.iter().map(WalletEvent::event_type).collect())
    }

    /// The balance of `account`; absent accounts are zero.
    pub async fn balance_of(&self, account: &AccountId) -> i64 {
        self.state.read().await.balance_of(account)
    }

    /// A snapshot copy of all balances.
    pub async fn all_balances(&self) -> HashMap<AccountId, i64> {
        self.state.read().await.all_balances()
    }

    /// The sum of all balances.
    pub async fn total_balance(&self) -> i64 {
        self.state.read().await.total_balance()
    }

    /// Closes the underlying store. Called by the worker loop on shutdown.
    pub async fn close(&self) -> Result<(), StoreError> {
        self.store.close().await
    }

    fn notify_handlers(&self, events: &[WalletEvent]) {
        for event in events {
            for handler in &self.handlers {
                if let Err(error) = handler(event) {
                    tracing::warn!(
                        transaction_id = %event.transaction_id(),
                        event_type = %event.event_type(),
                        %error,
                        "event handler failed; event is already persisted, continuing"
                    );
                }
            }
        }
    }

    fn publish(&self, events: &[WalletEvent]) {
        for event in events {
            match EventEnvelope::new(event) {
                // No receivers is fine; the log remains the source of truth.
                Ok(envelope) => {
                    let _ = self.events_tx.send(envelope);
                }
                Err(error) => {
                    tracing::warn!(
                        transaction_id = %event.transaction_id(),
                        %error,
                        "failed to serialize event for publishing"
                    );
                }
            }
        }
    }
}
