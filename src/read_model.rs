//! Read-only balance projection (the query side of CQRS).
//!
//! The read model maintains its own `balances` map, independent of the
//! engine, kept current by observing the event stream. It tracks balances
//! only: deduplication is the engine's concern, and `TransactionFailed`
//! events cause no state change here.
//!
//! Exactly one event source must feed a projection instance: either the
//! engine's direct in-process handler (the default, preserving order with
//! zero queueing) or the broadcast event bus via [`BalanceReadModel::follow_bus`].
//! Wiring both would double-count every transfer.

use crate::codec::EventEnvelope;
use crate::engine::EventHandler;
use crate::event::WalletEvent;
use crate::types::AccountId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;

/// A balance lookup result for one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceResponse {
    /// The queried account.
    pub account: AccountId,
    /// Its balance in minor units; zero when the account is unknown.
    pub balance: i64,
}

/// A snapshot of every balance the projection knows about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalancesSummary {
    /// Balance per account.
    pub balances: HashMap<AccountId, i64>,
    /// Sum over all balances.
    pub total_balance: i64,
    /// Number of known accounts.
    pub account_count: usize,
}

/// Derived projection of account balances.
///
/// Clones share the same underlying map, so one clone can be wired as the
/// engine's handler while another serves queries. Reads proceed concurrently
/// with event application under a readers-writer lock: individual query
/// results are internally consistent, but a multi-account query (such as
/// [`get_total_balance`](Self::get_total_balance)) issued between the
/// deduction and credit of one transfer may observe the intermediate state.
#[derive(Debug, Clone, Default)]
pub struct BalanceReadModel {
    balances: Arc<RwLock<HashMap<AccountId, i64>>>,
}

impl BalanceReadModel {
    /// Creates an empty projection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets an account's balance directly, bypassing the event stream.
    ///
    /// Out-of-band initialization only, applied before replay with the same
    /// seeds as the engine.
    pub fn seed_balance(&self, account: AccountId, balance: i64) {
        self.balances
            .write()
            .expect("balances lock poisoned")
            .insert(account, balance);
    }

    /// Seeds several balances at once.
    pub fn seed_balances(&self, balances: impl IntoIterator<Item = (AccountId, i64)>) {
        let mut map = self.balances.write().expect("balances lock poisoned");
        for (account, balance) in balances {
            map.insert(account, balance);
        }
    }

    /// Applies one event to the projection.
    ///
    /// Identical to the engine's apply function restricted to balance
    /// mutations; failure events are a no-op.
    pub fn apply(&self, event: &WalletEvent) {
        let mut balances = self.balances.write().expect("balances lock poisoned");
        match event {
            WalletEvent::MoneyDeducted(deducted) => {
                *balances.entry(deducted.account.clone()).or_insert(0) -= deducted.amount;
            }
            WalletEvent::MoneyCredited(credited) => {
                *balances.entry(credited.account.clone()).or_insert(0) += credited.amount;
            }
            WalletEvent::TransactionFailed(_) => {}
        }
    }

    /// Applies a sequence of events in order (startup replay).
    pub fn apply_all(&self, events: &[WalletEvent]) {
        for event in events {
            self.apply(event);
        }
    }

    /// Returns `(balance, exists)` for an account; absent is `(0, false)`.
    pub fn get_balance(&self, account: &AccountId) -> (i64, bool) {
        let balances = self.balances.read().expect("balances lock poisoned");
        match balances.get(account) {
            Some(balance) => (*balance, true),
            None => (0, false),
        }
    }

    /// A snapshot copy of all balances.
    pub fn get_all_balances(&self) -> HashMap<AccountId, i64> {
        self.balances
            .read()
            .expect("balances lock poisoned")
            .clone()
    }

    /// The sum over all balances.
    pub fn get_total_balance(&self) -> i64 {
        self.balances
            .read()
            .expect("balances lock poisoned")
            .values()
            .sum()
    }

    /// The balance query payload for one account.
    pub fn balance_response(&self, account: &AccountId) -> BalanceResponse {
        let (balance, _) = self.get_balance(account);
        BalanceResponse {
            account: account.clone(),
            balance,
        }
    }

    /// The all-balances query payload.
    pub fn summary(&self) -> BalancesSummary {
        let balances = self.get_all_balances();
        let total_balance = balances.values().sum();
        let account_count = balances.len();
        BalancesSummary {
            balances,
            total_balance,
            account_count,
        }
    }

    /// Converts this projection handle into an engine event handler.
    ///
    /// This is the preferred wiring: the engine invokes the handler
    /// synchronously for every event in order, so the projection can never
    /// reorder or drop events. Do not additionally wire the same projection
    /// to the event bus.
    pub fn into_engine_handler(self) -> EventHandler {
        Box::new(move |event| {
            self.apply(event);
            Ok(())
        })
    }

    /// Spawns a task that keeps this projection current from the broadcast
    /// event bus.
    ///
    /// Intended for projections living outside the engine's process
    /// composition. Consumes the handle; do not also register the same
    /// projection as a direct engine handler. The task ends when the bus
    /// closes. A lagging receiver logs a warning and continues; missed
    /// envelopes make the projection stale until rebuilt from the log.
    pub fn follow_bus(
        self,
        mut events: broadcast::Receiver<EventEnvelope>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(envelope) => match envelope.into_event() {
                        Ok(event) => self.apply(&event),
                        Err(error) => {
                            tracing::warn!(%error, "dropping undecodable envelope from event bus");
                        }
                    },
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        tracing::warn!(missed, "read model lagged behind the event bus");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}
