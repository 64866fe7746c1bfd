//! The sealed set of wallet domain events.
//!
//! Events are the only persisted datum in the system. They are immutable
//! facts: created by the engine, persisted by the event store, projected by
//! the read model, never mutated or deleted. Every successful transfer
//! produces exactly one [`MoneyDeducted`] followed by exactly one
//! [`MoneyCredited`] with the same transaction id; every business-rule
//! rejection produces exactly one [`TransactionFailed`].

use crate::types::{AccountId, TransactionId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Money was deducted from an account as the first half of a transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoneyDeducted {
    /// The transaction this deduction belongs to.
    pub transaction_id: TransactionId,
    /// The account the money left.
    pub account: AccountId,
    /// Amount in minor units (cents). Always strictly positive.
    pub amount: i64,
}

/// Money was credited to an account as the second half of a transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoneyCredited {
    /// The transaction this credit belongs to.
    pub transaction_id: TransactionId,
    /// The account the money arrived at.
    pub account: AccountId,
    /// Amount in minor units (cents). Always strictly positive.
    pub amount: i64,
}

/// A transfer was rejected by a business rule.
///
/// The transaction id is still marked processed, so a retry with the same id
/// is an idempotent no-op even if the underlying cause is later remedied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionFailed {
    /// The transaction that was rejected.
    pub transaction_id: TransactionId,
    /// The account the transfer was attempted from.
    pub from_account: AccountId,
    /// Human-readable rejection reason.
    pub reason: String,
}

/// All possible wallet domain events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalletEvent {
    /// Money left an account.
    MoneyDeducted(MoneyDeducted),
    /// Money arrived at an account.
    MoneyCredited(MoneyCredited),
    /// A transfer was rejected by a business rule.
    TransactionFailed(TransactionFailed),
}

impl WalletEvent {
    /// Returns the wire tag identifying this event's variant.
    pub const fn event_type(&self) -> EventType {
        match self {
            Self::MoneyDeducted(_) => EventType::MoneyDeducted,
            Self::MoneyCredited(_) => EventType::MoneyCredited,
            Self::TransactionFailed(_) => EventType::TransactionFailed,
        }
    }

    /// Returns the transaction id carried by every variant.
    pub const fn transaction_id(&self) -> &TransactionId {
        match self {
            Self::MoneyDeducted(event) => &event.transaction_id,
            Self::MoneyCredited(event) => &event.transaction_id,
            Self::TransactionFailed(event) => &event.transaction_id,
        }
    }
}

impl From<MoneyDeducted> for WalletEvent {
    fn from(event: MoneyDeducted) -> Self {
        Self::MoneyDeducted(event)
    }
}

impl From<MoneyCredited> for WalletEvent {
    fn from(event: MoneyCredited) -> Self {
        Self::MoneyCredited(event)
    }
}

impl From<TransactionFailed> for WalletEvent {
    fn from(event: TransactionFailed) -> Self {
        Self::TransactionFailed(event)
    }
}

/// The wire tag of an event variant.
///
/// Tags are the compatibility surface of the on-disk log and the outbound
/// envelope; they serialize as their bare string form (`"MoneyDeducted"`,
/// `"MoneyCredited"`, `"TransactionFailed"`) and appear in command
/// acknowledgments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    /// Tag for [`MoneyDeducted`].
    MoneyDeducted,
    /// Tag for [`MoneyCredited`].
    MoneyCredited,
    /// Tag for [`TransactionFailed`].
    TransactionFailed,
}

impl EventType {
    /// The tag as it appears on the wire.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MoneyDeducted => "MoneyDeducted",
            Self::MoneyCredited => "MoneyCredited",
            Self::TransactionFailed => "TransactionFailed",
        }
    }

    /// Parses a wire tag, returning `None` for unrecognized tags.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "MoneyDeducted" => Some(Self::MoneyDeducted),
            "MoneyCredited" => Some(Self::MoneyCredited),
            "TransactionFailed" => Some(Self::TransactionFailed),
            _ => None,
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
