//! Inbound command and acknowledgment payloads.

use crate::event::EventType;
use crate::types::{AccountId, TransactionId};
use serde::{Deserialize, Serialize};

/// A request to transfer money between two accounts.
///
/// Commands are external input and are never stored; only the events they
/// produce are persisted. The `transaction_id` is the caller's deduplication
/// key: resubmitting a command with an id the engine has already observed is
/// an idempotent no-op.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferCommand {
    /// Caller-supplied deduplication key.
    pub transaction_id: TransactionId,
    /// The account to debit.
    pub from_account: AccountId,
    /// The account to credit.
    pub to_account: AccountId,
    /// Amount in minor units (cents) to avoid floating point issues.
    pub amount: i64,
}

/// The acknowledgment returned for a processed command.
///
/// `success: true` covers both business success (two events emitted) and
/// business failure (one `TransactionFailed` event emitted) as well as
/// idempotent duplicates (no events). `success: false` denotes a system
/// error: serialization, store I/O, or channel failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResponse {
    /// Whether the command was processed (business failures included).
    pub success: bool,
    /// System-error description, present only when `success` is `false`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Tags of the events the command emitted, in emission order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<EventType>,
}

impl CommandResponse {
    /// An acknowledgment for a processed command with the events it emitted.
    ///
    /// An empty list means the command was an idempotent duplicate.
    pub fn acknowledged(events: Vec<EventType>) -> Self {
        Self {
            success: true,
            error: None,
            events,
        }
    }

    /// An acknowledgment for a command that hit a system error.
    ///
    /// Used by transports that serialize errors into the wire payload rather
    /// than surfacing a typed error to the caller.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            events: Vec::new(),
        }
    }
}
