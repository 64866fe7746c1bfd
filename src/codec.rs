//! Envelope (de)serialization for wallet events.
//!
//! Every event crosses the process boundary (disk and event bus) wrapped in
//! an [`EventEnvelope`]: a JSON object with a `type` tag, an informational
//! UTC timestamp, and the variant payload under `data`. One envelope per
//! line, UTF-8, no BOM:
//!
//! ```text
//! {"type":"MoneyDeducted","timestamp":"2024-01-15T10:30:00Z","data":{...}}
//! ```
//!
//! The codec is strictly syntactic: it does not inspect or enforce semantic
//! invariants, and the timestamp is never consulted during replay. Decoding
//! dispatches on the `type` tag so that an unrecognized tag surfaces as
//! [`CodecError::UnknownEventType`] rather than a generic parse failure.

use crate::event::{EventType, MoneyCredited, MoneyDeducted, TransactionFailed, WalletEvent};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced by envelope encoding and decoding.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The envelope carried a type tag outside the sealed event set.
    #[error("unknown event type: {0}")]
    UnknownEventType(String),

    /// An event could not be serialized into its envelope.
    #[error("failed to encode event: {0}")]
    Encode(#[source] serde_json::Error),

    /// An envelope or payload could not be parsed.
    #[error("failed to decode event: {0}")]
    Decode(#[source] serde_json::Error),
}

/// The wire and on-disk form of an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// The variant tag (`MoneyDeducted`, `MoneyCredited`, `TransactionFailed`).
    #[serde(rename = "type")]
    pub event_type: String,
    /// When the envelope was created. Informational only; never an input to
    /// state reconstruction.
    pub timestamp: DateTime<Utc>,
    /// The variant payload, kept raw so the envelope stays payload-agnostic.
    pub data: serde_json::Value,
}

impl EventEnvelope {
    /// Wraps an event in a fresh envelope stamped with the current time.
    pub fn new(event: &WalletEvent) -> Result<Self, CodecError> {
        let data = match event {
            WalletEvent::MoneyDeducted(payload) => serde_json::to_value(payload),
            WalletEvent::MoneyCredited(payload) => serde_json::to_value(payload),
            WalletEvent::TransactionFailed(payload) => serde_json::to_value(payload),
        }
        .map_err(CodecError::Encode)?;

        Ok(Self {
            event_type: event.event_type().as_str().to_string(),
            timestamp: Utc::now(),
            data,
        })
    }

    /// Serializes the envelope as a single JSON line (without the trailing
    /// newline; line framing belongs to the store).
    pub fn to_line(&self) -> Result<String, CodecError> {
        serde_json::to_string(self).map_err(CodecError::Encode)
    }

    /// Parses one envelope from a single JSON line.
    pub fn from_line(line: &str) -> Result<Self, CodecError> {
        serde_json::from_str(line).map_err(CodecError::Decode)
    }

    /// Extracts the domain event, dispatching on the type tag.
    pub fn into_event(self) -> Result<WalletEvent, CodecError> {
        let event_type = EventType::from_tag(&self.event_type)
            .ok_or_else(|| CodecError::UnknownEventType(self.event_type.clone()))?;

        let event = match event_type {
            EventType::MoneyDeducted => serde_json::from_value::<MoneyDeducted>(self.data)
                .map(WalletEvent::from)
                .map_err(CodecError::Decode)?,
            EventType::MoneyCredited => serde_json::from_value::<MoneyCredited>(self.data)
                .map(WalletEvent::from)
                .map_err(CodecError::Decode)?,
            EventType::TransactionFailed => serde_json::from_value::<TransactionFailed>(self.data)
                .map(WalletEvent::from)
                .map_err(CodecError::Decode)?,
        };

        Ok(event)
    }
}

/// Encodes an event as one envelope line.
pub fn encode(event: &WalletEvent) -> Result<String, CodecError> {
    EventEnvelope::new(event)?.to_line()
}

/// Decodes one envelope line back into a domain event.
pub fn decode(line: &str) -> Result<WalletEvent, CodecError> {
    EventEnvelope::from_line(line)?.into_event()
}
