//! Errors surfaced at the command boundary.
//!
//! Business failures are deliberately absent here: a rejected transfer is a
//! value (a persisted `TransactionFailed` event inside a successful
//! acknowledgment), not an error. This enum covers only system failures.

use crate::codec::CodecError;
use crate::store::StoreError;
use thiserror::Error;

/// The closed set of system errors a command submission can produce.
///
/// Any of these means the command was *not* processed: no events were
/// persisted and engine state is unchanged.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The event store failed to persist the command's events.
    #[error("event store failure: {0}")]
    StoreIo(String),

    /// An event could not be serialized for persistence.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// The command channel is closed: the engine has shut down.
    #[error("command channel closed")]
    ChannelClosed,

    /// The caller-supplied timeout expired before the acknowledgment
    /// arrived. The engine still runs the command to completion.
    #[error("timed out waiting for command acknowledgment")]
    Timeout,
}

// thiserror's #[from] cannot route enum variants, and a store-side codec
// failure should surface as the codec variant. Manual match is the
// idiomatic solution for variant-specific conversion.
impl From<StoreError> for CommandError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::Codec(codec) => Self::Codec(codec),
            other => Self::StoreIo(other.to_string()),
        }
    }
}
