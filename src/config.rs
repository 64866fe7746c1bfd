//! Configuration recognized by the wallet core.
//!
//! Everything else (network endpoints, logging levels, broker URLs)
//! belongs to the external collaborators that embed the core.

use nutype::nutype;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Bound on the command channel, validated to be positive.
///
/// When this many commands are queued and unprocessed, further submissions
/// block until the worker catches up; commands are never dropped.
#[nutype(
    validate(greater_or_equal = 1),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Into,
        Serialize,
        Deserialize
    )
)]
pub struct ChannelCapacity(usize);

/// Default command channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Configuration for a wallet service instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletConfig {
    /// Filesystem path of the append-only event log.
    pub event_store_path: PathBuf,
    /// Bound on the command channel.
    pub command_channel_capacity: ChannelCapacity,
}

impl WalletConfig {
    /// Creates a configuration with the default channel capacity.
    pub fn new(event_store_path: impl Into<PathBuf>) -> Self {
        Self {
            event_store_path: event_store_path.into(),
            command_channel_capacity: ChannelCapacity::try_new(DEFAULT_CHANNEL_CAPACITY)
                .expect("default capacity is positive"),
        }
    }

    /// Overrides the command channel capacity.
    #[must_use]
    pub fn with_channel_capacity(mut self, capacity: ChannelCapacity) -> Self {
        self.command_channel_capacity = capacity;
        self
    }
}
