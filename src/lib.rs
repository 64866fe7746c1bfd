//! # walletcore
//!
//! An event-sourced digital-wallet engine: a deterministic single-writer
//! state machine that processes money-transfer commands, emits an immutable
//! ordered event log, and serves balance queries from a derived read model
//! (CQRS).
//!
//! ## Guarantees
//!
//! - **Atomic transfers without a transactional database**: a successful
//!   transfer is exactly one `MoneyDeducted` followed by one `MoneyCredited`
//!   with the same transaction id, appended to the log as a single fsynced
//!   batch.
//! - **Exactly-once processing**: commands carry a caller-supplied
//!   transaction id; resubmitting an observed id is an idempotent no-op.
//! - **Bit-identical replay**: state is rebuilt by folding the log through
//!   the same pure `apply` function used in live processing: no clocks, no
//!   randomness, no I/O.
//! - **Durability before acknowledgment**: every accepted mutation is
//!   fsynced before the caller sees success.
//!
//! ## Architecture
//!
//! ```text
//! caller ──► WalletHandle ──► bounded channel ──► worker loop (single writer)
//!                                                   │  WalletEngine
//!                                                   │    1. validate (pure decide)
//!                                                   │    2. append_batch + fsync
//!                                                   │    3. apply (pure fold)
//!                                                   │    4. notify handlers ──► BalanceReadModel
//!                                                   │    5. publish ──► broadcast bus
//!                                                   ▼
//!                                             FileEventStore (JSONL log)
//! ```
//!
//! On startup the service replays the full log into the engine and the read
//! model before the command channel exists, so no command can observe
//! partially rebuilt state.
//!
//! ## Example
//!
//! ```no_run
//! use walletcore::{AccountId, TransactionId, TransferCommand, WalletConfig, WalletService};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let alice = AccountId::try_new("alice")?;
//!     let bob = AccountId::try_new("bob")?;
//!
//!     let config = WalletConfig::new("wallet-events.log");
//!     let service = WalletService::start(config, [(alice.clone(), 10_000)]).await?;
//!
//!     let response = service
//!         .handle()
//!         .transfer(TransferCommand {
//!             transaction_id: TransactionId::generate(),
//!             from_account: alice,
//!             to_account: bob.clone(),
//!             amount: 2_500,
//!         })
//!         .await?;
//!     assert!(response.success);
//!
//!     let (balance, _) = service.read_model().get_balance(&bob);
//!     assert_eq!(balance, 2_500);
//!
//!     service.shutdown().await;
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod channel;
pub mod codec;
pub mod command;
pub mod config;
pub mod engine;
pub mod errors;
pub mod event;
pub mod read_model;
pub mod service;
pub mod store;
pub mod types;

pub use channel::WalletHandle;
pub use codec::{CodecError, EventEnvelope};
pub use command::{CommandResponse, TransferCommand};
pub use config::{ChannelCapacity, WalletConfig, DEFAULT_CHANNEL_CAPACITY};
pub use engine::{EventHandler, HandlerError, WalletEngine, WalletState};
pub use errors::CommandError;
pub use event::{
    EventType, MoneyCredited, MoneyDeducted, TransactionFailed, WalletEvent,
};
pub use read_model::{BalanceReadModel, BalanceResponse, BalancesSummary};
pub use service::WalletService;
pub use store::{EventStore, FileEventStore, InMemoryEventStore, StoreError};
pub use types::{AccountId, AccountIdError, TransactionId, TransactionIdError};
