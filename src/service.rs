//! Process-level composition of the wallet core.
//!
//! [`WalletService::start`] wires the components leaves-first: open the
//! store, seed balances, replay the log into the engine and the read model
//! from a single scan, attach the read-model projection as a direct engine
//! handler, and only then spawn the command worker. Because the command
//! channel does not exist until replay has finished, no command can reach
//! the engine before steady state: the Initializing to Running transition
//! is structural, not a runtime check.
//!
//! There is one engine and one store per service instance, created by
//! explicit initialization and torn down by [`WalletService::shutdown`];
//! nothing lives in ambient globals.

use crate::channel::{self, WalletHandle};
use crate::config::WalletConfig;
use crate::engine::WalletEngine;
use crate::read_model::BalanceReadModel;
use crate::store::{FileEventStore, StoreError};
use crate::types::AccountId;
use tokio::task::JoinHandle;

/// A running wallet service: single-writer engine, durable log, and the
/// balance projection, behind a cloneable command handle.
pub struct WalletService {
    handle: WalletHandle,
    read_model: BalanceReadModel,
    worker: JoinHandle<()>,
}

impl WalletService {
    /// Starts a service from configuration.
    ///
    /// `initial_balances` is out-of-band state injected before replay; the
    /// same seeds must be supplied on every start against the same log, or
    /// reconstructed balances will not match the originating run. Replay
    /// errors are fatal: a service must not accept commands over
    /// inconsistent state.
    pub async fn start(
        config: WalletConfig,
        initial_balances: impl IntoIterator<Item = (AccountId, i64)>,
    ) -> Result<Self, StoreError> {
        let store = FileEventStore::open(&config.event_store_path).await?;
        let mut engine = WalletEngine::new(store);
        let read_model = BalanceReadModel::new();

        let seeds: Vec<(AccountId, i64)> = initial_balances.into_iter().collect();
        engine.seed_balances(seeds.iter().cloned()).await;
        read_model.seed_balances(seeds);

        // One full scan rebuilds both the engine and the projection, so the
        // two cannot diverge on startup.
        let events = engine.replay().await?;
        read_model.apply_all(&events);
        tracing::info!(
            events = events.len(),
            accounts = read_model.get_all_balances().len(),
            path = %config.event_store_path.display(),
            "read model rebuilt from event log"
        );

        // The projection observes live events directly from the engine, in
        // order. The broadcast bus stays available for other subscribers;
        // wiring this projection to it as well would double-count.
        engine.register_handler(read_model.clone().into_engine_handler());

        let (handle, worker) = channel::spawn(engine, config.command_channel_capacity);

        Ok(Self {
            handle,
            read_model,
            worker,
        })
    }

    /// A cloneable handle for submitting commands and subscribing to events.
    pub fn handle(&self) -> WalletHandle {
        self.handle.clone()
    }

    /// The balance projection serving queries for this service.
    pub fn read_model(&self) -> BalanceReadModel {
        self.read_model.clone()
    }

    /// Gracefully stops the service: refuses new commands, drains work
    /// already submitted through this handle, and closes the store.
    ///
    /// Outstanding [`WalletHandle`] clones keep the worker alive until they
    /// are dropped; the store is closed exactly once when the worker exits.
    pub async fn shutdown(self) {
        drop(self.handle);
        if let Err(error) = self.worker.await {
            tracing::error!(%error, "wallet engine worker did not shut down cleanly");
        }
    }
}
