//! Carry ledger service
//!
//! This module ties together the in-memory ledger, storage, the writer actor
//! and event fan-out into a high-level API.
//!
//! # Example
//!
//! ```no_run
//! use carry_ledger::{Config, KeyPair, Ledger, LegId, ManualSequence};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> carry_ledger::Result<()> {
//!     let operator = KeyPair::generate();
//!     let mut config = Config::default();
//!     config.operator = Some(operator.identity().to_hex());
//!
//!     let blocks = Arc::new(ManualSequence::new(100));
//!     let ledger = Ledger::open(config, blocks.clone()).await?;
//!
//!     blocks.set(105);
//!     ledger
//!         .push_carry(operator.identity(), LegId::from_label("legA"), 500_00000)
//!         .await?;
//!     println!("{:?}", ledger.get_state());
//!
//!     ledger.shutdown().await
//! }
//! ```

use crate::{
    actor::{spawn_carry_actor, CarryHandle},
    auth::{Authorizer, FixedOperator},
    carry::CarryLedger,
    crypto::{verify_command, Commitment},
    events::BroadcastSink,
    metrics::Metrics,
    sequence::SequenceSource,
    types::{
        Carry, CarryState, Command, EpochId, EventEnvelope, Identity, LegId, Precondition,
        SignedCommand, SnapshotRecord,
    },
    Config, Error, Result, Storage,
};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::BroadcastStream;

/// Main ledger interface
pub struct Ledger {
    /// Actor handle for writes
    handle: CarryHandle,

    /// Actor task
    task: JoinHandle<()>,

    /// Shared ledger (for reads)
    carry: Arc<RwLock<CarryLedger>>,

    /// Event fan-out
    events: BroadcastSink,

    /// Metrics
    metrics: Metrics,

    /// Configuration
    config: Config,
}

impl std::fmt::Debug for Ledger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledger")
            .field("carry", &*self.carry.read())
            .field("service_name", &self.config.service_name)
            .finish_non_exhaustive()
    }
}

impl Ledger {
    /// Open ledger with the operator named in the configuration
    pub async fn open(config: Config, sequence: Arc<dyn SequenceSource>) -> Result<Self> {
        let operator = config.operator_identity()?;
        Self::open_with(config, Arc::new(FixedOperator::new(operator)), sequence).await
    }

    /// Open ledger with an explicit authorization policy
    ///
    /// A persisted ledger is restored as-is, keeping its original deployment
    /// sequence. Otherwise a new ledger is created at the current sequence.
    ///
    /// The operator is not part of the persisted state. Write authority after
    /// a restart belongs to whoever `authorizer` names now, so reopening with
    /// a different configured operator hands the ledger over to it.
    pub async fn open_with(
        config: Config,
        authorizer: Arc<dyn Authorizer>,
        sequence: Arc<dyn SequenceSource>,
    ) -> Result<Self> {
        let events = BroadcastSink::new(config.events.channel_capacity);
        let sink = Arc::new(events.clone());

        let storage = if config.persistence {
            Some(Arc::new(Storage::open(&config)?))
        } else {
            None
        };

        let persisted = match &storage {
            Some(storage) => storage.load()?,
            None => None,
        };

        let carry = match persisted {
            Some(persisted) => {
                tracing::warn!(
                    operator = %authorizer.operator(),
                    "Restoring persisted ledger; writes are authorized for the configured operator"
                );
                CarryLedger::restore(authorizer, sequence, sink, persisted)
            }
            None => {
                let carry = CarryLedger::new(authorizer, sequence, sink);
                if let Some(storage) = &storage {
                    storage.store(&carry.to_persisted())?;
                }
                carry
            }
        };

        tracing::info!(
            operator = %carry.operator(),
            deployment_sequence = carry.deployment_sequence(),
            persistence = config.persistence,
            "Carry ledger opened"
        );

        let carry = Arc::new(RwLock::new(carry));
        let metrics = Metrics::new().map_err(|e| Error::Other(format!("metrics: {}", e)))?;
        let (handle, task) = spawn_carry_actor(
            carry.clone(),
            storage,
            metrics.clone(),
            config.actor.mailbox_capacity,
        );

        Ok(Self {
            handle,
            task,
            carry,
            events,
            metrics,
            config,
        })
    }

    // Writes

    /// Apply one delta to one leg
    pub async fn push_carry(
        &self,
        caller: Identity,
        leg_id: LegId,
        delta_carry: Carry,
    ) -> Result<EventEnvelope> {
        self.handle.push_carry(caller, leg_id, delta_carry).await
    }

    /// Apply paired deltas to legs as one atomic unit
    pub async fn push_carry_batch(
        &self,
        caller: Identity,
        leg_ids: Vec<LegId>,
        delta_carries: Vec<Carry>,
    ) -> Result<EventEnvelope> {
        self.handle
            .push_carry_batch(caller, leg_ids, delta_carries)
            .await
    }

    /// Seal a snapshot of net carry under `epoch_id`
    pub async fn snapshot(&self, caller: Identity, epoch_id: EpochId) -> Result<EventEnvelope> {
        self.handle.snapshot(caller, epoch_id).await
    }

    /// Verify a signed command and execute it as its signer
    ///
    /// The command runs only if the ledger still matches the precondition it
    /// was signed against, so a captured command cannot be submitted twice.
    pub async fn submit(&self, signed: SignedCommand) -> Result<EventEnvelope> {
        let caller = match verify_command(&signed) {
            Ok(caller) => caller,
            Err(e) => {
                self.metrics.record_rejection();
                tracing::warn!(caller = %signed.caller, error = %e, "Signed command rejected");
                return Err(e);
            }
        };
        self.handle
            .execute_guarded(caller, signed.command, signed.precondition)
            .await
    }

    /// Precondition to sign alongside `command` for [`Ledger::submit`]
    pub fn precondition(&self, command: &Command) -> Precondition {
        self.carry.read().precondition(command)
    }

    // Reads

    /// `(net_carry, tick_count, last_update_sequence)`
    pub fn get_state(&self) -> CarryState {
        self.carry.read().state()
    }

    /// Cumulative carry of a leg; zero if never written
    pub fn get_leg_carry(&self, leg_id: &LegId) -> Carry {
        self.carry.read().leg_carry(leg_id)
    }

    /// Snapshot for `epoch_id`; `(0, 0)` if never sealed
    pub fn get_snapshot(&self, epoch_id: EpochId) -> SnapshotRecord {
        self.carry.read().get_snapshot(epoch_id)
    }

    /// Net carry per elapsed sequence unit since deployment
    pub fn get_carry_rate_per_block(&self) -> Carry {
        self.carry.read().carry_rate_per_block()
    }

    /// Commitment over the current state triple
    pub fn get_state_commitment(&self) -> Commitment {
        self.carry.read().state_commitment()
    }

    /// Operator identity
    pub fn operator(&self) -> Identity {
        self.carry.read().operator()
    }

    /// Sequence at construction
    pub fn deployment_sequence(&self) -> u64 {
        self.carry.read().deployment_sequence()
    }

    /// Stream of committed events, starting from the next one
    pub fn subscribe(&self) -> BroadcastStream<EventEnvelope> {
        self.events.stream()
    }

    /// Metrics collector
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Shutdown ledger, waiting for in-flight writes
    pub async fn shutdown(self) -> Result<()> {
        self.handle.shutdown().await?;
        self.task
            .await
            .map_err(|e| Error::Concurrency(format!("Actor task failed: {}", e)))?;
        tracing::info!("Carry ledger shut down");
        Ok(())
    }
}
