//! Actor-based single writer for the carry ledger
//!
//! All mutations flow through one Tokio task, so no two writes ever
//! interleave. Reads bypass the actor and take a read guard on the shared
//! ledger directly.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │               CarryHandle (Clone)                     │
//! │         Sends commands to actor mailbox               │
//! └─────────────────────┬────────────────────────────────┘
//!                       │
//!                       │ mpsc::channel (bounded)
//!                       ▼
//! ┌──────────────────────────────────────────────────────┐
//! │              CarryActor (Single Task)                 │
//! │   prepare (read guard) → Storage::commit()            │
//! │                        → apply (write guard)          │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! A change becomes visible to readers only after it is durable, and it
//! becomes visible all at once.

use crate::carry::{CarryLedger, StateChange};
use crate::metrics::Metrics;
use crate::types::{Carry, Command, EpochId, EventEnvelope, Identity, LegId, Precondition};
use crate::{Error, Result, Storage};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Message sent to the carry actor
#[derive(Debug)]
pub enum CarryMessage {
    /// Execute a mutating command on behalf of `caller`
    ///
    /// With a precondition, the command only runs against that exact state.
    Execute {
        caller: Identity,
        command: Command,
        precondition: Option<Precondition>,
        response: oneshot::Sender<Result<EventEnvelope>>,
    },

    /// Shutdown actor
    Shutdown,
}

/// Actor that owns the write path
pub struct CarryActor {
    /// Shared ledger (readers hold read guards)
    ledger: Arc<RwLock<CarryLedger>>,

    /// Storage backend, absent when running in-memory
    storage: Option<Arc<Storage>>,

    /// Metrics
    metrics: Metrics,

    /// Mailbox for incoming messages
    mailbox: mpsc::Receiver<CarryMessage>,
}

impl CarryActor {
    /// Create new actor
    pub fn new(
        ledger: Arc<RwLock<CarryLedger>>,
        storage: Option<Arc<Storage>>,
        metrics: Metrics,
        mailbox: mpsc::Receiver<CarryMessage>,
    ) -> Self {
        Self {
            ledger,
            storage,
            metrics,
            mailbox,
        }
    }

    /// Run the actor event loop
    pub async fn run(mut self) {
        while let Some(msg) = self.mailbox.recv().await {
            match msg {
                CarryMessage::Execute {
                    caller,
                    command,
                    precondition,
                    response,
                } => {
                    let result = self.execute(&caller, &command, precondition.as_ref());
                    let _ = response.send(result);
                }
                CarryMessage::Shutdown => break,
            }
        }

        tracing::info!("Carry actor stopped");
    }

    fn execute(
        &self,
        caller: &Identity,
        command: &Command,
        precondition: Option<&Precondition>,
    ) -> Result<EventEnvelope> {
        let (change, deployment_sequence) = {
            let ledger = self.ledger.read();
            let change = match precondition {
                Some(expected) => ledger
                    .check_precondition(command, expected)
                    .and_then(|()| prepare(&ledger, caller, command)),
                None => prepare(&ledger, caller, command),
            };
            (change, ledger.deployment_sequence())
        };

        let change = match change {
            Ok(change) => change,
            Err(e) => {
                if e.is_rejection() {
                    self.metrics.record_rejection();
                    tracing::warn!(caller = %caller, error = %e, "Carry command rejected");
                }
                return Err(e);
            }
        };

        if let Some(storage) = &self.storage {
            storage.commit(deployment_sequence, &change)?;
        }

        let envelope = self.ledger.write().apply(change);
        self.metrics.record_event(&envelope.event);

        tracing::debug!(
            event = envelope.event.kind(),
            event_id = %envelope.event_id,
            sequence = envelope.sequence,
            "Carry change committed"
        );

        Ok(envelope)
    }
}

fn prepare(ledger: &CarryLedger, caller: &Identity, command: &Command) -> Result<StateChange> {
    match command {
        Command::PushCarry {
            leg_id,
            delta_carry,
        } => ledger.prepare_push_carry(caller, *leg_id, *delta_carry),
        Command::PushCarryBatch {
            leg_ids,
            delta_carries,
        } => ledger.prepare_push_carry_batch(caller, leg_ids, delta_carries),
        Command::Snapshot { epoch_id } => ledger.prepare_snapshot(caller, *epoch_id),
    }
}

/// Handle for sending messages to the actor
#[derive(Clone, Debug)]
pub struct CarryHandle {
    sender: mpsc::Sender<CarryMessage>,
}

impl CarryHandle {
    /// Create new handle
    pub fn new(sender: mpsc::Sender<CarryMessage>) -> Self {
        Self { sender }
    }

    /// Execute any command
    pub async fn execute(&self, caller: Identity, command: Command) -> Result<EventEnvelope> {
        self.send_execute(caller, command, None).await
    }

    /// Execute a command only if the ledger still matches `precondition`
    pub async fn execute_guarded(
        &self,
        caller: Identity,
        command: Command,
        precondition: Precondition,
    ) -> Result<EventEnvelope> {
        self.send_execute(caller, command, Some(precondition)).await
    }

    async fn send_execute(
        &self,
        caller: Identity,
        command: Command,
        precondition: Option<Precondition>,
    ) -> Result<EventEnvelope> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(CarryMessage::Execute {
                caller,
                command,
                precondition,
                response: tx,
            })
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))?
    }

    /// Apply one delta to one leg
    pub async fn push_carry(
        &self,
        caller: Identity,
        leg_id: LegId,
        delta_carry: Carry,
    ) -> Result<EventEnvelope> {
        self.execute(
            caller,
            Command::PushCarry {
                leg_id,
                delta_carry,
            },
        )
        .await
    }

    /// Apply a batch of deltas
    pub async fn push_carry_batch(
        &self,
        caller: Identity,
        leg_ids: Vec<LegId>,
        delta_carries: Vec<Carry>,
    ) -> Result<EventEnvelope> {
        self.execute(
            caller,
            Command::PushCarryBatch {
                leg_ids,
                delta_carries,
            },
        )
        .await
    }

    /// Seal a snapshot
    pub async fn snapshot(&self, caller: Identity, epoch_id: EpochId) -> Result<EventEnvelope> {
        self.execute(caller, Command::Snapshot { epoch_id }).await
    }

    /// Shutdown actor
    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(CarryMessage::Shutdown)
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;
        Ok(())
    }
}

/// Spawn the carry actor
pub fn spawn_carry_actor(
    ledger: Arc<RwLock<CarryLedger>>,
    storage: Option<Arc<Storage>>,
    metrics: Metrics,
    mailbox_capacity: usize,
) -> (CarryHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(mailbox_capacity.max(1)); // Bounded channel for backpressure
    let actor = CarryActor::new(ledger, storage, metrics, rx);

    let task = tokio::spawn(async move {
        actor.run().await;
    });

    (CarryHandle::new(tx), task)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::FixedOperator;
    use crate::events::MemorySink;
    use crate::sequence::ManualSequence;
    use crate::types::CarryEvent;
    use crate::Config;

    const OPERATOR: Identity = Identity::from_bytes([1u8; 32]);

    fn in_memory_ledger(seq: Arc<ManualSequence>) -> Arc<RwLock<CarryLedger>> {
        Arc::new(RwLock::new(CarryLedger::new(
            Arc::new(FixedOperator::new(OPERATOR)),
            seq,
            Arc::new(MemorySink::new()),
        )))
    }

    #[tokio::test]
    async fn test_actor_spawn_and_shutdown() {
        let ledger = in_memory_ledger(Arc::new(ManualSequence::new(0)));
        let (handle, task) = spawn_carry_actor(ledger, None, Metrics::new().unwrap(), 8);

        handle.shutdown().await.unwrap();
        task.await.unwrap();

        let err = handle.snapshot(OPERATOR, 1).await.unwrap_err();
        assert!(matches!(err, Error::Concurrency(_)));
    }

    #[tokio::test]
    async fn test_actor_applies_commands() {
        let seq = Arc::new(ManualSequence::new(100));
        let ledger = in_memory_ledger(seq.clone());
        let metrics = Metrics::new().unwrap();
        let (handle, _task) = spawn_carry_actor(ledger.clone(), None, metrics.clone(), 8);

        let leg_a = LegId::from_label("legA");
        seq.set(101);
        let envelope = handle.push_carry(OPERATOR, leg_a, 500).await.unwrap();
        assert_eq!(envelope.sequence, 101);

        handle
            .push_carry_batch(OPERATOR, vec![leg_a, leg_a], vec![1, 2])
            .await
            .unwrap();
        let sealed = handle.snapshot(OPERATOR, 1).await.unwrap();
        assert_eq!(
            sealed.event,
            CarryEvent::SnapshotSealed {
                epoch_id: 1,
                sequence: 101,
                net_carry: 503,
            }
        );

        assert_eq!(ledger.read().leg_carry(&leg_a), 503);
        assert_eq!(ledger.read().state().tick_count, 3);
        assert_eq!(metrics.ticks_total.get(), 3);
        assert_eq!(metrics.snapshots_total.get(), 1);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_actor_counts_rejections() {
        let ledger = in_memory_ledger(Arc::new(ManualSequence::new(0)));
        let metrics = Metrics::new().unwrap();
        let (handle, _task) = spawn_carry_actor(ledger.clone(), None, metrics.clone(), 8);

        let stranger = Identity::from_bytes([9u8; 32]);
        let err = handle.snapshot(stranger, 1).await.unwrap_err();
        assert!(matches!(err, Error::Unauthorized { .. }));

        let err = handle
            .push_carry_batch(OPERATOR, vec![], vec![1])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::LengthMismatch { .. }));

        assert_eq!(metrics.rejections_total.get(), 2);
        assert_eq!(ledger.read().state().tick_count, 0);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_actor_rejects_stale_precondition() {
        let seq = Arc::new(ManualSequence::new(10));
        let ledger = in_memory_ledger(seq.clone());
        let metrics = Metrics::new().unwrap();
        let (handle, _task) = spawn_carry_actor(ledger.clone(), None, metrics.clone(), 8);

        let command = Command::PushCarry {
            leg_id: LegId::from_label("legA"),
            delta_carry: 7,
        };
        let precondition = ledger.read().precondition(&command);
        handle
            .execute_guarded(OPERATOR, command.clone(), precondition)
            .await
            .unwrap();

        let err = handle
            .execute_guarded(OPERATOR, command, precondition)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::StaleCommand(_)));
        assert_eq!(ledger.read().state().net_carry, 7);
        assert_eq!(metrics.rejections_total.get(), 1);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_actor_persists_before_commit() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();

        let storage = Arc::new(Storage::open(&config).unwrap());
        let ledger = in_memory_ledger(Arc::new(ManualSequence::new(5)));
        storage.store(&ledger.read().to_persisted()).unwrap();

        let (handle, _task) =
            spawn_carry_actor(ledger, Some(storage.clone()), Metrics::new().unwrap(), 8);

        let leg_a = LegId::from_label("legA");
        handle.push_carry(OPERATOR, leg_a, -40).await.unwrap();

        assert_eq!(storage.get_leg_carry(&leg_a).unwrap(), Some(-40));
        let persisted = storage.load().unwrap().unwrap();
        assert_eq!(persisted.state.net_carry, -40);
        assert_eq!(persisted.deployment_sequence, 5);

        handle.shutdown().await.unwrap();
    }
}
