//! In-memory carry ledger
//!
//! Every mutation is split in two phases:
//!
//! 1. `prepare_*` validates the call (operator, lengths, sequence, overflow)
//!    and computes a [`StateChange`] without touching state.
//! 2. [`CarryLedger::apply`] commits the change and publishes its event.
//!
//! The split lets the actor persist a change before it becomes visible.
//! The `push_carry`/`push_carry_batch`/`snapshot` shorthands run both phases.
//!
//! # Invariants
//!
//! - `net_carry` equals the sum of every delta ever applied
//! - each leg's carry equals the sum of deltas applied to that leg
//! - `tick_count` grows by exactly the number of leg applications
//! - `last_update_sequence` never decreases
//! - a rejected call changes nothing

use crate::{
    auth::Authorizer,
    crypto::{state_commitment, Commitment},
    events::EventSink,
    sequence::SequenceSource,
    types::{
        Carry, CarryEvent, CarryState, Command, EpochId, EventEnvelope, Identity, LegId,
        Precondition, SnapshotRecord,
    },
    Error, Result,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Complete durable footprint of a ledger
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedLedger {
    /// Sequence at construction
    pub deployment_sequence: u64,
    /// Aggregate state
    pub state: CarryState,
    /// Per-leg cumulative carry
    pub legs: HashMap<LegId, Carry>,
    /// Sealed snapshots
    pub snapshots: HashMap<EpochId, SnapshotRecord>,
}

/// Validated, not yet committed, result of a mutating call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateChange {
    /// Sequence the change was written at
    pub sequence: u64,
    /// Aggregate state after the change
    pub state: CarryState,
    /// New cumulative value of every touched leg
    pub legs: Vec<(LegId, Carry)>,
    /// Snapshot to record, if any
    pub snapshot: Option<(EpochId, SnapshotRecord)>,
    /// Event to publish on commit
    pub event: CarryEvent,
}

/// Authorization-gated carry ledger
pub struct CarryLedger {
    authorizer: Arc<dyn Authorizer>,
    sequence: Arc<dyn SequenceSource>,
    sink: Arc<dyn EventSink>,
    deployment_sequence: u64,
    state: CarryState,
    legs: HashMap<LegId, Carry>,
    snapshots: HashMap<EpochId, SnapshotRecord>,
}

impl fmt::Debug for CarryLedger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CarryLedger")
            .field("operator", &self.authorizer.operator())
            .field("deployment_sequence", &self.deployment_sequence)
            .field("state", &self.state)
            .field("legs", &self.legs.len())
            .field("snapshots", &self.snapshots.len())
            .finish_non_exhaustive()
    }
}

impl CarryLedger {
    /// Construct a fresh ledger at the source's current sequence
    pub fn new(
        authorizer: Arc<dyn Authorizer>,
        sequence: Arc<dyn SequenceSource>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        let deployment_sequence = sequence.current();
        let persisted = PersistedLedger {
            deployment_sequence,
            state: CarryState {
                net_carry: 0,
                tick_count: 0,
                last_update_sequence: deployment_sequence,
            },
            ..Default::default()
        };
        Self::restore(authorizer, sequence, sink, persisted)
    }

    /// Rebuild a ledger from its durable footprint
    pub fn restore(
        authorizer: Arc<dyn Authorizer>,
        sequence: Arc<dyn SequenceSource>,
        sink: Arc<dyn EventSink>,
        persisted: PersistedLedger,
    ) -> Self {
        Self {
            authorizer,
            sequence,
            sink,
            deployment_sequence: persisted.deployment_sequence,
            state: persisted.state,
            legs: persisted.legs,
            snapshots: persisted.snapshots,
        }
    }

    /// Copy of the durable footprint
    pub fn to_persisted(&self) -> PersistedLedger {
        PersistedLedger {
            deployment_sequence: self.deployment_sequence,
            state: self.state,
            legs: self.legs.clone(),
            snapshots: self.snapshots.clone(),
        }
    }

    /// Operator identity fixed at construction
    pub fn operator(&self) -> Identity {
        self.authorizer.operator()
    }

    /// Sequence at construction
    pub fn deployment_sequence(&self) -> u64 {
        self.deployment_sequence
    }

    // Mutations

    /// Apply one delta to one leg
    pub fn push_carry(
        &mut self,
        caller: &Identity,
        leg_id: LegId,
        delta_carry: Carry,
    ) -> Result<EventEnvelope> {
        let change = self.prepare_push_carry(caller, leg_id, delta_carry)?;
        Ok(self.apply(change))
    }

    /// Apply paired deltas to legs as one atomic unit
    pub fn push_carry_batch(
        &mut self,
        caller: &Identity,
        leg_ids: &[LegId],
        delta_carries: &[Carry],
    ) -> Result<EventEnvelope> {
        let change = self.prepare_push_carry_batch(caller, leg_ids, delta_carries)?;
        Ok(self.apply(change))
    }

    /// Seal `(current sequence, net_carry)` under `epoch_id`
    pub fn snapshot(&mut self, caller: &Identity, epoch_id: EpochId) -> Result<EventEnvelope> {
        let change = self.prepare_snapshot(caller, epoch_id)?;
        Ok(self.apply(change))
    }

    /// Validate a single tick and compute its change
    pub fn prepare_push_carry(
        &self,
        caller: &Identity,
        leg_id: LegId,
        delta_carry: Carry,
    ) -> Result<StateChange> {
        self.authorizer.authorize(caller)?;
        let sequence = self.write_sequence()?;

        let net_carry = checked_carry(self.state.net_carry, delta_carry, "net carry")?;
        let leg_carry = checked_carry(self.leg_carry(&leg_id), delta_carry, "leg carry")?;
        let tick_count = checked_ticks(self.state.tick_count, 1)?;

        Ok(StateChange {
            sequence,
            state: CarryState {
                net_carry,
                tick_count,
                last_update_sequence: sequence,
            },
            legs: vec![(leg_id, leg_carry)],
            snapshot: None,
            event: CarryEvent::CarryTick {
                leg_id,
                delta_carry,
                new_net_carry: net_carry,
            },
        })
    }

    /// Validate a batch and compute its change
    ///
    /// A leg appearing more than once accumulates every one of its deltas.
    /// An empty batch is accepted: it moves `last_update_sequence` and emits a
    /// batch event with `leg_count = 0`.
    pub fn prepare_push_carry_batch(
        &self,
        caller: &Identity,
        leg_ids: &[LegId],
        delta_carries: &[Carry],
    ) -> Result<StateChange> {
        self.authorizer.authorize(caller)?;
        if leg_ids.len() != delta_carries.len() {
            return Err(Error::LengthMismatch {
                legs: leg_ids.len(),
                deltas: delta_carries.len(),
            });
        }
        let sequence = self.write_sequence()?;

        let mut staged: HashMap<LegId, Carry> = HashMap::with_capacity(leg_ids.len());
        let mut order = Vec::with_capacity(leg_ids.len());
        let mut total_delta: Carry = 0;

        for (leg_id, delta) in leg_ids.iter().zip(delta_carries) {
            let current = match staged.get(leg_id) {
                Some(value) => *value,
                None => {
                    order.push(*leg_id);
                    self.leg_carry(leg_id)
                }
            };
            staged.insert(*leg_id, checked_carry(current, *delta, "leg carry")?);
            total_delta = checked_carry(total_delta, *delta, "batch total")?;
        }

        let net_carry = checked_carry(self.state.net_carry, total_delta, "net carry")?;
        let tick_count = checked_ticks(self.state.tick_count, leg_ids.len())?;
        let legs = order
            .into_iter()
            .map(|leg_id| (leg_id, staged[&leg_id]))
            .collect();

        Ok(StateChange {
            sequence,
            state: CarryState {
                net_carry,
                tick_count,
                last_update_sequence: sequence,
            },
            legs,
            snapshot: None,
            event: CarryEvent::CarryTickBatch {
                leg_count: leg_ids.len() as u64,
                total_delta,
                new_net_carry: net_carry,
            },
        })
    }

    /// Validate a snapshot and compute its change
    ///
    /// Re-sealing an existing epoch overwrites it. The state triple, and with
    /// it the state commitment, is left as it was.
    pub fn prepare_snapshot(&self, caller: &Identity, epoch_id: EpochId) -> Result<StateChange> {
        self.authorizer.authorize(caller)?;
        let sequence = self.write_sequence()?;

        let record = SnapshotRecord {
            sequence,
            net_carry: self.state.net_carry,
        };

        Ok(StateChange {
            sequence,
            state: self.state,
            legs: Vec::new(),
            snapshot: Some((epoch_id, record)),
            event: CarryEvent::SnapshotSealed {
                epoch_id,
                sequence,
                net_carry: record.net_carry,
            },
        })
    }

    /// Commit a prepared change and publish its event
    ///
    /// The change must have been prepared against the current state.
    pub fn apply(&mut self, change: StateChange) -> EventEnvelope {
        self.state = change.state;
        self.legs.extend(change.legs);
        if let Some((epoch_id, record)) = change.snapshot {
            if self.snapshots.insert(epoch_id, record).is_some() {
                tracing::warn!(epoch_id, "Snapshot overwritten");
            }
        }

        let envelope = EventEnvelope::new(change.sequence, change.event);
        self.sink.publish(envelope.clone());
        envelope
    }

    /// Precondition a caller signs when submitting `command` now
    pub fn precondition(&self, command: &Command) -> Precondition {
        Precondition {
            state: self.state,
            snapshot: match command {
                Command::Snapshot { epoch_id } => self.snapshots.get(epoch_id).copied(),
                _ => None,
            },
        }
    }

    /// Reject a signed command whose precondition no longer holds
    ///
    /// A replayed command fails here: the write it authorized already moved
    /// the tick count, the sequence or the target epoch's record.
    pub fn check_precondition(&self, command: &Command, expected: &Precondition) -> Result<()> {
        let actual = self.precondition(command);
        if actual == *expected {
            return Ok(());
        }
        Err(Error::StaleCommand(format!(
            "expected {:?}, found {:?}",
            expected, actual
        )))
    }

    // Reads

    /// `(net_carry, tick_count, last_update_sequence)`
    pub fn state(&self) -> CarryState {
        self.state
    }

    /// Cumulative carry of a leg; zero if never written
    pub fn leg_carry(&self, leg_id: &LegId) -> Carry {
        self.legs.get(leg_id).copied().unwrap_or(0)
    }

    /// Snapshot sealed under `epoch_id`; `(0, 0)` if never sealed
    pub fn get_snapshot(&self, epoch_id: EpochId) -> SnapshotRecord {
        self.snapshots.get(&epoch_id).copied().unwrap_or_default()
    }

    /// Net carry per elapsed sequence unit since deployment
    ///
    /// Zero when no sequence has elapsed. Division truncates toward zero.
    pub fn carry_rate_per_block(&self) -> Carry {
        let elapsed = self.sequence.current().saturating_sub(self.deployment_sequence);
        if elapsed == 0 {
            return 0;
        }
        self.state.net_carry / Carry::from(elapsed)
    }

    /// Commitment over the current state triple
    pub fn state_commitment(&self) -> Commitment {
        state_commitment(&self.state)
    }

    fn write_sequence(&self) -> Result<u64> {
        let current = self.sequence.current();
        if current < self.state.last_update_sequence {
            return Err(Error::SequenceRegression {
                last: self.state.last_update_sequence,
                current,
            });
        }
        Ok(current)
    }
}

fn checked_carry(value: Carry, delta: Carry, what: &str) -> Result<Carry> {
    value
        .checked_add(delta)
        .ok_or_else(|| Error::ArithmeticOverflow(format!("{} {} + {}", what, value, delta)))
}

fn checked_ticks(count: u64, n: usize) -> Result<u64> {
    u64::try_from(n)
        .ok()
        .and_then(|n| count.checked_add(n))
        .ok_or_else(|| Error::ArithmeticOverflow(format!("tick count {} + {}", count, n)))
}
