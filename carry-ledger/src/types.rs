//! Core types for the carry ledger
//!
//! All types are designed for:
//! - Deterministic serialization (bincode)
//! - Exact arithmetic (fixed-point `i128` carry, scale 1e8)
//! - Opaque 32-byte identifiers for legs and callers

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use uuid::Uuid;

/// Signed fixed-point carry amount
pub type Carry = i128;

/// Number of decimal places carried by [`Carry`]
pub const CARRY_DECIMALS: u32 = 8;

/// One whole carry unit (1e8)
pub const CARRY_SCALE: Carry = 100_000_000;

/// Caller-chosen snapshot key
pub type EpochId = u64;

/// Render fixed-point carry as a decimal for reports and logs.
///
/// Returns `None` when the value exceeds the 96-bit decimal mantissa.
pub fn carry_to_decimal(carry: Carry) -> Option<Decimal> {
    Decimal::try_from_i128_with_scale(carry, CARRY_DECIMALS).ok()
}

macro_rules! bytes32_id {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name([u8; 32]);

        impl $name {
            /// Create from raw bytes
            pub const fn from_bytes(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }

            /// Get raw bytes
            pub fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }

            /// Parse from a 64-character hex string
            pub fn from_hex(s: &str) -> crate::Result<Self> {
                let raw = hex::decode(s.trim_start_matches("0x"))
                    .map_err(|e| crate::Error::Other(format!("invalid hex: {}", e)))?;
                let bytes: [u8; 32] = raw.try_into().map_err(|v: Vec<u8>| {
                    crate::Error::Other(format!("expected 32 bytes, got {}", v.len()))
                })?;
                Ok(Self(bytes))
            }

            /// Lowercase hex encoding
            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "0x{}", self.to_hex())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self)
            }
        }

        impl From<[u8; 32]> for $name {
            fn from(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }
        }
    };
}

bytes32_id!(LegId, "Opaque leg identifier (32 bytes)");
bytes32_id!(Identity, "Caller identity (Ed25519 public key bytes)");

impl LegId {
    /// Derive a leg id from a human label, e.g. `"EURUSD-3M"`
    pub fn from_label(label: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(label.as_bytes());
        Self(hasher.finalize().into())
    }
}

/// Aggregate ledger state as returned by `get_state`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CarryState {
    /// Cumulative net carry over all legs
    pub net_carry: Carry,
    /// Number of individual leg applications
    pub tick_count: u64,
    /// Sequence of the most recent successful write
    pub last_update_sequence: u64,
}

/// Sealed snapshot of net carry at an epoch boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SnapshotRecord {
    /// Sequence at which the snapshot was sealed
    pub sequence: u64,
    /// Net carry at seal time
    pub net_carry: Carry,
}

/// Event emitted exactly once per successful mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CarryEvent {
    /// Single leg tick
    CarryTick {
        /// Leg the delta was applied to
        leg_id: LegId,
        /// Applied delta
        delta_carry: Carry,
        /// Net carry after the tick
        new_net_carry: Carry,
    },
    /// Batch of leg ticks. Carries the aggregate only, never per-leg deltas.
    CarryTickBatch {
        /// Number of legs in the batch
        leg_count: u64,
        /// Sum of all deltas in the batch
        total_delta: Carry,
        /// Net carry after the batch
        new_net_carry: Carry,
    },
    /// Snapshot sealed under an epoch id
    SnapshotSealed {
        /// Epoch the snapshot was sealed under
        epoch_id: EpochId,
        /// Sequence at seal time
        sequence: u64,
        /// Net carry at seal time
        net_carry: Carry,
    },
}

impl CarryEvent {
    /// Short name used in logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            CarryEvent::CarryTick { .. } => "carry_tick",
            CarryEvent::CarryTickBatch { .. } => "carry_tick_batch",
            CarryEvent::SnapshotSealed { .. } => "snapshot_sealed",
        }
    }
}

/// Event as delivered to indexers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Unique event ID (UUIDv7 for time-ordering)
    pub event_id: Uuid,
    /// Sequence of the write that produced the event
    pub sequence: u64,
    /// Wall-clock emission time
    pub emitted_at: DateTime<Utc>,
    /// The event itself
    pub event: CarryEvent,
}

impl EventEnvelope {
    /// Wrap an event emitted at `sequence`
    pub fn new(sequence: u64, event: CarryEvent) -> Self {
        Self {
            event_id: Uuid::now_v7(),
            sequence,
            emitted_at: Utc::now(),
            event,
        }
    }
}

/// Mutating command, as submitted by the operator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    /// Apply one delta to one leg
    PushCarry {
        /// Target leg
        leg_id: LegId,
        /// Signed delta
        delta_carry: Carry,
    },
    /// Apply paired deltas to legs as one atomic unit
    PushCarryBatch {
        /// Target legs
        leg_ids: Vec<LegId>,
        /// Signed deltas, paired by index with `leg_ids`
        delta_carries: Vec<Carry>,
    },
    /// Seal a snapshot under an epoch id
    Snapshot {
        /// Epoch key
        epoch_id: EpochId,
    },
}

/// State a signed command expects to apply to
///
/// Every accepted write changes the state it was signed against, so a
/// replayed command no longer matches and is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Precondition {
    /// Expected `(net_carry, tick_count, last_update_sequence)`
    pub state: CarryState,
    /// Expected current record of the target epoch; `Snapshot` commands only
    pub snapshot: Option<SnapshotRecord>,
}

/// Canonical bytes a caller signs: the precondition followed by the command
pub fn signing_bytes(precondition: &Precondition, command: &Command) -> crate::Result<Vec<u8>> {
    Ok(bincode::serialize(&(precondition, command))?)
}

/// Command together with the caller's Ed25519 signature
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedCommand {
    /// The command to execute
    pub command: Command,
    /// State the command was signed against
    pub precondition: Precondition,
    /// Claimed caller (public key)
    pub caller: Identity,
    /// Signature over `signing_bytes(precondition, command)`
    pub signature: Signature,
}

/// Digital signature (Ed25519)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    /// Signature bytes (64 bytes)
    #[serde(with = "serde_bytes")]
    bytes: [u8; 64],
}

impl Signature {
    /// Create from bytes
    pub fn from_bytes(bytes: [u8; 64]) -> Self {
        Self { bytes }
    }

    /// Get bytes
    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.bytes
    }
}
