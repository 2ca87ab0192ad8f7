//! DelTran Carry Ledger
//!
//! Single-operator ledger of signed carry deltas, with per-leg totals,
//! epoch snapshots and a state commitment for external verification.
//!
//! # Architecture
//!
//! - **Single Writer**: One actor task applies every mutation, in order
//! - **Two-phase writes**: Validate and stage, persist, then publish atomically
//! - **Injected collaborators**: Authorization, sequence source and event sink
//! - **RocksDB**: Durable footprint is four scalars plus two maps
//!
//! # Invariants
//!
//! - Carry conservation: net carry == Σ(all deltas) == Σ(leg carries)
//! - Tick count == number of individual leg applications
//! - Monotonic: last update sequence never decreases
//! - All-or-nothing: a rejected call leaves no trace

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod actor;
pub mod auth;
pub mod carry;
pub mod config;
pub mod crypto;
pub mod error;
pub mod events;
pub mod ledger;
pub mod metrics;
pub mod sequence;
pub mod storage;
pub mod types;

// Re-exports
pub use auth::{Authorizer, FixedOperator};
pub use carry::CarryLedger;
pub use config::Config;
pub use crypto::{Commitment, KeyPair};
pub use error::{Error, Result};
pub use events::{BroadcastSink, EventSink, MemorySink};
pub use ledger::Ledger;
pub use sequence::{ClockSequence, ManualSequence, SequenceSource};
pub use storage::Storage;
pub use types::{
    Carry, CarryEvent, CarryState, Command, EpochId, EventEnvelope, Identity, LegId,
    Precondition, SignedCommand, SnapshotRecord, CARRY_SCALE,
};
