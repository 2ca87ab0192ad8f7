//! Storage layer using RocksDB
//!
//! # Column Families
//!
//! - `state` - The four scalar fields (single key `ledger`)
//! - `legs` - Cumulative carry per leg (key: 32-byte leg id)
//! - `snapshots` - Sealed snapshots (key: epoch id, big-endian)
//!
//! Nothing else is stored: these three families are the whole durable
//! footprint of a ledger.

use crate::{
    carry::{PersistedLedger, StateChange},
    error::{Error, Result},
    types::{Carry, CarryState, EpochId, LegId, SnapshotRecord},
    Config,
};
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, IteratorMode, Options, WriteBatch, DB};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Column family names
const CF_STATE: &str = "state";
const CF_LEGS: &str = "legs";
const CF_SNAPSHOTS: &str = "snapshots";

const STATE_KEY: &[u8] = b"ledger";

/// Scalar record stored under [`STATE_KEY`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct ScalarRecord {
    deployment_sequence: u64,
    state: CarryState,
}

/// Storage wrapper for RocksDB
pub struct Storage {
    db: DB,
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage").field("path", &self.db.path()).finish()
    }
}

impl Storage {
    /// Open or create database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;

        // Create directory if not exists
        std::fs::create_dir_all(path)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        // Tuning from config
        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);

        if config.rocksdb.enable_statistics {
            db_opts.enable_statistics();
        }

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_STATE, Options::default()),
            ColumnFamilyDescriptor::new(CF_LEGS, Self::cf_options_point_lookup()),
            ColumnFamilyDescriptor::new(CF_SNAPSHOTS, Self::cf_options_point_lookup()),
        ];

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        tracing::info!(path = ?path, "Opened RocksDB carry store");

        Ok(Self { db })
    }

    fn cf_options_point_lookup() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        // Reads are point lookups by key
        let mut block_opts = rocksdb::BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false);
        opts.set_block_based_table_factory(&block_opts);
        opts
    }

    fn cf_handle(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", name)))
    }

    // Whole-ledger operations

    /// Load the full footprint, or `None` if nothing was ever written
    pub fn load(&self) -> Result<Option<PersistedLedger>> {
        let cf_state = self.cf_handle(CF_STATE)?;
        let scalars: ScalarRecord = match self.db.get_cf(cf_state, STATE_KEY)? {
            Some(value) => bincode::deserialize(&value)?,
            None => return Ok(None),
        };

        let mut legs = HashMap::new();
        for item in self.db.iterator_cf(self.cf_handle(CF_LEGS)?, IteratorMode::Start) {
            let (key, value) = item?;
            let leg_id = Self::decode_leg_key(&key)?;
            legs.insert(leg_id, bincode::deserialize::<Carry>(&value)?);
        }

        let mut snapshots = HashMap::new();
        for item in self.db.iterator_cf(self.cf_handle(CF_SNAPSHOTS)?, IteratorMode::Start) {
            let (key, value) = item?;
            let epoch_id = Self::decode_epoch_key(&key)?;
            snapshots.insert(epoch_id, bincode::deserialize::<SnapshotRecord>(&value)?);
        }

        tracing::info!(
            legs = legs.len(),
            snapshots = snapshots.len(),
            tick_count = scalars.state.tick_count,
            "Loaded persisted carry ledger"
        );

        Ok(Some(PersistedLedger {
            deployment_sequence: scalars.deployment_sequence,
            state: scalars.state,
            legs,
            snapshots,
        }))
    }

    /// Write the full footprint (used at genesis)
    pub fn store(&self, ledger: &PersistedLedger) -> Result<()> {
        let mut batch = WriteBatch::default();
        self.put_scalars(&mut batch, ledger.deployment_sequence, &ledger.state)?;

        let cf_legs = self.cf_handle(CF_LEGS)?;
        for (leg_id, carry) in &ledger.legs {
            batch.put_cf(cf_legs, leg_id.as_bytes(), bincode::serialize(carry)?);
        }

        let cf_snapshots = self.cf_handle(CF_SNAPSHOTS)?;
        for (epoch_id, record) in &ledger.snapshots {
            batch.put_cf(cf_snapshots, epoch_id.to_be_bytes(), bincode::serialize(record)?);
        }

        self.db.write(batch)?;
        Ok(())
    }

    /// Persist one prepared change (atomic)
    pub fn commit(&self, deployment_sequence: u64, change: &StateChange) -> Result<()> {
        let mut batch = WriteBatch::default();

        // 1. Scalars
        self.put_scalars(&mut batch, deployment_sequence, &change.state)?;

        // 2. Touched legs
        let cf_legs = self.cf_handle(CF_LEGS)?;
        for (leg_id, carry) in &change.legs {
            batch.put_cf(cf_legs, leg_id.as_bytes(), bincode::serialize(carry)?);
        }

        // 3. Snapshot
        if let Some((epoch_id, record)) = &change.snapshot {
            let cf_snapshots = self.cf_handle(CF_SNAPSHOTS)?;
            batch.put_cf(cf_snapshots, epoch_id.to_be_bytes(), bincode::serialize(record)?);
        }

        // Atomic commit
        self.db.write(batch)?;

        tracing::debug!(
            tick_count = change.state.tick_count,
            legs = change.legs.len(),
            sequence = change.state.last_update_sequence,
            "Carry change persisted"
        );

        Ok(())
    }

    fn put_scalars(
        &self,
        batch: &mut WriteBatch,
        deployment_sequence: u64,
        state: &CarryState,
    ) -> Result<()> {
        let cf_state = self.cf_handle(CF_STATE)?;
        let record = ScalarRecord {
            deployment_sequence,
            state: *state,
        };
        batch.put_cf(cf_state, STATE_KEY, bincode::serialize(&record)?);
        Ok(())
    }

    // Point reads

    /// Get persisted carry of a leg
    pub fn get_leg_carry(&self, leg_id: &LegId) -> Result<Option<Carry>> {
        let cf = self.cf_handle(CF_LEGS)?;
        match self.db.get_cf(cf, leg_id.as_bytes())? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    /// Get persisted snapshot
    pub fn get_snapshot(&self, epoch_id: EpochId) -> Result<Option<SnapshotRecord>> {
        let cf = self.cf_handle(CF_SNAPSHOTS)?;
        match self.db.get_cf(cf, epoch_id.to_be_bytes())? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    // Key helpers

    fn decode_leg_key(key: &[u8]) -> Result<LegId> {
        let bytes: [u8; 32] = key
            .try_into()
            .map_err(|_| Error::Storage(format!("Corrupt leg key of {} bytes", key.len())))?;
        Ok(LegId::from_bytes(bytes))
    }

    fn decode_epoch_key(key: &[u8]) -> Result<EpochId> {
        let bytes: [u8; 8] = key
            .try_into()
            .map_err(|_| Error::Storage(format!("Corrupt epoch key of {} bytes", key.len())))?;
        Ok(EpochId::from_be_bytes(bytes))
    }

    /// Close database (graceful shutdown)
    pub fn close(self) -> Result<()> {
        drop(self.db);
        tracing::info!("RocksDB closed gracefully");
        Ok(())
    }
}
