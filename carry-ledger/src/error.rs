//! Error types for the carry ledger

use crate::types::Identity;
use thiserror::Error;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger errors
#[derive(Error, Debug)]
pub enum Error {
    /// Caller is not the configured operator
    #[error("Unauthorized caller: {caller}")]
    Unauthorized {
        /// Identity that attempted the write
        caller: Identity,
    },

    /// Batch leg ids and deltas differ in length
    #[error("Length mismatch: {legs} leg ids, {deltas} deltas")]
    LengthMismatch {
        /// Number of leg ids supplied
        legs: usize,
        /// Number of deltas supplied
        deltas: usize,
    },

    /// Carry or tick arithmetic left the representable range
    #[error("Arithmetic overflow: {0}")]
    ArithmeticOverflow(String),

    /// Sequence source moved backwards
    #[error("Sequence regression: last update at {last}, current {current}")]
    SequenceRegression {
        /// Sequence of the last successful write
        last: u64,
        /// Sequence reported now
        current: u64,
    },

    /// Signed command no longer matches the state it was signed against
    #[error("Stale command: {0}")]
    StaleCommand(String),

    /// Storage error (RocksDB)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Signature verification failed
    #[error("Signature verification failed: {0}")]
    SignatureError(String),

    /// Concurrency error (actor mailbox closed, etc.)
    #[error("Concurrency error: {0}")]
    Concurrency(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// True for rejections that leave ledger state untouched by construction
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Error::Unauthorized { .. }
                | Error::LengthMismatch { .. }
                | Error::ArithmeticOverflow(_)
                | Error::SequenceRegression { .. }
                | Error::StaleCommand(_)
                | Error::SignatureError(_)
        )
    }
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length_mismatch_message() {
        let err = Error::LengthMismatch { legs: 3, deltas: 2 };
        assert_eq!(err.to_string(), "Length mismatch: 3 leg ids, 2 deltas");
        assert!(err.is_rejection());
    }

    #[test]
    fn test_storage_is_not_rejection() {
        let err = Error::Storage("disk full".to_string());
        assert!(!err.is_rejection());
    }
}
