//! Configuration for the carry ledger

use crate::types::Identity;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Ledger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Data directory for RocksDB
    pub data_dir: PathBuf,

    /// Service name
    pub service_name: String,

    /// Service version
    pub service_version: String,

    /// Operator Ed25519 public key (hex)
    pub operator: Option<String>,

    /// Persist to RocksDB; in-memory only when false
    pub persistence: bool,

    /// RocksDB configuration
    pub rocksdb: RocksDBConfig,

    /// Writer actor configuration
    pub actor: ActorConfig,

    /// Event fan-out configuration
    pub events: EventsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data/carry-ledger"),
            service_name: "carry-ledger".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            operator: None,
            persistence: true,
            rocksdb: RocksDBConfig::default(),
            actor: ActorConfig::default(),
            events: EventsConfig::default(),
        }
    }
}

/// RocksDB configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RocksDBConfig {
    /// Write buffer size (MB)
    pub write_buffer_size_mb: usize,

    /// Max background jobs (compaction + flush)
    pub max_background_jobs: i32,

    /// Enable statistics
    pub enable_statistics: bool,
}

impl Default for RocksDBConfig {
    fn default() -> Self {
        Self {
            write_buffer_size_mb: 64,
            max_background_jobs: 2,
            enable_statistics: false,
        }
    }
}

/// Writer actor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ActorConfig {
    /// Bounded mailbox size (backpressure)
    pub mailbox_capacity: usize,
}

impl Default for ActorConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: 1000,
        }
    }
}

/// Event fan-out configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Broadcast buffer per subscriber
    pub channel_capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1024,
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(data_dir) = std::env::var("CARRY_LEDGER_DATA_DIR") {
            config.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(operator) = std::env::var("CARRY_LEDGER_OPERATOR") {
            config.operator = Some(operator);
        }

        if let Ok(flag) = std::env::var("CARRY_LEDGER_PERSISTENCE") {
            config.persistence = flag.parse().map_err(|_| {
                crate::Error::Config(format!("CARRY_LEDGER_PERSISTENCE must be true/false, got {}", flag))
            })?;
        }

        Ok(config)
    }

    /// Parsed operator identity
    pub fn operator_identity(&self) -> crate::Result<Identity> {
        let hex = self
            .operator
            .as_deref()
            .ok_or_else(|| crate::Error::Config("operator public key is not set".to_string()))?;
        Identity::from_hex(hex)
            .map_err(|e| crate::Error::Config(format!("Invalid operator key: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.service_name, "carry-ledger");
        assert!(config.persistence);
        assert_eq!(config.actor.mailbox_capacity, 1000);
        assert!(config.operator_identity().is_err());
    }

    #[test]
    fn test_parse_partial_toml() {
        let config: Config = toml::from_str(
            r#"
            data_dir = "/var/lib/carry"
            operator = "0x0101010101010101010101010101010101010101010101010101010101010101"

            [events]
            channel_capacity = 16
            "#,
        )
        .unwrap();

        assert_eq!(config.data_dir, PathBuf::from("/var/lib/carry"));
        assert_eq!(config.events.channel_capacity, 16);
        assert_eq!(config.actor.mailbox_capacity, 1000);
        assert_eq!(
            config.operator_identity().unwrap(),
            Identity::from_bytes([1u8; 32])
        );
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("carry.toml");
        std::fs::write(&path, "persistence = false\n").unwrap();

        let config = Config::from_file(&path).unwrap();
        assert!(!config.persistence);

        std::fs::write(&path, "persistence = \"maybe\"\n").unwrap();
        assert!(matches!(
            Config::from_file(&path),
            Err(crate::Error::Config(_))
        ));
    }
}
