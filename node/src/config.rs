//! Node configuration with TOML file support.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use tally_deposits::DepositConfig;

use crate::{LogFormat, NodeError};

/// Configuration for a Tally node.
///
/// Can be loaded from a TOML file via [`NodeConfig::from_toml_file`] or
/// built programmatically (e.g. for tests). Deposit engine settings live in
/// the nested `[deposits]` table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Data directory for the LMDB environment.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// LMDB map size in MiB.
    #[serde(default = "default_map_size_mb")]
    pub lmdb_map_size_mb: usize,

    /// Whether to serve the HTTP API.
    #[serde(default = "default_true")]
    pub enable_api: bool,

    /// HTTP API port (if enabled).
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Whether to run the background sweep.
    #[serde(default = "default_true")]
    pub enable_sweeper: bool,

    /// Credit claims left in `Verified` before serving anything.
    #[serde(default = "default_true")]
    pub reconcile_on_start: bool,

    /// Log format: "human" or "json".
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Log level filter: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Whether to expose Prometheus metrics at `/metrics`.
    #[serde(default)]
    pub enable_metrics: bool,

    #[serde(default)]
    pub deposits: DepositConfig,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_data_dir() -> PathBuf {
    PathBuf::from("./tally_data")
}

fn default_map_size_mb() -> usize {
    1024
}

fn default_true() -> bool {
    true
}

fn default_api_port() -> u16 {
    7480
}

fn default_log_format() -> String {
    "human".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

// ── Impl ───────────────────────────────────────────────────────────────

impl NodeConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: &str) -> Result<Self, NodeError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| NodeError::Config(format!("{path}: {e}")))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, NodeError> {
        toml::from_str(s).map_err(|e| NodeError::Config(e.to_string()))
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml_string(&self) -> Result<String, NodeError> {
        toml::to_string_pretty(self).map_err(|e| NodeError::Config(e.to_string()))
    }

    /// Reject settings the node cannot run with.
    pub fn validate(&self) -> Result<(), NodeError> {
        self.log_format.parse::<LogFormat>()?;
        if self.lmdb_map_size_mb == 0 {
            return Err(NodeError::Config("lmdb_map_size_mb must be positive".into()));
        }
        self.deposits.validate()?;
        Ok(())
    }

    pub fn map_size_bytes(&self) -> usize {
        self.lmdb_map_size_mb.saturating_mul(1024 * 1024)
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            lmdb_map_size_mb: default_map_size_mb(),
            enable_api: default_true(),
            api_port: default_api_port(),
            enable_sweeper: default_true(),
            reconcile_on_start: default_true(),
            log_format: default_log_format(),
            log_level: default_log_level(),
            enable_metrics: false,
            deposits: DepositConfig::default(),
        }
    }
}
