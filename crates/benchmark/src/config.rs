//! Benchmark configuration.
//!
//! Options come from three layers, later ones winning: built-in defaults, an
//! optional TOML file, and command-line flags. Example TOML:
//!
//! ```toml
//! jsonrpc-endpoint = "http://127.0.0.1:8545"
//! main-key = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80"
//! balance-limit = 10000000000000000
//! pending-tx-limit = 400
//! load-pattern = "fan-out"
//! confirmation-timeout-secs = 300
//! ```

use crate::accounts::DEFAULT_KEY_BUFFER;
use clap::{Args, ValueEnum};
use ledger_tps_ledger::{Account, FeeParams, KeyError, U256};
use ledger_tps_ledger_rpc::RpcLedgerConfig;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Errors loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("main-key is required")]
    MissingMainKey,

    #[error("invalid main-key: {0}")]
    InvalidMainKey(#[from] KeyError),

    #[error("jsonrpc-endpoint must not be empty")]
    EmptyEndpoint,

    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

/// Which load strategy to drive the ledger with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum LoadPatternKind {
    /// Recursive balance splitting into fresh accounts.
    #[default]
    FanOut,
    /// Amount-1 transfers from the root account to one destination.
    FixedDestination,
}

impl fmt::Display for LoadPatternKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadPatternKind::FanOut => f.write_str("fan-out"),
            LoadPatternKind::FixedDestination => f.write_str("fixed-destination"),
        }
    }
}

/// Complete benchmark configuration.
#[derive(Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BenchmarkConfig {
    /// Ledger JSON-RPC URL.
    #[serde(default = "default_endpoint")]
    pub jsonrpc_endpoint: String,

    /// Hex private key of the funded root account.
    #[serde(default)]
    pub main_key: Option<String>,

    /// Balance floor below which an account stops distributing.
    #[serde(default = "default_balance_limit")]
    pub balance_limit: u64,

    #[serde(default = "default_gas_limit")]
    pub gas_limit: u64,

    #[serde(default = "default_gas_price")]
    pub gas_price: u64,

    /// Pending transaction count above which branches stop recursing.
    #[serde(default = "default_pending_tx_limit")]
    pub pending_tx_limit: u64,

    #[serde(default)]
    pub load_pattern: LoadPatternKind,

    #[serde(default = "default_stats_window_secs")]
    pub stats_window_secs: u64,

    #[serde(default = "default_report_interval_secs")]
    pub report_interval_secs: u64,

    /// Upper bound on concurrently running branches.
    #[serde(default = "default_max_concurrent_branches")]
    pub max_concurrent_branches: usize,

    /// Capacity of the pre-generated key buffer.
    #[serde(default = "default_key_buffer")]
    pub key_buffer: usize,

    #[serde(default = "default_confirmation_poll_ms")]
    pub confirmation_poll_ms: u64,

    /// Give up on a receipt after this many seconds. Unset waits forever.
    #[serde(default)]
    pub confirmation_timeout_secs: Option<u64>,

    /// Stop after this many seconds. Unset runs until interrupted.
    #[serde(default)]
    pub duration_secs: Option<u64>,

    /// How long in-flight branches may take to finish after cancellation.
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

fn default_endpoint() -> String {
    "http://127.0.0.1:8545".to_string()
}

fn default_balance_limit() -> u64 {
    10_000_000_000_000_000
}

fn default_gas_limit() -> u64 {
    61_569
}

fn default_gas_price() -> u64 {
    18_000_000_000
}

fn default_pending_tx_limit() -> u64 {
    400
}

fn default_stats_window_secs() -> u64 {
    60
}

fn default_report_interval_secs() -> u64 {
    10
}

fn default_max_concurrent_branches() -> usize {
    1024
}

fn default_key_buffer() -> usize {
    DEFAULT_KEY_BUFFER
}

fn default_confirmation_poll_ms() -> u64 {
    1000
}

fn default_shutdown_grace_secs() -> u64 {
    120
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            jsonrpc_endpoint: default_endpoint(),
            main_key: None,
            balance_limit: default_balance_limit(),
            gas_limit: default_gas_limit(),
            gas_price: default_gas_price(),
            pending_tx_limit: default_pending_tx_limit(),
            load_pattern: LoadPatternKind::default(),
            stats_window_secs: default_stats_window_secs(),
            report_interval_secs: default_report_interval_secs(),
            max_concurrent_branches: default_max_concurrent_branches(),
            key_buffer: default_key_buffer(),
            confirmation_poll_ms: default_confirmation_poll_ms(),
            confirmation_timeout_secs: None,
            duration_secs: None,
            shutdown_grace_secs: default_shutdown_grace_secs(),
        }
    }
}

// The root key stays out of debug output.
impl fmt::Debug for BenchmarkConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BenchmarkConfig")
            .field("jsonrpc_endpoint", &self.jsonrpc_endpoint)
            .field("main_key", &self.main_key.as_ref().map(|_| "<redacted>"))
            .field("balance_limit", &self.balance_limit)
            .field("gas_limit", &self.gas_limit)
            .field("gas_price", &self.gas_price)
            .field("pending_tx_limit", &self.pending_tx_limit)
            .field("load_pattern", &self.load_pattern)
            .field("stats_window_secs", &self.stats_window_secs)
            .field("report_interval_secs", &self.report_interval_secs)
            .field("max_concurrent_branches", &self.max_concurrent_branches)
            .field("key_buffer", &self.key_buffer)
            .field("confirmation_poll_ms", &self.confirmation_poll_ms)
            .field("confirmation_timeout_secs", &self.confirmation_timeout_secs)
            .field("duration_secs", &self.duration_secs)
            .field("shutdown_grace_secs", &self.shutdown_grace_secs)
            .finish()
    }
}

/// Command-line overrides. Every flag is optional and replaces the
/// corresponding config value when present.
#[derive(Debug, Clone, Default, Args)]
pub struct ConfigOverrides {
    /// Ledger JSON-RPC URL [default: http://127.0.0.1:8545]
    #[arg(long)]
    pub jsonrpc_endpoint: Option<String>,

    /// Hex private key of the funded root account
    #[arg(long, env = "LEDGER_TPS_MAIN_KEY", hide_env_values = true)]
    pub main_key: Option<String>,

    /// Balance floor below which accounts stop distributing [default: 10000000000000000]
    #[arg(long)]
    pub balance_limit: Option<u64>,

    /// Gas limit per transfer [default: 61569]
    #[arg(long)]
    pub gas_limit: Option<u64>,

    /// Gas price per transfer [default: 18000000000]
    #[arg(long)]
    pub gas_price: Option<u64>,

    /// Pending transaction ceiling for recursion [default: 400]
    #[arg(long)]
    pub pending_tx_limit: Option<u64>,

    /// Load strategy [default: fan-out]
    #[arg(long, value_enum)]
    pub load_pattern: Option<LoadPatternKind>,

    /// Periodic TPS window in seconds [default: 60]
    #[arg(long)]
    pub stats_window_secs: Option<u64>,

    /// Status line interval in seconds [default: 10]
    #[arg(long)]
    pub report_interval_secs: Option<u64>,

    /// Maximum concurrently running branches [default: 1024]
    #[arg(long)]
    pub max_concurrent_branches: Option<usize>,

    /// Pre-generated key buffer size [default: 1000]
    #[arg(long)]
    pub key_buffer: Option<usize>,

    /// Receipt poll interval in milliseconds [default: 1000]
    #[arg(long)]
    pub confirmation_poll_ms: Option<u64>,

    /// Receipt wait bound in seconds
    #[arg(long)]
    pub confirmation_timeout_secs: Option<u64>,

    /// Run length in seconds
    #[arg(long, alias = "duration")]
    pub duration_secs: Option<u64>,

    /// Drain bound after cancellation in seconds [default: 120]
    #[arg(long)]
    pub shutdown_grace_secs: Option<u64>,
}

impl BenchmarkConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Replace config values with any flags given on the command line.
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(ref endpoint) = overrides.jsonrpc_endpoint {
            self.jsonrpc_endpoint = endpoint.clone();
        }
        if let Some(ref key) = overrides.main_key {
            self.main_key = Some(key.clone());
        }
        if let Some(limit) = overrides.balance_limit {
            self.balance_limit = limit;
        }
        if let Some(gas_limit) = overrides.gas_limit {
            self.gas_limit = gas_limit;
        }
        if let Some(gas_price) = overrides.gas_price {
            self.gas_price = gas_price;
        }
        if let Some(limit) = overrides.pending_tx_limit {
            self.pending_tx_limit = limit;
        }
        if let Some(pattern) = overrides.load_pattern {
            self.load_pattern = pattern;
        }
        if let Some(secs) = overrides.stats_window_secs {
            self.stats_window_secs = secs;
        }
        if let Some(secs) = overrides.report_interval_secs {
            self.report_interval_secs = secs;
        }
        if let Some(max) = overrides.max_concurrent_branches {
            self.max_concurrent_branches = max;
        }
        if let Some(capacity) = overrides.key_buffer {
            self.key_buffer = capacity;
        }
        if let Some(ms) = overrides.confirmation_poll_ms {
            self.confirmation_poll_ms = ms;
        }
        if let Some(secs) = overrides.confirmation_timeout_secs {
            self.confirmation_timeout_secs = Some(secs);
        }
        if let Some(secs) = overrides.duration_secs {
            self.duration_secs = Some(secs);
        }
        if let Some(secs) = overrides.shutdown_grace_secs {
            self.shutdown_grace_secs = secs;
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.jsonrpc_endpoint.trim().is_empty() {
            return Err(ConfigError::EmptyEndpoint);
        }
        self.root_account()?;

        let positive = [
            ("gas-limit", self.gas_limit),
            ("stats-window-secs", self.stats_window_secs),
            ("report-interval-secs", self.report_interval_secs),
            ("max-concurrent-branches", self.max_concurrent_branches as u64),
            ("key-buffer", self.key_buffer as u64),
            ("confirmation-poll-ms", self.confirmation_poll_ms),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(ConfigError::Zero(name));
            }
        }
        if self.confirmation_timeout_secs == Some(0) {
            return Err(ConfigError::Zero("confirmation-timeout-secs"));
        }
        if self.duration_secs == Some(0) {
            return Err(ConfigError::Zero("duration-secs"));
        }

        Ok(())
    }

    /// Parse the configured root key.
    pub fn root_account(&self) -> Result<Account, ConfigError> {
        let key = self.main_key.as_deref().ok_or(ConfigError::MissingMainKey)?;
        Ok(Account::from_hex_key(key)?)
    }

    pub fn balance_floor(&self) -> U256 {
        U256::from(self.balance_limit)
    }

    pub fn fees(&self) -> FeeParams {
        FeeParams {
            gas_limit: self.gas_limit,
            gas_price: u128::from(self.gas_price),
        }
    }

    pub fn stats_window(&self) -> Duration {
        Duration::from_secs(self.stats_window_secs)
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.report_interval_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    pub fn duration(&self) -> Option<Duration> {
        self.duration_secs.map(Duration::from_secs)
    }

    /// Connection settings for the JSON-RPC ledger client.
    pub fn rpc_config(&self) -> RpcLedgerConfig {
        RpcLedgerConfig {
            endpoint: self.jsonrpc_endpoint.clone(),
            poll_interval: Duration::from_millis(self.confirmation_poll_ms),
            confirmation_timeout: self.confirmation_timeout_secs.map(Duration::from_secs),
        }
    }
}
