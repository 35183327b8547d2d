//! Node configuration types and persistence
//!
//! `NodeSettings` holds the tunables persisted in `node_settings.json`;
//! [`build_node_config`] combines them with the keystore's network and chain
//! backend choice into the immutable [`NodeConfig`] handed to the node builder.

use super::error::Error;
use super::network::Network;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Settings file name inside the application data directory
pub const SETTINGS_FILE: &str = "node_settings.json";

/// Verbosity passed to the node library and the crate logger
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Gossip,
    #[default]
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn to_level_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Gossip | LogLevel::Trace => log::LevelFilter::Trace,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Error => log::LevelFilter::Error,
        }
    }
}

/// Node tunables stored in node_settings.json
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NodeSettings {
    /// Node state directory; defaults to `<data dir>/ldk_node`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_directory: Option<String>,

    /// Sockets accepting inbound peer connections
    #[serde(default = "default_listening_addresses")]
    pub listening_addresses: Vec<String>,

    #[serde(default = "default_cltv_expiry_delta")]
    pub default_cltv_expiry_delta: u32,

    #[serde(default = "default_onchain_sync_secs")]
    pub onchain_wallet_sync_interval_secs: u64,

    #[serde(default = "default_lightning_sync_secs")]
    pub lightning_wallet_sync_interval_secs: u64,

    #[serde(default = "default_fee_rate_secs")]
    pub fee_rate_cache_update_interval_secs: u64,

    #[serde(default)]
    pub log_level: LogLevel,

    /// Upper bound for a single node service operation
    #[serde(default = "default_operation_timeout_secs")]
    pub operation_timeout_secs: u64,

    /// Event loop poll interval when the node has nothing queued
    #[serde(default = "default_event_poll_interval_secs")]
    pub event_poll_interval_secs: u64,

    /// Published events buffered per subscriber before the oldest are dropped
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,
}

fn default_listening_addresses() -> Vec<String> {
    vec!["0.0.0.0:9735".to_string()]
}

fn default_cltv_expiry_delta() -> u32 {
    144
}

fn default_onchain_sync_secs() -> u64 {
    60
}

fn default_lightning_sync_secs() -> u64 {
    20
}

fn default_fee_rate_secs() -> u64 {
    600
}

fn default_operation_timeout_secs() -> u64 {
    120
}

fn default_event_poll_interval_secs() -> u64 {
    5
}

fn default_event_bus_capacity() -> usize {
    64
}

impl Default for NodeSettings {
    fn default() -> Self {
        Self {
            storage_directory: None,
            listening_addresses: default_listening_addresses(),
            default_cltv_expiry_delta: default_cltv_expiry_delta(),
            onchain_wallet_sync_interval_secs: default_onchain_sync_secs(),
            lightning_wallet_sync_interval_secs: default_lightning_sync_secs(),
            fee_rate_cache_update_interval_secs: default_fee_rate_secs(),
            log_level: LogLevel::default(),
            operation_timeout_secs: default_operation_timeout_secs(),
            event_poll_interval_secs: default_event_poll_interval_secs(),
            event_bus_capacity: default_event_bus_capacity(),
        }
    }
}

impl NodeSettings {
    /// Get the path to the settings file
    pub fn settings_path(data_dir: &Path) -> PathBuf {
        data_dir.join(SETTINGS_FILE)
    }

    /// Load settings from disk, or return defaults if missing or unreadable
    pub fn load(data_dir: &Path) -> Self {
        let path = Self::settings_path(data_dir);
        match fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
                log::error!("Failed to parse {}: {}, using defaults", path.display(), e);
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// Save settings to disk
    pub fn save(&self, data_dir: &Path) -> Result<(), Error> {
        let path = Self::settings_path(data_dir);

        fs::create_dir_all(data_dir)
            .map_err(|e| Error::Config(format!("Failed to create data dir: {}", e)))?;

        let contents = serde_json::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize settings: {}", e)))?;

        fs::write(&path, contents)
            .map_err(|e| Error::Config(format!("Failed to write settings: {}", e)))?;

        log::info!("Node settings saved to {}", path.display());
        Ok(())
    }

    /// Effective node storage directory
    pub fn storage_dir(&self, data_dir: &Path) -> PathBuf {
        match &self.storage_directory {
            Some(dir) if !dir.is_empty() => PathBuf::from(crate::expand_path(dir)),
            _ => data_dir.join("ldk_node"),
        }
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs.max(1))
    }

    pub fn event_poll_interval(&self) -> Duration {
        Duration::from_secs(self.event_poll_interval_secs.max(1))
    }
}

/// Immutable node configuration, built once per service construction
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeConfig {
    pub storage_dir: PathBuf,
    pub network: Network,
    pub listening_addresses: Vec<String>,
    pub default_cltv_expiry_delta: u32,
    pub onchain_wallet_sync_interval_secs: u64,
    pub lightning_wallet_sync_interval_secs: u64,
    pub fee_rate_cache_update_interval_secs: u64,
    pub log_level: LogLevel,
}

/// Network-specific instructions for the node builder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuilderDirectives {
    /// Esplora chain backend to attach
    pub esplora_url: String,
    /// Rapid gossip sync source, bitcoin and testnet only
    pub rgs_url: Option<String>,
}

/// Output of the config builder
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfig {
    pub config: NodeConfig,
    pub directives: BuilderDirectives,
}

/// Derive the node configuration from persisted values and network defaults.
///
/// An absent or unrecognised network resolves to testnet; an absent chain
/// backend URL resolves to the network's built-in default.
pub fn build_node_config(
    stored_network: Option<&str>,
    stored_esplora_url: Option<&str>,
    storage_dir: &Path,
    settings: &NodeSettings,
) -> Result<ResolvedConfig, Error> {
    let network = Network::parse_or_default(stored_network);
    let profile = network.profile();

    let esplora_url = match stored_esplora_url {
        Some(url) if !url.trim().is_empty() => url.trim().to_string(),
        _ => profile.esplora_url.to_string(),
    };
    Url::parse(&esplora_url)
        .map_err(|e| Error::Config(format!("Invalid chain backend URL {}: {}", esplora_url, e)))?;

    if storage_dir.as_os_str().is_empty() {
        return Err(Error::Config("Storage directory is empty".to_string()));
    }

    let config = NodeConfig {
        storage_dir: storage_dir.to_path_buf(),
        network,
        listening_addresses: settings.listening_addresses.clone(),
        default_cltv_expiry_delta: settings.default_cltv_expiry_delta,
        onchain_wallet_sync_interval_secs: settings.onchain_wallet_sync_interval_secs,
        lightning_wallet_sync_interval_secs: settings.lightning_wallet_sync_interval_secs,
        fee_rate_cache_update_interval_secs: settings.fee_rate_cache_update_interval_secs,
        log_level: settings.log_level,
    };

    let directives = BuilderDirectives {
        esplora_url,
        rgs_url: profile.rgs_url.map(str::to_string),
    };

    Ok(ResolvedConfig { config, directives })
}
