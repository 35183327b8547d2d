//! Network profiles
//!
//! Static per-network parameters: default chain backend, gossip source and
//! the colour the presentation layer uses to tag the active network.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Default Esplora endpoints per network
pub const ESPLORA_URL_BITCOIN: &str = "https://blockstream.info/api";
pub const ESPLORA_URL_TESTNET: &str = "https://mempool.space/testnet/api";
pub const ESPLORA_URL_SIGNET: &str = "https://mutinynet.com/api";
pub const ESPLORA_URL_REGTEST: &str = "http://127.0.0.1:3002";

/// Rapid gossip sync snapshot servers
pub const RGS_URL_BITCOIN: &str = "https://rapidsync.lightningdevkit.org/snapshot";
pub const RGS_URL_TESTNET: &str = "https://rapidsync.lightningdevkit.org/testnet/snapshot";

/// Bitcoin network the node operates on
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    /// Main network
    Bitcoin,
    /// Test network
    #[default]
    Testnet,
    /// Signet (mutinynet by default)
    Signet,
    /// Local regression test network
    Regtest,
}

impl Network {
    pub const ALL: [Network; 4] = [
        Network::Bitcoin,
        Network::Testnet,
        Network::Signet,
        Network::Regtest,
    ];

    /// Get the network name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Bitcoin => "bitcoin",
            Network::Testnet => "testnet",
            Network::Signet => "signet",
            Network::Regtest => "regtest",
        }
    }

    /// Parse a persisted network name, falling back to testnet when the
    /// value is absent or not recognised
    pub fn parse_or_default(value: Option<&str>) -> Self {
        match value.map(str::parse::<Network>) {
            Some(Ok(network)) => network,
            Some(Err(_)) => {
                log::warn!(
                    "Unrecognised network {:?}, defaulting to {}",
                    value.unwrap_or_default(),
                    Network::default()
                );
                Network::default()
            }
            None => Network::default(),
        }
    }

    /// Static parameters for this network
    pub fn profile(&self) -> NetworkProfile {
        match self {
            Network::Bitcoin => NetworkProfile {
                network: *self,
                esplora_url: ESPLORA_URL_BITCOIN,
                rgs_url: Some(RGS_URL_BITCOIN),
                color: "#F7931A",
            },
            Network::Testnet => NetworkProfile {
                network: *self,
                esplora_url: ESPLORA_URL_TESTNET,
                rgs_url: Some(RGS_URL_TESTNET),
                color: "#5FB15A",
            },
            Network::Signet => NetworkProfile {
                network: *self,
                esplora_url: ESPLORA_URL_SIGNET,
                rgs_url: None,
                color: "#E84393",
            },
            Network::Regtest => NetworkProfile {
                network: *self,
                esplora_url: ESPLORA_URL_REGTEST,
                rgs_url: None,
                color: "#3478F6",
            },
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Network {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "bitcoin" | "mainnet" => Ok(Network::Bitcoin),
            "testnet" => Ok(Network::Testnet),
            "signet" => Ok(Network::Signet),
            "regtest" => Ok(Network::Regtest),
            other => Err(format!("Unknown network: {}", other)),
        }
    }
}

/// Compiled-in parameters of a network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkProfile {
    pub network: Network,
    /// Default chain backend (Esplora) endpoint
    pub esplora_url: &'static str,
    /// Rapid gossip sync server, only published for bitcoin and testnet
    pub rgs_url: Option<&'static str>,
    /// Display colour (hex RGB)
    pub color: &'static str,
}
