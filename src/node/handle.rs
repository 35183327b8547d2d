//! The node handle seam
//!
//! [`LightningNode`] is everything the service needs from the underlying
//! node library; [`NodeBuilder`] constructs one from a resolved config and a
//! seed. The production implementation lives in `ldk.rs`. Values crossing
//! the seam are plain library-independent types.

use super::config::ResolvedConfig;
use super::error::{Error, NodeError};
use bip39::Mnemonic;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// A peer's public key: 33-byte compressed secp256k1 point, hex-encoded
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NodeId(String);

impl NodeId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// From the serialized form of a key the library already validated
    pub fn from_compressed_key(key: [u8; 33]) -> Self {
        NodeId(hex::encode(key))
    }
}

impl FromStr for NodeId {
    type Err = NodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        let bytes = hex::decode(&s).map_err(|_| NodeError::InvalidPublicKey)?;
        match bytes.as_slice() {
            [0x02 | 0x03, rest @ ..] if rest.len() == 32 => Ok(NodeId(s)),
            _ => Err(NodeError::InvalidPublicKey),
        }
    }
}

impl TryFrom<String> for NodeId {
    type Error = NodeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<NodeId> for String {
    fn from(id: NodeId) -> Self {
        id.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Payment hash, hex-encoded in its textual form
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PaymentHash(pub [u8; 32]);

impl FromStr for PaymentHash {
    type Err = NodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s.trim(), &mut bytes).map_err(|_| NodeError::InvalidPaymentHash)?;
        Ok(PaymentHash(bytes))
    }
}

impl TryFrom<String> for PaymentHash {
    type Error = NodeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PaymentHash> for String {
    fn from(hash: PaymentHash) -> Self {
        hash.to_string()
    }
}

impl fmt::Display for PaymentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// Local identifier of a channel, assigned when the funding flow starts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserChannelId(pub u128);

impl FromStr for UserChannelId {
    type Err = NodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u128>()
            .map(UserChannelId)
            .map_err(|_| NodeError::InvalidChannelId)
    }
}

impl fmt::Display for UserChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerDetails {
    pub node_id: NodeId,
    pub address: String,
    pub is_persisted: bool,
    pub is_connected: bool,
}

/// Per-channel forwarding policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelOptions {
    pub forwarding_fee_base_msat: u32,
    pub forwarding_fee_proportional_millionths: u32,
    pub cltv_expiry_delta: u16,
}

impl ChannelOptions {
    /// Library fee defaults with the given CLTV expiry delta
    pub fn with_cltv_expiry_delta(cltv_expiry_delta: u16) -> Self {
        Self {
            forwarding_fee_base_msat: 1000,
            forwarding_fee_proportional_millionths: 0,
            cltv_expiry_delta,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelStatus {
    /// Funding negotiated, waiting for confirmations
    Pending,
    /// Confirmed, peer not yet usable (e.g. disconnected)
    Ready,
    Usable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelRecord {
    pub channel_id: String,
    pub user_channel_id: UserChannelId,
    pub counterparty_node_id: NodeId,
    pub amount_sats: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub push_msat: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_config: Option<ChannelOptions>,
    pub announce: bool,
    pub status: ChannelStatus,
    pub outbound_capacity_msat: u64,
    pub inbound_capacity_msat: u64,
}

/// Parameters of a channel funding request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenChannelRequest {
    pub node_id: NodeId,
    pub address: String,
    pub channel_amount_sats: u64,
    pub push_to_counterparty_msat: Option<u64>,
    pub channel_config: Option<ChannelOptions>,
    pub announce_channel: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentDirection {
    Inbound,
    Outbound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Succeeded,
    Failed,
}

/// Fee caps agreed with an LSP for a just-in-time channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LspFeeLimits {
    pub max_total_opening_fee_msat: Option<u64>,
    pub max_proportional_opening_fee_ppm_msat: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRecord {
    pub hash: PaymentHash,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preimage: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount_msat: Option<u64>,
    pub direction: PaymentDirection,
    pub status: PaymentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lsp_fee_limits: Option<LspFeeLimits>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Balances {
    pub total_onchain_balance_sats: u64,
    pub spendable_onchain_balance_sats: u64,
    pub total_lightning_balance_sats: u64,
}

/// Runtime status reported by the node library
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeStatus {
    pub is_running: bool,
    pub is_listening: bool,
    pub best_block_height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventKind {
    PaymentSuccessful,
    PaymentFailed,
    PaymentReceived,
    PaymentClaimable,
    ChannelPending,
    ChannelReady,
    ChannelClosed,
    Other,
}

/// A node-level occurrence drained from the library's event queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeEvent {
    pub kind: EventKind,
    pub description: String,
}

/// Operations of a constructed node
///
/// Calls may block on network or disk I/O; the service runs them on the
/// blocking thread pool.
pub trait LightningNode: Send + Sync {
    fn start(&self) -> Result<(), NodeError>;
    fn stop(&self) -> Result<(), NodeError>;
    fn node_id(&self) -> NodeId;
    fn status(&self) -> RuntimeStatus;
    fn listening_addresses(&self) -> Option<Vec<String>>;

    fn connect(&self, node_id: &NodeId, address: &str, persist: bool) -> Result<(), NodeError>;
    fn disconnect(&self, node_id: &NodeId) -> Result<(), NodeError>;
    /// Connects if needed, then starts the funding flow
    fn open_channel(&self, request: &OpenChannelRequest) -> Result<UserChannelId, NodeError>;
    fn close_channel(
        &self,
        user_channel_id: UserChannelId,
        counterparty_node_id: &NodeId,
    ) -> Result<(), NodeError>;
    fn list_peers(&self) -> Vec<PeerDetails>;
    fn list_channels(&self) -> Vec<ChannelRecord>;

    fn send_payment(&self, invoice: &str) -> Result<PaymentHash, NodeError>;
    fn send_payment_using_amount(
        &self,
        invoice: &str,
        amount_msat: u64,
    ) -> Result<PaymentHash, NodeError>;
    fn send_spontaneous_payment(
        &self,
        amount_msat: u64,
        node_id: &NodeId,
    ) -> Result<PaymentHash, NodeError>;
    fn receive_payment(
        &self,
        amount_msat: u64,
        description: &str,
        expiry_secs: u32,
    ) -> Result<String, NodeError>;
    fn receive_variable_amount_payment(
        &self,
        description: &str,
        expiry_secs: u32,
    ) -> Result<String, NodeError>;
    fn payment(&self, hash: &PaymentHash) -> Option<PaymentRecord>;
    fn remove_payment(&self, hash: &PaymentHash) -> Result<(), NodeError>;
    fn list_payments(&self) -> Vec<PaymentRecord>;

    fn balances(&self) -> Balances;
    fn new_onchain_address(&self) -> Result<String, NodeError>;
    fn send_all_to_onchain_address(&self, address: &str) -> Result<String, NodeError>;
    fn sync_wallets(&self) -> Result<(), NodeError>;

    fn next_event(&self) -> Option<NodeEvent>;
    /// Acknowledge the event last returned by `next_event`.
    ///
    /// ldk-node panics instead of returning when the acknowledgment cannot
    /// be persisted. Under the release profile's `panic = "abort"` that ends
    /// the process; the event loop only sees the panic as a failed task in
    /// unwinding builds such as tests.
    fn event_handled(&self) -> Result<(), NodeError>;
}

/// Constructs a node from a resolved configuration and seed
pub trait NodeBuilder {
    /// Fails with `Error::Config` when the library rejects the configuration
    fn build(
        &self,
        resolved: &ResolvedConfig,
        mnemonic: &Mnemonic,
    ) -> Result<Arc<dyn LightningNode>, Error>;
}
