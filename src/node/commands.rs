//! Caller-facing commands
//!
//! Thin handlers for a presentation layer: textual inputs are parsed here,
//! the service does the work, and every failure leaves as an
//! [`ErrorMessage`] so no library-internal error crosses this boundary.

use super::error::{Error, NodeError};
use super::error_mapper::ErrorMessage;
use super::handle::{
    Balances, ChannelOptions, ChannelRecord, NodeId, PaymentHash, PaymentRecord, PeerDetails,
    UserChannelId,
};
use super::keystore::BackupInfo;
use super::service::NodeService;
use super::state::NodeStatus;
use serde::{Deserialize, Serialize};

pub type CommandResult<T> = Result<T, ErrorMessage>;

/// Default invoice expiry (one hour)
pub const DEFAULT_INVOICE_EXPIRY_SECS: u32 = 3600;

fn connection_input<T>(r: Result<T, NodeError>) -> CommandResult<T> {
    r.map_err(|e| Error::Connection(e).into())
}

fn channel_input<T>(r: Result<T, NodeError>) -> CommandResult<T> {
    r.map_err(|e| Error::Channel(e).into())
}

fn payment_input<T>(r: Result<T, NodeError>) -> CommandResult<T> {
    r.map_err(|e| Error::Payment(e).into())
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectRequest {
    pub node_id: String,
    pub address: String,
    #[serde(default = "default_true")]
    pub persist: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenChannelCommand {
    pub node_id: String,
    pub address: String,
    pub channel_amount_sats: u64,
    #[serde(default)]
    pub push_to_counterparty_msat: Option<u64>,
    #[serde(default)]
    pub channel_config: Option<ChannelOptions>,
    #[serde(default = "default_true")]
    pub announce_channel: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiveRequest {
    /// Absent for a variable-amount invoice
    #[serde(default)]
    pub amount_msat: Option<u64>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub expiry_secs: Option<u32>,
}

fn default_true() -> bool {
    true
}

/// Network summary for display
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NetworkInfo {
    pub network: String,
    pub color: String,
    pub esplora_url: String,
}

// ============================================================================
// Status
// ============================================================================

pub fn get_status(service: &NodeService) -> NodeStatus {
    service.status()
}

pub fn get_node_id(service: &NodeService) -> String {
    service.node_id().to_string()
}

pub fn get_network_info(service: &NodeService) -> NetworkInfo {
    let network = service.network();
    NetworkInfo {
        network: network.to_string(),
        color: service.network_color().to_string(),
        esplora_url: service.resolved_config().directives.esplora_url.clone(),
    }
}

pub async fn start_node(service: &NodeService) -> CommandResult<()> {
    Ok(service.start().await?)
}

pub async fn stop_node(service: &NodeService) -> CommandResult<()> {
    Ok(service.stop().await?)
}

pub async fn get_listening_addresses(service: &NodeService) -> CommandResult<Vec<String>> {
    Ok(service.listening_addresses().await?.unwrap_or_default())
}

// ============================================================================
// Peers and channels
// ============================================================================

pub async fn connect_peer(service: &NodeService, request: ConnectRequest) -> CommandResult<()> {
    let node_id: NodeId = connection_input(request.node_id.parse())?;
    Ok(service
        .connect(&node_id, request.address.trim(), request.persist)
        .await?)
}

pub async fn disconnect_peer(service: &NodeService, node_id: &str) -> CommandResult<()> {
    let node_id: NodeId = connection_input(node_id.parse())?;
    Ok(service.disconnect(&node_id).await?)
}

/// Returns the local channel id as a string
pub async fn open_channel(
    service: &NodeService,
    request: OpenChannelCommand,
) -> CommandResult<String> {
    let node_id: NodeId = channel_input(request.node_id.parse())?;
    let user_channel_id = service
        .connect_open_channel(
            &node_id,
            request.address.trim(),
            request.channel_amount_sats,
            request.push_to_counterparty_msat,
            request.channel_config,
            request.announce_channel,
        )
        .await?;
    Ok(user_channel_id.to_string())
}

pub async fn close_channel(
    service: &NodeService,
    user_channel_id: &str,
    counterparty_node_id: &str,
) -> CommandResult<()> {
    let user_channel_id: UserChannelId = channel_input(user_channel_id.parse())?;
    let counterparty: NodeId = channel_input(counterparty_node_id.parse())?;
    Ok(service.close_channel(user_channel_id, &counterparty).await?)
}

pub async fn list_peers(service: &NodeService) -> CommandResult<Vec<PeerDetails>> {
    Ok(service.list_peers().await?)
}

pub async fn list_channels(service: &NodeService) -> CommandResult<Vec<ChannelRecord>> {
    Ok(service.list_channels().await?)
}

// ============================================================================
// Payments
// ============================================================================

/// Pay an invoice; `amount_msat` is required for variable-amount invoices
pub async fn send_payment(
    service: &NodeService,
    invoice: &str,
    amount_msat: Option<u64>,
) -> CommandResult<String> {
    let hash = match amount_msat {
        Some(amount) => service.send_payment_using_amount(invoice, amount).await?,
        None => service.send_payment(invoice).await?,
    };
    Ok(hash.to_string())
}

pub async fn send_keysend(
    service: &NodeService,
    amount_msat: u64,
    node_id: &str,
) -> CommandResult<String> {
    let node_id: NodeId = payment_input(node_id.parse())?;
    let hash = service.send_spontaneous_payment(amount_msat, &node_id).await?;
    Ok(hash.to_string())
}

/// Create an invoice and return it in its encoded form
pub async fn create_invoice(service: &NodeService, request: ReceiveRequest) -> CommandResult<String> {
    let expiry = request.expiry_secs.unwrap_or(DEFAULT_INVOICE_EXPIRY_SECS);
    let invoice = match request.amount_msat {
        Some(amount) => {
            service
                .receive_payment(amount, &request.description, expiry)
                .await?
        }
        None => {
            service
                .receive_variable_amount_payment(&request.description, expiry)
                .await?
        }
    };
    Ok(invoice)
}

pub async fn get_payment(
    service: &NodeService,
    hash: &str,
) -> CommandResult<Option<PaymentRecord>> {
    let hash: PaymentHash = payment_input(hash.parse())?;
    Ok(service.payment_info(&hash).await?)
}

pub async fn remove_payment(service: &NodeService, hash: &str) -> CommandResult<bool> {
    let hash: PaymentHash = payment_input(hash.parse())?;
    Ok(service.remove_payment(&hash).await?)
}

pub async fn list_payments(service: &NodeService) -> CommandResult<Vec<PaymentRecord>> {
    Ok(service.list_payments().await?)
}

// ============================================================================
// Wallet
// ============================================================================

pub async fn get_balances(service: &NodeService) -> CommandResult<Balances> {
    Ok(service.list_balances().await?)
}

pub async fn new_onchain_address(service: &NodeService) -> CommandResult<String> {
    Ok(service.new_onchain_address().await?)
}

pub async fn send_all_onchain(service: &NodeService, address: &str) -> CommandResult<String> {
    Ok(service.send_all_to_onchain_address(address).await?)
}

pub async fn sync_wallets(service: &NodeService) -> CommandResult<()> {
    Ok(service.sync_wallets().await?)
}

// ============================================================================
// Danger zone
// ============================================================================

pub fn get_backup_info(service: &NodeService) -> CommandResult<BackupInfo> {
    Ok(service.get_backup_info()?)
}

pub fn import_mnemonic(service: &NodeService, mnemonic: &str) -> CommandResult<()> {
    Ok(service.save_mnemonic(mnemonic)?)
}

pub fn delete_wallet(service: &NodeService) -> CommandResult<()> {
    Ok(service.delete_wallet()?)
}
