//! The node service
//!
//! Owns the node handle for the lifetime of the process and exposes its
//! operations as async calls. Every call goes through a single operation
//! queue, runs on the blocking pool and is bounded by the configured
//! timeout; library failures come back classified by the operation that
//! raised them.

use super::config::{build_node_config, NodeSettings, ResolvedConfig};
use super::error::{Error, NodeError, Result, StorageError};
use super::events::{EventBus, EventLoop, Notification};
use super::handle::{
    Balances, ChannelOptions, ChannelRecord, LightningNode, NodeBuilder, NodeId,
    OpenChannelRequest, PaymentHash, PaymentRecord, PaymentStatus, PeerDetails, UserChannelId,
};
use super::keystore::{BackupInfo, KeyStore};
use super::network::Network;
use super::state::{LifecycleState, NodeStatus, ServiceState};
use bip39::Mnemonic;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Words in a freshly generated seed phrase
const MNEMONIC_WORDS: usize = 24;

pub struct NodeService {
    node: Arc<dyn LightningNode>,
    key_store: Arc<dyn KeyStore>,
    resolved: ResolvedConfig,
    state: ServiceState,
    /// Serializes caller-issued operations on the node
    op_lock: Arc<tokio::sync::Mutex<()>>,
    operation_timeout: Duration,
    poll_interval: Duration,
    bus: EventBus,
    event_loop: tokio::sync::Mutex<Option<EventLoop>>,
}

/// Shared handle passed to every consumer of the service
pub type SharedNodeService = Arc<NodeService>;

impl NodeService {
    /// Resolve the configuration, obtain the seed and build the node.
    ///
    /// Fails with `Error::Config` when the configuration is rejected and
    /// with `Error::Storage` when the key store cannot be read.
    pub fn new(
        key_store: Arc<dyn KeyStore>,
        builder: &dyn NodeBuilder,
        storage_dir: &Path,
        settings: &NodeSettings,
    ) -> Result<Self> {
        let stored_network = key_store.get_network()?;
        let stored_url = key_store.get_esplora_url()?;
        let resolved = build_node_config(
            stored_network.as_deref(),
            stored_url.as_deref(),
            storage_dir,
            settings,
        )?;

        let mnemonic = obtain_mnemonic(key_store.as_ref())?;
        let node = builder.build(&resolved, &mnemonic)?;

        log::info!(
            "Node {} constructed on {} (chain backend {}, storage {})",
            node.node_id(),
            resolved.config.network,
            resolved.directives.esplora_url,
            resolved.config.storage_dir.display()
        );

        Ok(Self {
            node,
            key_store,
            resolved,
            state: ServiceState::default(),
            op_lock: Arc::new(tokio::sync::Mutex::new(())),
            operation_timeout: settings.operation_timeout(),
            poll_interval: settings.event_poll_interval(),
            bus: EventBus::new(settings.event_bus_capacity),
            event_loop: tokio::sync::Mutex::new(None),
        })
    }

    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    /// Run a node call on the operation queue
    async fn run<T, F>(
        &self,
        operation: &'static str,
        classify: fn(NodeError) -> Error,
        call: F,
    ) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn LightningNode) -> std::result::Result<T, NodeError> + Send + 'static,
    {
        let op_lock = self.op_lock.clone();
        let node = self.node.clone();
        let work = async move {
            let guard = op_lock.lock_owned().await;
            // The guard moves into the blocking call so a timed-out call
            // keeps the queue closed until it actually returns
            tokio::task::spawn_blocking(move || {
                let _guard = guard;
                call(node.as_ref())
            })
            .await
        };

        match tokio::time::timeout(self.operation_timeout, work).await {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(e))) => {
                log::warn!("{} failed: {}", operation, e);
                Err(classify(e))
            }
            Ok(Err(e)) => {
                log::error!("{} task failed: {}", operation, e);
                Err(Error::Unexpected(NodeError::Other(e.to_string())))
            }
            Err(_) => {
                log::error!(
                    "{} timed out after {:?}",
                    operation,
                    self.operation_timeout
                );
                Err(Error::Timeout {
                    operation,
                    secs: self.operation_timeout.as_secs(),
                })
            }
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    pub async fn start(&self) -> Result<()> {
        self.run("start", Error::Connection, |node| node.start())
            .await?;
        self.state.mark_started();
        log::info!("Node started");
        Ok(())
    }

    pub async fn stop(&self) -> Result<()> {
        self.run("stop", Error::Connection, |node| node.stop())
            .await?;
        self.state.mark_stopped();
        log::info!("Node stopped");
        Ok(())
    }

    pub fn node_id(&self) -> NodeId {
        self.node.node_id()
    }

    pub fn lifecycle(&self) -> LifecycleState {
        self.state.lifecycle()
    }

    pub fn status(&self) -> NodeStatus {
        self.state.snapshot(
            self.network(),
            self.node.node_id(),
            self.node.status(),
            self.is_listening_for_events(),
        )
    }

    pub fn network(&self) -> Network {
        self.resolved.config.network
    }

    /// Display color of the active network
    pub fn network_color(&self) -> &'static str {
        self.network().profile().color
    }

    pub fn resolved_config(&self) -> &ResolvedConfig {
        &self.resolved
    }

    pub async fn listening_addresses(&self) -> Result<Option<Vec<String>>> {
        self.run("listening_addresses", Error::Unexpected, |node| {
            Ok(node.listening_addresses())
        })
        .await
    }

    // ========================================================================
    // Peers and channels
    // ========================================================================

    pub async fn connect(&self, node_id: &NodeId, address: &str, persist: bool) -> Result<()> {
        let node_id = node_id.clone();
        let address = address.to_string();
        log::info!("Connecting to {}@{} (persist: {})", node_id, address, persist);
        self.run("connect", Error::Connection, move |node| {
            node.connect(&node_id, &address, persist)
        })
        .await
    }

    pub async fn disconnect(&self, node_id: &NodeId) -> Result<()> {
        let node_id = node_id.clone();
        log::info!("Disconnecting from {}", node_id);
        self.run("disconnect", Error::Connection, move |node| {
            node.disconnect(&node_id)
        })
        .await
    }

    /// Connect to the peer if needed and start a channel funding flow.
    ///
    /// `channel_config` and `announce_channel` are passed through as given;
    /// without a config the node's default CLTV expiry delta applies.
    pub async fn connect_open_channel(
        &self,
        node_id: &NodeId,
        address: &str,
        channel_amount_sats: u64,
        push_to_counterparty_msat: Option<u64>,
        channel_config: Option<ChannelOptions>,
        announce_channel: bool,
    ) -> Result<UserChannelId> {
        if channel_amount_sats == 0 {
            return Err(Error::Channel(NodeError::InvalidAmount));
        }

        let channel_config = match channel_config {
            Some(config) => config,
            None => self.default_channel_options()?,
        };
        let request = OpenChannelRequest {
            node_id: node_id.clone(),
            address: address.to_string(),
            channel_amount_sats,
            push_to_counterparty_msat,
            channel_config: Some(channel_config),
            announce_channel,
        };

        log::info!(
            "Opening {} sat channel with {}@{} (announce: {})",
            channel_amount_sats,
            node_id,
            address,
            announce_channel
        );
        let user_channel_id = self
            .run("connect_open_channel", Error::Channel, move |node| {
                node.open_channel(&request)
            })
            .await?;
        log::info!("Channel {} funding started", user_channel_id);
        Ok(user_channel_id)
    }

    fn default_channel_options(&self) -> Result<ChannelOptions> {
        let delta = self.resolved.config.default_cltv_expiry_delta;
        let delta = u16::try_from(delta)
            .map_err(|_| Error::Config(format!("CLTV expiry delta {} out of range", delta)))?;
        Ok(ChannelOptions::with_cltv_expiry_delta(delta))
    }

    pub async fn close_channel(
        &self,
        user_channel_id: UserChannelId,
        counterparty_node_id: &NodeId,
    ) -> Result<()> {
        let counterparty = counterparty_node_id.clone();
        log::info!("Closing channel {} with {}", user_channel_id, counterparty);
        self.run("close_channel", Error::Channel, move |node| {
            node.close_channel(user_channel_id, &counterparty)
        })
        .await
    }

    pub async fn list_peers(&self) -> Result<Vec<PeerDetails>> {
        self.run("list_peers", Error::Unexpected, |node| Ok(node.list_peers()))
            .await
    }

    pub async fn list_channels(&self) -> Result<Vec<ChannelRecord>> {
        self.run("list_channels", Error::Unexpected, |node| {
            Ok(node.list_channels())
        })
        .await
    }

    // ========================================================================
    // Payments
    // ========================================================================

    pub async fn send_payment(&self, invoice: &str) -> Result<PaymentHash> {
        let invoice = invoice.trim().to_string();
        let hash = self
            .run("send_payment", Error::Payment, move |node| {
                node.send_payment(&invoice)
            })
            .await?;
        log::info!("Payment {} sent", hash);
        Ok(hash)
    }

    pub async fn send_payment_using_amount(
        &self,
        invoice: &str,
        amount_msat: u64,
    ) -> Result<PaymentHash> {
        let invoice = invoice.trim().to_string();
        let hash = self
            .run("send_payment_using_amount", Error::Payment, move |node| {
                node.send_payment_using_amount(&invoice, amount_msat)
            })
            .await?;
        log::info!("Payment {} sent ({} msat)", hash, amount_msat);
        Ok(hash)
    }

    pub async fn send_spontaneous_payment(
        &self,
        amount_msat: u64,
        node_id: &NodeId,
    ) -> Result<PaymentHash> {
        let node_id = node_id.clone();
        let hash = self
            .run("send_spontaneous_payment", Error::Payment, move |node| {
                node.send_spontaneous_payment(amount_msat, &node_id)
            })
            .await?;
        log::info!("Spontaneous payment {} sent ({} msat)", hash, amount_msat);
        Ok(hash)
    }

    pub async fn receive_payment(
        &self,
        amount_msat: u64,
        description: &str,
        expiry_secs: u32,
    ) -> Result<String> {
        let description = description.to_string();
        self.run("receive_payment", Error::Payment, move |node| {
            node.receive_payment(amount_msat, &description, expiry_secs)
        })
        .await
    }

    pub async fn receive_variable_amount_payment(
        &self,
        description: &str,
        expiry_secs: u32,
    ) -> Result<String> {
        let description = description.to_string();
        self.run("receive_variable_amount_payment", Error::Payment, move |node| {
            node.receive_variable_amount_payment(&description, expiry_secs)
        })
        .await
    }

    pub async fn payment_info(&self, hash: &PaymentHash) -> Result<Option<PaymentRecord>> {
        let hash = *hash;
        self.run("payment_info", Error::Payment, move |node| Ok(node.payment(&hash)))
            .await
    }

    /// Remove a settled payment record; returns whether one existed.
    ///
    /// Pending payments cannot be removed.
    pub async fn remove_payment(&self, hash: &PaymentHash) -> Result<bool> {
        let hash = *hash;
        self.run("remove_payment", Error::Payment, move |node| {
            match node.payment(&hash) {
                None => Ok(false),
                Some(record) if record.status == PaymentStatus::Pending => {
                    Err(NodeError::PaymentPending)
                }
                Some(_) => node.remove_payment(&hash).map(|_| true),
            }
        })
        .await
    }

    pub async fn list_payments(&self) -> Result<Vec<PaymentRecord>> {
        self.run("list_payments", Error::Payment, |node| {
            Ok(node.list_payments())
        })
        .await
    }

    // ========================================================================
    // Wallet
    // ========================================================================

    pub async fn list_balances(&self) -> Result<Balances> {
        self.run("list_balances", Error::Unexpected, |node| Ok(node.balances()))
            .await
    }

    pub async fn spendable_onchain_balance_sats(&self) -> Result<u64> {
        Ok(self.list_balances().await?.spendable_onchain_balance_sats)
    }

    pub async fn total_onchain_balance_sats(&self) -> Result<u64> {
        Ok(self.list_balances().await?.total_onchain_balance_sats)
    }

    pub async fn total_lightning_balance_sats(&self) -> Result<u64> {
        Ok(self.list_balances().await?.total_lightning_balance_sats)
    }

    pub async fn new_onchain_address(&self) -> Result<String> {
        self.run("new_onchain_address", Error::Payment, |node| {
            node.new_onchain_address()
        })
        .await
    }

    /// Sweep the whole on-chain balance; returns the transaction id
    pub async fn send_all_to_onchain_address(&self, address: &str) -> Result<String> {
        let address = address.trim().to_string();
        let txid = self
            .run("send_all_to_onchain_address", Error::Payment, move |node| {
                node.send_all_to_onchain_address(&address)
            })
            .await?;
        log::info!("On-chain sweep broadcast: {}", txid);
        Ok(txid)
    }

    pub async fn sync_wallets(&self) -> Result<()> {
        self.run("sync_wallets", Error::Connection, |node| node.sync_wallets())
            .await
    }

    // ========================================================================
    // Key material
    // ========================================================================

    /// Exposes the raw seed phrase
    pub fn get_backup_info(&self) -> Result<BackupInfo> {
        Ok(self.key_store.get_backup_info()?)
    }

    /// Store an imported seed phrase; used from the next construction on
    pub fn save_mnemonic(&self, mnemonic: &str) -> Result<()> {
        let mnemonic = Mnemonic::parse(mnemonic.trim())
            .map_err(|e| Error::Config(format!("Invalid mnemonic: {}", e)))?;
        self.key_store
            .save_backup_info(&BackupInfo::new(mnemonic.to_string()))?;
        log::info!("Mnemonic saved");
        Ok(())
    }

    /// Delete every key store record, including the seed backup
    pub fn delete_wallet(&self) -> Result<()> {
        self.key_store.delete_all()?;
        log::warn!("Wallet key material deleted");
        Ok(())
    }

    // ========================================================================
    // Events
    // ========================================================================

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.bus.subscribe()
    }

    /// True while a loop runs, or while another caller is starting or
    /// stopping one
    pub fn is_listening_for_events(&self) -> bool {
        match self.event_loop.try_lock() {
            Ok(slot) => slot.as_ref().map_or(false, EventLoop::is_running),
            Err(_) => true,
        }
    }

    /// Start the event loop; a second call while it runs is a no-op.
    ///
    /// Waits for a concurrent `stop_listening` to finish joining the old
    /// loop, so two loops never drain the queue at once.
    pub async fn listen_for_events(&self) {
        let mut slot = self.event_loop.lock().await;
        if slot.as_ref().map_or(false, EventLoop::is_running) {
            log::debug!("Event loop already running");
            return;
        }
        *slot = Some(EventLoop::spawn(
            self.node.clone(),
            self.bus.clone(),
            self.poll_interval,
        ));
    }

    /// Cancel the event loop and wait for it to exit
    pub async fn stop_listening(&self) {
        // The slot stays locked until the old loop has been joined
        let mut slot = self.event_loop.lock().await;
        if let Some(event_loop) = slot.take() {
            event_loop.shutdown().await;
        }
    }
}

impl Drop for NodeService {
    fn drop(&mut self) {
        if let Some(event_loop) = self.event_loop.get_mut().as_ref() {
            event_loop.cancel();
        }
    }
}

/// Reuse the stored seed, or generate and persist a fresh one.
///
/// Failing to persist a fresh seed is tolerated: it stays usable in memory
/// for this session.
fn obtain_mnemonic(key_store: &dyn KeyStore) -> Result<Mnemonic> {
    match key_store.get_backup_info() {
        Ok(backup) if !backup.mnemonic.trim().is_empty() => {
            return Mnemonic::parse(backup.mnemonic.trim())
                .map_err(|e| Error::Config(format!("Stored mnemonic is invalid: {}", e)));
        }
        Ok(_) | Err(StorageError::NotFound(_)) => {}
        Err(e) => return Err(e.into()),
    }

    let mnemonic = Mnemonic::generate(MNEMONIC_WORDS)
        .map_err(|e| Error::Config(format!("Failed to generate mnemonic: {}", e)))?;
    match key_store.save_backup_info(&BackupInfo::new(mnemonic.to_string())) {
        Ok(()) => log::info!("Generated and stored a new {}-word mnemonic", MNEMONIC_WORDS),
        Err(e) => log::warn!(
            "Generated a new mnemonic but failed to store it, continuing in memory: {}",
            e
        ),
    }
    Ok(mnemonic)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::handle::{ChannelStatus, EventKind, NodeEvent};
    use crate::node::keystore::{FileKeyStore, MemoryKeyStore};
    use crate::node::network::ESPLORA_URL_TESTNET;
    use crate::node::testing::{MockBuilder, ReadOnlyKeyStore, PEER_KEY};
    use tempfile::TempDir;

    const MNEMONIC: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    fn service_with(key_store: Arc<dyn KeyStore>, builder: &MockBuilder) -> NodeService {
        NodeService::new(
            key_store,
            builder,
            Path::new("/tmp/monday-test"),
            &NodeSettings::default(),
        )
        .unwrap()
    }

    fn service() -> (NodeService, MockBuilder) {
        let builder = MockBuilder::default();
        let service = service_with(Arc::new(MemoryKeyStore::new()), &builder);
        (service, builder)
    }

    fn peer() -> NodeId {
        PEER_KEY.parse().unwrap()
    }

    #[test]
    fn test_unset_network_resolves_to_testnet() {
        let (service, builder) = service();
        assert_eq!(service.network(), Network::Testnet);
        let resolved = builder.resolved.lock().unwrap().clone().unwrap();
        assert_eq!(resolved.directives.esplora_url, ESPLORA_URL_TESTNET);
        assert_eq!(service.lifecycle(), LifecycleState::Constructed);
    }

    #[test]
    fn test_stored_mnemonic_is_reused() {
        let key_store = Arc::new(MemoryKeyStore::new());
        key_store.save_backup_info(&BackupInfo::new(MNEMONIC)).unwrap();

        let builder = MockBuilder::default();
        service_with(key_store.clone(), &builder);
        service_with(key_store.clone(), &builder);

        assert_eq!(builder.mnemonics(), vec![MNEMONIC.to_string(); 2]);
        assert_eq!(key_store.get_backup_info().unwrap().mnemonic, MNEMONIC);
    }

    #[test]
    fn test_generated_mnemonic_is_persisted_across_restarts() {
        let dir = TempDir::new().unwrap();
        let builder = MockBuilder::default();

        let key_store = Arc::new(FileKeyStore::in_data_dir(dir.path()));
        service_with(key_store, &builder);
        let reopened = Arc::new(FileKeyStore::in_data_dir(dir.path()));
        service_with(reopened.clone(), &builder);

        let mnemonics = builder.mnemonics();
        assert_eq!(mnemonics[0].split_whitespace().count(), MNEMONIC_WORDS);
        assert_eq!(mnemonics[0], mnemonics[1]);
        assert_eq!(reopened.get_backup_info().unwrap().mnemonic, mnemonics[0]);
    }

    #[test]
    fn test_deleted_backup_yields_fresh_mnemonic() {
        let key_store = Arc::new(MemoryKeyStore::new());
        let builder = MockBuilder::default();

        let first = service_with(key_store.clone(), &builder);
        first.delete_wallet().unwrap();
        assert!(first.get_backup_info().is_err());
        service_with(key_store.clone(), &builder);

        let mnemonics = builder.mnemonics();
        assert_ne!(mnemonics[0], mnemonics[1]);
    }

    #[test]
    fn test_write_back_failure_is_tolerated() {
        let builder = MockBuilder::default();
        let service = service_with(Arc::new(ReadOnlyKeyStore::default()), &builder);

        assert_eq!(builder.mnemonics().len(), 1);
        assert!(matches!(
            service.get_backup_info(),
            Err(Error::Storage(StorageError::NotFound(_)))
        ));
    }

    #[test]
    fn test_invalid_stored_mnemonic_is_config_error() {
        let key_store = Arc::new(MemoryKeyStore::new());
        key_store
            .save_backup_info(&BackupInfo::new("not a seed phrase"))
            .unwrap();
        let builder = MockBuilder::default();

        let result = NodeService::new(
            key_store,
            &builder,
            Path::new("/tmp/monday-test"),
            &NodeSettings::default(),
        );
        assert!(matches!(result, Err(Error::Config(_))));
        assert!(builder.mnemonics().is_empty());
    }

    #[test]
    fn test_builder_rejection_is_surfaced() {
        let builder = MockBuilder::failing("invalid listening address");
        let result = NodeService::new(
            Arc::new(MemoryKeyStore::new()),
            &builder,
            Path::new("/tmp/monday-test"),
            &NodeSettings::default(),
        );
        match result {
            Err(Error::Config(reason)) => assert_eq!(reason, "invalid listening address"),
            _ => panic!("expected a configuration error"),
        }
    }

    #[test]
    fn test_save_mnemonic_validates() {
        let (service, _) = service();
        assert!(matches!(
            service.save_mnemonic("twelve random words"),
            Err(Error::Config(_))
        ));
        service.save_mnemonic(MNEMONIC).unwrap();
        assert_eq!(service.get_backup_info().unwrap().mnemonic, MNEMONIC);
    }

    #[tokio::test]
    async fn test_lifecycle() {
        let (service, _) = service();
        service.start().await.unwrap();
        assert_eq!(service.lifecycle(), LifecycleState::Started);
        assert!(service.status().is_running);

        assert!(matches!(
            service.start().await,
            Err(Error::Connection(NodeError::AlreadyRunning))
        ));

        service.stop().await.unwrap();
        assert_eq!(service.lifecycle(), LifecycleState::Stopped);
        service.start().await.unwrap();
        assert_eq!(service.lifecycle(), LifecycleState::Started);
    }

    #[tokio::test]
    async fn test_start_failure_keeps_state() {
        let (service, builder) = service();
        builder.node.fail_start(NodeError::TxSyncFailed);
        assert!(matches!(
            service.start().await,
            Err(Error::Connection(NodeError::TxSyncFailed))
        ));
        assert_eq!(service.lifecycle(), LifecycleState::Constructed);
    }

    #[tokio::test]
    async fn test_connect_open_channel() {
        let (service, builder) = service();
        service.start().await.unwrap();

        service
            .connect_open_channel(&peer(), "127.0.0.1:9735", 20_000, None, None, true)
            .await
            .unwrap();

        let channels = service.list_channels().await.unwrap();
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].amount_sats, 20_000);
        assert_eq!(channels[0].status, ChannelStatus::Pending);

        let request = &builder.node.open_requests()[0];
        assert!(request.announce_channel);
        assert_eq!(request.channel_config.unwrap().cltv_expiry_delta, 144);
    }

    #[tokio::test]
    async fn test_caller_channel_parameters_pass_through() {
        let (service, builder) = service();
        let config = ChannelOptions {
            forwarding_fee_base_msat: 0,
            forwarding_fee_proportional_millionths: 250,
            cltv_expiry_delta: 72,
        };

        service
            .connect_open_channel(&peer(), "127.0.0.1:9735", 50_000, Some(5_000), Some(config), false)
            .await
            .unwrap();

        let request = &builder.node.open_requests()[0];
        assert!(!request.announce_channel);
        assert_eq!(request.channel_config, Some(config));
        assert_eq!(request.push_to_counterparty_msat, Some(5_000));
    }

    #[tokio::test]
    async fn test_channel_failures_are_channel_errors() {
        let (service, builder) = service();
        assert!(matches!(
            service
                .connect_open_channel(&peer(), "127.0.0.1:9735", 0, None, None, true)
                .await,
            Err(Error::Channel(NodeError::InvalidAmount))
        ));

        builder.node.set_spendable_sats(1_000);
        assert!(matches!(
            service
                .connect_open_channel(&peer(), "127.0.0.1:9735", 20_000, None, None, true)
                .await,
            Err(Error::Channel(NodeError::InsufficientFunds))
        ));

        assert!(matches!(
            service.close_channel(UserChannelId(99), &peer()).await,
            Err(Error::Channel(NodeError::ChannelClosingFailed))
        ));
    }

    #[tokio::test]
    async fn test_close_channel_removes_record() {
        let (service, _) = service();
        let id = service
            .connect_open_channel(&peer(), "127.0.0.1:9735", 20_000, None, None, true)
            .await
            .unwrap();
        service.close_channel(id, &peer()).await.unwrap();
        assert!(service.list_channels().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_peer_connections() {
        let (service, builder) = service();
        builder.node.set_unreachable("10.0.0.9:9735");

        assert!(matches!(
            service.connect(&peer(), "10.0.0.9:9735", true).await,
            Err(Error::Connection(NodeError::ConnectionFailed))
        ));

        service.connect(&peer(), "127.0.0.1:9735", true).await.unwrap();
        let peers = service.list_peers().await.unwrap();
        assert_eq!(peers.len(), 1);
        assert!(peers[0].is_persisted);

        service.disconnect(&peer()).await.unwrap();
        assert!(matches!(
            service.disconnect(&peer()).await,
            Err(Error::Connection(_))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_invoice_fails_without_success_record() {
        let (service, builder) = service();
        builder.node.set_unroutable();
        let hash = PaymentHash([9; 32]);
        let invoice = format!("lnmock:{}:21000", hash);

        assert!(matches!(
            service.send_payment(&invoice).await,
            Err(Error::Payment(NodeError::PaymentSendingFailed))
        ));

        let record = service.payment_info(&hash).await.unwrap();
        assert!(record.map_or(true, |r| r.status != PaymentStatus::Succeeded));
    }

    #[tokio::test]
    async fn test_payments() {
        let (service, _) = service();

        let invoice = service
            .receive_variable_amount_payment("tip", 600)
            .await
            .unwrap();
        assert!(matches!(
            service.send_payment(&invoice).await,
            Err(Error::Payment(NodeError::InvalidAmount))
        ));
        assert!(matches!(
            service.send_payment("lnbc1garbage").await,
            Err(Error::Payment(NodeError::InvalidInvoice))
        ));
        assert!(matches!(
            service.receive_payment(1_000, "zero expiry", 0).await,
            Err(Error::Payment(NodeError::InvoiceCreationFailed))
        ));

        let keysend = service.send_spontaneous_payment(5_000, &peer()).await.unwrap();
        let record = service.payment_info(&keysend).await.unwrap().unwrap();
        assert_eq!(record.status, PaymentStatus::Succeeded);
        assert_eq!(record.amount_msat, Some(5_000));

        assert_eq!(service.list_payments().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_remove_payment() {
        let (service, builder) = service();
        let unknown = PaymentHash([1; 32]);
        assert!(!service.remove_payment(&unknown).await.unwrap());

        let hash = service.send_spontaneous_payment(1_000, &peer()).await.unwrap();
        assert!(service.remove_payment(&hash).await.unwrap());
        assert!(service.payment_info(&hash).await.unwrap().is_none());
        assert!(!service.remove_payment(&hash).await.unwrap());

        let invoice = service.receive_payment(2_000, "pending", 60).await.unwrap();
        let pending: PaymentHash = invoice.split(':').nth(1).unwrap().parse().unwrap();
        assert!(matches!(
            service.remove_payment(&pending).await,
            Err(Error::Payment(NodeError::PaymentPending))
        ));

        builder.node.settle_payment(&pending, PaymentStatus::Failed);
        assert!(service.remove_payment(&pending).await.unwrap());
    }

    #[tokio::test]
    async fn test_wallet_operations() {
        let (service, builder) = service();
        assert_eq!(service.spendable_onchain_balance_sats().await.unwrap(), 1_000_000);
        assert_eq!(service.total_lightning_balance_sats().await.unwrap(), 0);

        let address = service.new_onchain_address().await.unwrap();
        assert!(matches!(
            service.send_all_to_onchain_address("bc1qwrongnet").await,
            Err(Error::Payment(NodeError::InvalidAddress))
        ));
        service.send_all_to_onchain_address(&address).await.unwrap();
        assert_eq!(service.spendable_onchain_balance_sats().await.unwrap(), 0);

        builder.node.fail_sync(NodeError::TxSyncFailed);
        assert!(matches!(
            service.sync_wallets().await,
            Err(Error::Connection(NodeError::TxSyncFailed))
        ));
    }

    #[tokio::test]
    async fn test_operation_timeout() {
        let (service, builder) = service();
        let service = service.with_operation_timeout(Duration::from_millis(50));
        builder.node.set_delay(Duration::from_millis(300));

        match service.connect(&peer(), "127.0.0.1:9735", false).await {
            Err(Error::Timeout { operation, .. }) => assert_eq!(operation, "connect"),
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_operations_are_serialized() {
        let (service, builder) = service();
        builder.node.set_delay(Duration::from_millis(50));
        let service = Arc::new(service);

        let first = {
            let service = service.clone();
            tokio::spawn(async move {
                service
                    .connect_open_channel(&peer(), "127.0.0.1:9735", 10_000, None, None, true)
                    .await
            })
        };
        let second = {
            let service = service.clone();
            tokio::spawn(async move {
                service
                    .connect_open_channel(&peer(), "127.0.0.1:9736", 10_000, None, None, true)
                    .await
            })
        };

        first.await.unwrap().unwrap();
        second.await.unwrap().unwrap();
        assert_eq!(builder.node.max_in_flight_ops(), 1);
        assert_eq!(service.list_channels().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_event_loop_control() {
        let (service, builder) = service();
        builder.node.queue_event(NodeEvent {
            kind: EventKind::ChannelPending,
            description: "channel pending".into(),
        });

        let mut rx = service.subscribe();
        service.listen_for_events().await;
        service.listen_for_events().await;
        assert!(service.is_listening_for_events());

        assert!(matches!(
            rx.recv().await.unwrap(),
            Notification::PendingChannel { .. }
        ));

        service.stop_listening().await;
        assert!(!service.is_listening_for_events());
        assert!(!service.status().event_loop_running);
        assert_eq!(builder.node.ack_count(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_stop_and_restart_drain_once() {
        let (service, builder) = service();
        let node = builder.node.clone();
        node.set_event_delay(Duration::from_millis(40));
        node.watch_bus(&service.bus);
        for name in ["e1", "e2", "e3"] {
            node.queue_event(NodeEvent {
                kind: EventKind::Other,
                description: name.into(),
            });
        }

        let service = Arc::new(service);
        let mut rx = service.subscribe();
        service.listen_for_events().await;

        let stopping = {
            let service = service.clone();
            tokio::spawn(async move { service.stop_listening().await })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;
        service.listen_for_events().await;
        stopping.await.unwrap();
        // Restart in case the stop won the race
        service.listen_for_events().await;

        tokio::time::timeout(Duration::from_secs(5), async {
            while node.queued_events() > 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("queue should drain");
        service.stop_listening().await;

        let mut published = Vec::new();
        while let Ok(notification) = rx.try_recv() {
            if let Notification::NodeEvent { description, .. } = notification {
                published.push(description);
            }
        }
        let expected = vec!["e1".to_string(), "e2".to_string(), "e3".to_string()];
        assert_eq!(published, expected);
        assert_eq!(node.acknowledged(), expected);
        assert_eq!(node.max_in_flight_acks(), 1);
    }

    #[test]
    fn test_network_color() {
        let (service, _) = service();
        assert_eq!(service.network_color(), Network::Testnet.profile().color);
    }
}
