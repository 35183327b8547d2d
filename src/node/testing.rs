//! In-memory node handle for tests
//!
//! Invoices produced by [`MockNode`] have the form
//! `lnmock:<payment hash hex>:<amount msat | any>`.

use super::config::ResolvedConfig;
use super::error::{Error, NodeError, StorageError};
use super::events::{EventBus, Notification};
use super::handle::*;
use super::keystore::{BackupInfo, KeyStore, MemoryKeyStore};
use bip39::Mnemonic;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;

pub const MOCK_NODE_KEY: [u8; 33] = [
    0x03, 0xab, 0xab, 0xab, 0xab, 0xab, 0xab, 0xab, 0xab, 0xab, 0xab, 0xab, 0xab, 0xab, 0xab,
    0xab, 0xab, 0xab, 0xab, 0xab, 0xab, 0xab, 0xab, 0xab, 0xab, 0xab, 0xab, 0xab, 0xab, 0xab,
    0xab, 0xab, 0xab,
];

pub const PEER_KEY: &str = "03abcdefabcdefabcdefabcdefabcdefabcdefabcdefabcdefabcdefabcdefabcd";

#[derive(Debug, Default)]
struct Inner {
    running: bool,
    peers: Vec<PeerDetails>,
    channels: Vec<ChannelRecord>,
    open_requests: Vec<OpenChannelRequest>,
    payments: HashMap<PaymentHash, PaymentRecord>,
    unreachable: HashSet<String>,
    unroutable: bool,
    spendable_sats: u64,
    next_id: u64,
    events: VecDeque<NodeEvent>,
    acknowledged: Vec<String>,
    ack_failure: Option<NodeError>,
    ack_panic: bool,
    start_failure: Option<NodeError>,
    sync_failure: Option<NodeError>,
    delay: Duration,
    event_delay: Duration,
}

#[derive(Debug)]
pub struct MockNode {
    inner: Mutex<Inner>,
    watcher: Mutex<Option<broadcast::Receiver<Notification>>>,
    in_flight_ops: AtomicUsize,
    max_in_flight_ops: AtomicUsize,
    in_flight_acks: AtomicUsize,
    max_in_flight_acks: AtomicUsize,
}

impl Default for MockNode {
    fn default() -> Self {
        Self {
            inner: Mutex::new(Inner {
                spendable_sats: 1_000_000,
                ..Inner::default()
            }),
            watcher: Mutex::new(None),
            in_flight_ops: AtomicUsize::new(0),
            max_in_flight_ops: AtomicUsize::new(0),
            in_flight_acks: AtomicUsize::new(0),
            max_in_flight_acks: AtomicUsize::new(0),
        }
    }
}

impl MockNode {
    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap()
    }

    fn next_hash(inner: &mut Inner) -> PaymentHash {
        inner.next_id += 1;
        let mut bytes = [0u8; 32];
        bytes[..8].copy_from_slice(&inner.next_id.to_be_bytes());
        PaymentHash(bytes)
    }

    /// Simulated latency of peer and channel calls
    fn busy(&self) {
        let delay = self.lock().delay;
        let now = self.in_flight_ops.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight_ops.fetch_max(now, Ordering::SeqCst);
        std::thread::sleep(delay);
        self.in_flight_ops.fetch_sub(1, Ordering::SeqCst);
    }

    /// Acknowledgments check that their event reached this receiver first
    pub fn watch_bus(&self, bus: &EventBus) {
        *self.watcher.lock().unwrap() = Some(bus.subscribe());
    }

    pub fn queue_event(&self, event: NodeEvent) {
        self.lock().events.push_back(event);
    }

    pub fn acknowledged(&self) -> Vec<String> {
        self.lock().acknowledged.clone()
    }

    pub fn ack_count(&self) -> usize {
        self.lock().acknowledged.len()
    }

    pub fn fail_acknowledgments(&self, error: NodeError) {
        self.lock().ack_failure = Some(error);
    }

    /// Panic in `event_handled`, as ldk-node does on persistence failure
    pub fn panic_on_acknowledgment(&self) {
        self.lock().ack_panic = true;
    }

    pub fn fail_start(&self, error: NodeError) {
        self.lock().start_failure = Some(error);
    }

    pub fn fail_sync(&self, error: NodeError) {
        self.lock().sync_failure = Some(error);
    }

    pub fn set_unreachable(&self, address: &str) {
        self.lock().unreachable.insert(address.to_string());
    }

    pub fn set_unroutable(&self) {
        self.lock().unroutable = true;
    }

    pub fn set_spendable_sats(&self, sats: u64) {
        self.lock().spendable_sats = sats;
    }

    pub fn set_delay(&self, delay: Duration) {
        self.lock().delay = delay;
    }

    pub fn max_in_flight_ops(&self) -> usize {
        self.max_in_flight_ops.load(Ordering::SeqCst)
    }

    /// Simulated latency of polling and acknowledging events
    pub fn set_event_delay(&self, delay: Duration) {
        self.lock().event_delay = delay;
    }

    pub fn max_in_flight_acks(&self) -> usize {
        self.max_in_flight_acks.load(Ordering::SeqCst)
    }

    pub fn queued_events(&self) -> usize {
        self.lock().events.len()
    }

    pub fn open_requests(&self) -> Vec<OpenChannelRequest> {
        self.lock().open_requests.clone()
    }

    /// Mark a payment as settled, as a payment event would
    pub fn settle_payment(&self, hash: &PaymentHash, status: PaymentStatus) {
        if let Some(payment) = self.lock().payments.get_mut(hash) {
            payment.status = status;
        }
    }

    fn parse_invoice(invoice: &str) -> Result<(PaymentHash, Option<u64>), NodeError> {
        let mut parts = invoice.split(':');
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some("lnmock"), Some(hash), Some(amount), None) => {
                let hash = hash.parse().map_err(|_| NodeError::InvalidInvoice)?;
                let amount = match amount {
                    "any" => None,
                    a => Some(a.parse().map_err(|_| NodeError::InvalidInvoice)?),
                };
                Ok((hash, amount))
            }
            _ => Err(NodeError::InvalidInvoice),
        }
    }

    fn pay(&self, hash: PaymentHash, amount_msat: u64) -> Result<PaymentHash, NodeError> {
        let mut inner = self.lock();
        if let Some(existing) = inner.payments.get(&hash) {
            if existing.status != PaymentStatus::Failed {
                return Err(NodeError::DuplicatePayment);
            }
        }
        let status = if inner.unroutable {
            PaymentStatus::Failed
        } else {
            PaymentStatus::Succeeded
        };
        inner.payments.insert(
            hash,
            PaymentRecord {
                hash,
                preimage: None,
                secret: None,
                amount_msat: Some(amount_msat),
                direction: PaymentDirection::Outbound,
                status,
                lsp_fee_limits: None,
            },
        );
        match status {
            PaymentStatus::Failed => Err(NodeError::PaymentSendingFailed),
            _ => Ok(hash),
        }
    }

    fn invoice(&self, amount_msat: Option<u64>, expiry_secs: u32) -> Result<String, NodeError> {
        if expiry_secs == 0 {
            return Err(NodeError::InvoiceCreationFailed);
        }
        let mut inner = self.lock();
        let hash = Self::next_hash(&mut inner);
        inner.payments.insert(
            hash,
            PaymentRecord {
                hash,
                preimage: None,
                secret: Some(hex::encode([7u8; 32])),
                amount_msat,
                direction: PaymentDirection::Inbound,
                status: PaymentStatus::Pending,
                lsp_fee_limits: None,
            },
        );
        let amount = amount_msat.map_or_else(|| "any".to_string(), |a| a.to_string());
        Ok(format!("lnmock:{}:{}", hash, amount))
    }
}

impl LightningNode for MockNode {
    fn start(&self) -> Result<(), NodeError> {
        let mut inner = self.lock();
        if let Some(e) = inner.start_failure.clone() {
            return Err(e);
        }
        if inner.running {
            return Err(NodeError::AlreadyRunning);
        }
        inner.running = true;
        Ok(())
    }

    fn stop(&self) -> Result<(), NodeError> {
        let mut inner = self.lock();
        if !inner.running {
            return Err(NodeError::NotRunning);
        }
        inner.running = false;
        Ok(())
    }

    fn node_id(&self) -> NodeId {
        NodeId::from_compressed_key(MOCK_NODE_KEY)
    }

    fn status(&self) -> RuntimeStatus {
        let running = self.lock().running;
        RuntimeStatus {
            is_running: running,
            is_listening: running,
            best_block_height: 100,
        }
    }

    fn listening_addresses(&self) -> Option<Vec<String>> {
        Some(vec!["0.0.0.0:9735".to_string()])
    }

    fn connect(&self, node_id: &NodeId, address: &str, persist: bool) -> Result<(), NodeError> {
        self.busy();
        if !address.contains(':') {
            return Err(NodeError::InvalidSocketAddress);
        }
        let mut inner = self.lock();
        if inner.unreachable.contains(address) {
            return Err(NodeError::ConnectionFailed);
        }
        inner.peers.retain(|p| &p.node_id != node_id);
        inner.peers.push(PeerDetails {
            node_id: node_id.clone(),
            address: address.to_string(),
            is_persisted: persist,
            is_connected: true,
        });
        Ok(())
    }

    fn disconnect(&self, node_id: &NodeId) -> Result<(), NodeError> {
        let mut inner = self.lock();
        let before = inner.peers.len();
        inner.peers.retain(|p| &p.node_id != node_id);
        if inner.peers.len() == before {
            return Err(NodeError::ConnectionFailed);
        }
        Ok(())
    }

    fn open_channel(&self, request: &OpenChannelRequest) -> Result<UserChannelId, NodeError> {
        self.connect(&request.node_id, &request.address, true)?;
        let mut inner = self.lock();
        if request.channel_amount_sats == 0 {
            return Err(NodeError::InvalidAmount);
        }
        if request.channel_amount_sats > inner.spendable_sats {
            return Err(NodeError::InsufficientFunds);
        }
        inner.spendable_sats -= request.channel_amount_sats;
        inner.next_id += 1;
        let user_channel_id = UserChannelId(inner.next_id as u128);
        inner.open_requests.push(request.clone());
        inner.channels.push(ChannelRecord {
            channel_id: format!("{:064x}", user_channel_id.0),
            user_channel_id,
            counterparty_node_id: request.node_id.clone(),
            amount_sats: request.channel_amount_sats,
            push_msat: request.push_to_counterparty_msat,
            channel_config: request.channel_config,
            announce: request.announce_channel,
            status: ChannelStatus::Pending,
            outbound_capacity_msat: 0,
            inbound_capacity_msat: 0,
        });
        Ok(user_channel_id)
    }

    fn close_channel(
        &self,
        user_channel_id: UserChannelId,
        counterparty_node_id: &NodeId,
    ) -> Result<(), NodeError> {
        let mut inner = self.lock();
        let position = inner
            .channels
            .iter()
            .position(|c| {
                c.user_channel_id == user_channel_id
                    && &c.counterparty_node_id == counterparty_node_id
            })
            .ok_or(NodeError::ChannelClosingFailed)?;
        inner.channels.remove(position);
        Ok(())
    }

    fn list_peers(&self) -> Vec<PeerDetails> {
        self.lock().peers.clone()
    }

    fn list_channels(&self) -> Vec<ChannelRecord> {
        self.lock().channels.clone()
    }

    fn send_payment(&self, invoice: &str) -> Result<PaymentHash, NodeError> {
        match Self::parse_invoice(invoice)? {
            (hash, Some(amount_msat)) => self.pay(hash, amount_msat),
            (_, None) => Err(NodeError::InvalidAmount),
        }
    }

    fn send_payment_using_amount(
        &self,
        invoice: &str,
        amount_msat: u64,
    ) -> Result<PaymentHash, NodeError> {
        match Self::parse_invoice(invoice)? {
            (hash, None) if amount_msat > 0 => self.pay(hash, amount_msat),
            _ => Err(NodeError::InvalidAmount),
        }
    }

    fn send_spontaneous_payment(
        &self,
        amount_msat: u64,
        _node_id: &NodeId,
    ) -> Result<PaymentHash, NodeError> {
        let hash = Self::next_hash(&mut self.lock());
        self.pay(hash, amount_msat)
    }

    fn receive_payment(
        &self,
        amount_msat: u64,
        _description: &str,
        expiry_secs: u32,
    ) -> Result<String, NodeError> {
        self.invoice(Some(amount_msat), expiry_secs)
    }

    fn receive_variable_amount_payment(
        &self,
        _description: &str,
        expiry_secs: u32,
    ) -> Result<String, NodeError> {
        self.invoice(None, expiry_secs)
    }

    fn payment(&self, hash: &PaymentHash) -> Option<PaymentRecord> {
        self.lock().payments.get(hash).cloned()
    }

    fn remove_payment(&self, hash: &PaymentHash) -> Result<(), NodeError> {
        self.lock().payments.remove(hash);
        Ok(())
    }

    fn list_payments(&self) -> Vec<PaymentRecord> {
        self.lock().payments.values().cloned().collect()
    }

    fn balances(&self) -> Balances {
        let inner = self.lock();
        Balances {
            total_onchain_balance_sats: inner.spendable_sats + 10_000,
            spendable_onchain_balance_sats: inner.spendable_sats,
            total_lightning_balance_sats: inner.channels.iter().map(|c| c.amount_sats).sum(),
        }
    }

    fn new_onchain_address(&self) -> Result<String, NodeError> {
        let mut inner = self.lock();
        inner.next_id += 1;
        Ok(format!("tb1qmock{}", inner.next_id))
    }

    fn send_all_to_onchain_address(&self, address: &str) -> Result<String, NodeError> {
        let mut inner = self.lock();
        if !address.starts_with("tb1") {
            return Err(NodeError::InvalidAddress);
        }
        if inner.spendable_sats == 0 {
            return Err(NodeError::InsufficientFunds);
        }
        inner.spendable_sats = 0;
        Ok(hex::encode([0x11u8; 32]))
    }

    fn sync_wallets(&self) -> Result<(), NodeError> {
        match self.lock().sync_failure.clone() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn next_event(&self) -> Option<NodeEvent> {
        let delay = self.lock().event_delay;
        std::thread::sleep(delay);
        self.lock().events.front().cloned()
    }

    fn event_handled(&self) -> Result<(), NodeError> {
        let delay = self.lock().event_delay;
        let now = self.in_flight_acks.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight_acks.fetch_max(now, Ordering::SeqCst);
        std::thread::sleep(delay);
        self.in_flight_acks.fetch_sub(1, Ordering::SeqCst);

        let mut published = Vec::new();
        if let Some(rx) = self.watcher.lock().unwrap().as_mut() {
            while let Ok(notification) = rx.try_recv() {
                if let Notification::NodeEvent { description, .. }
                | Notification::PendingChannel { description } = notification
                {
                    published.push(description);
                }
            }
        }

        if self.lock().ack_panic {
            panic!("Couldn't mark event handled due to persistence failure");
        }
        let mut inner = self.lock();
        if let Some(e) = inner.ack_failure.clone() {
            return Err(e);
        }
        if let Some(event) = inner.events.pop_front() {
            let watched = self.watcher.lock().unwrap().is_some();
            if watched && !published.contains(&event.description) {
                inner.acknowledged.push(format!("unpublished: {}", event.description));
            } else {
                inner.acknowledged.push(event.description);
            }
        }
        Ok(())
    }
}

/// Hands out one shared [`MockNode`] and records what it was built with
#[derive(Default)]
pub struct MockBuilder {
    pub node: Arc<MockNode>,
    pub mnemonics: Mutex<Vec<String>>,
    pub resolved: Mutex<Option<ResolvedConfig>>,
    pub failure: Option<String>,
}

impl MockBuilder {
    pub fn failing(reason: &str) -> Self {
        Self {
            failure: Some(reason.to_string()),
            ..Self::default()
        }
    }

    pub fn mnemonics(&self) -> Vec<String> {
        self.mnemonics.lock().unwrap().clone()
    }
}

impl NodeBuilder for MockBuilder {
    fn build(
        &self,
        resolved: &ResolvedConfig,
        mnemonic: &Mnemonic,
    ) -> Result<Arc<dyn LightningNode>, Error> {
        if let Some(reason) = &self.failure {
            return Err(Error::Config(reason.clone()));
        }
        self.mnemonics.lock().unwrap().push(mnemonic.to_string());
        *self.resolved.lock().unwrap() = Some(resolved.clone());
        Ok(self.node.clone())
    }
}

/// Key store whose backup writes always fail
#[derive(Debug, Default)]
pub struct ReadOnlyKeyStore {
    inner: MemoryKeyStore,
}

impl KeyStore for ReadOnlyKeyStore {
    fn get_network(&self) -> Result<Option<String>, StorageError> {
        self.inner.get_network()
    }

    fn save_network(&self, network: &str) -> Result<(), StorageError> {
        self.inner.save_network(network)
    }

    fn get_esplora_url(&self) -> Result<Option<String>, StorageError> {
        self.inner.get_esplora_url()
    }

    fn save_esplora_url(&self, url: &str) -> Result<(), StorageError> {
        self.inner.save_esplora_url(url)
    }

    fn get_backup_info(&self) -> Result<BackupInfo, StorageError> {
        self.inner.get_backup_info()
    }

    fn save_backup_info(&self, _backup: &BackupInfo) -> Result<(), StorageError> {
        Err(StorageError::Io(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "read-only key store",
        )))
    }

    fn delete_backup_info(&self) -> Result<(), StorageError> {
        self.inner.delete_backup_info()
    }

    fn delete_all(&self) -> Result<(), StorageError> {
        self.inner.delete_all()
    }
}
