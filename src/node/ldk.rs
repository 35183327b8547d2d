//! ldk-node backed node handle
//!
//! Translates between the service's value types and the `ldk_node` API.

use super::config::{LogLevel, ResolvedConfig};
use super::error::{Error, NodeError};
use super::handle::{
    Balances, ChannelOptions, ChannelRecord, ChannelStatus, EventKind, LightningNode,
    LspFeeLimits, NodeBuilder, NodeEvent, NodeId, OpenChannelRequest, PaymentDirection,
    PaymentHash, PaymentRecord, PaymentStatus, PeerDetails, RuntimeStatus, UserChannelId,
};
use super::network::Network;
use bip39::Mnemonic;
use ldk_node::bitcoin::secp256k1::PublicKey;
use ldk_node::bitcoin::Address;
use ldk_node::config::{ChannelConfig, Config, EsploraSyncConfig};
use ldk_node::lightning::ln::channelmanager::PaymentId;
use ldk_node::lightning::ln::msgs::SocketAddress;
use ldk_node::lightning_invoice::Bolt11Invoice;
use ldk_node::payment::{PaymentDetails, PaymentKind};
use ldk_node::{Builder, Event, Node};
use std::str::FromStr;
use std::sync::Arc;

/// Builds nodes through `ldk_node::Builder`
#[derive(Debug, Default, Clone, Copy)]
pub struct LdkNodeBuilder;

impl NodeBuilder for LdkNodeBuilder {
    fn build(
        &self,
        resolved: &ResolvedConfig,
        mnemonic: &Mnemonic,
    ) -> Result<Arc<dyn LightningNode>, Error> {
        let node_config = &resolved.config;

        let listening_addresses = node_config
            .listening_addresses
            .iter()
            .map(|addr| {
                SocketAddress::from_str(addr)
                    .map_err(|_| Error::Config(format!("Invalid listening address: {}", addr)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        std::fs::create_dir_all(&node_config.storage_dir).map_err(|e| {
            Error::Config(format!(
                "Storage directory {} is not writable: {}",
                node_config.storage_dir.display(),
                e
            ))
        })?;

        let mut config = Config::default();
        config.storage_dir_path = node_config.storage_dir.to_string_lossy().into_owned();
        config.network = to_ldk_network(node_config.network);
        config.listening_addresses = Some(listening_addresses);
        config.log_level = to_ldk_log_level(node_config.log_level);

        let mut sync_config = EsploraSyncConfig::default();
        sync_config.onchain_wallet_sync_interval_secs =
            node_config.onchain_wallet_sync_interval_secs;
        sync_config.lightning_wallet_sync_interval_secs =
            node_config.lightning_wallet_sync_interval_secs;
        sync_config.fee_rate_cache_update_interval_secs =
            node_config.fee_rate_cache_update_interval_secs;

        let mut builder = Builder::from_config(config);
        builder.set_chain_source_esplora(resolved.directives.esplora_url.clone(), Some(sync_config));
        if let Some(rgs_url) = &resolved.directives.rgs_url {
            builder.set_gossip_source_rgs(rgs_url.clone());
        }
        builder.set_entropy_bip39_mnemonic(mnemonic.clone(), None);

        log::info!(
            "Building {} node in {}",
            node_config.network,
            node_config.storage_dir.display()
        );
        let node = builder
            .build()
            .map_err(|e| Error::Config(format!("Failed to build node: {}", e)))?;

        Ok(Arc::new(LdkNode {
            node,
            network: node_config.network,
        }))
    }
}

/// Running or stopped `ldk_node::Node`
pub struct LdkNode {
    node: Node,
    network: Network,
}

fn to_ldk_network(network: Network) -> ldk_node::bitcoin::Network {
    match network {
        Network::Bitcoin => ldk_node::bitcoin::Network::Bitcoin,
        Network::Testnet => ldk_node::bitcoin::Network::Testnet,
        Network::Signet => ldk_node::bitcoin::Network::Signet,
        Network::Regtest => ldk_node::bitcoin::Network::Regtest,
    }
}

fn to_ldk_log_level(level: LogLevel) -> ldk_node::LogLevel {
    match level {
        LogLevel::Gossip => ldk_node::LogLevel::Gossip,
        LogLevel::Trace => ldk_node::LogLevel::Trace,
        LogLevel::Debug => ldk_node::LogLevel::Debug,
        LogLevel::Info => ldk_node::LogLevel::Info,
        LogLevel::Warn => ldk_node::LogLevel::Warn,
        LogLevel::Error => ldk_node::LogLevel::Error,
    }
}

fn to_public_key(node_id: &NodeId) -> Result<PublicKey, NodeError> {
    PublicKey::from_str(node_id.as_str()).map_err(|_| NodeError::InvalidPublicKey)
}

fn to_socket_address(address: &str) -> Result<SocketAddress, NodeError> {
    SocketAddress::from_str(address).map_err(|_| NodeError::InvalidSocketAddress)
}

fn to_invoice(invoice: &str) -> Result<Bolt11Invoice, NodeError> {
    Bolt11Invoice::from_str(invoice.trim()).map_err(|_| NodeError::InvalidInvoice)
}

fn to_node_id(key: &PublicKey) -> NodeId {
    NodeId::from_compressed_key(key.serialize())
}

fn to_channel_config(options: &ChannelOptions) -> ChannelConfig {
    let mut config = ChannelConfig::default();
    config.forwarding_fee_base_msat = options.forwarding_fee_base_msat;
    config.forwarding_fee_proportional_millionths = options.forwarding_fee_proportional_millionths;
    config.cltv_expiry_delta = options.cltv_expiry_delta;
    config
}

fn from_channel_config(config: &ChannelConfig) -> ChannelOptions {
    ChannelOptions {
        forwarding_fee_base_msat: config.forwarding_fee_base_msat,
        forwarding_fee_proportional_millionths: config.forwarding_fee_proportional_millionths,
        cltv_expiry_delta: config.cltv_expiry_delta,
    }
}

impl From<ldk_node::NodeError> for NodeError {
    fn from(e: ldk_node::NodeError) -> Self {
        use ldk_node::NodeError as E;
        match e {
            E::AlreadyRunning => NodeError::AlreadyRunning,
            E::NotRunning => NodeError::NotRunning,
            E::ConnectionFailed => NodeError::ConnectionFailed,
            E::OnchainTxCreationFailed => NodeError::OnchainTxCreationFailed,
            E::InvoiceCreationFailed => NodeError::InvoiceCreationFailed,
            E::PaymentSendingFailed => NodeError::PaymentSendingFailed,
            E::ChannelCreationFailed => NodeError::ChannelCreationFailed,
            E::ChannelClosingFailed => NodeError::ChannelClosingFailed,
            E::ChannelConfigUpdateFailed => NodeError::ChannelConfigUpdateFailed,
            E::PersistenceFailed => NodeError::PersistenceFailed,
            E::WalletOperationFailed => NodeError::WalletOperationFailed,
            E::TxSyncFailed => NodeError::TxSyncFailed,
            E::GossipUpdateFailed => NodeError::GossipUpdateFailed,
            E::InvalidAddress => NodeError::InvalidAddress,
            E::InvalidSocketAddress => NodeError::InvalidSocketAddress,
            E::InvalidPublicKey => NodeError::InvalidPublicKey,
            E::InvalidPaymentHash => NodeError::InvalidPaymentHash,
            E::InvalidAmount => NodeError::InvalidAmount,
            E::InvalidInvoice => NodeError::InvalidInvoice,
            E::InvalidChannelId => NodeError::InvalidChannelId,
            E::InvalidNetwork => NodeError::InvalidNetwork,
            E::DuplicatePayment => NodeError::DuplicatePayment,
            E::InsufficientFunds => NodeError::InsufficientFunds,
            E::InvoiceRequestCreationFailed => NodeError::InvoiceRequestCreationFailed,
            E::OfferCreationFailed => NodeError::OfferCreationFailed,
            E::RefundCreationFailed => NodeError::RefundCreationFailed,
            E::ProbeSendingFailed => NodeError::ProbeSendingFailed,
            E::FeerateEstimationUpdateFailed => NodeError::FeerateEstimationUpdateFailed,
            E::FeerateEstimationUpdateTimeout => NodeError::FeerateEstimationUpdateTimeout,
            E::WalletOperationTimeout => NodeError::WalletOperationTimeout,
            E::OnchainTxSigningFailed => NodeError::OnchainTxSigningFailed,
            E::TxSyncTimeout => NodeError::TxSyncTimeout,
            E::GossipUpdateTimeout => NodeError::GossipUpdateTimeout,
            E::LiquidityRequestFailed => NodeError::LiquidityRequestFailed,
            E::UriParameterParsingFailed => NodeError::UriParameterParsingFailed,
            E::InvalidSecretKey => NodeError::InvalidSecretKey,
            E::InvalidOfferId => NodeError::InvalidOfferId,
            E::InvalidNodeId => NodeError::InvalidNodeId,
            E::InvalidPaymentId => NodeError::InvalidPaymentId,
            E::InvalidPaymentPreimage => NodeError::InvalidPaymentPreimage,
            E::InvalidPaymentSecret => NodeError::InvalidPaymentSecret,
            E::InvalidOffer => NodeError::InvalidOffer,
            E::InvalidRefund => NodeError::InvalidRefund,
            E::InvalidUri => NodeError::InvalidUri,
            E::InvalidQuantity => NodeError::InvalidQuantity,
            E::InvalidNodeAlias => NodeError::InvalidNodeAlias,
            E::UnsupportedCurrency => NodeError::UnsupportedCurrency,
            E::LiquiditySourceUnavailable => NodeError::LiquiditySourceUnavailable,
            E::LiquidityFeeTooHigh => NodeError::LiquidityFeeTooHigh,
        }
    }
}

fn payment_record(details: PaymentDetails) -> Option<PaymentRecord> {
    let (hash, preimage, secret, lsp_fee_limits) = match details.kind {
        PaymentKind::Bolt11 {
            hash,
            preimage,
            secret,
            ..
        } => (hash, preimage, secret, None),
        PaymentKind::Bolt11Jit {
            hash,
            preimage,
            secret,
            lsp_fee_limits,
            ..
        } => (
            hash,
            preimage,
            secret,
            Some(LspFeeLimits {
                max_total_opening_fee_msat: lsp_fee_limits.max_total_opening_fee_msat,
                max_proportional_opening_fee_ppm_msat: lsp_fee_limits
                    .max_proportional_opening_fee_ppm_msat,
            }),
        ),
        PaymentKind::Spontaneous { hash, preimage, .. } => (hash, preimage, None, None),
        // On-chain and BOLT12 payments have no invoice hash to key on
        _ => return None,
    };

    Some(PaymentRecord {
        hash: PaymentHash(hash.0),
        preimage: preimage.map(|p| hex::encode(p.0)),
        secret: secret.map(|s| hex::encode(s.0)),
        amount_msat: details.amount_msat,
        direction: match details.direction {
            ldk_node::payment::PaymentDirection::Inbound => PaymentDirection::Inbound,
            ldk_node::payment::PaymentDirection::Outbound => PaymentDirection::Outbound,
        },
        status: match details.status {
            ldk_node::payment::PaymentStatus::Pending => PaymentStatus::Pending,
            ldk_node::payment::PaymentStatus::Succeeded => PaymentStatus::Succeeded,
            ldk_node::payment::PaymentStatus::Failed => PaymentStatus::Failed,
        },
        lsp_fee_limits,
    })
}

fn event_kind(event: &Event) -> EventKind {
    match event {
        Event::PaymentSuccessful { .. } => EventKind::PaymentSuccessful,
        Event::PaymentFailed { .. } => EventKind::PaymentFailed,
        Event::PaymentReceived { .. } => EventKind::PaymentReceived,
        Event::PaymentClaimable { .. } => EventKind::PaymentClaimable,
        Event::ChannelPending { .. } => EventKind::ChannelPending,
        Event::ChannelReady { .. } => EventKind::ChannelReady,
        Event::ChannelClosed { .. } => EventKind::ChannelClosed,
        #[allow(unreachable_patterns)]
        _ => EventKind::Other,
    }
}

impl LightningNode for LdkNode {
    fn start(&self) -> Result<(), NodeError> {
        Ok(self.node.start()?)
    }

    fn stop(&self) -> Result<(), NodeError> {
        Ok(self.node.stop()?)
    }

    fn node_id(&self) -> NodeId {
        to_node_id(&self.node.node_id())
    }

    fn status(&self) -> RuntimeStatus {
        let status = self.node.status();
        RuntimeStatus {
            is_running: status.is_running,
            is_listening: status.is_listening,
            best_block_height: status.current_best_block.height,
        }
    }

    fn listening_addresses(&self) -> Option<Vec<String>> {
        self.node
            .listening_addresses()
            .map(|addrs| addrs.iter().map(|a| a.to_string()).collect())
    }

    fn connect(&self, node_id: &NodeId, address: &str, persist: bool) -> Result<(), NodeError> {
        let key = to_public_key(node_id)?;
        let address = to_socket_address(address)?;
        Ok(self.node.connect(key, address, persist)?)
    }

    fn disconnect(&self, node_id: &NodeId) -> Result<(), NodeError> {
        Ok(self.node.disconnect(to_public_key(node_id)?)?)
    }

    fn open_channel(&self, request: &OpenChannelRequest) -> Result<UserChannelId, NodeError> {
        let key = to_public_key(&request.node_id)?;
        let address = to_socket_address(&request.address)?;
        let channel_config = request.channel_config.as_ref().map(to_channel_config);

        let user_channel_id = if request.announce_channel {
            self.node.open_announced_channel(
                key,
                address,
                request.channel_amount_sats,
                request.push_to_counterparty_msat,
                channel_config,
            )?
        } else {
            self.node.open_channel(
                key,
                address,
                request.channel_amount_sats,
                request.push_to_counterparty_msat,
                channel_config,
            )?
        };
        Ok(UserChannelId(user_channel_id.0))
    }

    fn close_channel(
        &self,
        user_channel_id: UserChannelId,
        counterparty_node_id: &NodeId,
    ) -> Result<(), NodeError> {
        let key = to_public_key(counterparty_node_id)?;
        let id = ldk_node::UserChannelId(user_channel_id.0);
        Ok(self.node.close_channel(&id, key)?)
    }

    fn list_peers(&self) -> Vec<PeerDetails> {
        self.node
            .list_peers()
            .into_iter()
            .map(|peer| PeerDetails {
                node_id: to_node_id(&peer.node_id),
                address: peer.address.to_string(),
                is_persisted: peer.is_persisted,
                is_connected: peer.is_connected,
            })
            .collect()
    }

    fn list_channels(&self) -> Vec<ChannelRecord> {
        self.node
            .list_channels()
            .into_iter()
            .map(|channel| {
                let status = if channel.is_usable {
                    ChannelStatus::Usable
                } else if channel.is_channel_ready {
                    ChannelStatus::Ready
                } else {
                    ChannelStatus::Pending
                };
                ChannelRecord {
                    channel_id: channel.channel_id.to_string(),
                    user_channel_id: UserChannelId(channel.user_channel_id.0),
                    counterparty_node_id: to_node_id(&channel.counterparty_node_id),
                    amount_sats: channel.channel_value_sats,
                    push_msat: None,
                    channel_config: Some(from_channel_config(&channel.config)),
                    announce: channel.is_announced,
                    status,
                    outbound_capacity_msat: channel.outbound_capacity_msat,
                    inbound_capacity_msat: channel.inbound_capacity_msat,
                }
            })
            .collect()
    }

    fn send_payment(&self, invoice: &str) -> Result<PaymentHash, NodeError> {
        let invoice = to_invoice(invoice)?;
        let id = self.node.bolt11_payment().send(&invoice, None)?;
        Ok(PaymentHash(id.0))
    }

    fn send_payment_using_amount(
        &self,
        invoice: &str,
        amount_msat: u64,
    ) -> Result<PaymentHash, NodeError> {
        let invoice = to_invoice(invoice)?;
        let id = self
            .node
            .bolt11_payment()
            .send_using_amount(&invoice, amount_msat, None)?;
        Ok(PaymentHash(id.0))
    }

    fn send_spontaneous_payment(
        &self,
        amount_msat: u64,
        node_id: &NodeId,
    ) -> Result<PaymentHash, NodeError> {
        let key = to_public_key(node_id)?;
        let id = self
            .node
            .spontaneous_payment()
            .send(amount_msat, key, None)?;
        Ok(PaymentHash(id.0))
    }

    fn receive_payment(
        &self,
        amount_msat: u64,
        description: &str,
        expiry_secs: u32,
    ) -> Result<String, NodeError> {
        let invoice = self
            .node
            .bolt11_payment()
            .receive(amount_msat, description, expiry_secs)?;
        Ok(invoice.to_string())
    }

    fn receive_variable_amount_payment(
        &self,
        description: &str,
        expiry_secs: u32,
    ) -> Result<String, NodeError> {
        let invoice = self
            .node
            .bolt11_payment()
            .receive_variable_amount(description, expiry_secs)?;
        Ok(invoice.to_string())
    }

    fn payment(&self, hash: &PaymentHash) -> Option<PaymentRecord> {
        self.node
            .payment(&PaymentId(hash.0))
            .and_then(payment_record)
    }

    fn remove_payment(&self, hash: &PaymentHash) -> Result<(), NodeError> {
        Ok(self.node.remove_payment(&PaymentId(hash.0))?)
    }

    fn list_payments(&self) -> Vec<PaymentRecord> {
        self.node
            .list_payments()
            .into_iter()
            .filter_map(payment_record)
            .collect()
    }

    fn balances(&self) -> Balances {
        let balances = self.node.list_balances();
        Balances {
            total_onchain_balance_sats: balances.total_onchain_balance_sats,
            spendable_onchain_balance_sats: balances.spendable_onchain_balance_sats,
            total_lightning_balance_sats: balances.total_lightning_balance_sats,
        }
    }

    fn new_onchain_address(&self) -> Result<String, NodeError> {
        Ok(self.node.onchain_payment().new_address()?.to_string())
    }

    fn send_all_to_onchain_address(&self, address: &str) -> Result<String, NodeError> {
        let network = to_ldk_network(self.network);
        let address = Address::from_str(address.trim())
            .map_err(|_| NodeError::InvalidAddress)?
            .require_network(network)
            .map_err(|_| NodeError::InvalidNetwork)?;
        let txid = self.node.onchain_payment().send_all_to_address(&address)?;
        Ok(txid.to_string())
    }

    fn sync_wallets(&self) -> Result<(), NodeError> {
        Ok(self.node.sync_wallets()?)
    }

    fn next_event(&self) -> Option<NodeEvent> {
        self.node.next_event().map(|event| NodeEvent {
            kind: event_kind(&event),
            description: format!("{:?}", event),
        })
    }

    /// ldk-node panics when it cannot persist the acknowledgment, so this
    /// never returns an error itself.
    fn event_handled(&self) -> Result<(), NodeError> {
        self.node.event_handled();
        Ok(())
    }
}
