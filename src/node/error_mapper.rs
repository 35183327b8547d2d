//! User-facing error messages
//!
//! Every failure kind maps to a short title and a longer explanation. The
//! match over [`NodeError`] is exhaustive, as is the conversion from the
//! library's own kinds in `ldk.rs`, so a new kind cannot go unmapped.

use super::error::{Error, NodeError, StorageError};
use serde::Serialize;

/// Fallback title for failures without a dedicated message
pub const UNEXPECTED_TITLE: &str = "Unexpected error";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorMessage {
    pub title: String,
    pub detail: String,
}

impl ErrorMessage {
    fn new(title: &str, detail: impl Into<String>) -> Self {
        Self {
            title: title.to_string(),
            detail: detail.into(),
        }
    }
}

impl From<&Error> for ErrorMessage {
    fn from(e: &Error) -> Self {
        map_error(e)
    }
}

impl From<Error> for ErrorMessage {
    fn from(e: Error) -> Self {
        map_error(&e)
    }
}

/// Map a service error to its user-facing message
pub fn map_error(error: &Error) -> ErrorMessage {
    match error {
        Error::Config(detail) => ErrorMessage::new("Configuration Error", detail.clone()),
        Error::Storage(e) => map_storage_error(e),
        Error::Timeout { operation, secs } => ErrorMessage::new(
            "Timed Out",
            format!(
                "The node did not answer {} within {} seconds. The operation may still \
                 complete; check the payment and channel lists before retrying.",
                operation, secs
            ),
        ),
        Error::Connection(e) | Error::Channel(e) | Error::Payment(e) | Error::Unexpected(e) => {
            map_node_error(e)
        }
    }
}

fn map_storage_error(error: &StorageError) -> ErrorMessage {
    match error {
        StorageError::NotFound(what) => ErrorMessage::new(
            "Nothing Saved",
            format!("No {} has been saved on this device.", what),
        ),
        StorageError::UnsupportedVersion(version) => ErrorMessage::new(
            "Storage Error",
            format!(
                "Saved wallet data uses format version {} which this version cannot read.",
                version
            ),
        ),
        StorageError::Io(_) | StorageError::Serialization(_) => {
            ErrorMessage::new("Storage Error", error.to_string())
        }
    }
}

/// Map a node library failure kind to its user-facing message
pub fn map_node_error(error: &NodeError) -> ErrorMessage {
    match error {
        NodeError::AlreadyRunning => ErrorMessage::new(
            "Already Running",
            "The node is already running.",
        ),
        NodeError::NotRunning => ErrorMessage::new(
            "Not Running",
            "The node is not running. Start it and try again.",
        ),
        NodeError::ConnectionFailed => ErrorMessage::new(
            "Connection Failed",
            "Could not connect to the peer. Check the node ID and address.",
        ),
        NodeError::OnchainTxCreationFailed => ErrorMessage::new(
            "Transaction Failed",
            "The on-chain transaction could not be created.",
        ),
        NodeError::InvoiceCreationFailed => ErrorMessage::new(
            "Invoice Failed",
            "The invoice could not be created.",
        ),
        NodeError::PaymentSendingFailed => ErrorMessage::new(
            "Payment Failed",
            "The payment could not be sent. No route may exist to the destination.",
        ),
        NodeError::ChannelCreationFailed => ErrorMessage::new(
            "Channel Open Failed",
            "The channel could not be opened. The peer may have rejected it.",
        ),
        NodeError::ChannelClosingFailed => ErrorMessage::new(
            "Channel Close Failed",
            "The channel could not be closed. It may be unknown or already closing.",
        ),
        NodeError::ChannelConfigUpdateFailed => ErrorMessage::new(
            "Channel Update Failed",
            "The channel configuration could not be updated.",
        ),
        NodeError::PersistenceFailed => ErrorMessage::new(
            "Persistence Failed",
            "The node could not write its state to disk.",
        ),
        NodeError::WalletOperationFailed => ErrorMessage::new(
            "Wallet Error",
            "The on-chain wallet operation failed.",
        ),
        NodeError::TxSyncFailed => ErrorMessage::new(
            "Sync Failed",
            "Could not sync with the chain backend. Check the Esplora server.",
        ),
        NodeError::GossipUpdateFailed => ErrorMessage::new(
            "Gossip Update Failed",
            "Network graph data could not be updated.",
        ),
        NodeError::InvalidAddress => ErrorMessage::new(
            "Invalid Address",
            "The bitcoin address is not valid.",
        ),
        NodeError::InvalidSocketAddress => ErrorMessage::new(
            "Invalid Address",
            "The peer address must be in host:port form.",
        ),
        NodeError::InvalidPublicKey => ErrorMessage::new(
            "Invalid Node ID",
            "The node ID must be a 33-byte hex-encoded public key.",
        ),
        NodeError::InvalidPaymentHash => ErrorMessage::new(
            "Invalid Payment Hash",
            "The payment hash must be 32 bytes of hex.",
        ),
        NodeError::InvalidAmount => ErrorMessage::new(
            "Invalid Amount",
            "The amount is not valid for this operation.",
        ),
        NodeError::InvalidInvoice => ErrorMessage::new(
            "Invalid Invoice",
            "The invoice could not be decoded or does not fit this payment.",
        ),
        NodeError::InvalidChannelId => ErrorMessage::new(
            "Invalid Channel",
            "The channel ID is not valid.",
        ),
        NodeError::InvalidNetwork => ErrorMessage::new(
            "Wrong Network",
            "The value belongs to a different bitcoin network.",
        ),
        NodeError::DuplicatePayment => ErrorMessage::new(
            "Duplicate Payment",
            "This invoice has already been paid or is being paid.",
        ),
        NodeError::InsufficientFunds => ErrorMessage::new(
            "Insufficient Funds",
            "There are not enough funds available for this operation.",
        ),
        NodeError::PaymentPending => ErrorMessage::new(
            "Payment Pending",
            "A pending payment cannot be removed. Wait until it succeeds or fails.",
        ),
        NodeError::InvoiceRequestCreationFailed => ErrorMessage::new(
            "Invoice Request Failed",
            "The invoice request for this offer could not be created.",
        ),
        NodeError::OfferCreationFailed => ErrorMessage::new(
            "Offer Failed",
            "The offer could not be created.",
        ),
        NodeError::RefundCreationFailed => ErrorMessage::new(
            "Refund Failed",
            "The refund could not be created.",
        ),
        NodeError::ProbeSendingFailed => ErrorMessage::new(
            "Route Check Failed",
            "Could not check a route to the destination.",
        ),
        NodeError::FeerateEstimationUpdateFailed => ErrorMessage::new(
            "Fee Estimates Unavailable",
            "Could not fetch fee estimates from the chain backend. Check the Esplora server.",
        ),
        NodeError::FeerateEstimationUpdateTimeout => ErrorMessage::new(
            "Fee Estimates Timed Out",
            "The chain backend did not return fee estimates in time. Try again later.",
        ),
        NodeError::WalletOperationTimeout => ErrorMessage::new(
            "Wallet Timed Out",
            "The on-chain wallet operation did not finish in time.",
        ),
        NodeError::OnchainTxSigningFailed => ErrorMessage::new(
            "Signing Failed",
            "The on-chain transaction could not be signed.",
        ),
        NodeError::TxSyncTimeout => ErrorMessage::new(
            "Sync Timed Out",
            "The chain backend did not answer in time. Check the Esplora server and try again.",
        ),
        NodeError::GossipUpdateTimeout => ErrorMessage::new(
            "Gossip Update Timed Out",
            "Network graph data could not be downloaded in time.",
        ),
        NodeError::LiquidityRequestFailed => ErrorMessage::new(
            "Liquidity Request Failed",
            "The liquidity provider did not accept the request.",
        ),
        NodeError::UriParameterParsingFailed => ErrorMessage::new(
            "Invalid Payment Link",
            "A parameter of the payment URI could not be read.",
        ),
        NodeError::InvalidSecretKey => ErrorMessage::new(
            "Invalid Key",
            "The secret key is not valid.",
        ),
        NodeError::InvalidOfferId => ErrorMessage::new(
            "Invalid Offer",
            "The offer ID is not valid.",
        ),
        NodeError::InvalidNodeId => ErrorMessage::new(
            "Invalid Node ID",
            "The node ID is not valid.",
        ),
        NodeError::InvalidPaymentId => ErrorMessage::new(
            "Invalid Payment",
            "The payment ID is not valid.",
        ),
        NodeError::InvalidPaymentPreimage => ErrorMessage::new(
            "Invalid Preimage",
            "The payment preimage is not valid.",
        ),
        NodeError::InvalidPaymentSecret => ErrorMessage::new(
            "Invalid Payment Secret",
            "The payment secret is not valid.",
        ),
        NodeError::InvalidOffer => ErrorMessage::new(
            "Invalid Offer",
            "The offer could not be decoded or has expired.",
        ),
        NodeError::InvalidRefund => ErrorMessage::new(
            "Invalid Refund",
            "The refund could not be decoded or has expired.",
        ),
        NodeError::InvalidUri => ErrorMessage::new(
            "Invalid Payment Link",
            "The payment URI could not be decoded.",
        ),
        NodeError::InvalidQuantity => ErrorMessage::new(
            "Invalid Quantity",
            "The requested quantity is not valid for this offer.",
        ),
        NodeError::InvalidNodeAlias => ErrorMessage::new(
            "Invalid Alias",
            "The node alias is not valid.",
        ),
        NodeError::UnsupportedCurrency => ErrorMessage::new(
            "Unsupported Currency",
            "The offer is denominated in a currency this wallet cannot pay.",
        ),
        NodeError::LiquiditySourceUnavailable => ErrorMessage::new(
            "No Liquidity Provider",
            "No liquidity provider is configured or reachable.",
        ),
        NodeError::LiquidityFeeTooHigh => ErrorMessage::new(
            "Fee Too High",
            "The liquidity provider's opening fee exceeds the allowed limit.",
        ),
        NodeError::Other(message) => ErrorMessage::new(UNEXPECTED_TITLE, message.clone()),
    }
}
