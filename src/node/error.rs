//! Error types for the node service
//!
//! `NodeError` is the set of failure kinds the node library can raise;
//! `Error` classifies them by the operation that failed so the caller-facing
//! layer never sees library-internal representations.

use thiserror::Error;

/// Failure kinds reported by the node library
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NodeError {
    #[error("node is already running")]
    AlreadyRunning,
    #[error("node is not running")]
    NotRunning,
    #[error("failed to connect to peer")]
    ConnectionFailed,
    #[error("failed to create on-chain transaction")]
    OnchainTxCreationFailed,
    #[error("failed to create invoice")]
    InvoiceCreationFailed,
    #[error("failed to send payment")]
    PaymentSendingFailed,
    #[error("failed to create channel")]
    ChannelCreationFailed,
    #[error("failed to close channel")]
    ChannelClosingFailed,
    #[error("failed to update channel config")]
    ChannelConfigUpdateFailed,
    #[error("failed to persist data")]
    PersistenceFailed,
    #[error("wallet operation failed")]
    WalletOperationFailed,
    #[error("failed to sync transactions")]
    TxSyncFailed,
    #[error("failed to update gossip data")]
    GossipUpdateFailed,
    #[error("invalid address")]
    InvalidAddress,
    #[error("invalid socket address")]
    InvalidSocketAddress,
    #[error("invalid public key")]
    InvalidPublicKey,
    #[error("invalid payment hash")]
    InvalidPaymentHash,
    #[error("invalid amount")]
    InvalidAmount,
    #[error("invalid invoice")]
    InvalidInvoice,
    #[error("invalid channel id")]
    InvalidChannelId,
    #[error("invalid network")]
    InvalidNetwork,
    #[error("duplicate payment")]
    DuplicatePayment,
    #[error("insufficient funds")]
    InsufficientFunds,
    #[error("payment is still pending")]
    PaymentPending,
    #[error("failed to create invoice request")]
    InvoiceRequestCreationFailed,
    #[error("failed to create offer")]
    OfferCreationFailed,
    #[error("failed to create refund")]
    RefundCreationFailed,
    #[error("failed to send payment probe")]
    ProbeSendingFailed,
    #[error("failed to update fee rate estimates")]
    FeerateEstimationUpdateFailed,
    #[error("fee rate estimation update timed out")]
    FeerateEstimationUpdateTimeout,
    #[error("wallet operation timed out")]
    WalletOperationTimeout,
    #[error("failed to sign on-chain transaction")]
    OnchainTxSigningFailed,
    #[error("transaction sync timed out")]
    TxSyncTimeout,
    #[error("gossip update timed out")]
    GossipUpdateTimeout,
    #[error("liquidity request failed")]
    LiquidityRequestFailed,
    #[error("failed to parse URI parameter")]
    UriParameterParsingFailed,
    #[error("invalid secret key")]
    InvalidSecretKey,
    #[error("invalid offer id")]
    InvalidOfferId,
    #[error("invalid node id")]
    InvalidNodeId,
    #[error("invalid payment id")]
    InvalidPaymentId,
    #[error("invalid payment preimage")]
    InvalidPaymentPreimage,
    #[error("invalid payment secret")]
    InvalidPaymentSecret,
    #[error("invalid offer")]
    InvalidOffer,
    #[error("invalid refund")]
    InvalidRefund,
    #[error("invalid URI")]
    InvalidUri,
    #[error("invalid quantity")]
    InvalidQuantity,
    #[error("invalid node alias")]
    InvalidNodeAlias,
    #[error("unsupported currency")]
    UnsupportedCurrency,
    #[error("liquidity source unavailable")]
    LiquiditySourceUnavailable,
    #[error("liquidity fee too high")]
    LiquidityFeeTooHigh,
    /// Failures from outside the node library, such as a crashed task
    #[error("{0}")]
    Other(String),
}

/// Failures of the persisted key material and settings
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("no {0} stored")]
    NotFound(&'static str),
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to (de)serialize stored data: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("unsupported keystore version {0}")]
    UnsupportedVersion(u32),
}

/// Typed result of every node service operation
#[derive(Debug, Error)]
pub enum Error {
    /// Bad configuration or build failure; no node exists to recover with
    #[error("configuration error: {0}")]
    Config(String),
    #[error("connection error: {0}")]
    Connection(NodeError),
    #[error("channel error: {0}")]
    Channel(NodeError),
    #[error("payment error: {0}")]
    Payment(NodeError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("{operation} timed out after {secs}s")]
    Timeout { operation: &'static str, secs: u64 },
    #[error("unexpected error: {0}")]
    Unexpected(NodeError),
}

impl Error {
    /// The underlying node library failure, if any
    pub fn node_error(&self) -> Option<&NodeError> {
        match self {
            Error::Connection(e) | Error::Channel(e) | Error::Payment(e) | Error::Unexpected(e) => {
                Some(e)
            }
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
