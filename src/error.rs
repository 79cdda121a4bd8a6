//! Error types shared by waiters, submitters, drivers and the decryption builder

use std::sync::Arc;

use alloy::{
    primitives::{Address, TxHash},
    providers::PendingTransactionError,
    transports::TransportError,
};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("node request failed: {0}")]
    NodeUnreachable(#[source] TransportError),

    #[error("gas estimation failed: {0}")]
    Estimation(#[source] TransportError),

    #[error("block subscription failed: {0}")]
    Subscription(#[source] TransportError),

    #[error("block subscription closed before the wait completed")]
    SubscriptionClosed,

    #[error("transaction {0} was not confirmed: {1}")]
    Confirmation(TxHash, #[source] PendingTransactionError),

    #[error("transaction {0} reverted")]
    Reverted(TxHash),

    /// Every caller sharing a failed deployment sees the same underlying error.
    #[error("helper contract deployment failed: {0}")]
    Deployment(#[source] Arc<Error>),

    #[error("deployment receipt carries no contract address")]
    ContractNotDeployed,

    #[error("{0} is not an account of the node; list them with `eth_accounts`")]
    UnknownSigner(Address),

    #[error("typed data is missing the `{0}` type")]
    MissingType(&'static str),

    #[error("invalid typed data: {0}")]
    TypedData(#[from] serde_json::Error),

    #[error("failed to sign typed data: {0}")]
    Signing(#[from] alloy::signers::Error),

    #[error("decryption oracle rejected the request: {0}")]
    Oracle(#[source] Box<dyn std::error::Error + Send + Sync>),
}
