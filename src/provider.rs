//! Helper functions to build Ethereum [providers](https://docs.rs/alloy/latest/alloy/providers/trait.Provider.html)
//! for the harness: mnemonic-derived wallets, HTTP providers for simulated
//! networks and reconnecting WebSocket providers for hosted ones.

use std::time::Duration;

use alloy::{
    network::{Ethereum, EthereumWallet},
    providers::{
        ProviderBuilder, RootProvider,
        fillers::{FillProvider, JoinFill, WalletFiller},
        utils::JoinedRecommendedFillers,
    },
    signers::local::{LocalSignerError, MnemonicBuilder, PrivateKeySigner, coins_bip39::English},
    transports::{http::reqwest::Url, ws::WsConnect},
};
use tracing::error;

use crate::client::ProviderClient;

/// Default mnemonic of hardhat and anvil development chains.
pub const DEV_MNEMONIC: &str = "test test test test test test test test test test test junk";

pub type ProviderWithWallet = FillProvider<
    JoinFill<JoinedRecommendedFillers, WalletFiller<EthereumWallet>>,
    RootProvider,
    Ethereum,
>;

/// Build a local signer from wallet mnemonic and account index
pub fn build_signer(
    mnemonic: &str,
    account_index: u32,
) -> Result<PrivateKeySigner, LocalSignerError> {
    MnemonicBuilder::<English>::default()
        .phrase(mnemonic)
        .index(account_index)?
        .build()
}

/// Wallet with `default_index` as default signer, also holding the `extra` accounts.
///
/// Transactions whose `from` is any of these accounts are signed locally.
pub fn build_wallet(
    mnemonic: &str,
    default_index: u32,
    extra: &[u32],
) -> Result<EthereumWallet, LocalSignerError> {
    let mut wallet = EthereumWallet::from(build_signer(mnemonic, default_index)?);
    for index in extra {
        wallet.register_signer(build_signer(mnemonic, *index)?);
    }
    Ok(wallet)
}

/// a handy thin wrapper around wallet builder and provider builder that directly
/// returns a harness client over HTTP, ready to send tx from every listed account
pub fn build_http_client(
    mnemonic: &str,
    default_index: u32,
    extra: &[u32],
    url: Url,
) -> Result<ProviderClient<ProviderWithWallet>, LocalSignerError> {
    let wallet = build_wallet(mnemonic, default_index, extra)?;
    Ok(ProviderClient::new(
        ProviderBuilder::new().wallet(wallet).connect_http(url),
    ))
}

#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct PubSubProviderConfig {
    pub url: Url,
    pub max_retries: u32,
    pub retry_interval: Duration,
}

impl PubSubProviderConfig {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            max_retries: 12,
            retry_interval: Duration::from_secs(5),
        }
    }
}

/// Connect a WebSocket provider with `wallet`, as needed for block
/// subscriptions on hosted networks.
pub async fn build_pubsub_client(
    cfg: PubSubProviderConfig,
    wallet: EthereumWallet,
) -> anyhow::Result<ProviderClient<ProviderWithWallet>> {
    let ws = WsConnect::new(cfg.url)
        .with_max_retries(cfg.max_retries)
        .with_retry_interval(cfg.retry_interval);
    let provider = ProviderBuilder::new()
        .wallet(wallet)
        .connect_pubsub_with(ws)
        .await
        .map_err(|err| {
            error!(?err, "event pubsub failed to start");
            err
        })?;
    Ok(ProviderClient::new(provider))
}
