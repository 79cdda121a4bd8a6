//! The RPC surface the harness consumes, and its implementation over an alloy
//! [`Provider`](https://docs.rs/alloy/latest/alloy/providers/trait.Provider.html).

use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use alloy::{
    primitives::{Address, B256, TxHash, U256},
    providers::{PendingTransactionBuilder, Provider},
    rpc::types::TransactionRequest,
};
use futures::{Stream, StreamExt, stream::BoxStream};
use tracing::error;

use crate::error::{Error, Result};

pub type BlockHeight = u64;

/// A live `newHeads` subscription yielding block heights.
pub struct BlockSubscription {
    id: B256,
    heights: BoxStream<'static, BlockHeight>,
}

impl BlockSubscription {
    pub fn new(id: B256, heights: BoxStream<'static, BlockHeight>) -> Self {
        Self { id, heights }
    }

    pub fn id(&self) -> B256 {
        self.id
    }
}

impl Stream for BlockSubscription {
    type Item = BlockHeight;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.heights.poll_next_unpin(cx)
    }
}

/// The parts of a transaction receipt the harness looks at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub tx_hash: TxHash,
    pub block_number: Option<BlockHeight>,
    pub contract_address: Option<Address>,
    pub gas_used: u64,
    pub success: bool,
}

/// JSON-RPC operations used to observe and drive a single EVM node.
pub trait ChainClient: Send + Sync {
    /// `eth_blockNumber`
    fn block_number(&self) -> impl Future<Output = Result<BlockHeight>> + Send;

    /// `eth_getBalance` at the latest block
    fn balance(&self, address: Address) -> impl Future<Output = Result<U256>> + Send;

    /// `eth_accounts`: the accounts the node itself can sign for.
    fn accounts(&self) -> impl Future<Output = Result<Vec<Address>>> + Send;

    /// Subscribe to new block headers.
    fn subscribe_blocks(&self) -> impl Future<Output = Result<BlockSubscription>> + Send;

    /// Request cancellation of a block subscription.
    ///
    /// The request is handed to the transport and not awaited. Waiters discard
    /// the returned error, since a wait that already finished does not depend on
    /// the cleanup succeeding.
    fn unsubscribe(&self, id: B256) -> Result<()>;

    /// Force the node to produce one block (`evm_mine`).
    fn mine_block(&self) -> impl Future<Output = Result<()>> + Send;

    fn estimate_gas(&self, tx: &TransactionRequest) -> impl Future<Output = Result<u64>> + Send;

    /// Submit a transaction, returning once the node accepted it.
    fn send_transaction(
        &self,
        tx: TransactionRequest,
    ) -> impl Future<Output = Result<TxHash>> + Send;

    /// Wait until `tx_hash` is included in a block.
    fn confirm(&self, tx_hash: TxHash) -> impl Future<Output = Result<Receipt>> + Send;
}

/// Fails with [`Error::UnknownSigner`] unless `address` is one of the node's
/// own accounts.
pub async fn check_is_node_signer<C: ChainClient>(client: &C, address: Address) -> Result<()> {
    let accounts = client.accounts().await?;
    if accounts.contains(&address) {
        Ok(())
    } else {
        error!(%address, known = accounts.len(), "not a node signer");
        Err(Error::UnknownSigner(address))
    }
}

/// [`ChainClient`] backed by an alloy provider.
///
/// Transactions are signed by the provider's wallet filler, so any `from`
/// address used by the harness must be registered in that wallet.
#[derive(Debug, Clone)]
pub struct ProviderClient<P> {
    provider: P,
}

impl<P> ProviderClient<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }
}

impl<P: Provider> ChainClient for ProviderClient<P> {
    async fn block_number(&self) -> Result<BlockHeight> {
        self.provider
            .get_block_number()
            .await
            .map_err(Error::NodeUnreachable)
    }

    async fn balance(&self, address: Address) -> Result<U256> {
        self.provider
            .get_balance(address)
            .await
            .map_err(Error::NodeUnreachable)
    }

    async fn accounts(&self) -> Result<Vec<Address>> {
        self.provider
            .get_accounts()
            .await
            .map_err(Error::NodeUnreachable)
    }

    async fn subscribe_blocks(&self) -> Result<BlockSubscription> {
        let sub = self.provider.subscribe_blocks().await.map_err(|err| {
            error!(?err, "block subscription failed");
            Error::Subscription(err)
        })?;
        let id = *sub.local_id();
        let heights = sub.into_stream().map(|header| header.number).boxed();
        Ok(BlockSubscription::new(id, heights))
    }

    fn unsubscribe(&self, id: B256) -> Result<()> {
        self.provider.root().unsubscribe(id).map_err(Error::NodeUnreachable)
    }

    async fn mine_block(&self) -> Result<()> {
        self.provider
            .raw_request::<_, serde_json::Value>("evm_mine".into(), serde_json::json!([]))
            .await
            .map_err(Error::NodeUnreachable)?;
        Ok(())
    }

    async fn estimate_gas(&self, tx: &TransactionRequest) -> Result<u64> {
        self.provider
            .estimate_gas(tx.clone())
            .await
            .map_err(Error::Estimation)
    }

    async fn send_transaction(&self, tx: TransactionRequest) -> Result<TxHash> {
        let pending = self
            .provider
            .send_transaction(tx)
            .await
            .map_err(Error::NodeUnreachable)?;
        Ok(*pending.tx_hash())
    }

    async fn confirm(&self, tx_hash: TxHash) -> Result<Receipt> {
        let receipt = PendingTransactionBuilder::new(self.provider.root().clone(), tx_hash)
            .get_receipt()
            .await
            .map_err(|err| Error::Confirmation(tx_hash, err))?;
        Ok(Receipt {
            tx_hash,
            block_number: receipt.block_number,
            contract_address: receipt.contract_address,
            gas_used: receipt.gas_used,
            success: receipt.status(),
        })
    }
}
