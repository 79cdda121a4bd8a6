//! Chain progress: synthetic block production through dummy transactions, and
//! native mining.

use alloy::primitives::Address;
use tracing::{debug, info};

use crate::{
    Counter,
    client::{BlockHeight, ChainClient},
    config::{Config, NetworkMode},
    deployer::{DeploymentCache, deploy_counter_contract},
    error::{Error, Result},
    submitter::GasCappedSubmitter,
    waiter::BlockWaiter,
};

pub struct ChainProgressDriver<C> {
    client: C,
    mode: NetworkMode,
    deployer: Address,
    cache: DeploymentCache,
    submitter: GasCappedSubmitter<C>,
    waiter: BlockWaiter<C>,
}

impl<C> ChainProgressDriver<C>
where
    C: ChainClient + Clone + 'static,
{
    /// `deployer` deploys the helper contract and sends the dummy transactions;
    /// `cache` decides which deployment this driver shares.
    pub fn new(client: C, config: &Config, deployer: Address, cache: DeploymentCache) -> Self {
        Self {
            submitter: GasCappedSubmitter::new(client.clone(), config.gas),
            waiter: BlockWaiter::new(client.clone(), config),
            client,
            mode: config.mode,
            deployer,
            cache,
        }
    }

    pub fn waiter(&self) -> &BlockWaiter<C> {
        &self.waiter
    }

    /// Wait for `n` more blocks, producing them first on a simulated network.
    ///
    /// A hosted network is expected to produce blocks on its own.
    pub async fn advance_blocks(&self, n: u64) -> Result<BlockHeight> {
        let start = self.client.block_number().await?;
        if self.mode == NetworkMode::Simulated {
            self.produce_dummy_transactions(n).await?;
        }
        let target = start.saturating_add(n);
        let reached = self.waiter.wait_for_height(target).await?;
        info!(start, target, reached, "advanced chain");
        Ok(reached)
    }

    /// Send `count` `increment()` calls to the helper contract, one at a time.
    ///
    /// Each call is confirmed before the next is sent so the node cannot batch
    /// them into fewer blocks.
    pub async fn produce_dummy_transactions(&self, count: u64) -> Result<()> {
        let counter = self.helper_contract().await?;
        for i in 0..count {
            let pending = self
                .submitter
                .submit_call(self.deployer, counter, &Counter::incrementCall {})
                .await?;
            let receipt = self.client.confirm(pending.tx_hash).await?;
            if !receipt.success {
                return Err(Error::Reverted(pending.tx_hash));
            }
            debug!(
                tx_hash = %pending.tx_hash,
                block = ?receipt.block_number,
                "dummy tx {} of {count} mined",
                i + 1
            );
        }
        Ok(())
    }

    /// Address of the helper contract, deploying it on first use.
    pub async fn helper_contract(&self) -> Result<Address> {
        let client = self.client.clone();
        let deployer = self.deployer;
        self.cache
            .get_or_deploy(move || async move { deploy_counter_contract(&client, deployer).await })
            .await
    }

    /// Issue `n` sequential `evm_mine` commands.
    pub async fn mine_blocks_natively(&self, n: u64) -> Result<()> {
        for _ in 0..n {
            self.client.mine_block().await?;
        }
        debug!(n, "mined blocks");
        Ok(())
    }
}
