//! Waiting for chain state: block heights and balances.
//!
//! Height waits follow the network mode: a simulated network is polled, a
//! hosted one is watched through a block subscription. Balance waits always
//! watch the subscription and only check on block notifications, whatever the
//! mode.

use std::time::Duration;

use alloy::primitives::{Address, U256};
use futures::StreamExt;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, trace};

use crate::{
    client::{BlockHeight, BlockSubscription, ChainClient},
    config::{Config, NetworkMode},
    error::{Error, Result},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitCondition {
    Height(BlockHeight),
    Balance { address: Address, threshold: U256 },
}

/// A block subscription bound to one condition.
///
/// Consumed by [`PendingWait::finish`] exactly once, whichever way the wait
/// ends.
struct PendingWait<'a, C: ChainClient> {
    client: &'a C,
    condition: WaitCondition,
    subscription: BlockSubscription,
}

impl<'a, C: ChainClient> PendingWait<'a, C> {
    async fn subscribe(client: &'a C, condition: WaitCondition) -> Result<Self> {
        let subscription = client.subscribe_blocks().await?;
        debug!(id = %subscription.id(), ?condition, "watching new blocks");
        Ok(Self {
            client,
            condition,
            subscription,
        })
    }

    async fn run(&mut self) -> Result<()> {
        if let WaitCondition::Height(target) = self.condition {
            // an already reached height must not wait for the next block
            if self.client.block_number().await? >= target {
                return Ok(());
            }
        }
        while let Some(height) = self.subscription.next().await {
            if self.is_met(height).await? {
                return Ok(());
            }
            trace!(height, condition = ?self.condition, "condition not met yet");
        }
        Err(Error::SubscriptionClosed)
    }

    async fn is_met(&self, height: BlockHeight) -> Result<bool> {
        match self.condition {
            WaitCondition::Height(target) => Ok(height >= target),
            WaitCondition::Balance { address, threshold } => {
                Ok(self.client.balance(address).await? > threshold)
            }
        }
    }

    /// Requests unsubscription without awaiting it; a failure is only logged.
    fn finish(self) {
        let id = self.subscription.id();
        if let Err(err) = self.client.unsubscribe(id) {
            debug!(%id, %err, "ignoring unsubscribe failure");
        }
    }
}

#[derive(Debug, Clone)]
pub struct BlockWaiter<C> {
    client: C,
    mode: NetworkMode,
    poll_interval: Duration,
}

impl<C: ChainClient> BlockWaiter<C> {
    pub fn new(client: C, config: &Config) -> Self {
        Self {
            client,
            mode: config.mode,
            poll_interval: config.poll_interval,
        }
    }

    pub fn mode(&self) -> NetworkMode {
        self.mode
    }

    /// Resolve once the node reports a height of at least `target`.
    ///
    /// Polling returns the observed height; the subscription returns `target`
    /// itself, since notifications may already be ahead of it.
    pub async fn wait_for_height(&self, target: BlockHeight) -> Result<BlockHeight> {
        match self.mode {
            NetworkMode::Simulated => self.poll_height(target).await,
            NetworkMode::Hosted => {
                self.watch(WaitCondition::Height(target)).await?;
                Ok(target)
            }
        }
    }

    /// Resolve once `address` holds a nonzero balance.
    pub async fn wait_for_balance(&self, address: Address) -> Result<()> {
        self.wait_for_balance_above(address, U256::ZERO).await
    }

    /// Resolve once the balance of `address` exceeds `threshold`, checked on
    /// every new block.
    pub async fn wait_for_balance_above(&self, address: Address, threshold: U256) -> Result<()> {
        self.watch(WaitCondition::Balance { address, threshold }).await
    }

    async fn poll_height(&self, target: BlockHeight) -> Result<BlockHeight> {
        // tokio rejects a zero period
        let mut ticker = interval(self.poll_interval.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            // the first tick completes immediately
            ticker.tick().await;
            let current = self.client.block_number().await?;
            if current >= target {
                debug!(current, target, "reached block");
                return Ok(current);
            }
            trace!(current, target, "waiting for block");
        }
    }

    async fn watch(&self, condition: WaitCondition) -> Result<()> {
        let mut pending = PendingWait::subscribe(&self.client, condition).await?;
        let outcome = pending.run().await;
        pending.finish();
        outcome
    }
}
