//! Chain synchronization helpers for EVM test harnesses.
//!
//! This crate lets tests wait for block heights and balances whether the node
//! is polled or subscribed to, submit gas-capped transactions, produce blocks
//! on chains that only mine on demand, and sign user decryption requests.

mod sol_types;

pub mod client;
pub mod config;
pub mod decrypt;
pub mod deployer;
pub mod driver;
pub mod error;
pub mod provider;
pub mod submitter;
pub mod waiter;

#[cfg(test)]
mod testing;

pub use sol_types::*;

use alloy::{primitives::Address, signers::local::LocalSignerError};

use crate::{
    client::ChainClient, config::Config, deployer::DeploymentCache, driver::ChainProgressDriver,
    submitter::GasCappedSubmitter, waiter::BlockWaiter,
};

/// Test-session context: one client, one configuration and the helper
/// contract deployment shared by every driver handed out.
#[derive(Clone)]
pub struct ChainSession<C> {
    client: C,
    config: Config,
    deployments: DeploymentCache,
}

impl<C: ChainClient + Clone + 'static> ChainSession<C> {
    pub fn new(client: C, config: Config) -> Self {
        Self {
            client,
            config,
            deployments: DeploymentCache::new(),
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn waiter(&self) -> BlockWaiter<C> {
        BlockWaiter::new(self.client.clone(), &self.config)
    }

    pub fn submitter(&self) -> GasCappedSubmitter<C> {
        GasCappedSubmitter::new(self.client.clone(), self.config.gas)
    }

    /// Driver deploying and sending dummy transactions from `deployer`.
    pub fn driver(&self, deployer: Address) -> ChainProgressDriver<C> {
        ChainProgressDriver::new(
            self.client.clone(),
            &self.config,
            deployer,
            self.deployments.clone(),
        )
    }

    /// Driver sending from the designated deployer account of `mnemonic`, at
    /// [`Config::deployer_index`].
    pub fn deployer_driver(
        &self,
        mnemonic: &str,
    ) -> Result<ChainProgressDriver<C>, LocalSignerError> {
        Ok(self.driver(self.config.deployer(mnemonic)?))
    }
}
