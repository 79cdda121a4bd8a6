//! Harness configuration: network identity, polling cadence, gas policy and
//! the designated deployer account.

use std::{env, time::Duration};

use alloy::{primitives::Address, signers::local::LocalSignerError};

use crate::{provider::build_signer, submitter::GasPolicy};

/// Environment variable carrying the network name (set by hardhat, and by our
/// own test scripts when running against anvil).
pub const NETWORK_ENV: &str = "HARDHAT_NETWORK";

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Account index of the helper contract deployer (the fourth hardhat account).
pub const DEFAULT_DEPLOYER_INDEX: u32 = 3;

/// Kind of network the harness talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NetworkMode {
    /// In-process or local development chain without interval mining: heights
    /// are polled, blocks are produced by sending dummy transactions.
    #[default]
    Simulated,
    /// Externally hosted chain producing its own blocks: heights are observed
    /// through a `newHeads` subscription.
    Hosted,
}

impl NetworkMode {
    pub fn from_network_name(name: &str) -> Self {
        match name.trim() {
            "hardhat" | "anvil" => Self::Simulated,
            _ => Self::Hosted,
        }
    }

    /// Read the mode from [`NETWORK_ENV`], defaulting to [`NetworkMode::Simulated`].
    pub fn from_env() -> Self {
        env::var(NETWORK_ENV)
            .map(|name| Self::from_network_name(&name))
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct Config {
    pub mode: NetworkMode,
    pub poll_interval: Duration,
    pub gas: GasPolicy,
    pub deployer_index: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self::new(NetworkMode::default())
    }
}

impl Config {
    pub fn new(mode: NetworkMode) -> Self {
        Self {
            mode,
            poll_interval: DEFAULT_POLL_INTERVAL,
            gas: GasPolicy::default(),
            deployer_index: DEFAULT_DEPLOYER_INDEX,
        }
    }

    pub fn from_env() -> Self {
        Self::new(NetworkMode::from_env())
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_gas_policy(mut self, gas: GasPolicy) -> Self {
        self.gas = gas;
        self
    }

    pub fn with_deployer_index(mut self, deployer_index: u32) -> Self {
        self.deployer_index = deployer_index;
        self
    }

    /// Address of the designated deployer account derived from `mnemonic`.
    pub fn deployer(&self, mnemonic: &str) -> Result<Address, LocalSignerError> {
        Ok(build_signer(mnemonic, self.deployer_index)?.address())
    }
}
