//! Gas-capped transaction submission

use alloy::{
    network::TransactionBuilder,
    primitives::{Address, TxHash},
    rpc::types::TransactionRequest,
    sol_types::SolCall,
};
use tracing::debug;

use crate::{client::ChainClient, error::Result};

/// Hard ceiling on the gas limit of any submitted transaction.
pub const ABSOLUTE_MAX_GAS: u64 = 10_000_000;

/// Safety margin applied to gas estimates, in percent of the estimate.
pub const DEFAULT_MARGIN_PERCENT: u64 = 120;

/// Gas estimate and the limit actually sent with the transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasPlan {
    pub estimated: u64,
    pub capped: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasPolicy {
    pub margin_percent: u64,
    pub max_gas: u64,
}

impl Default for GasPolicy {
    fn default() -> Self {
        Self {
            margin_percent: DEFAULT_MARGIN_PERCENT,
            max_gas: ABSOLUTE_MAX_GAS,
        }
    }
}

impl GasPolicy {
    /// Effective ceiling: `max_gas`, never above [`ABSOLUTE_MAX_GAS`].
    pub fn ceiling(&self) -> u64 {
        self.max_gas.min(ABSOLUTE_MAX_GAS)
    }

    /// `min(round(estimated * margin), ceiling)`, rounding half up.
    pub fn plan(&self, estimated: u64) -> GasPlan {
        let ceiling = self.ceiling();
        let scaled = (u128::from(estimated) * u128::from(self.margin_percent) + 50) / 100;
        let capped = u64::try_from(scaled.min(u128::from(ceiling))).unwrap_or(ceiling);
        GasPlan { estimated, capped }
    }
}

/// A submitted, not yet confirmed, transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingTx {
    pub tx_hash: TxHash,
    pub gas: GasPlan,
}

#[derive(Debug, Clone)]
pub struct GasCappedSubmitter<C> {
    client: C,
    policy: GasPolicy,
}

impl<C: ChainClient> GasCappedSubmitter<C> {
    pub fn new(client: C, policy: GasPolicy) -> Self {
        Self { client, policy }
    }

    pub fn policy(&self) -> GasPolicy {
        self.policy
    }

    /// Estimate, cap and send `tx`.
    ///
    /// Estimation failures propagate unchanged and nothing is sent. The
    /// returned handle is not confirmed.
    pub async fn submit(&self, tx: TransactionRequest) -> Result<PendingTx> {
        let estimated = self.client.estimate_gas(&tx).await?;
        let gas = self.policy.plan(estimated);
        let tx_hash = self
            .client
            .send_transaction(tx.with_gas_limit(gas.capped))
            .await?;
        debug!(%tx_hash, gas.estimated, gas.capped, "submitted gas-capped tx");
        Ok(PendingTx { tx_hash, gas })
    }

    /// ABI-encode `call` against `to` and submit it from `from`.
    pub async fn submit_call<T: SolCall>(
        &self,
        from: Address,
        to: Address,
        call: &T,
    ) -> Result<PendingTx> {
        let tx = TransactionRequest::default()
            .with_from(from)
            .with_to(to)
            .with_input(call.abi_encode());
        self.submit(tx).await
    }
}
