//! Helper contract deployment and its single-flight cache
use std::{
    future::Future,
    sync::{Arc, Mutex, PoisonError},
};

use alloy::{network::TransactionBuilder, primitives::Address, rpc::types::TransactionRequest};
use futures::{
    FutureExt, TryFutureExt,
    future::{BoxFuture, Shared},
};

use crate::{
    Counter,
    client::ChainClient,
    error::{Error, Result},
};

type SharedDeployment = Shared<BoxFuture<'static, Result<Address, Arc<Error>>>>;

/// Deploy a contract (with logging)
pub(crate) async fn deploy<C: ChainClient>(
    client: &C,
    name: &str,
    tx: TransactionRequest,
) -> Result<Address> {
    tracing::info!("deploying {name}");
    let tx_hash = client.send_transaction(tx).await?;
    tracing::info!(%tx_hash, "waiting for tx to be mined");

    let receipt = client.confirm(tx_hash).await?;
    tracing::info!(%receipt.gas_used, %tx_hash, "tx mined");
    if !receipt.success {
        return Err(Error::Reverted(tx_hash));
    }
    let addr = receipt.contract_address.ok_or(Error::ContractNotDeployed)?;

    tracing::info!("deployed {name} at {addr:#x}");
    Ok(addr)
}

/// Deploy a new [`Counter`] from `deployer`
pub async fn deploy_counter_contract<C: ChainClient>(
    client: &C,
    deployer: Address,
) -> Result<Address> {
    let tx = TransactionRequest::default()
        .with_from(deployer)
        .with_deploy_code(Counter::BYTECODE.clone());
    deploy(client, "Counter", tx).await
}

/// Memoizes the one helper contract deployment of a test session.
///
/// The first caller installs the deployment future before it is polled, and
/// every later or concurrent caller awaits that same future. The slot is never
/// cleared: a failed deployment keeps failing for everyone sharing the cache,
/// so at most one deployment transaction is ever issued through it. Clones
/// share the slot.
#[derive(Clone, Default)]
pub struct DeploymentCache {
    slot: Arc<Mutex<Option<SharedDeployment>>>,
}

impl DeploymentCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached deployment, starting it with `deploy` if there is none.
    pub async fn get_or_deploy<F, Fut>(&self, deploy: F) -> Result<Address>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Address>> + Send + 'static,
    {
        let deployment = {
            let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
            match slot.as_ref() {
                Some(deployment) => {
                    tracing::debug!("awaiting cached helper deployment");
                    deployment.clone()
                }
                None => slot
                    .insert(deploy().map_err(Arc::new).boxed().shared())
                    .clone(),
            }
        };
        deployment.await.map_err(Error::Deployment)
    }

    /// Address of a completed, successful deployment.
    pub fn address(&self) -> Option<Address> {
        let slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        match slot.as_ref()?.peek()? {
            Ok(addr) => Some(*addr),
            Err(_) => None,
        }
    }
}
