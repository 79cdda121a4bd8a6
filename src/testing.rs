//! In-memory chain and decryption oracle for unit tests

use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, Mutex, MutexGuard},
};

use alloy::{
    hex,
    primitives::{Address, B256, Bytes, Signature, TxHash, TxKind, U256},
    rpc::types::TransactionRequest,
    sol_types::{Eip712Domain, eip712_domain},
    transports::TransportErrorKind,
};
use futures::{StreamExt, channel::mpsc};
use serde_json::json;
use tokio::task::JoinHandle;

use crate::{
    client::{BlockHeight, BlockSubscription, ChainClient, Receipt},
    decrypt::{DecryptionOracle, Eip712Field, Eip712Request, USER_DECRYPT_TYPE, UserDecryptRequest},
    error::{Error, Result},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum FakeEvent {
    Sent(TxHash),
    Confirmed(TxHash),
}

#[derive(Default)]
struct FakeState {
    height: BlockHeight,
    advance_per_query: u64,
    gas_estimate: u64,
    balances: HashMap<Address, U256>,
    accounts: Vec<Address>,
    nonces: HashMap<Address, u64>,
    fail_block_number: bool,
    fail_balance: bool,
    fail_estimate: bool,
    fail_subscribe: bool,
    fail_unsubscribe: bool,
    fail_deploy: bool,
    revert_calls: bool,
    next_subscription: u64,
    subscribers: Vec<(B256, mpsc::UnboundedSender<BlockHeight>)>,
    unsubscribed: Vec<B256>,
    block_number_calls: usize,
    deploy_attempts: usize,
    mined_natively: u64,
    sent: Vec<TransactionRequest>,
    receipts: HashMap<TxHash, Receipt>,
    events: Vec<FakeEvent>,
}

impl FakeState {
    fn mine(&mut self) {
        self.height += 1;
        let height = self.height;
        self.subscribers
            .retain(|(_, tx)| tx.unbounded_send(height).is_ok());
    }
}

fn transport_error(msg: &str) -> alloy::transports::TransportError {
    TransportErrorKind::custom_str(msg)
}

/// Automining chain: every accepted transaction lands in its own block.
#[derive(Clone, Default)]
pub(crate) struct FakeChain {
    state: Arc<Mutex<FakeState>>,
}

impl FakeChain {
    pub(crate) fn at_height(height: BlockHeight) -> Self {
        let chain = Self::default();
        {
            let mut state = chain.state();
            state.height = height;
            state.gas_estimate = 50_000;
        }
        chain
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub(crate) fn mine(&self) {
        self.state().mine();
    }

    pub(crate) fn height(&self) -> BlockHeight {
        self.state().height
    }

    pub(crate) fn advance_per_query(&self, blocks: u64) {
        self.state().advance_per_query = blocks;
    }

    pub(crate) fn set_gas_estimate(&self, gas: u64) {
        self.state().gas_estimate = gas;
    }

    pub(crate) fn set_balance(&self, address: Address, balance: U256) {
        self.state().balances.insert(address, balance);
    }

    pub(crate) fn set_accounts(&self, accounts: Vec<Address>) {
        self.state().accounts = accounts;
    }

    pub(crate) fn fail_block_number(&self, fail: bool) {
        self.state().fail_block_number = fail;
    }

    pub(crate) fn fail_balance(&self, fail: bool) {
        self.state().fail_balance = fail;
    }

    pub(crate) fn fail_estimate(&self, fail: bool) {
        self.state().fail_estimate = fail;
    }

    pub(crate) fn fail_subscribe(&self, fail: bool) {
        self.state().fail_subscribe = fail;
    }

    pub(crate) fn fail_unsubscribe(&self, fail: bool) {
        self.state().fail_unsubscribe = fail;
    }

    pub(crate) fn fail_deploy(&self, fail: bool) {
        self.state().fail_deploy = fail;
    }

    pub(crate) fn revert_calls(&self, revert: bool) {
        self.state().revert_calls = revert;
    }

    pub(crate) fn sent(&self) -> Vec<TransactionRequest> {
        self.state().sent.clone()
    }

    pub(crate) fn events(&self) -> Vec<FakeEvent> {
        self.state().events.clone()
    }

    pub(crate) fn block_number_calls(&self) -> usize {
        self.state().block_number_calls
    }

    pub(crate) fn subscriber_count(&self) -> usize {
        self.state().subscribers.len()
    }

    pub(crate) fn unsubscribed(&self) -> Vec<B256> {
        self.state().unsubscribed.clone()
    }

    pub(crate) fn deploy_attempts(&self) -> usize {
        self.state().deploy_attempts
    }

    pub(crate) fn mined_natively(&self) -> u64 {
        self.state().mined_natively
    }

    pub(crate) async fn until_subscribed(&self) {
        while self.subscriber_count() == 0 {
            tokio::task::yield_now().await;
        }
    }

    /// Mine `blocks` blocks once someone subscribed to new heads.
    pub(crate) fn mine_after_subscribed(&self, blocks: u64) -> JoinHandle<()> {
        let chain = self.clone();
        tokio::spawn(async move {
            chain.until_subscribed().await;
            for _ in 0..blocks {
                chain.mine();
            }
        })
    }

    /// End every block stream once someone subscribed.
    pub(crate) fn close_after_subscribed(&self) -> JoinHandle<()> {
        let chain = self.clone();
        tokio::spawn(async move {
            chain.until_subscribed().await;
            chain.state().subscribers.clear();
        })
    }
}

impl ChainClient for FakeChain {
    async fn block_number(&self) -> Result<BlockHeight> {
        let mut state = self.state();
        state.block_number_calls += 1;
        if state.fail_block_number {
            return Err(Error::NodeUnreachable(transport_error("connection refused")));
        }
        let height = state.height;
        for _ in 0..state.advance_per_query {
            state.mine();
        }
        Ok(height)
    }

    async fn balance(&self, address: Address) -> Result<U256> {
        let state = self.state();
        if state.fail_balance {
            return Err(Error::NodeUnreachable(transport_error("connection refused")));
        }
        Ok(state.balances.get(&address).copied().unwrap_or_default())
    }

    async fn accounts(&self) -> Result<Vec<Address>> {
        Ok(self.state().accounts.clone())
    }

    async fn subscribe_blocks(&self) -> Result<BlockSubscription> {
        let mut state = self.state();
        if state.fail_subscribe {
            return Err(Error::Subscription(transport_error("subscriptions not supported")));
        }
        state.next_subscription += 1;
        let id = B256::left_padding_from(&state.next_subscription.to_be_bytes());
        let (tx, rx) = mpsc::unbounded();
        state.subscribers.push((id, tx));
        Ok(BlockSubscription::new(id, rx.boxed()))
    }

    fn unsubscribe(&self, id: B256) -> Result<()> {
        let mut state = self.state();
        state.unsubscribed.push(id);
        state.subscribers.retain(|(sub, _)| *sub != id);
        if state.fail_unsubscribe {
            return Err(Error::NodeUnreachable(transport_error("connection reset")));
        }
        Ok(())
    }

    async fn mine_block(&self) -> Result<()> {
        let mut state = self.state();
        state.mined_natively += 1;
        state.mine();
        Ok(())
    }

    async fn estimate_gas(&self, _tx: &TransactionRequest) -> Result<u64> {
        let state = self.state();
        if state.fail_estimate {
            return Err(Error::Estimation(transport_error("execution reverted")));
        }
        Ok(state.gas_estimate)
    }

    async fn send_transaction(&self, tx: TransactionRequest) -> Result<TxHash> {
        // let concurrent callers interleave here
        tokio::task::yield_now().await;

        let mut state = self.state();
        let from = tx.from.unwrap_or_default();
        let is_create = matches!(tx.to, None | Some(TxKind::Create));
        if is_create {
            state.deploy_attempts += 1;
            if state.fail_deploy {
                return Err(Error::NodeUnreachable(transport_error("deployment rejected")));
            }
        }

        let nonce = state.nonces.entry(from).or_default();
        let contract_address = is_create.then(|| from.create(*nonce));
        *nonce += 1;

        let tx_hash = TxHash::left_padding_from(&(state.sent.len() as u64 + 1).to_be_bytes());
        state.sent.push(tx);
        state.mine();
        let receipt = Receipt {
            tx_hash,
            block_number: Some(state.height),
            contract_address,
            gas_used: state.gas_estimate,
            success: is_create || !state.revert_calls,
        };
        state.receipts.insert(tx_hash, receipt);
        state.events.push(FakeEvent::Sent(tx_hash));
        Ok(tx_hash)
    }

    async fn confirm(&self, tx_hash: TxHash) -> Result<Receipt> {
        let mut state = self.state();
        let receipt = state
            .receipts
            .get(&tx_hash)
            .cloned()
            .ok_or_else(|| Error::NodeUnreachable(transport_error("unknown transaction")))?;
        state.events.push(FakeEvent::Confirmed(tx_hash));
        Ok(receipt)
    }
}

const ORACLE_CHAIN_ID: u64 = 31337;

/// Oracle that verifies signatures the way the decryption service does and
/// answers with a fixed plaintext.
pub(crate) struct FakeOracle {
    plaintext: U256,
    verify_chain_id: Mutex<u64>,
    submitted: Mutex<Vec<UserDecryptRequest>>,
}

impl FakeOracle {
    pub(crate) fn new(plaintext: U256) -> Self {
        Self {
            plaintext,
            verify_chain_id: Mutex::new(ORACLE_CHAIN_ID),
            submitted: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn verify_with_chain_id(&self, chain_id: u64) {
        *self.verify_chain_id.lock().unwrap() = chain_id;
    }

    pub(crate) fn submitted(&self) -> Vec<UserDecryptRequest> {
        self.submitted.lock().unwrap().clone()
    }

    fn domain(chain_id: u64) -> Eip712Domain {
        eip712_domain! {
            name: "Decryption",
            version: "1",
            chain_id: chain_id,
            verifying_contract: Address::repeat_byte(0x5e),
        }
    }

    fn field(name: &str, ty: &str) -> Eip712Field {
        Eip712Field {
            name: name.to_owned(),
            ty: ty.to_owned(),
        }
    }

    fn eip712_with_domain(
        domain: Eip712Domain,
        public_key: &Bytes,
        contract_addresses: &[Address],
        start_timestamp: &str,
        duration_days: &str,
    ) -> Eip712Request {
        let types = BTreeMap::from([
            (
                "EIP712Domain".to_owned(),
                vec![
                    Self::field("name", "string"),
                    Self::field("version", "string"),
                    Self::field("chainId", "uint256"),
                    Self::field("verifyingContract", "address"),
                ],
            ),
            (
                USER_DECRYPT_TYPE.to_owned(),
                vec![
                    Self::field("publicKey", "bytes"),
                    Self::field("contractAddresses", "address[]"),
                    Self::field("startTimestamp", "uint256"),
                    Self::field("durationDays", "uint256"),
                    Self::field("extraData", "bytes"),
                ],
            ),
        ]);
        let message = json!({
            "publicKey": hex::encode_prefixed(public_key),
            "contractAddresses": contract_addresses,
            "startTimestamp": start_timestamp,
            "durationDays": duration_days,
            "extraData": "0x00",
        });
        Eip712Request {
            domain,
            types,
            message,
        }
    }

    pub(crate) fn eip712_for_parts(
        &self,
        public_key: &Bytes,
        contract_addresses: &[Address],
        start_timestamp: &str,
        duration_days: &str,
    ) -> Eip712Request {
        Self::eip712_with_domain(
            Self::domain(ORACLE_CHAIN_ID),
            public_key,
            contract_addresses,
            start_timestamp,
            duration_days,
        )
    }

    /// The typed data the oracle handed out for `request`.
    pub(crate) fn eip712_for(&self, request: &UserDecryptRequest) -> Eip712Request {
        self.eip712_for_parts(
            &request.public_key,
            &request.contract_addresses,
            &request.start_timestamp,
            &request.duration_days,
        )
    }
}

impl DecryptionOracle for FakeOracle {
    fn create_eip712(
        &self,
        public_key: &Bytes,
        contract_addresses: &[Address],
        start_timestamp: &str,
        duration_days: &str,
    ) -> Result<Eip712Request> {
        Ok(self.eip712_for_parts(public_key, contract_addresses, start_timestamp, duration_days))
    }

    async fn user_decrypt(&self, request: UserDecryptRequest) -> Result<U256> {
        let chain_id = *self.verify_chain_id.lock().unwrap();
        let eip712 = Self::eip712_with_domain(
            Self::domain(chain_id),
            &request.public_key,
            &request.contract_addresses,
            &request.start_timestamp,
            &request.duration_days,
        );
        let hash = eip712
            .user_decrypt_typed_data()?
            .eip712_signing_hash()
            .map_err(|err| Error::Oracle(err.into()))?;

        let raw = hex::decode(&request.signature).map_err(|err| Error::Oracle(err.into()))?;
        let signature =
            Signature::try_from(raw.as_slice()).map_err(|err| Error::Oracle(err.into()))?;
        let recovered = signature
            .recover_address_from_prehash(&hash)
            .map_err(|err| Error::Oracle(err.into()))?;

        self.submitted.lock().unwrap().push(request.clone());
        if recovered != request.signer_address {
            return Err(Error::Oracle("signature does not match the signer".into()));
        }
        Ok(self.plaintext)
    }
}
