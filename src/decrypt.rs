//! User decryption requests: EIP-712 authorization for one encrypted handle.
//!
//! The oracle rebuilds the typed data from the submitted request and checks
//! the signature against it, so the domain, the single
//! `UserDecryptRequestVerification` type (field order included) and the
//! message must reach the signer exactly as the oracle produced them. Any
//! mismatch only surfaces as an oracle rejection.

use std::{
    collections::BTreeMap,
    fmt,
    future::Future,
    time::{SystemTime, UNIX_EPOCH},
};

use alloy::{
    dyn_abi::TypedData,
    hex,
    primitives::{Address, B256, Bytes, U256},
    signers::Signer,
    sol_types::Eip712Domain,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use crate::error::{Error, Result};

pub const USER_DECRYPT_TYPE: &str = "UserDecryptRequestVerification";

/// Validity window of an authorization, in days.
pub const DEFAULT_DURATION_DAYS: &str = "10";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandleContractPair {
    pub ct_handle: B256,
    pub contract_address: Address,
}

#[derive(Clone)]
pub struct DecryptionParams {
    pub handle: B256,
    pub contract_address: Address,
    pub private_key: Bytes,
    pub public_key: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Eip712Field {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
}

/// Typed data as handed out by the oracle's `createEIP712`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Eip712Request {
    pub domain: Eip712Domain,
    pub types: BTreeMap<String, Vec<Eip712Field>>,
    pub message: serde_json::Value,
}

impl Eip712Request {
    /// Typed data over the domain, the verification type alone, and the message.
    pub fn user_decrypt_typed_data(&self) -> Result<TypedData> {
        let fields = self
            .types
            .get(USER_DECRYPT_TYPE)
            .ok_or(Error::MissingType(USER_DECRYPT_TYPE))?;
        let types = BTreeMap::from([(USER_DECRYPT_TYPE, fields)]);
        let typed = serde_json::from_value(json!({
            "types": types,
            "primaryType": USER_DECRYPT_TYPE,
            "domain": self.domain,
            "message": self.message,
        }))?;
        Ok(typed)
    }
}

/// Signed authorization in the shape the oracle's `userDecrypt` expects.
#[derive(Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDecryptRequest {
    pub handle_contract_pairs: Vec<HandleContractPair>,
    pub private_key: Bytes,
    pub public_key: Bytes,
    /// hex without `0x`
    pub signature: String,
    pub contract_addresses: Vec<Address>,
    pub signer_address: Address,
    pub start_timestamp: String,
    pub duration_days: String,
}

impl fmt::Debug for UserDecryptRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserDecryptRequest")
            .field("handle_contract_pairs", &self.handle_contract_pairs)
            .field("private_key", &"<redacted>")
            .field("public_key", &self.public_key)
            .field("signature", &self.signature)
            .field("contract_addresses", &self.contract_addresses)
            .field("signer_address", &self.signer_address)
            .field("start_timestamp", &self.start_timestamp)
            .field("duration_days", &self.duration_days)
            .finish()
    }
}

/// The decryption service.
pub trait DecryptionOracle: Send + Sync {
    fn create_eip712(
        &self,
        public_key: &Bytes,
        contract_addresses: &[Address],
        start_timestamp: &str,
        duration_days: &str,
    ) -> Result<Eip712Request>;

    /// Submit a signed request and return the decrypted plaintext.
    fn user_decrypt(
        &self,
        request: UserDecryptRequest,
    ) -> impl Future<Output = Result<U256>> + Send;
}

pub fn strip_hex_prefix(s: &str) -> &str {
    s.strip_prefix("0x").unwrap_or(s)
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or_default()
}

pub struct DecryptionRequestBuilder<'a, O, S> {
    oracle: &'a O,
    signer: &'a S,
}

impl<'a, O, S> DecryptionRequestBuilder<'a, O, S>
where
    O: DecryptionOracle,
    S: Signer + Send + Sync,
{
    pub fn new(oracle: &'a O, signer: &'a S) -> Self {
        Self { oracle, signer }
    }

    /// Build and sign the authorization for `params.handle`, starting now.
    pub async fn authorize(&self, params: &DecryptionParams) -> Result<UserDecryptRequest> {
        let handle_contract_pairs = vec![HandleContractPair {
            ct_handle: params.handle,
            contract_address: params.contract_address,
        }];
        let contract_addresses = vec![params.contract_address];
        let start_timestamp = unix_now().to_string();
        let duration_days = DEFAULT_DURATION_DAYS.to_string();

        let eip712 = self.oracle.create_eip712(
            &params.public_key,
            &contract_addresses,
            &start_timestamp,
            &duration_days,
        )?;
        let typed_data = eip712.user_decrypt_typed_data()?;
        let signature = self.signer.sign_dynamic_typed_data(&typed_data).await?;
        let signature = hex::encode_prefixed(signature.as_bytes());
        debug!(handle = %params.handle, %start_timestamp, "signed user decrypt request");

        Ok(UserDecryptRequest {
            handle_contract_pairs,
            private_key: params.private_key.clone(),
            public_key: params.public_key.clone(),
            signature: strip_hex_prefix(&signature).to_owned(),
            contract_addresses,
            signer_address: self.signer.address(),
            start_timestamp,
            duration_days,
        })
    }

    /// Authorize and decrypt a single handle.
    pub async fn build_and_sign(&self, params: &DecryptionParams) -> Result<U256> {
        let request = self.authorize(params).await?;
        info!(
            handle = %params.handle,
            signer = %request.signer_address,
            "requesting user decryption"
        );
        self.oracle.user_decrypt(request).await
    }
}
