use std::sync::Arc;

use alloy::consensus::SignableTransaction;
use alloy::network::TxSigner;
use alloy::primitives::{Address, B256, ChainId, Signature};
use alloy::signers as alloy_signer;
use alloy::signers::{Error as SignerError, Result as SignerResult, Signer,
    sign_transaction_with_chain_id};
use async_trait::async_trait;

use crate::normalize::normalize_signature;
use crate::signer::ThresholdSigner;

/// A wallet whose private key lives behind a threshold-signing service.
///
/// The account never sees key material: every hash is shipped to the signer
/// under its `key_handle` and the returned components are normalized into a
/// standard secp256k1 signature. From the provider stack's point of view this
/// behaves exactly like a local key.
pub struct DelegatedAccount<T: ThresholdSigner> {
    signer: Arc<T>,
    address: Address,
    key_handle: String,
    chain_id: Option<ChainId>,
}

impl<T: ThresholdSigner> Clone for DelegatedAccount<T> {
    fn clone(&self) -> Self {
        Self {
            signer: Arc::clone(&self.signer),
            address: self.address,
            key_handle: self.key_handle.clone(),
            chain_id: self.chain_id,
        }
    }
}

impl<T: ThresholdSigner> std::fmt::Debug for DelegatedAccount<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DelegatedAccount")
            .field("address", &self.address)
            .field("key_handle", &self.key_handle)
            .field("chain_id", &self.chain_id)
            .finish_non_exhaustive()
    }
}

impl<T: ThresholdSigner> DelegatedAccount<T> {
    pub fn new(signer: Arc<T>, address: Address, key_handle: impl Into<String>) -> Self {
        Self {
            signer,
            address,
            key_handle: key_handle.into(),
            chain_id: None,
        }
    }

    pub fn with_chain_id(mut self, chain_id: ChainId) -> Self {
        self.chain_id = Some(chain_id);
        self
    }

    pub fn key_handle(&self) -> &str {
        &self.key_handle
    }

    async fn sign_digest(&self, digest: &B256) -> SignerResult<Signature> {
        let raw = self
            .signer
            .sign_digest(*digest, &self.key_handle)
            .await
            .map_err(SignerError::other)?;
        normalize_signature(&raw).map_err(SignerError::other)
    }
}

#[async_trait]
impl<T: ThresholdSigner> Signer for DelegatedAccount<T> {
    async fn sign_hash(&self, hash: &B256) -> SignerResult<Signature> {
        self.sign_digest(hash).await
    }

    fn address(&self) -> Address {
        self.address
    }

    fn chain_id(&self) -> Option<ChainId> {
        self.chain_id
    }

    fn set_chain_id(&mut self, chain_id: Option<ChainId>) {
        self.chain_id = chain_id;
    }
}

#[async_trait]
impl<T: ThresholdSigner> TxSigner<Signature> for DelegatedAccount<T> {
    fn address(&self) -> Address {
        self.address
    }

    async fn sign_transaction(
        &self,
        tx: &mut dyn SignableTransaction<Signature>,
    ) -> SignerResult<Signature> {
        sign_transaction_with_chain_id!(self, tx, self.sign_digest(&tx.signature_hash()).await)
    }
}
