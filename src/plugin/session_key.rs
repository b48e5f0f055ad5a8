// src/plugin/session_key.rs
//! Session-key validator: a secondary key restricted to a Merkle-committed set
//! of permissions.
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use ethers::abi::{AbiDecode, AbiEncode};
use ethers::contract::abigen;
use ethers::signers::Signer;
use ethers::types::transaction::eip712::TypedData;
use ethers::types::{Address, Bytes, H256, U256};
use tracing::{debug, info};

use crate::client::{require_chain_id, ChainClient};
use crate::codec::{encode_batch_permission_proofs, encode_permission_proof, session_key_enable_data};
use crate::constants::DUMMY_ECDSA_SIGNATURE;
use crate::entry_point::get_user_operation_hash;
use crate::error::{KernelError, Result};
use crate::matcher::{find_matching_permissions, MatchedPermissions};
use crate::merkle::{permission_leaf, MerkleTree};
use crate::permission::{Permission, SessionKeyData};
use crate::plugin::{wrap_plugin_signature, KernelPlugin, PluginConfig};
use crate::signature::signature_bytes;
use crate::types::UserOperation;

abigen!(
    SessionKeyValidatorContract,
    r#"[
        function nonces(address kernel) external view returns (uint128 lastNonce, uint128 invalidNonce)
    ]"#
);

pub struct SessionKeyValidator<S> {
    client: Arc<dyn ChainClient>,
    signer: S,
    config: PluginConfig,
    session_key_data: SessionKeyData,
    merkle_tree: MerkleTree,
    chain_id: u64,
}

impl<S: Signer> fmt::Debug for SessionKeyValidator<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionKeyValidator")
            .field("session_key", &self.signer.address())
            .field("config", &self.config)
            .field("merkle_root", &self.merkle_tree.root())
            .field("chain_id", &self.chain_id)
            .finish_non_exhaustive()
    }
}

impl<S: Signer + 'static> SessionKeyValidator<S> {
    pub async fn new(
        client: Arc<dyn ChainClient>,
        signer: S,
        session_key_data: SessionKeyData,
        config: PluginConfig,
    ) -> Result<Self> {
        let chain_id = require_chain_id(client.as_ref()).await?;
        let merkle_tree = MerkleTree::from_permissions(session_key_data.permissions());
        info!(
            "Session key {:?} with {} permissions, merkle root {:?}",
            signer.address(),
            session_key_data.permissions().len(),
            merkle_tree.root()
        );
        Ok(Self {
            client,
            signer,
            config,
            session_key_data,
            merkle_tree,
            chain_id,
        })
    }

    pub fn merkle_tree(&self) -> &MerkleTree {
        &self.merkle_tree
    }

    pub fn session_key_data(&self) -> &SessionKeyData {
        &self.session_key_data
    }

    /// Next session nonce the validator will accept for `account`.
    async fn session_nonce(&self, account: Address) -> Result<U256> {
        let data = NoncesCall { kernel: account }.encode();
        let output = self
            .client
            .call(Some(self.config.validator_address), data.into())
            .await?;
        let NoncesReturn { last_nonce, .. } = NoncesReturn::decode(output)?;
        Ok(U256::from(last_nonce) + 1)
    }

    /// Permission(s) authorizing `call_data` together with their Merkle
    /// proofs. Empty when the session key is unrestricted.
    pub fn permission_proof_data(&self, call_data: &[u8]) -> Result<Bytes> {
        if self.merkle_tree.is_sentinel() {
            return Ok(Bytes::default());
        }

        let permissions = self.session_key_data.permissions();
        match find_matching_permissions(permissions, call_data) {
            Some(MatchedPermissions::Single(permission)) => {
                let proof = self.proof_for(permission)?;
                debug!("Call authorized by permission {}", permission.index());
                Ok(encode_permission_proof(permission, &proof))
            }
            Some(MatchedPermissions::Batch(matched)) => {
                let proofs = matched
                    .iter()
                    .map(|permission| self.proof_for(permission))
                    .collect::<Result<Vec<_>>>()?;
                debug!(
                    "Batch authorized by permissions {:?}",
                    matched.iter().map(|p| p.index()).collect::<Vec<_>>()
                );
                Ok(encode_batch_permission_proofs(&matched, &proofs))
            }
            None => Err(KernelError::NoMatchingPermission),
        }
    }

    fn proof_for(&self, permission: &Permission) -> Result<Vec<H256>> {
        self.merkle_tree
            .proof(&permission_leaf(permission))
            .ok_or(KernelError::NoMatchingPermission)
    }

    /// `sessionKey ∥ ecdsaSignature ∥ permissionProofData`
    async fn plugin_signature(
        &self,
        op: &UserOperation,
        approve_signature: Option<&Bytes>,
        ecdsa_signature: &[u8],
        proof_data: &[u8],
    ) -> Result<Bytes> {
        let mut signature = self.signer.address().as_bytes().to_vec();
        signature.extend_from_slice(ecdsa_signature);
        signature.extend_from_slice(proof_data);
        wrap_plugin_signature(self, op.sender, approve_signature, &signature).await
    }
}

#[async_trait]
impl<S> KernelPlugin for SessionKeyValidator<S>
where
    S: Signer + 'static,
{
    fn address(&self) -> Address {
        self.config.validator_address
    }

    fn signer_address(&self) -> Address {
        self.signer.address()
    }

    fn config(&self) -> &PluginConfig {
        &self.config
    }

    async fn get_enable_data(&self, account: Option<Address>) -> Result<Bytes> {
        let account = account.ok_or(KernelError::MissingAccountAddress)?;
        let nonce = self.session_nonce(account).await?;
        Ok(session_key_enable_data(
            self.signer.address(),
            self.merkle_tree.root(),
            self.session_key_data.valid_after(),
            self.session_key_data.valid_until(),
            self.session_key_data.paymaster(),
            nonce,
        ))
    }

    async fn sign_user_operation(
        &self,
        op: &UserOperation,
        approve_signature: Option<&Bytes>,
    ) -> Result<Bytes> {
        // fail on unauthorized calls before touching the key
        let proof_data = self.permission_proof_data(&op.call_data)?;

        let hash = get_user_operation_hash(op, self.config.entry_point, self.chain_id);
        let signature = self
            .signer
            .sign_message(hash.as_bytes())
            .await
            .map_err(|e| KernelError::Signer(e.to_string()))?;
        let signature = signature_bytes(&signature)?;
        self.plugin_signature(op, approve_signature, &signature, &proof_data)
            .await
    }

    async fn get_dummy_signature(
        &self,
        op: &UserOperation,
        approve_signature: Option<&Bytes>,
    ) -> Result<Bytes> {
        let proof_data = self.permission_proof_data(&op.call_data)?;
        self.plugin_signature(op, approve_signature, &DUMMY_ECDSA_SIGNATURE, &proof_data)
            .await
    }

    async fn get_plugin_approve_signature(
        &self,
        _account: Address,
        _plugin: &dyn KernelPlugin,
    ) -> Result<Bytes> {
        Err(KernelError::UnsupportedOperation(
            "session keys cannot approve other validators".to_string(),
        ))
    }

    async fn sign_message(&self, message: &[u8]) -> Result<Bytes> {
        let signature = self
            .signer
            .sign_message(message)
            .await
            .map_err(|e| KernelError::Signer(e.to_string()))?;
        signature_bytes(&signature)
    }

    async fn sign_typed_data(&self, data: &TypedData) -> Result<Bytes> {
        let signature = self
            .signer
            .sign_typed_data(data)
            .await
            .map_err(|e| KernelError::Signer(e.to_string()))?;
        signature_bytes(&signature)
    }
}
