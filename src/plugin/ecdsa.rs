// src/plugin/ecdsa.rs
use std::sync::Arc;

use async_trait::async_trait;
use ethers::signers::Signer;
use ethers::types::transaction::eip712::TypedData;
use ethers::types::{Address, Bytes};
use tracing::debug;

use crate::client::{require_chain_id, ChainClient};
use crate::codec::{ecdsa_enable_data, with_mode};
use crate::constants::{mode, DUMMY_ECDSA_SIGNATURE};
use crate::entry_point::get_user_operation_hash;
use crate::error::{KernelError, Result};
use crate::plugin::{validator_approved_typed_data, KernelPlugin, PluginConfig};
use crate::signature::signature_bytes;
use crate::types::UserOperation;

/// Single-owner validator. Always signs user operations in sudo mode.
#[derive(Debug)]
pub struct EcdsaValidator<S> {
    signer: S,
    config: PluginConfig,
    chain_id: u64,
}

impl<S: Signer> EcdsaValidator<S> {
    pub async fn new(client: Arc<dyn ChainClient>, signer: S, config: PluginConfig) -> Result<Self> {
        let chain_id = require_chain_id(client.as_ref()).await?;
        debug!(
            "ECDSA validator {:?} for owner {:?} on chain {}",
            config.validator_address,
            signer.address(),
            chain_id
        );
        Ok(Self {
            signer,
            config,
            chain_id,
        })
    }

    async fn personal_sign(&self, message: &[u8]) -> Result<Bytes> {
        let signature = self
            .signer
            .sign_message(message)
            .await
            .map_err(|e| KernelError::Signer(e.to_string()))?;
        signature_bytes(&signature)
    }
}

#[async_trait]
impl<S> KernelPlugin for EcdsaValidator<S>
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

    async fn get_enable_data(&self, _account: Option<Address>) -> Result<Bytes> {
        Ok(ecdsa_enable_data(self.signer.address()))
    }

    async fn sign_user_operation(
        &self,
        op: &UserOperation,
        _approve_signature: Option<&Bytes>,
    ) -> Result<Bytes> {
        let hash = get_user_operation_hash(op, self.config.entry_point, self.chain_id);
        let signature = self.personal_sign(hash.as_bytes()).await?;
        Ok(with_mode(mode::SUDO, &signature))
    }

    async fn get_dummy_signature(
        &self,
        _op: &UserOperation,
        _approve_signature: Option<&Bytes>,
    ) -> Result<Bytes> {
        Ok(with_mode(mode::SUDO, &DUMMY_ECDSA_SIGNATURE))
    }

    async fn get_plugin_approve_signature(
        &self,
        account: Address,
        plugin: &dyn KernelPlugin,
    ) -> Result<Bytes> {
        let enable_data = plugin.get_enable_data(Some(account)).await?;
        let typed_data = validator_approved_typed_data(self.chain_id, account, plugin, &enable_data)?;
        debug!("Approving validator {:?} for {:?}", plugin.address(), account);
        self.sign_typed_data(&typed_data).await
    }

    async fn sign_message(&self, message: &[u8]) -> Result<Bytes> {
        self.personal_sign(message).await
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

#[cfg(test)]
mod tests {
    use ethers::signers::LocalWallet;
    use ethers::types::transaction::eip712::Eip712;
    use ethers::types::Signature;

    use super::*;
    use crate::client::mock::MockChainClient;

    const OWNER_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    async fn validator() -> EcdsaValidator<LocalWallet> {
        let client: Arc<dyn ChainClient> = Arc::new(MockChainClient::new(1));
        EcdsaValidator::new(client, OWNER_KEY.parse().unwrap(), PluginConfig::ecdsa())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_rejects_client_without_chain() {
        let client: Arc<dyn ChainClient> = Arc::new(MockChainClient::new(0));
        let wallet: LocalWallet = OWNER_KEY.parse().unwrap();
        let err = EcdsaValidator::new(client, wallet, PluginConfig::ecdsa())
            .await
            .unwrap_err();
        assert!(matches!(err, KernelError::ChainNotConfigured));
    }

    #[tokio::test]
    async fn test_user_operation_signature_is_sudo_mode() {
        let validator = validator().await;
        let op = UserOperation {
            sender: Address::repeat_byte(0x01),
            ..Default::default()
        };
        let signature = validator.sign_user_operation(&op, None).await.unwrap();
        assert_eq!(&signature[..4], &mode::SUDO);
        assert_eq!(signature.len(), 4 + 65);
        assert!(signature[68] == 27 || signature[68] == 28);

        let hash = get_user_operation_hash(&op, validator.config.entry_point, 1);
        let recovered = Signature::try_from(&signature[4..])
            .unwrap()
            .recover(hash.as_bytes())
            .unwrap();
        assert_eq!(recovered, validator.signer_address());
    }

    #[tokio::test]
    async fn test_dummy_signature_is_sudo_mode() {
        let validator = validator().await;
        let dummy = validator
            .get_dummy_signature(&UserOperation::default(), None)
            .await
            .unwrap();
        assert_eq!(&dummy[..4], &mode::SUDO);
        assert_eq!(&dummy[4..], &DUMMY_ECDSA_SIGNATURE);
    }

    #[tokio::test]
    async fn test_enable_data_is_owner_word() {
        let validator = validator().await;
        let data = validator.get_enable_data(None).await.unwrap();
        assert_eq!(data.len(), 32);
        assert_eq!(&data[12..], validator.signer_address().as_bytes());
    }

    #[tokio::test]
    async fn test_approves_plugin_with_typed_data() {
        let owner = validator().await;
        let wallet: LocalWallet = "59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d"
            .parse()
            .unwrap();
        let client: Arc<dyn ChainClient> = Arc::new(MockChainClient::new(1));
        let mut plugin_config = PluginConfig::ecdsa();
        plugin_config.executor_data = Some(Default::default());
        let plugin = EcdsaValidator::new(client, wallet, plugin_config).await.unwrap();

        let account = Address::repeat_byte(0x99);
        let approval = owner.get_plugin_approve_signature(account, &plugin).await.unwrap();

        let enable_data = plugin.get_enable_data(Some(account)).await.unwrap();
        let typed_data = validator_approved_typed_data(1, account, &plugin, &enable_data).unwrap();
        let digest = typed_data.encode_eip712().unwrap();
        let recovered = Signature::try_from(&approval[..])
            .unwrap()
            .recover(ethers::types::H256::from(digest))
            .unwrap();
        assert_eq!(recovered, owner.signer_address());
    }

    #[tokio::test]
    async fn test_approval_requires_executor_data() {
        let owner = validator().await;
        let err = owner
            .get_plugin_approve_signature(Address::repeat_byte(0x99), &validator().await)
            .await
            .unwrap_err();
        assert!(matches!(err, KernelError::InvalidExecutorData(_)));
    }
}
