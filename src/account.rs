// src/account.rs
//! Kernel smart account: a resolved address plus the validators that sign for
//! it.
use std::sync::Arc;

use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::transaction::eip712::TypedData;
use ethers::types::{Address, Bytes, U256};
use tracing::{debug, info};

use crate::client::{require_chain_id, ChainClient};
use crate::codec::{
    decode_execution_detail, encode_create_account, encode_execute, encode_execute_batch,
    encode_get_execution, encode_init_code, encode_initialize,
};
use crate::constants::{ENTRY_POINT_V06, KERNEL_ACCOUNT_LOGIC, KERNEL_FACTORY};
use crate::entry_point::{get_account_nonce, get_sender_address};
use crate::erc6492::wrap_signature;
use crate::error::{KernelError, Result};
use crate::plugin::KernelPlugin;
use crate::types::{KernelCall, UserOperation};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelAccountConfig {
    pub entry_point: Address,
    pub factory: Address,
    pub account_logic: Address,
    /// Salt distinguishing accounts of the same owner.
    pub index: U256,
    /// Skips address derivation for an account that already exists.
    pub deployed_account_address: Option<Address>,
}

impl Default for KernelAccountConfig {
    fn default() -> Self {
        Self {
            entry_point: ENTRY_POINT_V06,
            factory: KERNEL_FACTORY,
            account_logic: KERNEL_ACCOUNT_LOGIC,
            index: U256::zero(),
            deployed_account_address: None,
        }
    }
}

/// `createAccount(accountLogic, initialize(validator, enableData), index)`
/// for an account whose default validator is `validator`.
pub async fn get_factory_data(
    validator: &dyn KernelPlugin,
    config: &KernelAccountConfig,
) -> Result<Bytes> {
    let enable_data = validator.get_enable_data(None).await?;
    let initialize = encode_initialize(validator.address(), enable_data);
    Ok(encode_create_account(config.account_logic, initialize, config.index))
}

/// Counterfactual address of the account `validator` would deploy.
pub async fn get_account_address(
    client: &dyn ChainClient,
    validator: &dyn KernelPlugin,
    config: &KernelAccountConfig,
) -> Result<Address> {
    if let Some(address) = config.deployed_account_address {
        return Ok(address);
    }
    let factory_data = get_factory_data(validator, config).await?;
    let init_code = encode_init_code(config.factory, &factory_data);
    get_sender_address(client, init_code, config.entry_point).await
}

/// A kernel account handle. Immutable once built; switching validators means
/// building a new one.
pub struct KernelSmartAccount {
    client: Arc<dyn ChainClient>,
    address: Address,
    chain_id: u64,
    config: KernelAccountConfig,
    default_validator: Box<dyn KernelPlugin>,
    plugin: Option<Box<dyn KernelPlugin>>,
}

impl KernelSmartAccount {
    pub async fn new(
        client: Arc<dyn ChainClient>,
        default_validator: Box<dyn KernelPlugin>,
        plugin: Option<Box<dyn KernelPlugin>>,
        config: KernelAccountConfig,
    ) -> Result<Self> {
        let (chain_id, address) = tokio::try_join!(
            require_chain_id(client.as_ref()),
            get_account_address(client.as_ref(), default_validator.as_ref(), &config),
        )?;
        info!(
            "Kernel account {:?} on chain {} (default validator {:?}, plugin {:?})",
            address,
            chain_id,
            default_validator.address(),
            plugin.as_ref().map(|plugin| plugin.address())
        );

        Ok(Self {
            client,
            address,
            chain_id,
            config,
            default_validator,
            plugin,
        })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn config(&self) -> &KernelAccountConfig {
        &self.config
    }

    pub fn default_validator(&self) -> &dyn KernelPlugin {
        self.default_validator.as_ref()
    }

    /// The plugin if one is configured, else the default validator.
    pub fn active_validator(&self) -> &dyn KernelPlugin {
        self.plugin
            .as_deref()
            .unwrap_or_else(|| self.default_validator.as_ref())
    }

    pub async fn is_deployed(&self) -> Result<bool> {
        let code = self.client.get_code(self.address).await?;
        Ok(!code.is_empty())
    }

    pub async fn get_nonce(&self) -> Result<U256> {
        let key = self.active_validator().get_nonce_key();
        get_account_nonce(self.client.as_ref(), self.address, self.config.entry_point, key).await
    }

    pub async fn get_factory_data(&self) -> Result<Bytes> {
        get_factory_data(self.default_validator.as_ref(), &self.config).await
    }

    /// Factory address followed by factory data, or empty once deployed.
    pub async fn get_init_code(&self) -> Result<Bytes> {
        if self.is_deployed().await? {
            return Ok(Bytes::default());
        }
        let factory_data = self.get_factory_data().await?;
        Ok(encode_init_code(self.config.factory, &factory_data))
    }

    pub fn encode_call_data(&self, call: &KernelCall) -> Result<Bytes> {
        match call {
            KernelCall::Single(tx) => Ok(encode_execute(tx)),
            KernelCall::Batch(txs) => encode_execute_batch(txs),
        }
    }

    /// Whether the configured plugin can sign without a fresh approval: it is
    /// the default validator, or the deployed account already routes its
    /// selector to it.
    pub async fn is_plugin_enabled(&self) -> Result<bool> {
        let Some(plugin) = self.plugin.as_deref() else {
            return Ok(true);
        };
        if plugin.address() == self.default_validator.address() {
            return Ok(true);
        }
        if !self.is_deployed().await? {
            return Ok(false);
        }

        let executor_data = plugin.config().executor_data()?;
        let output = self
            .client
            .call(Some(self.address), encode_get_execution(executor_data.selector))
            .await?;
        let detail = decode_execution_detail(&output)?;
        Ok(detail.validator == plugin.address())
    }

    /// Approval from the default validator, when the plugin is not enabled yet.
    async fn plugin_approval(&self) -> Result<Option<Bytes>> {
        let Some(plugin) = self.plugin.as_deref() else {
            return Ok(None);
        };
        if self.is_plugin_enabled().await? {
            debug!("Plugin {:?} already enabled on {:?}", plugin.address(), self.address);
            return Ok(None);
        }

        debug!("Enabling plugin {:?} on {:?}", plugin.address(), self.address);
        let approval = self
            .default_validator
            .get_plugin_approve_signature(self.address, plugin)
            .await?;
        Ok(Some(approval))
    }

    pub async fn sign_user_operation(&self, op: &UserOperation) -> Result<Bytes> {
        let approval = self.plugin_approval().await?;
        self.active_validator()
            .sign_user_operation(op, approval.as_ref())
            .await
    }

    pub async fn get_dummy_signature(&self, op: &UserOperation) -> Result<Bytes> {
        let approval = self.plugin_approval().await?;
        self.active_validator()
            .get_dummy_signature(op, approval.as_ref())
            .await
    }

    pub async fn sign_message(&self, message: &[u8]) -> Result<Bytes> {
        self.active_validator().sign_message(message).await
    }

    /// [`KernelSmartAccount::sign_message`], wrapped per ERC-6492 while the
    /// account is not deployed so verifiers can deploy it first.
    pub async fn sign_message_erc6492(&self, message: &[u8]) -> Result<Bytes> {
        let signature = self.sign_message(message).await?;
        if self.is_deployed().await? {
            return Ok(signature);
        }
        let factory_data = self.get_factory_data().await?;
        Ok(wrap_signature(self.config.factory, factory_data, signature))
    }

    pub async fn sign_typed_data(&self, data: &TypedData) -> Result<Bytes> {
        self.active_validator().sign_typed_data(data).await
    }

    pub async fn sign_transaction(&self, _tx: &TypedTransaction) -> Result<Bytes> {
        Err(KernelError::UnsupportedOperation(
            "smart accounts cannot sign transactions".to_string(),
        ))
    }
}
