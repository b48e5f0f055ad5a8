// src/plugin/mod.rs
//! Validator plugins: the signers a kernel account delegates to.
use async_trait::async_trait;
use ethers::types::transaction::eip712::TypedData;
use ethers::types::{Address, Bytes, U256};
use serde_json::json;

use crate::codec::{encode_enable_signature, validator_data, with_mode, EnableSignature};
use crate::constants::{
    mode, ECDSA_VALIDATOR, ENTRY_POINT_V06, KERNEL_NAME, KERNEL_VERSION, SESSION_KEY_VALIDATOR,
};
use crate::error::{KernelError, Result};
use crate::types::{ExecutorData, UserOperation};

pub mod ecdsa;
pub mod session_key;

pub use ecdsa::EcdsaValidator;
pub use session_key::SessionKeyValidator;

/// Settings shared by every validator plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginConfig {
    /// Entry point the user-operation hash is bound to.
    pub entry_point: Address,
    /// On-chain validator contract.
    pub validator_address: Address,
    /// Executor and selector the plugin is enabled for. Required to enable the
    /// plugin on an account.
    pub executor_data: Option<ExecutorData>,
    /// Window during which the enabled plugin is valid; zero means unbounded.
    pub valid_after: u64,
    pub valid_until: u64,
}

impl PluginConfig {
    pub fn ecdsa() -> Self {
        Self {
            entry_point: ENTRY_POINT_V06,
            validator_address: ECDSA_VALIDATOR,
            executor_data: None,
            valid_after: 0,
            valid_until: 0,
        }
    }

    pub fn session_key() -> Self {
        Self {
            entry_point: ENTRY_POINT_V06,
            validator_address: SESSION_KEY_VALIDATOR,
            executor_data: Some(ExecutorData::default()),
            valid_after: 0,
            valid_until: 0,
        }
    }

    pub fn executor_data(&self) -> Result<&ExecutorData> {
        self.executor_data.as_ref().ok_or_else(|| {
            KernelError::InvalidExecutorData(format!(
                "validator {:?} has no executor and selector",
                self.validator_address
            ))
        })
    }
}

/// A validator a kernel account can sign with, either as its default
/// validator or as an enabled plugin.
#[async_trait]
pub trait KernelPlugin: Send + Sync {
    /// Address of the on-chain validator contract.
    fn address(&self) -> Address;

    /// Address of the key this plugin signs with.
    fn signer_address(&self) -> Address;

    fn config(&self) -> &PluginConfig;

    /// Payload the validator contract's `enable` receives for `account`.
    async fn get_enable_data(&self, account: Option<Address>) -> Result<Bytes>;

    fn get_nonce_key(&self) -> U256 {
        U256::zero()
    }

    /// Final signature for `op`. With an approval from the default
    /// validator the plugin signs in enable mode.
    async fn sign_user_operation(
        &self,
        op: &UserOperation,
        approve_signature: Option<&Bytes>,
    ) -> Result<Bytes>;

    /// Signature of the same shape as [`KernelPlugin::sign_user_operation`]
    /// for gas estimation.
    async fn get_dummy_signature(
        &self,
        op: &UserOperation,
        approve_signature: Option<&Bytes>,
    ) -> Result<Bytes>;

    /// Approval authorizing `plugin` on `account`, signed by this validator.
    async fn get_plugin_approve_signature(
        &self,
        account: Address,
        plugin: &dyn KernelPlugin,
    ) -> Result<Bytes>;

    /// EIP-191 personal signature by the underlying key.
    async fn sign_message(&self, message: &[u8]) -> Result<Bytes>;

    /// EIP-712 signature by the underlying key.
    async fn sign_typed_data(&self, data: &TypedData) -> Result<Bytes>;
}

/// Prefixes a plugin's own signature with plugin mode, or with the full
/// enable-mode header when an approval is given.
pub async fn wrap_plugin_signature(
    plugin: &dyn KernelPlugin,
    account: Address,
    approve_signature: Option<&Bytes>,
    signature: &[u8],
) -> Result<Bytes> {
    let Some(approve_signature) = approve_signature else {
        return Ok(with_mode(mode::PLUGIN, signature));
    };

    let config = plugin.config();
    let executor_data = config.executor_data()?;
    let enable_data = plugin.get_enable_data(Some(account)).await?;
    Ok(encode_enable_signature(&EnableSignature {
        valid_until: config.valid_until,
        valid_after: config.valid_after,
        validator: plugin.address(),
        executor_data,
        enable_data: &enable_data,
        enable_signature: approve_signature,
        signature,
    }))
}

/// EIP-712 `ValidatorApproved` message the default validator signs to enable
/// `plugin` on `account`.
pub fn validator_approved_typed_data(
    chain_id: u64,
    account: Address,
    plugin: &dyn KernelPlugin,
    enable_data: &Bytes,
) -> Result<TypedData> {
    let config = plugin.config();
    let executor_data = config.executor_data()?;
    let validator_data = validator_data(config.valid_until, config.valid_after, plugin.address());

    let typed_data = json!({
        "types": {
            "EIP712Domain": [
                { "name": "name", "type": "string" },
                { "name": "version", "type": "string" },
                { "name": "chainId", "type": "uint256" },
                { "name": "verifyingContract", "type": "address" }
            ],
            "ValidatorApproved": [
                { "name": "sig", "type": "bytes4" },
                { "name": "validatorData", "type": "uint256" },
                { "name": "executor", "type": "address" },
                { "name": "enableData", "type": "bytes" }
            ]
        },
        "primaryType": "ValidatorApproved",
        "domain": {
            "name": KERNEL_NAME,
            "version": KERNEL_VERSION,
            "chainId": chain_id,
            "verifyingContract": account
        },
        "message": {
            "sig": format!("0x{}", hex::encode(executor_data.selector)),
            "validatorData": validator_data.to_string(),
            "executor": executor_data.executor,
            "enableData": enable_data
        }
    });
    Ok(serde_json::from_value(typed_data)?)
}
