// src/rpc.rs
use std::sync::Arc;

use ethers::types::{Address, Bytes, U256};
use jsonrpsee::core::{async_trait, RpcResult};
use jsonrpsee::proc_macros::rpc;
use jsonrpsee::types::error::ErrorObjectOwned;
use tracing::{debug, error, info};

use crate::account::KernelSmartAccount;
use crate::error::KernelError;
use crate::types::{KernelCall, UserOperation};

const KERNEL_ERROR_CODE: i32 = -32000;

#[rpc(server, namespace = "kernel")]
pub trait KernelRpc {
    /// Address of the served kernel account
    #[method(name = "accountAddress")]
    async fn account_address(&self) -> RpcResult<Address>;

    #[method(name = "getNonce")]
    async fn get_nonce(&self) -> RpcResult<U256>;

    /// Init code for the next user operation, empty once deployed
    #[method(name = "getInitCode")]
    async fn get_init_code(&self) -> RpcResult<Bytes>;

    #[method(name = "encodeCallData")]
    async fn encode_call_data(&self, call: KernelCall) -> RpcResult<Bytes>;

    #[method(name = "getDummySignature")]
    async fn get_dummy_signature(&self, user_op: UserOperation) -> RpcResult<Bytes>;

    #[method(name = "signUserOperation")]
    async fn sign_user_operation(&self, user_op: UserOperation) -> RpcResult<Bytes>;

    /// Personal signature over `message`, ERC-6492 wrapped when `erc6492` is
    /// set and the account is not deployed
    #[method(name = "signMessage")]
    async fn sign_message(&self, message: Bytes, erc6492: Option<bool>) -> RpcResult<Bytes>;
}

pub struct KernelRpcImpl {
    account: Arc<KernelSmartAccount>,
}

impl KernelRpcImpl {
    pub fn new(account: Arc<KernelSmartAccount>) -> Self {
        Self { account }
    }
}

fn rpc_error(method: &str, err: KernelError) -> ErrorObjectOwned {
    error!("{} failed: {}", method, err);
    ErrorObjectOwned::owned(KERNEL_ERROR_CODE, format!("Kernel error: {}", err), None::<()>)
}

#[async_trait]
impl KernelRpcServer for KernelRpcImpl {
    async fn account_address(&self) -> RpcResult<Address> {
        Ok(self.account.address())
    }

    async fn get_nonce(&self) -> RpcResult<U256> {
        self.account
            .get_nonce()
            .await
            .map_err(|e| rpc_error("getNonce", e))
    }

    async fn get_init_code(&self) -> RpcResult<Bytes> {
        self.account
            .get_init_code()
            .await
            .map_err(|e| rpc_error("getInitCode", e))
    }

    async fn encode_call_data(&self, call: KernelCall) -> RpcResult<Bytes> {
        self.account
            .encode_call_data(&call)
            .map_err(|e| rpc_error("encodeCallData", e))
    }

    async fn get_dummy_signature(&self, user_op: UserOperation) -> RpcResult<Bytes> {
        debug!("Dummy signature requested for sender {:?}", user_op.sender);
        self.account
            .get_dummy_signature(&user_op)
            .await
            .map_err(|e| rpc_error("getDummySignature", e))
    }

    async fn sign_user_operation(&self, user_op: UserOperation) -> RpcResult<Bytes> {
        debug!("Received sign request for nonce {}", user_op.nonce);

        match self.account.sign_user_operation(&user_op).await {
            Ok(signature) => {
                info!("Signed user operation for {:?}", user_op.sender);
                Ok(signature)
            }
            Err(e) => Err(rpc_error("signUserOperation", e)),
        }
    }

    async fn sign_message(&self, message: Bytes, erc6492: Option<bool>) -> RpcResult<Bytes> {
        let signed = match erc6492.unwrap_or(false) {
            true => self.account.sign_message_erc6492(&message).await,
            false => self.account.sign_message(&message).await,
        };
        signed.map_err(|e| rpc_error("signMessage", e))
    }
}
