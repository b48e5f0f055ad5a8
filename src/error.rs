// src/error.rs
use ethers::types::Bytes;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum KernelError {
    #[error("Account not found: address derivation returned no sender")]
    AccountNotFound,

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Invalid signed data: {0}")]
    InvalidSignedData(String),

    #[error("No matching permission found for the call data")]
    NoMatchingPermission,

    #[error("Invalid executor data: {0}")]
    InvalidExecutorData(String),

    #[error("Chain not configured on client")]
    ChainNotConfigured,

    #[error("Kernel account address is required for this operation")]
    MissingAccountAddress,

    #[error("Invalid permission: {0}")]
    InvalidPermission(String),

    #[error("Call reverted with data {0}")]
    Reverted(Bytes),

    #[error("Ethereum provider error: {0}")]
    Provider(String),

    #[error("Signer error: {0}")]
    Signer(String),

    #[error(transparent)]
    Abi(#[from] ethers::abi::Error),

    #[error(transparent)]
    AbiDecode(#[from] ethers::abi::AbiError),

    #[error(transparent)]
    Hex(#[from] hex::FromHexError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T, E = KernelError> = std::result::Result<T, E>;
