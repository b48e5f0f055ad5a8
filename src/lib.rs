// src/lib.rs
//! Client-side Kernel v2 smart account for ERC-4337: deterministic addresses,
//! init code, and user-operation signing through ECDSA or session-key
//! validators.
pub mod account;
pub mod client;
pub mod codec;
pub mod constants;
pub mod entry_point;
pub mod erc6492;
pub mod error;
pub mod matcher;
pub mod merkle;
pub mod permission;
pub mod plugin;
pub mod rpc;
pub mod signature;
pub mod types;

pub use account::{KernelAccountConfig, KernelSmartAccount};
pub use client::{ChainClient, ProviderClient};
pub use error::{KernelError, Result};
pub use merkle::MerkleTree;
pub use permission::{ExecutionRule, ParamCondition, ParamRule, Permission, SessionKeyData};
pub use plugin::{EcdsaValidator, KernelPlugin, PluginConfig, SessionKeyValidator};
pub use types::{ExecutorData, KernelCall, KernelTransaction, Operation, UserOperation};
