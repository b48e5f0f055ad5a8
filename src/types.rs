// src/types.rs
use ethers::abi::{encode, Token};
use ethers::types::{Address, Bytes, H256, U256};
use ethers::utils::keccak256;
use serde::{Deserialize, Serialize};

use crate::constants::signatures;

/// ERC-4337 v0.6 user operation.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperation {
    pub sender: Address,
    pub nonce: U256,
    pub init_code: Bytes,
    pub call_data: Bytes,
    pub call_gas_limit: U256,
    pub verification_gas_limit: U256,
    pub pre_verification_gas: U256,
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
    pub paymaster_and_data: Bytes,
    pub signature: Bytes,
}

impl UserOperation {
    /// Packs every field except the signature, hashing the dynamic ones.
    pub fn pack_without_signature(&self) -> Bytes {
        encode(&[
            Token::Address(self.sender),
            Token::Uint(self.nonce),
            Token::FixedBytes(keccak256(&self.init_code).to_vec()),
            Token::FixedBytes(keccak256(&self.call_data).to_vec()),
            Token::Uint(self.call_gas_limit),
            Token::Uint(self.verification_gas_limit),
            Token::Uint(self.pre_verification_gas),
            Token::Uint(self.max_fee_per_gas),
            Token::Uint(self.max_priority_fee_per_gas),
            Token::FixedBytes(keccak256(&self.paymaster_and_data).to_vec()),
        ])
        .into()
    }

    /// The hash an account signs: keccak(keccak(packed op) ∥ entry point ∥ chain id).
    pub fn hash(&self, entry_point: Address, chain_id: u64) -> H256 {
        let op_hash = keccak256(self.pack_without_signature());
        keccak256(encode(&[
            Token::FixedBytes(op_hash.to_vec()),
            Token::Address(entry_point),
            Token::Uint(U256::from(chain_id)),
        ]))
        .into()
    }
}

/// How the kernel account performs a call.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operation {
    #[default]
    Call,
    DelegateCall,
}

impl Operation {
    pub fn as_u8(self) -> u8 {
        match self {
            Operation::Call => 0,
            Operation::DelegateCall => 1,
        }
    }
}

/// A single call the account should execute.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KernelTransaction {
    pub to: Address,
    #[serde(default)]
    pub value: U256,
    #[serde(default)]
    pub data: Bytes,
    #[serde(default)]
    pub operation: Operation,
}

impl KernelTransaction {
    pub fn call(to: Address, value: U256, data: Bytes) -> Self {
        Self {
            to,
            value,
            data,
            operation: Operation::Call,
        }
    }

    pub fn delegate_call(to: Address, data: Bytes) -> Self {
        Self {
            to,
            value: U256::zero(),
            data,
            operation: Operation::DelegateCall,
        }
    }
}

/// One call or a batch, as accepted by `encodeCallData`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KernelCall {
    Single(KernelTransaction),
    Batch(Vec<KernelTransaction>),
}

/// Executor and selector a plugin validator is enabled for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutorData {
    pub executor: Address,
    pub selector: [u8; 4],
}

impl Default for ExecutorData {
    /// Zero executor bound to the account's own `execute` function.
    fn default() -> Self {
        Self {
            executor: Address::zero(),
            selector: ethers::utils::id(signatures::EXECUTE),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_op() -> UserOperation {
        UserOperation {
            sender: "0x921f125a92930cabb2969ad9323261d3a2a784e7".parse().unwrap(),
            nonce: 0.into(),
            init_code: "0x9406cc6185a346906296840746125a0e449764545fbfb9cf00000000000000000000000043378ff8c70109ee4dbe85af34428ab0615ebd230000000000000000000000000000000000000000000000000000000000000000".parse().unwrap(),
            call_data: "0xb61d27f6000000000000000000000000a02bfd0ba5d182226627a933333ba92d1a60e234000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000600000000000000000000000000000000000000000000000000000000000000000".parse().unwrap(),
            call_gas_limit: 530_100.into(),
            verification_gas_limit: 500_624.into(),
            pre_verification_gas: 104_056.into(),
            max_fee_per_gas: 1_695_000_030.into(),
            max_priority_fee_per_gas: 1_695_000_000.into(),
            paymaster_and_data: Bytes::default(),
            signature: "0x5ae30c60c3ad36192f6efc38b3ac41d70d2c08fd8efc5a2f2457bfc17a4deea72fb6b40081dc8e05da85a5f05b977d15a9583fbe0d1766357d2553ad233ddd2f1c".parse().unwrap(),
        }
    }

    #[test]
    fn test_user_operation_hash() {
        let entry_point: Address = "0x5FF137D4b0FDCD49DcA30c7CF57E578a026d2789".parse().unwrap();
        assert_eq!(
            sample_op().hash(entry_point, 5),
            "0x7bca0c9a2ffbd23c25c7d5e1df0520142c0c39454cee778c3201eef6a8a27f06"
                .parse::<H256>()
                .unwrap()
        );
    }

    #[test]
    fn test_hash_ignores_signature() {
        let entry_point: Address = "0x5FF137D4b0FDCD49DcA30c7CF57E578a026d2789".parse().unwrap();
        let mut op = sample_op();
        let signed = op.hash(entry_point, 5);
        op.signature = Bytes::default();
        assert_eq!(op.hash(entry_point, 5), signed);
    }

    #[test]
    fn test_transaction_defaults_from_json() {
        let tx: KernelTransaction = serde_json::from_value(serde_json::json!({
            "to": "0x000000000000000000000000000000000000dead"
        }))
        .unwrap();
        assert_eq!(tx.value, U256::zero());
        assert!(tx.data.is_empty());
        assert_eq!(tx.operation, Operation::Call);
    }
}
