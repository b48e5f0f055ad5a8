// src/constants.rs
//! Deployed contract addresses and fixed byte layouts used by Kernel v2 accounts.
//!
//! Addresses are defaults only; every config struct lets the caller override them.
use ethers::types::{Address, H160};
use hex_literal::hex;

/// ERC-4337 entry point v0.6
pub const ENTRY_POINT_V06: Address = H160(hex!("5FF137D4b0FDCD49DcA30c7CF57E578a026d2789"));

/// Kernel account factory
pub const KERNEL_FACTORY: Address = H160(hex!("5de4839a76cf55d0c90e2061ef4386d962E15ae3"));

/// Kernel v2.2 account logic (implementation)
pub const KERNEL_ACCOUNT_LOGIC: Address = H160(hex!("0DA6a956B9488eD4dd761E59f52FDc6c8068E6B5"));

/// ECDSA validator plugin
pub const ECDSA_VALIDATOR: Address = H160(hex!("d9AB5096a832b9ce79914329DAEE236f8Eea0390"));

/// Session key validator plugin
pub const SESSION_KEY_VALIDATOR: Address = H160(hex!("5C06CE2b673fD5E6e56076e40DD46aB67f5a72A5"));

/// EIP-712 domain of the kernel account
pub const KERNEL_NAME: &str = "Kernel";
pub const KERNEL_VERSION: &str = "0.2.2";

/// Validator mode headers prefixed to every kernel signature.
pub mod mode {
    pub const SUDO: [u8; 4] = [0x00, 0x00, 0x00, 0x00];
    pub const PLUGIN: [u8; 4] = [0x00, 0x00, 0x00, 0x01];
    pub const ENABLE: [u8; 4] = [0x00, 0x00, 0x00, 0x02];
}

/// Kernel account function signatures
pub mod signatures {
    pub const INITIALIZE: &str = "initialize(address,bytes)";
    pub const CREATE_ACCOUNT: &str = "createAccount(address,bytes,uint256)";
    pub const EXECUTE: &str = "execute(address,uint256,bytes,uint8)";
    pub const EXECUTE_BATCH: &str = "executeBatch((address,uint256,bytes)[])";
    pub const GET_EXECUTION: &str = "getExecution(bytes4)";
}

/// Suffix marking an ERC-6492 wrapped signature
pub const ERC6492_MAGIC_BYTES: [u8; 32] = [
    0x64, 0x92, 0x64, 0x92, 0x64, 0x92, 0x64, 0x92, 0x64, 0x92, 0x64, 0x92, 0x64, 0x92, 0x64, 0x92,
    0x64, 0x92, 0x64, 0x92, 0x64, 0x92, 0x64, 0x92, 0x64, 0x92, 0x64, 0x92, 0x64, 0x92, 0x64, 0x92,
];

pub const UINT48_BYTES: usize = 6;
pub const WORD_BYTES: usize = 32;
pub const ECDSA_SIGNATURE_BYTES: usize = 65;

/// Placeholder ECDSA signature with realistic length and byte weights, for gas
/// estimation only.
pub const DUMMY_ECDSA_SIGNATURE: [u8; ECDSA_SIGNATURE_BYTES] = hex!(
    "fffffffffffffffffffffffffffffff000000000000000000000000000000000"
    "7aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"
    "1c"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_const_addresses_match_parsed() {
        assert_eq!(
            ENTRY_POINT_V06,
            "0x5FF137D4b0FDCD49DcA30c7CF57E578a026d2789".parse::<Address>().unwrap()
        );
        assert_eq!(
            SESSION_KEY_VALIDATOR,
            "0x5c06ce2b673fd5e6e56076e40dd46ab67f5a72a5".parse::<Address>().unwrap()
        );
    }

    #[test]
    fn test_dummy_signature_layout() {
        assert_eq!(
            hex::encode(DUMMY_ECDSA_SIGNATURE),
            "fffffffffffffffffffffffffffffff0000000000000000000000000000000007aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa1c"
        );
    }
}
