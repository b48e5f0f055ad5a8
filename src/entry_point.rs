// src/entry_point.rs
//! Reads against the ERC-4337 entry point and decoding of its events.
use ethers::abi::{AbiDecode, AbiEncode};
use ethers::contract::{abigen, parse_log, EthError};
use ethers::types::{Address, Bytes, Log, H256, U256};
use tracing::{debug, warn};

use crate::client::ChainClient;
use crate::error::{KernelError, Result};
use crate::types::UserOperation;

abigen!(
    EntryPoint,
    r#"[
        function getNonce(address sender, uint192 key) external view returns (uint256 nonce)
        function getSenderAddress(bytes initCode) external
        error SenderAddressResult(address sender)
        event UserOperationEvent(bytes32 indexed userOpHash, address indexed sender, address indexed paymaster, uint256 nonce, bool success, uint256 actualGasCost, uint256 actualGasUsed)
    ]"#
);

/// Asks the entry point for the counterfactual sender of `init_code`.
///
/// `getSenderAddress` always reverts; the address travels in the
/// `SenderAddressResult` revert payload.
pub async fn get_sender_address(
    client: &dyn ChainClient,
    init_code: Bytes,
    entry_point: Address,
) -> Result<Address> {
    let data = GetSenderAddressCall { init_code }.encode();
    let revert = match client.call(Some(entry_point), data.into()).await {
        Err(KernelError::Reverted(revert)) => revert,
        Ok(output) => {
            warn!("getSenderAddress returned without reverting: {}", output);
            return Err(KernelError::AccountNotFound);
        }
        Err(err) => return Err(err),
    };

    match SenderAddressResult::decode_with_selector(&revert) {
        Some(SenderAddressResult { sender }) if !sender.is_zero() => {
            debug!("Derived sender address {:?}", sender);
            Ok(sender)
        }
        _ => Err(KernelError::AccountNotFound),
    }
}

/// Hash of `op` as the entry point computes it, with the signature cleared.
pub fn get_user_operation_hash(op: &UserOperation, entry_point: Address, chain_id: u64) -> H256 {
    let unsigned = UserOperation {
        signature: Bytes::default(),
        ..op.clone()
    };
    unsigned.hash(entry_point, chain_id)
}

pub async fn get_account_nonce(
    client: &dyn ChainClient,
    sender: Address,
    entry_point: Address,
    key: U256,
) -> Result<U256> {
    let data = GetNonceCall { sender, key }.encode();
    let output = client.call(Some(entry_point), data.into()).await?;
    let GetNonceReturn { nonce } = GetNonceReturn::decode(output)?;
    Ok(nonce)
}

/// Entry point `UserOperationEvent`s found in `logs`. Logs emitted by other
/// contracts or events are skipped.
pub fn decode_user_operation_events(logs: &[Log]) -> Vec<UserOperationEventFilter> {
    logs.iter()
        .filter_map(|log| parse_log::<UserOperationEventFilter>(log.clone()).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use ethers::abi::{encode, Token};
    use ethers::contract::{EthCall, EthEvent};
    use ethers::types::H256;

    use super::*;
    use crate::client::mock::{CallResponse, MockChainClient};

    fn entry_point() -> Address {
        "0x5FF137D4b0FDCD49DcA30c7CF57E578a026d2789".parse().unwrap()
    }

    fn sender_revert(sender: Address) -> Bytes {
        let mut data = SenderAddressResult::selector().to_vec();
        data.extend(encode(&[Token::Address(sender)]));
        data.into()
    }

    #[tokio::test]
    async fn test_sender_address_from_revert() {
        let sender: Address = "0x1111111111111111111111111111111111111111".parse().unwrap();
        let client = MockChainClient::new(1).on_call(
            Some(entry_point()),
            GetSenderAddressCall::selector(),
            CallResponse::Revert(sender_revert(sender)),
        );

        let derived = get_sender_address(&client, Bytes::from(vec![1, 2, 3]), entry_point())
            .await
            .unwrap();
        assert_eq!(derived, sender);
    }

    #[tokio::test]
    async fn test_zero_sender_is_account_not_found() {
        let client = MockChainClient::new(1).on_call(
            Some(entry_point()),
            GetSenderAddressCall::selector(),
            CallResponse::Revert(sender_revert(Address::zero())),
        );
        let err = get_sender_address(&client, Bytes::default(), entry_point())
            .await
            .unwrap_err();
        assert!(matches!(err, KernelError::AccountNotFound));
    }

    #[tokio::test]
    async fn test_non_reverting_call_is_account_not_found() {
        let client = MockChainClient::new(1).on_call(
            Some(entry_point()),
            GetSenderAddressCall::selector(),
            CallResponse::Return(Bytes::default()),
        );
        let err = get_sender_address(&client, Bytes::default(), entry_point())
            .await
            .unwrap_err();
        assert!(matches!(err, KernelError::AccountNotFound));
    }

    #[tokio::test]
    async fn test_get_account_nonce() {
        let client = MockChainClient::new(1).on_call(
            Some(entry_point()),
            GetNonceCall::selector(),
            CallResponse::Return(encode(&[Token::Uint(U256::from(7))]).into()),
        );
        let nonce = get_account_nonce(&client, Address::zero(), entry_point(), U256::zero())
            .await
            .unwrap();
        assert_eq!(nonce, U256::from(7));
    }

    #[tokio::test]
    async fn test_malformed_nonce_output_is_decode_error() {
        let client = MockChainClient::new(1).on_call(
            Some(entry_point()),
            GetNonceCall::selector(),
            CallResponse::Return(Bytes::from(vec![0x01, 0x02, 0x03])),
        );
        let err = get_account_nonce(&client, Address::zero(), entry_point(), U256::zero())
            .await
            .unwrap_err();
        assert!(matches!(err, KernelError::AbiDecode(_)));
    }

    #[test]
    fn test_user_operation_hash_clears_signature() {
        let op = UserOperation {
            sender: Address::repeat_byte(0x11),
            signature: Bytes::from(vec![0xaa; 65]),
            ..Default::default()
        };
        let cleared = UserOperation {
            signature: Bytes::default(),
            ..op.clone()
        };
        assert_eq!(
            get_user_operation_hash(&op, entry_point(), 1),
            cleared.hash(entry_point(), 1)
        );
    }

    #[test]
    fn test_unrelated_logs_are_discarded() {
        let sender = Address::repeat_byte(0x22);
        let event = Log {
            address: entry_point(),
            topics: vec![
                UserOperationEventFilter::signature(),
                H256::repeat_byte(0x01),
                H256::from(sender),
                H256::zero(),
            ],
            data: encode(&[
                Token::Uint(U256::from(3)),
                Token::Bool(true),
                Token::Uint(U256::from(1000)),
                Token::Uint(U256::from(50_000)),
            ])
            .into(),
            ..Default::default()
        };
        let unrelated = Log {
            address: entry_point(),
            topics: vec![H256::repeat_byte(0x99)],
            ..Default::default()
        };

        let events = decode_user_operation_events(&[unrelated, event]);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].sender, sender);
        assert!(events[0].success);
        assert_eq!(events[0].nonce, U256::from(3));
    }
}
