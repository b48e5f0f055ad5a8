// src/codec.rs
//! Byte layouts exchanged with the Kernel contracts: account calls, permission
//! leaves and proofs, enable data and mode-prefixed signatures.
use ethers::abi::{decode, encode, ParamType, Token};
use ethers::types::{Address, Bytes, H256, U256};
use ethers::utils::id;

use crate::constants::{mode, signatures, UINT48_BYTES, WORD_BYTES};
use crate::error::{KernelError, Result};
use crate::permission::Permission;
use crate::types::{ExecutorData, KernelTransaction, Operation};

/// A call decoded from `execute` / `executeBatch` call data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedCall {
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountCall {
    Execute(DecodedCall),
    ExecuteBatch(Vec<DecodedCall>),
}

/// Big-endian uint48 in six bytes. Callers validate the range.
pub fn uint48_bytes(value: u64) -> [u8; UINT48_BYTES] {
    let be = value.to_be_bytes();
    let mut out = [0u8; UINT48_BYTES];
    out.copy_from_slice(&be[8 - UINT48_BYTES..]);
    out
}

pub fn uint256_bytes(value: U256) -> [u8; WORD_BYTES] {
    let mut out = [0u8; WORD_BYTES];
    value.to_big_endian(&mut out);
    out
}

pub fn encode_initialize(validator: Address, enable_data: Bytes) -> Bytes {
    with_selector(
        signatures::INITIALIZE,
        &[Token::Address(validator), Token::Bytes(enable_data.to_vec())],
    )
}

pub fn encode_create_account(implementation: Address, data: Bytes, index: U256) -> Bytes {
    with_selector(
        signatures::CREATE_ACCOUNT,
        &[
            Token::Address(implementation),
            Token::Bytes(data.to_vec()),
            Token::Uint(index),
        ],
    )
}

/// Factory address followed by its `createAccount` call.
pub fn encode_init_code(factory: Address, factory_data: &Bytes) -> Bytes {
    let mut init_code = factory.as_bytes().to_vec();
    init_code.extend_from_slice(factory_data);
    init_code.into()
}

pub fn encode_execute(tx: &KernelTransaction) -> Bytes {
    with_selector(
        signatures::EXECUTE,
        &[
            Token::Address(tx.to),
            Token::Uint(tx.value),
            Token::Bytes(tx.data.to_vec()),
            Token::Uint(U256::from(tx.operation.as_u8())),
        ],
    )
}

/// `executeBatch` only performs plain calls.
pub fn encode_execute_batch(txs: &[KernelTransaction]) -> Result<Bytes> {
    let calls = txs
        .iter()
        .map(|tx| {
            if tx.operation != Operation::Call {
                return Err(KernelError::UnsupportedOperation(
                    "delegate call inside executeBatch".to_string(),
                ));
            }
            Ok(Token::Tuple(vec![
                Token::Address(tx.to),
                Token::Uint(tx.value),
                Token::Bytes(tx.data.to_vec()),
            ]))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(with_selector(signatures::EXECUTE_BATCH, &[Token::Array(calls)]))
}

/// Decodes account call data. Any selector other than `execute` /
/// `executeBatch`, or malformed arguments, yields `None`.
pub fn decode_account_call(call_data: &[u8]) -> Option<AccountCall> {
    let (selector, args) = (call_data.get(..4)?, call_data.get(4..)?);

    if selector == id(signatures::EXECUTE) {
        let tokens = decode(
            &[
                ParamType::Address,
                ParamType::Uint(256),
                ParamType::Bytes,
                ParamType::Uint(8),
            ],
            args,
        )
        .ok()?;
        return decode_call_tokens(tokens).map(AccountCall::Execute);
    }

    if selector == id(signatures::EXECUTE_BATCH) {
        let call_type = ParamType::Tuple(vec![ParamType::Address, ParamType::Uint(256), ParamType::Bytes]);
        let mut tokens = decode(&[ParamType::Array(Box::new(call_type))], args).ok()?;
        let calls = tokens.pop()?.into_array()?;
        return calls
            .into_iter()
            .map(|call| call.into_tuple().and_then(decode_call_tokens))
            .collect::<Option<Vec<_>>>()
            .map(AccountCall::ExecuteBatch);
    }

    None
}

fn decode_call_tokens(tokens: Vec<Token>) -> Option<DecodedCall> {
    let mut tokens = tokens.into_iter();
    let to = tokens.next()?.into_address()?;
    let value = tokens.next()?.into_uint()?;
    let data = tokens.next()?.into_bytes()?;
    Some(DecodedCall {
        to,
        value,
        data: data.into(),
    })
}

pub fn encode_get_execution(selector: [u8; 4]) -> Bytes {
    with_selector(
        signatures::GET_EXECUTION,
        &[Token::FixedBytes(selector.to_vec())],
    )
}

/// Execution detail registered on a kernel account for one selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionDetail {
    pub valid_after: u64,
    pub valid_until: u64,
    pub executor: Address,
    pub validator: Address,
}

pub fn decode_execution_detail(output: &[u8]) -> Result<ExecutionDetail> {
    let tokens = decode(
        &[ParamType::Tuple(vec![
            ParamType::Uint(48),
            ParamType::Uint(48),
            ParamType::Address,
            ParamType::Address,
        ])],
        output,
    )?;
    let invalid = || KernelError::Abi(ethers::abi::Error::InvalidData);
    let mut fields = tokens
        .into_iter()
        .next()
        .and_then(Token::into_tuple)
        .ok_or_else(invalid)?
        .into_iter();
    let mut next_uint = || fields.next().and_then(Token::into_uint).ok_or_else(invalid);
    let valid_after = next_uint()?.low_u64();
    let valid_until = next_uint()?.low_u64();
    let executor = fields.next().and_then(Token::into_address).ok_or_else(invalid)?;
    let validator = fields.next().and_then(Token::into_address).ok_or_else(invalid)?;
    Ok(ExecutionDetail {
        valid_after,
        valid_until,
        executor,
        validator,
    })
}

/// ABI tuple of a permission, as hashed into its Merkle leaf.
pub fn permission_token(permission: &Permission) -> Token {
    let rules = permission
        .rules
        .iter()
        .map(|rule| {
            Token::Tuple(vec![
                Token::Uint(U256::from(rule.offset)),
                Token::Uint(U256::from(rule.condition.as_u8())),
                Token::FixedBytes(rule.param.as_bytes().to_vec()),
            ])
        })
        .collect();
    let execution_rule = permission.execution_rule;

    Token::Tuple(vec![
        Token::Uint(U256::from(permission.index)),
        Token::Address(permission.target),
        Token::FixedBytes(permission.selector.unwrap_or_default().to_vec()),
        Token::Uint(permission.value_limit),
        Token::Array(rules),
        Token::Tuple(vec![
            Token::Uint(U256::from(execution_rule.valid_after)),
            Token::Uint(U256::from(execution_rule.interval)),
            Token::Uint(U256::from(execution_rule.runs)),
        ]),
        Token::Uint(U256::from(permission.operation.as_u8())),
    ])
}

/// Canonical `abi.encode(permission)`.
pub fn encode_permission(permission: &Permission) -> Bytes {
    encode(&[permission_token(permission)]).into()
}

/// `abi.encode(permission, bytes32[] proof)` for a single `execute`.
pub fn encode_permission_proof(permission: &Permission, proof: &[H256]) -> Bytes {
    encode(&[permission_token(permission), proof_token(proof)]).into()
}

/// `abi.encode(permission[], bytes32[][] proofs)` for `executeBatch`.
pub fn encode_batch_permission_proofs(permissions: &[&Permission], proofs: &[Vec<H256>]) -> Bytes {
    let permissions = permissions.iter().map(|p| permission_token(p)).collect();
    let proofs = proofs.iter().map(|proof| proof_token(proof)).collect();
    encode(&[Token::Array(permissions), Token::Array(proofs)]).into()
}

fn proof_token(proof: &[H256]) -> Token {
    Token::Array(
        proof
            .iter()
            .map(|node| Token::FixedBytes(node.as_bytes().to_vec()))
            .collect(),
    )
}

/// ECDSA validator enable data: the owner address as one ABI word.
pub fn ecdsa_enable_data(owner: Address) -> Bytes {
    encode(&[Token::Address(owner)]).into()
}

/// Session-key validator enable data.
pub fn session_key_enable_data(
    session_key: Address,
    merkle_root: H256,
    valid_after: u64,
    valid_until: u64,
    paymaster: Address,
    nonce: U256,
) -> Bytes {
    let mut data = Vec::with_capacity(20 + 32 + 6 + 6 + 20 + 32);
    data.extend_from_slice(session_key.as_bytes());
    data.extend_from_slice(merkle_root.as_bytes());
    data.extend_from_slice(&uint48_bytes(valid_after));
    data.extend_from_slice(&uint48_bytes(valid_until));
    data.extend_from_slice(paymaster.as_bytes());
    data.extend_from_slice(&uint256_bytes(nonce));
    data.into()
}

/// `validUntil(6) ∥ validAfter(6) ∥ validator(20)` read as one uint256.
pub fn validator_data(valid_until: u64, valid_after: u64, validator: Address) -> U256 {
    let mut word = [0u8; WORD_BYTES];
    word[..6].copy_from_slice(&uint48_bytes(valid_until));
    word[6..12].copy_from_slice(&uint48_bytes(valid_after));
    word[12..].copy_from_slice(validator.as_bytes());
    U256::from_big_endian(&word)
}

/// Parts of an enable-mode signature, which installs a plugin validator and
/// uses it in the same user operation.
#[derive(Debug, Clone)]
pub struct EnableSignature<'a> {
    pub valid_until: u64,
    pub valid_after: u64,
    pub validator: Address,
    pub executor_data: &'a ExecutorData,
    pub enable_data: &'a [u8],
    pub enable_signature: &'a [u8],
    pub signature: &'a [u8],
}

pub fn encode_enable_signature(parts: &EnableSignature<'_>) -> Bytes {
    let mut out = Vec::with_capacity(
        4 + 6 + 6 + 20 + 20 + 4 + 32 + parts.enable_data.len() + 32 + parts.enable_signature.len()
            + parts.signature.len(),
    );
    out.extend_from_slice(&mode::ENABLE);
    out.extend_from_slice(&uint48_bytes(parts.valid_until));
    out.extend_from_slice(&uint48_bytes(parts.valid_after));
    out.extend_from_slice(parts.validator.as_bytes());
    out.extend_from_slice(parts.executor_data.executor.as_bytes());
    out.extend_from_slice(&parts.executor_data.selector);
    out.extend_from_slice(&uint256_bytes(U256::from(parts.enable_data.len())));
    out.extend_from_slice(parts.enable_data);
    out.extend_from_slice(&uint256_bytes(U256::from(parts.enable_signature.len())));
    out.extend_from_slice(parts.enable_signature);
    out.extend_from_slice(parts.signature);
    out.into()
}

/// Prefixes `signature` with a 4-byte validator mode.
pub fn with_mode(mode: [u8; 4], signature: &[u8]) -> Bytes {
    let mut out = mode.to_vec();
    out.extend_from_slice(signature);
    out.into()
}

fn with_selector(signature: &str, args: &[Token]) -> Bytes {
    let mut data = id(signature).to_vec();
    data.extend(encode(args));
    data.into()
}
