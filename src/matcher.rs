// src/matcher.rs
//! Finds the permission authorizing each call inside account call data.
use tracing::debug;

use crate::codec::{decode_account_call, AccountCall, DecodedCall};
use crate::permission::Permission;
use crate::types::Operation;

/// Permissions authorizing an `execute` or every call of an `executeBatch`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchedPermissions<'a> {
    Single(&'a Permission),
    Batch(Vec<&'a Permission>),
}

/// Matches account call data against `permissions`.
///
/// Returns `None` if the call data is neither `execute` nor `executeBatch`,
/// or if any call of a batch has no authorizing permission.
pub fn find_matching_permissions<'a>(
    permissions: &'a [Permission],
    call_data: &[u8],
) -> Option<MatchedPermissions<'a>> {
    match decode_account_call(call_data)? {
        AccountCall::Execute(call) => match_call(permissions, &call).map(MatchedPermissions::Single),
        AccountCall::ExecuteBatch(calls) => calls
            .iter()
            .map(|call| match_call(permissions, call))
            .collect::<Option<Vec<_>>>()
            .map(MatchedPermissions::Batch),
    }
}

/// The permission authorizing one call: filtered by target, operation,
/// selector and value limit, then the highest value limit whose param rules
/// all hold.
pub fn match_call<'a>(permissions: &'a [Permission], call: &DecodedCall) -> Option<&'a Permission> {
    let by_target: Vec<&Permission> = permissions
        .iter()
        .filter(|p| p.target == call.to || p.target.is_zero())
        .collect();
    if by_target.is_empty() {
        debug!("no permission targets {:?}", call.to);
        return None;
    }

    // TODO: requests are always matched as plain calls; delegate-call scoped
    // permissions need the requested operation threaded through from execute.
    let requested = Operation::Call;
    let by_operation: Vec<&Permission> = by_target
        .into_iter()
        .filter(|p| p.operation == requested)
        .collect();
    if by_operation.is_empty() {
        debug!("no {:?} permission for {:?}", requested, call.to);
        return None;
    }

    let mut candidates: Vec<&Permission> = by_operation
        .into_iter()
        .filter(|p| p.matches_selector(&call.data))
        .filter(|p| p.value_limit >= call.value)
        .collect();
    if candidates.is_empty() {
        debug!("no permission for selector and value {} on {:?}", call.value, call.to);
        return None;
    }

    candidates.sort_by(|a, b| b.value_limit.cmp(&a.value_limit));
    candidates
        .into_iter()
        .find(|p| p.rules.iter().all(|rule| rule.matches(&call.data)))
}

#[cfg(test)]
mod tests {
    use ethers::abi::{encode, Token};
    use ethers::types::{Address, Bytes, H256, U256};

    use super::*;
    use crate::codec::{encode_execute, encode_execute_batch};
    use crate::permission::{ParamCondition, ParamRule, SessionKeyData};
    use crate::types::KernelTransaction;

    fn a() -> Address {
        Address::repeat_byte(0xaa)
    }

    fn b() -> Address {
        Address::repeat_byte(0xbb)
    }

    fn call(to: Address, value: u64, data: Vec<u8>) -> DecodedCall {
        DecodedCall {
            to,
            value: U256::from(value),
            data: data.into(),
        }
    }

    fn transfer(amount: u64) -> Vec<u8> {
        let mut data = ethers::utils::id("transfer(address,uint256)").to_vec();
        data.extend(encode(&[Token::Address(b()), Token::Uint(U256::from(amount))]));
        data
    }

    fn session(permissions: Vec<Permission>) -> SessionKeyData {
        SessionKeyData::new(0, 0, permissions).unwrap()
    }

    #[test]
    fn test_value_limit_selects_permission() {
        let data = session(vec![
            Permission::new(a()).with_value_limit(U256::from(10)),
            Permission::new(a()).with_value_limit(U256::from(5)),
        ]);
        let matched = match_call(data.permissions(), &call(a(), 7, vec![])).unwrap();
        assert_eq!(matched.index(), 0);
    }

    #[test]
    fn test_highest_value_limit_wins() {
        let data = session(vec![
            Permission::new(a()).with_value_limit(U256::from(5)),
            Permission::new(a()).with_value_limit(U256::from(10)),
        ]);
        let matched = match_call(data.permissions(), &call(a(), 1, vec![])).unwrap();
        assert_eq!(matched.index(), 1);
    }

    #[test]
    fn test_default_value_limit_rejects_value() {
        let data = session(vec![Permission::new(a())]);
        assert!(match_call(data.permissions(), &call(a(), 0, vec![])).is_some());
        assert!(match_call(data.permissions(), &call(a(), 1, vec![])).is_none());
    }

    #[test]
    fn test_selector_mismatch_fails() {
        let data = session(vec![Permission::new(a()).with_selector([0xaa; 4])]);
        assert!(match_call(data.permissions(), &call(a(), 0, transfer(1))).is_none());
        assert!(match_call(data.permissions(), &call(a(), 0, vec![])).is_none());
    }

    #[test]
    fn test_wildcard_target() {
        let data = session(vec![Permission::new(Address::zero())]);
        assert!(match_call(data.permissions(), &call(b(), 0, transfer(1))).is_some());
    }

    #[test]
    fn test_target_mismatch_fails() {
        let data = session(vec![Permission::new(a())]);
        assert!(match_call(data.permissions(), &call(b(), 0, vec![])).is_none());
    }

    #[test]
    fn test_delegate_call_permissions_never_match() {
        let data = session(vec![Permission::new(a()).with_operation(Operation::DelegateCall)]);
        assert!(match_call(data.permissions(), &call(a(), 0, vec![])).is_none());
    }

    #[test]
    fn test_rules_pick_first_passing_candidate() {
        let mut cap = [0u8; 32];
        U256::from(100).to_big_endian(&mut cap);
        let selector = ethers::utils::id("transfer(address,uint256)");
        let data = session(vec![
            Permission::new(a())
                .with_selector(selector)
                .with_value_limit(U256::from(50))
                .with_rule(ParamRule::new(32, ParamCondition::LessThanOrEqual, H256(cap))),
            Permission::new(a()).with_selector(selector),
        ]);

        let within = match_call(data.permissions(), &call(a(), 0, transfer(100))).unwrap();
        assert_eq!(within.index(), 0);
        let over = match_call(data.permissions(), &call(a(), 0, transfer(101))).unwrap();
        assert_eq!(over.index(), 1);
    }

    #[test]
    fn test_batch_requires_every_call_to_match() {
        let data = session(vec![Permission::new(a())]);
        let both_a = encode_execute_batch(&[
            KernelTransaction::call(a(), U256::zero(), Bytes::default()),
            KernelTransaction::call(a(), U256::zero(), Bytes::from(transfer(1))),
        ])
        .unwrap();
        match find_matching_permissions(data.permissions(), &both_a) {
            Some(MatchedPermissions::Batch(matched)) => assert_eq!(matched.len(), 2),
            other => panic!("expected batch match, got {:?}", other),
        }

        let with_b = encode_execute_batch(&[
            KernelTransaction::call(a(), U256::zero(), Bytes::default()),
            KernelTransaction::call(b(), U256::zero(), Bytes::default()),
        ])
        .unwrap();
        assert!(find_matching_permissions(data.permissions(), &with_b).is_none());
    }

    #[test]
    fn test_execute_matches_single() {
        let data = session(vec![Permission::new(a()).with_value_limit(U256::from(3))]);
        let call_data = encode_execute(&KernelTransaction::call(a(), U256::from(3), Bytes::default()));
        assert_eq!(
            find_matching_permissions(data.permissions(), &call_data),
            Some(MatchedPermissions::Single(&data.permissions()[0]))
        );
    }

    #[test]
    fn test_other_account_calls_do_not_match() {
        let data = session(vec![Permission::new(Address::zero())]);
        assert!(find_matching_permissions(data.permissions(), &transfer(1)).is_none());
    }
}
