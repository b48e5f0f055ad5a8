// src/permission.rs
//! Session-key permissions: which calls a session key may make.
use ethers::abi::{encode, Function, ParamType, Token};
use ethers::types::{Address, H256, U256};
use serde::{Deserialize, Serialize};

use crate::error::{KernelError, Result};
use crate::types::Operation;

const MAX_UINT48: u64 = (1 << 48) - 1;

/// Comparison applied between a call-data word and a rule's parameter.
/// Both sides compare as big-endian unsigned 256-bit integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ParamCondition {
    Equal,
    GreaterThan,
    LessThan,
    GreaterThanOrEqual,
    LessThanOrEqual,
    NotEqual,
}

impl ParamCondition {
    pub fn as_u8(self) -> u8 {
        match self {
            ParamCondition::Equal => 0,
            ParamCondition::GreaterThan => 1,
            ParamCondition::LessThan => 2,
            ParamCondition::GreaterThanOrEqual => 3,
            ParamCondition::LessThanOrEqual => 4,
            ParamCondition::NotEqual => 5,
        }
    }

    pub fn evaluate(self, actual: &[u8; 32], expected: &[u8; 32]) -> bool {
        // lexicographic order of equal-length big-endian words is numeric order
        match self {
            ParamCondition::Equal => actual == expected,
            ParamCondition::GreaterThan => actual > expected,
            ParamCondition::LessThan => actual < expected,
            ParamCondition::GreaterThanOrEqual => actual >= expected,
            ParamCondition::LessThanOrEqual => actual <= expected,
            ParamCondition::NotEqual => actual != expected,
        }
    }
}

/// Constraint on the 32-byte word at `offset` bytes into the call arguments
/// (after the 4-byte selector).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParamRule {
    pub offset: usize,
    pub condition: ParamCondition,
    pub param: H256,
}

impl ParamRule {
    pub fn new(offset: usize, condition: ParamCondition, param: H256) -> Self {
        Self {
            offset,
            condition,
            param,
        }
    }

    /// Checks the rule against raw call data. A word that runs past the end of
    /// the call data fails the rule.
    pub fn matches(&self, call_data: &[u8]) -> bool {
        let word = self
            .offset
            .checked_add(4)
            .and_then(|start| Some(start..start.checked_add(32)?))
            .and_then(|range| call_data.get(range));
        match word {
            Some(word) => {
                let mut actual = [0u8; 32];
                actual.copy_from_slice(word);
                self.condition.evaluate(&actual, self.param.as_fixed_bytes())
            }
            None => false,
        }
    }
}

/// Validity window and usage bounds of a permission. Enforced on-chain only.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRule {
    #[serde(default)]
    pub valid_after: u64,
    #[serde(default)]
    pub interval: u64,
    #[serde(default)]
    pub runs: u64,
}

/// One authorization rule of a session key.
///
/// `index` is the permission's position in its [`SessionKeyData`]; it is part
/// of the encoded leaf, so it is assigned there and never by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Permission {
    #[serde(skip)]
    pub(crate) index: u32,
    /// Zero address matches any target.
    pub target: Address,
    /// `None` matches any selector.
    #[serde(default, with = "selector_hex")]
    pub selector: Option<[u8; 4]>,
    /// Highest native value a matching call may carry. The default of zero
    /// admits only calls without value.
    #[serde(default)]
    pub value_limit: U256,
    #[serde(default)]
    pub rules: Vec<ParamRule>,
    #[serde(default)]
    pub execution_rule: ExecutionRule,
    #[serde(default)]
    pub operation: Operation,
}

impl Permission {
    pub fn new(target: Address) -> Self {
        Self {
            index: 0,
            target,
            selector: None,
            value_limit: U256::zero(),
            rules: Vec::new(),
            execution_rule: ExecutionRule::default(),
            operation: Operation::Call,
        }
    }

    /// Permission for calls of `function` on `target`, with one optional rule
    /// per leading argument. Rules may only constrain static arguments.
    pub fn for_function(
        target: Address,
        function: &Function,
        args: &[Option<(ParamCondition, Token)>],
    ) -> Result<Self> {
        if args.len() > function.inputs.len() {
            return Err(KernelError::InvalidPermission(format!(
                "{} takes {} arguments, got {} rules",
                function.name,
                function.inputs.len(),
                args.len()
            )));
        }

        let mut permission = Self::new(target).with_selector(function.short_signature());
        let mut offset = 0;
        for (input, arg) in function.inputs.iter().zip(args) {
            if let Some((condition, token)) = arg {
                if input.kind.is_dynamic() || !token.type_check(&input.kind) {
                    return Err(KernelError::InvalidPermission(format!(
                        "argument {} of {} cannot carry a rule",
                        input.name, function.name
                    )));
                }
                let encoded = encode(&[token.clone()]);
                if encoded.len() != 32 {
                    return Err(KernelError::InvalidPermission(format!(
                        "argument {} of {} spans more than one word",
                        input.name, function.name
                    )));
                }
                permission = permission.with_rule(ParamRule::new(
                    offset,
                    *condition,
                    H256::from_slice(&encoded),
                ));
            }
            offset += head_size(&input.kind);
        }
        Ok(permission)
    }

    pub fn with_selector(mut self, selector: [u8; 4]) -> Self {
        self.selector = Some(selector);
        self
    }

    pub fn with_value_limit(mut self, value_limit: U256) -> Self {
        self.value_limit = value_limit;
        self
    }

    pub fn with_rule(mut self, rule: ParamRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn with_execution_rule(mut self, execution_rule: ExecutionRule) -> Self {
        self.execution_rule = execution_rule;
        self
    }

    pub fn with_operation(mut self, operation: Operation) -> Self {
        self.operation = operation;
        self
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    /// Whether the call's first four bytes satisfy the selector constraint.
    pub fn matches_selector(&self, call_data: &[u8]) -> bool {
        match self.selector {
            None => true,
            Some(selector) => call_data.get(..4) == Some(&selector[..]),
        }
    }
}

/// Bytes an argument occupies in the head of the ABI encoding.
fn head_size(kind: &ParamType) -> usize {
    if kind.is_dynamic() {
        return 32;
    }
    match kind {
        ParamType::FixedArray(inner, len) => head_size(inner) * len,
        ParamType::Tuple(members) => members.iter().map(head_size).sum(),
        _ => 32,
    }
}

/// Everything a session-key validator commits to on enable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawSessionKeyData")]
pub struct SessionKeyData {
    valid_after: u64,
    valid_until: u64,
    paymaster: Address,
    permissions: Vec<Permission>,
}

impl SessionKeyData {
    /// Assigns each permission its position as index. Window bounds and
    /// execution rules must fit in 48 bits.
    pub fn new(valid_after: u64, valid_until: u64, permissions: Vec<Permission>) -> Result<Self> {
        check_uint48("validAfter", valid_after)?;
        check_uint48("validUntil", valid_until)?;

        let permissions = permissions
            .into_iter()
            .enumerate()
            .map(|(position, mut permission)| {
                let rule = permission.execution_rule;
                check_uint48("executionRule.validAfter", rule.valid_after)?;
                check_uint48("executionRule.interval", rule.interval)?;
                check_uint48("executionRule.runs", rule.runs)?;
                permission.index = u32::try_from(position)
                    .map_err(|_| KernelError::InvalidPermission("too many permissions".to_string()))?;
                Ok(permission)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            valid_after,
            valid_until,
            paymaster: Address::zero(),
            permissions,
        })
    }

    /// Restricts the session key to operations sponsored by `paymaster`.
    pub fn with_paymaster(mut self, paymaster: Address) -> Self {
        self.paymaster = paymaster;
        self
    }

    pub fn valid_after(&self) -> u64 {
        self.valid_after
    }

    pub fn valid_until(&self) -> u64 {
        self.valid_until
    }

    pub fn paymaster(&self) -> Address {
        self.paymaster
    }

    pub fn permissions(&self) -> &[Permission] {
        &self.permissions
    }
}

fn check_uint48(field: &str, value: u64) -> Result<()> {
    if value > MAX_UINT48 {
        return Err(KernelError::InvalidPermission(format!(
            "{field} {value} does not fit in 48 bits"
        )));
    }
    Ok(())
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSessionKeyData {
    #[serde(default)]
    valid_after: u64,
    #[serde(default)]
    valid_until: u64,
    #[serde(default)]
    paymaster: Address,
    #[serde(default)]
    permissions: Vec<Permission>,
}

impl TryFrom<RawSessionKeyData> for SessionKeyData {
    type Error = KernelError;

    fn try_from(raw: RawSessionKeyData) -> Result<Self> {
        Ok(Self::new(raw.valid_after, raw.valid_until, raw.permissions)?.with_paymaster(raw.paymaster))
    }
}

mod selector_hex {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(selector: &Option<[u8; 4]>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match selector {
            Some(selector) => serializer.serialize_str(&format!("0x{}", hex::encode(selector))),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<[u8; 4]>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let Some(s) = Option::<String>::deserialize(deserializer)? else {
            return Ok(None);
        };
        let s = s.strip_prefix("0x").unwrap_or(&s);
        let mut selector = [0u8; 4];
        hex::decode_to_slice(s, &mut selector).map_err(serde::de::Error::custom)?;
        Ok(Some(selector))
    }
}
