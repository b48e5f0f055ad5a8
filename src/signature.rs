// src/signature.rs
use ethers::types::{Bytes, Signature};

use crate::constants::ECDSA_SIGNATURE_BYTES;
use crate::error::{KernelError, Result};

/// Parses a hex signature (with or without `0x`) and rewrites a 0/1 recovery
/// id to 27/28, the form the on-chain verifiers expect.
pub fn fix_signed_data(signature: &str) -> Result<Bytes> {
    let hex_digits = signature.strip_prefix("0x").unwrap_or(signature);
    let raw = hex::decode(hex_digits)
        .map_err(|e| KernelError::InvalidSignedData(format!("{signature}: {e}")))?;
    normalize_signature(&raw)
}

/// Same as [`fix_signed_data`] for raw `r ∥ s ∥ v` bytes.
pub fn normalize_signature(raw: &[u8]) -> Result<Bytes> {
    if raw.len() != ECDSA_SIGNATURE_BYTES {
        return Err(KernelError::InvalidSignedData(format!(
            "expected {} bytes, got {}",
            ECDSA_SIGNATURE_BYTES,
            raw.len()
        )));
    }
    let mut fixed = raw.to_vec();
    if let v @ (0 | 1) = fixed[64] {
        fixed[64] = v + 27;
    }
    Ok(fixed.into())
}

pub fn signature_bytes(signature: &Signature) -> Result<Bytes> {
    normalize_signature(&signature.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_v(v: u8) -> String {
        format!("0x{}{}{:02x}", "11".repeat(32), "22".repeat(32), v)
    }

    #[test]
    fn test_recovery_id_is_rewritten() {
        assert_eq!(fix_signed_data(&with_v(0)).unwrap()[64], 27);
        assert_eq!(fix_signed_data(&with_v(1)).unwrap()[64], 28);
    }

    #[test]
    fn test_legacy_recovery_id_passes_through() {
        for v in [27u8, 28] {
            let fixed = fix_signed_data(&with_v(v)).unwrap();
            assert_eq!(fixed.to_vec(), hex::decode(&with_v(v)[2..]).unwrap());
        }
    }

    #[test]
    fn test_prefix_is_optional() {
        let bare = with_v(0)[2..].to_string();
        assert_eq!(fix_signed_data(&bare).unwrap(), fix_signed_data(&with_v(0)).unwrap());
    }

    #[test]
    fn test_malformed_hex_is_rejected() {
        assert!(matches!(
            fix_signed_data("0xzz"),
            Err(KernelError::InvalidSignedData(_))
        ));
        assert!(matches!(
            fix_signed_data("0x1234"),
            Err(KernelError::InvalidSignedData(_))
        ));
    }
}
