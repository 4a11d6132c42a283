use alloy::primitives::{Signature, U256};

use crate::error::ConnectorError;
use crate::signer::RawThresholdSignature;

/// Normalizes a threshold-signer signature into the canonical form.
///
/// The service may report the recovery id as `recid` (0/1), `recoveryParam`
/// (0/1) or `v` (27/28); all three collapse to a 0/1 y-parity here and the
/// original encoding is never inspected again downstream. A missing or
/// out-of-range recovery field is a hard signing error, not a default.
pub fn normalize_signature(raw: &RawThresholdSignature) -> Result<Signature, ConnectorError> {
    let r = parse_scalar("r", &raw.r)?;
    let s = parse_scalar("s", &raw.s)?;
    let y_parity = recovery_bit(raw)?;
    Ok(Signature::new(r, s, y_parity))
}

/// Hex scalar, at most 32 bytes; shorter values are left-zero-padded by the
/// numeric parse.
fn parse_scalar(field: &'static str, value: &str) -> Result<U256, ConnectorError> {
    let stripped = value.trim().trim_start_matches("0x");
    if stripped.is_empty() || stripped.len() > 64 {
        return Err(ConnectorError::SignatureFormat {
            message: format!("{field} must be 1..=32 bytes of hex, got {value:?}"),
        });
    }
    U256::from_str_radix(stripped, 16).map_err(|e| ConnectorError::SignatureFormat {
        message: format!("{field} is not valid hex ({value:?}): {e}"),
    })
}

fn recovery_bit(raw: &RawThresholdSignature) -> Result<bool, ConnectorError> {
    if let Some(recid) = raw.recid {
        return match recid {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(ConnectorError::SignatureFormat {
                message: format!("recid out of range: {other}"),
            }),
        };
    }
    if let Some(param) = raw.recovery_param {
        return match param {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(ConnectorError::SignatureFormat {
                message: format!("recoveryParam out of range: {other}"),
            }),
        };
    }
    if let Some(v) = raw.v {
        return match v {
            27 => Ok(false),
            28 => Ok(true),
            other => Err(ConnectorError::SignatureFormat {
                message: format!("v out of range: {other} (expected 27 or 28)"),
            }),
        };
    }
    Err(ConnectorError::SignatureFormat {
        message: "no recovery field present (expected recid, recoveryParam or v)".to_string(),
    })
}
