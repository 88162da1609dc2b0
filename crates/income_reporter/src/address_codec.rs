use bech32::{FromBase32, ToBase32, Variant};

use crate::ReportError;

pub const VALIDATOR_OPERATOR_SUFFIX: &str = "valoper";

/// Re-encodes an account address under the validator-operator prefix.
/// The identifying bytes are kept; only the prefix and checksum change.
pub fn to_validator_operator(address: &str, validator_prefix: &str) -> Result<String, ReportError> {
    let payload = decode_payload(address)?;
    bech32::encode(validator_prefix, payload.to_base32(), Variant::Bech32).map_err(|err| {
        ReportError::Decode {
            address: address.to_string(),
            reason: format!("encode under prefix {} failed: {}", validator_prefix, err),
        }
    })
}

/// Human-readable prefix of a bech32 address, lowercased.
pub fn address_prefix(address: &str) -> Result<String, ReportError> {
    let (hrp, _, _) = bech32::decode(address).map_err(|err| ReportError::Decode {
        address: address.to_string(),
        reason: err.to_string(),
    })?;
    Ok(hrp)
}

pub fn default_validator_prefix(account_prefix: &str) -> String {
    format!("{}{}", account_prefix, VALIDATOR_OPERATOR_SUFFIX)
}

/// Operator address for `address`, using `configured_prefix` when set and
/// otherwise the address's own prefix with `valoper` appended.
pub fn validator_operator_for(
    address: &str,
    configured_prefix: Option<&str>,
) -> Result<String, ReportError> {
    match configured_prefix {
        Some(prefix) => to_validator_operator(address, prefix),
        None => {
            let prefix = default_validator_prefix(&address_prefix(address)?);
            to_validator_operator(address, &prefix)
        }
    }
}

fn decode_payload(address: &str) -> Result<Vec<u8>, ReportError> {
    let (_, data, variant) = bech32::decode(address).map_err(|err| ReportError::Decode {
        address: address.to_string(),
        reason: err.to_string(),
    })?;
    if variant != Variant::Bech32 {
        return Err(ReportError::Decode {
            address: address.to_string(),
            reason: "bech32m checksum is not an account address".to_string(),
        });
    }
    let payload = Vec::<u8>::from_base32(&data).map_err(|err| ReportError::Decode {
        address: address.to_string(),
        reason: format!("payload does not regroup into bytes: {}", err),
    })?;
    if payload.is_empty() {
        return Err(ReportError::Decode {
            address: address.to_string(),
            reason: "empty payload".to_string(),
        });
    }
    Ok(payload)
}
