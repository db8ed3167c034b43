//! Generic utility functions

use ethers::types::Address;
use ethers::utils::to_checksum;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::str::FromStr;

/// Number of base units in one whole native token (wei per ether).
pub const BASE_UNITS_PER_TOKEN: f64 = 1e18;

/// Parses a decimal string the way the explorers report numbers.
/// Anything unparseable counts as zero.
pub fn parse_f64_lenient(raw: &str) -> f64 {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite()).unwrap_or(0.0)
}

/// Converts a base-unit amount (e.g. wei) into whole-token units.
pub fn base_units_to_tokens(raw: &str) -> f64 {
    parse_f64_lenient(raw) / BASE_UNITS_PER_TOKEN
}

/// Validates a candidate chain address.
///
/// Accepts 40 hex digits with an optional `0x` prefix. All-lowercase and
/// all-uppercase input is accepted as-is; mixed-case input must carry a valid
/// EIP-55 checksum.
pub fn parse_address(candidate: &str) -> Option<Address> {
    let trimmed = candidate.trim();
    let hex = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    if hex.len() != 40 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let address = Address::from_str(hex).ok()?;

    let has_lower = hex.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = hex.chars().any(|c| c.is_ascii_uppercase());
    if has_lower && has_upper {
        let checksummed = to_checksum(&address, None);
        if checksummed.trim_start_matches("0x") != hex {
            return None;
        }
    }
    Some(address)
}

/// Lowercase `0x`-prefixed hex form used as the cache key and for comparisons.
pub fn address_key(address: &Address) -> String {
    format!("{:#x}", address)
}

/// Case-insensitive equality of two address strings. Empty strings never match.
pub fn same_address(a: &str, b: &str) -> bool {
    let (a, b) = (a.trim(), b.trim());
    !a.is_empty() && !b.is_empty() && a.eq_ignore_ascii_case(b)
}

/// Accepts a JSON string, number, bool or null and yields its string form.
/// Explorers are not consistent about quoting numeric fields.
pub fn de_lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

/// Accepts a JSON number or numeric string as an `f64`.
pub fn de_number_or_string<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => Ok(n.as_f64()),
        Some(Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|e| serde::de::Error::custom(format!("invalid numeric string '{}': {}", s, e))),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected number or numeric string, got {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_address_accepts_lowercase_and_prefixless() {
        let a = parse_address("0x53db9542e3a0cdbfebb659d001799ba0b37b2275").unwrap();
        let b = parse_address("53db9542e3a0cdbfebb659d001799ba0b37b2275").unwrap();
        assert_eq!(a, b);
        assert_eq!(address_key(&a), "0x53db9542e3a0cdbfebb659d001799ba0b37b2275");
    }

    #[test]
    fn test_parse_address_checks_mixed_case_checksum() {
        // Canonical EIP-55 test vector
        assert!(parse_address("0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed").is_some());
        assert!(parse_address("0x5aaEb6053F3E94C9b9A09f33669435E7Ef1BeAed").is_none());
        assert!(parse_address("0x5AAEB6053F3E94C9B9A09F33669435E7EF1BEAED").is_some());
    }

    #[test]
    fn test_parse_address_rejects_garbage() {
        assert!(parse_address("not-an-address").is_none());
        assert!(parse_address("0x1234").is_none());
        assert!(parse_address("").is_none());
        assert!(parse_address("0xzz3db9542e3a0cdbfebb659d001799ba0b37b227").is_none());
    }

    #[test]
    fn test_lenient_numbers() {
        assert_eq!(parse_f64_lenient("21000"), 21000.0);
        assert_eq!(parse_f64_lenient(""), 0.0);
        assert_eq!(parse_f64_lenient("abc"), 0.0);
        assert_eq!(base_units_to_tokens("2000000000000000000"), 2.0);
    }

    #[test]
    fn test_same_address() {
        assert!(same_address("0xABC", "0xabc"));
        assert!(!same_address("", ""));
        assert!(!same_address("0xabc", "0xabcd"));
    }
}
