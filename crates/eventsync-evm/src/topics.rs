//! Indexed-argument extraction from raw log topics and data.
//!
//! Topics are 32-byte words. A `uint256` argument is the word itself; an
//! `address` argument occupies the low 20 bytes.

use alloy_primitives::{Address, B256, U256};

use eventsync_core::SyncError;

/// Parse a `0x`-prefixed 32-byte word.
pub fn word(hex_word: &str) -> Result<B256, String> {
    let digits = hex_word.strip_prefix("0x").unwrap_or(hex_word);
    let bytes = hex::decode(digits).map_err(|e| format!("invalid hex {hex_word:?}: {e}"))?;
    if bytes.len() != 32 {
        return Err(format!("expected 32-byte word, got {} bytes", bytes.len()));
    }
    Ok(B256::from_slice(&bytes))
}

pub fn topic_uint(topic: &str) -> Result<U256, String> {
    word(topic).map(|w| U256::from_be_bytes(w.0))
}

pub fn topic_address(topic: &str) -> Result<Address, String> {
    let w = word(topic)?;
    if w[..12].iter().any(|b| *b != 0) {
        return Err(format!("topic {topic} is not a left-padded address"));
    }
    Ok(Address::from_word(w))
}

/// `index`-th 32-byte word of the log's data section, if present.
pub fn data_uint(data: &str, index: usize) -> Option<U256> {
    let digits = data.strip_prefix("0x").unwrap_or(data);
    let start = index * 64;
    let chunk = digits.get(start..start + 64)?;
    word(chunk).ok().map(|w| U256::from_be_bytes(w.0))
}

/// EIP-55 checksum form.
pub fn checksum(address: &Address) -> String {
    address.to_checksum(None)
}

/// Parse any-case hex address and return its checksum form.
pub fn normalize_address(address: &str) -> Result<String, SyncError> {
    address
        .parse::<Address>()
        .map(|a| checksum(&a))
        .map_err(|e| SyncError::Config(format!("invalid address {address:?}: {e}")))
}

/// On-chain timestamps and counts as `i64`, saturating on overflow.
pub fn to_i64(value: U256) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

pub fn to_u64(value: U256) -> u64 {
    u64::try_from(value).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEVEN: &str = "0x0000000000000000000000000000000000000000000000000000000000000007";

    #[test]
    fn uint_topic() {
        assert_eq!(topic_uint(SEVEN).unwrap(), U256::from(7u64));
        assert!(topic_uint("0x07").is_err());
    }

    #[test]
    fn address_topic_is_checksummed() {
        let topic = "0x000000000000000000000000ad6f0b7fc14c1bdc5b1d0e5a5e4c2c3cc09cd687";
        let addr = topic_address(topic).unwrap();
        assert_eq!(checksum(&addr).to_lowercase(), "0xad6f0b7fc14c1bdc5b1d0e5a5e4c2c3cc09cd687");
        assert!(topic_address(SEVEN.replace("0x00", "0xff").as_str()).is_err());
    }

    #[test]
    fn data_words() {
        let data = format!("0x{}{}", &SEVEN[2..], "00".repeat(31) + "2a");
        assert_eq!(data_uint(&data, 0), Some(U256::from(7u64)));
        assert_eq!(data_uint(&data, 1), Some(U256::from(42u64)));
        assert_eq!(data_uint(&data, 2), None);
        assert_eq!(data_uint("0x", 0), None);
    }

    #[test]
    fn normalize_accepts_any_case() {
        let lower = normalize_address("0x062f04385cc31a88c4a1996d07b747b914e09e27").unwrap();
        let upper = normalize_address("0x062F04385CC31A88C4A1996D07B747B914E09E27").unwrap();
        assert_eq!(lower, upper);
        assert!(normalize_address("0x1234").is_err());
    }

    #[test]
    fn saturating_narrowing() {
        assert_eq!(to_i64(U256::MAX), i64::MAX);
        assert_eq!(to_u64(U256::from(5u64)), 5);
    }
}
