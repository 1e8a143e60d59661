//! Raw EVM log as delivered by `eth_getLogs` or a `logs` subscription.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawLog {
    pub address: String,
    pub topics: Vec<String>,
    #[serde(default)]
    pub data: String,
    #[serde(rename = "blockNumber", default)]
    pub block_number: String,
    #[serde(rename = "blockHash", default)]
    pub block_hash: String,
    #[serde(rename = "transactionHash", default)]
    pub tx_hash: String,
    #[serde(rename = "logIndex", default)]
    pub log_index: String,
    /// Set by the node when a reorg retracts the log.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub removed: Option<bool>,
}

impl RawLog {
    /// Block number, or 0 for pending logs without one.
    pub fn block_number_u64(&self) -> u64 {
        parse_hex_u64(&self.block_number).unwrap_or(0)
    }

    pub fn is_removed(&self) -> bool {
        self.removed.unwrap_or(false)
    }

    pub fn topic0(&self) -> Option<&str> {
        self.topics.first().map(String::as_str)
    }
}

/// Parse a quantity such as `"0x1a"`. The `0x` prefix is optional.
pub fn parse_hex_u64(s: &str) -> Option<u64> {
    let digits = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
    if digits.is_empty() {
        return None;
    }
    u64::from_str_radix(digits, 16).ok()
}
