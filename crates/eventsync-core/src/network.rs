//! Named chain profiles.
//!
//! Exactly one profile is active per process. A profile pairs an RPC/WS
//! endpoint set with the two contract deployments on that chain.

use serde::{Deserialize, Serialize};

use crate::error::SyncError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkProfile {
    /// Selector name (`"monad-testnet"`).
    pub name: String,
    pub chain_id: u64,
    /// Primary request/response endpoint.
    pub rpc_url: String,
    /// Streaming endpoint. `None` runs the pipeline degraded.
    pub ws_url: Option<String>,
    /// Tried in order after `rpc_url`.
    pub fallback_rpc_urls: Vec<String>,
    /// Event-registry contract.
    pub event_registry: Option<String>,
    /// NFT-ticket contract.
    pub ticket_contract: Option<String>,
}

impl NetworkProfile {
    pub const DEFAULT: &'static str = "monad-testnet";

    pub fn monad_testnet() -> Self {
        Self {
            name: "monad-testnet".into(),
            chain_id: 10143,
            rpc_url: "https://testnet-rpc.monad.xyz".into(),
            ws_url: Some("wss://testnet-rpc.monad.xyz".into()),
            fallback_rpc_urls: vec![],
            event_registry: Some("0x062F04385CC31a88c4A1996d07b747B914e09E27".into()),
            ticket_contract: Some("0xF15742734183129cb6f42d2606851952a9b7A4AA".into()),
        }
    }

    pub fn mantle_sepolia() -> Self {
        Self {
            name: "mantle-sepolia".into(),
            chain_id: 5003,
            rpc_url: "https://rpc.sepolia.mantle.xyz".into(),
            ws_url: None,
            fallback_rpc_urls: vec![
                "https://rpc.ankr.com/mantle_sepolia".into(),
                "https://mantle-sepolia-rpc.publicnode.com".into(),
            ],
            event_registry: None,
            ticket_contract: None,
        }
    }

    pub fn somnia_testnet() -> Self {
        Self {
            name: "somnia-testnet".into(),
            chain_id: 50312,
            rpc_url: "https://dream-rpc.somnia.network".into(),
            ws_url: None,
            fallback_rpc_urls: vec![],
            event_registry: None,
            ticket_contract: None,
        }
    }

    pub fn builtins() -> Vec<Self> {
        vec![Self::monad_testnet(), Self::mantle_sepolia(), Self::somnia_testnet()]
    }

    /// Look up a built-in profile by name (case-insensitive).
    pub fn builtin(name: &str) -> Result<Self, SyncError> {
        Self::builtins()
            .into_iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| SyncError::Config(format!("unknown network '{name}'")))
    }

    /// Primary RPC URL followed by the fallbacks, duplicates removed.
    pub fn rpc_candidates(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::with_capacity(1 + self.fallback_rpc_urls.len());
        for url in std::iter::once(&self.rpc_url).chain(&self.fallback_rpc_urls) {
            let url = url.trim();
            if !url.is_empty() && !out.iter().any(|u| u == url) {
                out.push(url.to_string());
            }
        }
        out
    }

    /// Both contract addresses, or a config error naming the missing one.
    pub fn contracts(&self) -> Result<(String, String), SyncError> {
        let registry = self.event_registry.clone().ok_or_else(|| {
            SyncError::Config(format!("network '{}' has no event-registry address", self.name))
        })?;
        let ticket = self.ticket_contract.clone().ok_or_else(|| {
            SyncError::Config(format!("network '{}' has no ticket contract address", self.name))
        })?;
        Ok((registry, ticket))
    }
}

impl Default for NetworkProfile {
    fn default() -> Self {
        Self::monad_testnet()
    }
}
