use crate::types::ChainId;
use alloy_primitives::Address;
use serde::{Deserialize, Serialize};

pub const ETHEREUM: ChainId = 1;
pub const OPTIMISM: ChainId = 10;
pub const BSC: ChainId = 56;
pub const POLYGON: ChainId = 137;
pub const SONIC: ChainId = 146;
pub const BASE: ChainId = 8453;
pub const ARBITRUM: ChainId = 42161;
pub const AVALANCHE: ChainId = 43114;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenInfo {
    pub address: Address,
    pub symbol: String,
    #[serde(default)]
    pub name: String,
    pub decimals: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo_uri: Option<String>,
}

impl TokenInfo {
    /// Native gas tokens are addressed by the zero address.
    pub fn is_native(&self) -> bool {
        self.address == Address::ZERO
    }

    pub fn native(symbol: &str, name: &str) -> Self {
        Self {
            address: Address::ZERO,
            symbol: symbol.to_string(),
            name: name.to_string(),
            decimals: 18,
            logo_uri: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainMetadata {
    pub id: ChainId,
    pub key: String,
    pub name: String,
    pub explorer_url: String,
    pub native_token: TokenInfo,
}

impl ChainMetadata {
    pub fn tx_url(&self, hash: &str) -> String {
        format!("{}/tx/{}", self.explorer_url.trim_end_matches('/'), hash)
    }
}

/// Built-in chain table: (id, key, name, explorer, native symbol, native name, RPC env var).
pub const KNOWN_CHAINS: &[(ChainId, &str, &str, &str, &str, &str, &str)] = &[
    (ETHEREUM, "ETH", "Ethereum", "https://etherscan.io", "ETH", "Ether", "ETHEREUM_RPC_URL"),
    (BSC, "BSC", "BNB Chain", "https://bscscan.com", "BNB", "BNB", "BINANCE_RPC_URL"),
    (POLYGON, "POL", "Polygon", "https://polygonscan.com", "POL", "Polygon", "POLYGON_RPC_URL"),
    (OPTIMISM, "OPT", "Optimism", "https://optimistic.etherscan.io", "ETH", "Ether", "OPTIMISM_RPC_URL"),
    (ARBITRUM, "ARB", "Arbitrum", "https://arbiscan.io", "ETH", "Ether", "ARBITRUM_RPC_URL"),
    (BASE, "BAS", "Base", "https://basescan.org", "ETH", "Ether", "BASE_RPC_URL"),
    (AVALANCHE, "AVA", "Avalanche", "https://snowtrace.io", "AVAX", "Avalanche", "AVALANCHE_RPC_URL"),
    (SONIC, "SON", "Sonic", "https://sonicscan.org", "S", "Sonic", "SONIC_RPC_URL"),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_chain_ids_are_unique() {
        let mut ids: Vec<_> = KNOWN_CHAINS.iter().map(|c| c.0).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), KNOWN_CHAINS.len());
    }

    #[test]
    fn tx_url_joins_explorer() {
        let chain = ChainMetadata {
            id: 1,
            key: "ETH".into(),
            name: "Ethereum".into(),
            explorer_url: "https://etherscan.io/".into(),
            native_token: TokenInfo::native("ETH", "Ether"),
        };
        assert_eq!(chain.tx_url("0xabc"), "https://etherscan.io/tx/0xabc");
    }
}
