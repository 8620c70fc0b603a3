use crate::chain::TokenInfo;
use crate::chain_client::{ChainClient, ChainRegistry};
use crate::erc20;
use crate::error::{PilotError, Result};
use crate::types::ChainId;
use crate::units::format_units;
use alloy_primitives::{Address, U256};
use async_trait::async_trait;
use std::sync::Arc;

/// Resolves a user-supplied token reference (symbol or address) on a chain.
#[async_trait]
pub trait TokenDirectory: Send + Sync {
    async fn resolve(&self, chain_id: ChainId, token: &str) -> Result<TokenInfo>;
}

/// Configured token lists first, then on-chain ERC-20 metadata for raw addresses.
pub struct ChainTokenDirectory {
    chains: Arc<ChainRegistry>,
}

impl ChainTokenDirectory {
    pub fn new(chains: Arc<ChainRegistry>) -> Self {
        Self { chains }
    }
}

#[async_trait]
impl TokenDirectory for ChainTokenDirectory {
    async fn resolve(&self, chain_id: ChainId, token: &str) -> Result<TokenInfo> {
        let token = token.trim();
        let not_found = || PilotError::TokenNotFound {
            chain_id,
            token: token.to_string(),
        };
        let native = self
            .chains
            .metadata(chain_id)
            .map(|m| m.native_token.clone())
            .ok_or_else(not_found)?;
        let known = self.chains.tokens(chain_id);

        if let Ok(address) = token.parse::<Address>() {
            if address == Address::ZERO {
                return Ok(native);
            }
            if let Some(found) = known.iter().find(|t| t.address == address) {
                return Ok(found.clone());
            }
            let client = self.chains.client(chain_id)?;
            let decimals = erc20::decimals(client.as_ref(), address).await?;
            let symbol = erc20::symbol(client.as_ref(), address)
                .await
                .unwrap_or_else(|_| "UNKNOWN".to_string());
            return Ok(TokenInfo {
                address,
                symbol: symbol.clone(),
                name: symbol,
                decimals,
                logo_uri: None,
            });
        }

        if native.symbol.eq_ignore_ascii_case(token) {
            return Ok(native);
        }
        known
            .iter()
            .find(|t| t.symbol.eq_ignore_ascii_case(token))
            .cloned()
            .ok_or_else(not_found)
    }
}

/// Native balance for the gas token, ERC-20 `balanceOf` otherwise.
pub async fn balance_of(client: &dyn ChainClient, token: &TokenInfo, owner: Address) -> Result<U256> {
    if token.is_native() {
        client.balance(owner).await
    } else {
        erc20::balance_of(client, token.address, owner).await
    }
}

pub async fn ensure_balance(
    client: &dyn ChainClient,
    token: &TokenInfo,
    owner: Address,
    required: U256,
) -> Result<()> {
    let available = balance_of(client, token, owner).await?;
    if available < required {
        return Err(PilotError::Handler(format!(
            "Insufficient {sym} balance. Required: {req} {sym}, available: {avail} {sym}",
            sym = token.symbol,
            req = format_units(required, token.decimals),
            avail = format_units(available, token.decimals),
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{chain_registry, MockChain, USDC};

    fn directory(chain: MockChain) -> ChainTokenDirectory {
        ChainTokenDirectory::new(Arc::new(chain_registry(vec![chain])))
    }

    #[tokio::test]
    async fn resolves_native_by_symbol_and_zero_address() {
        let dir = directory(MockChain::new(1));
        assert!(dir.resolve(1, "eth").await.unwrap().is_native());
        assert!(dir
            .resolve(1, "0x0000000000000000000000000000000000000000")
            .await
            .unwrap()
            .is_native());
    }

    #[tokio::test]
    async fn resolves_known_token_by_symbol() {
        let dir = directory(MockChain::new(1));
        let usdc = dir.resolve(1, "USDC").await.unwrap();
        assert_eq!(usdc.address, USDC);
        assert_eq!(usdc.decimals, 6);
    }

    #[tokio::test]
    async fn reads_unknown_address_metadata_on_chain() {
        let chain = MockChain::new(1);
        let token = Address::repeat_byte(0x42);
        chain.set_token_metadata(token, "ZRO", 9);
        let dir = directory(chain);
        let info = dir.resolve(1, &token.to_string()).await.unwrap();
        assert_eq!(info.symbol, "ZRO");
        assert_eq!(info.decimals, 9);
    }

    #[tokio::test]
    async fn unknown_symbol_is_token_not_found() {
        let dir = directory(MockChain::new(1));
        let err = dir.resolve(1, "DOGE").await.unwrap_err();
        assert!(matches!(err, PilotError::TokenNotFound { chain_id: 1, .. }));
        assert!(dir.resolve(999, "ETH").await.is_err());
    }

    #[tokio::test]
    async fn ensure_balance_reports_shortfall() {
        let chain = MockChain::new(1);
        let owner = Address::repeat_byte(7);
        chain.set_native_balance(owner, U256::from(5u64) * U256::from(10u64).pow(U256::from(17u64)));
        let native = TokenInfo::native("ETH", "Ether");
        let err = ensure_balance(&chain, &native, owner, U256::from(10u64).pow(U256::from(18u64)))
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Insufficient ETH balance. Required: 1 ETH, available: 0.5 ETH"
        );
    }
}
