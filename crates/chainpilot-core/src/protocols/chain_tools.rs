//! Read-only chain lookups exposed as tools.

use crate::chain_client::ChainRegistry;
use crate::error::Result;
use crate::params::Params;
use crate::tokens::{balance_of, TokenDirectory};
use crate::tools::{typed_tool, CallTool, Tool, ToolProvider};
use crate::types::ChainId;
use crate::units::format_units;
use alloy_primitives::{Address, B256};
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

pub const OWNER: &str = "chain";

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransactionQuery {
    pub chain_id: ChainId,
    #[schemars(with = "String")]
    pub hash: B256,
}

impl Params for TransactionQuery {}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BalanceQuery {
    pub chain_id: ChainId,
    #[schemars(with = "String")]
    pub address: Address,
    /// Token symbol or address; omitted means the native token.
    #[serde(default)]
    pub token: Option<String>,
}

impl Params for BalanceQuery {}

pub struct ChainTools {
    chains: Arc<ChainRegistry>,
    tokens: Arc<dyn TokenDirectory>,
}

impl ChainTools {
    pub fn new(chains: Arc<ChainRegistry>, tokens: Arc<dyn TokenDirectory>) -> Self {
        Self { chains, tokens }
    }
}

impl ToolProvider for ChainTools {
    fn owner(&self) -> &str {
        OWNER
    }

    fn tools(self: Arc<Self>) -> Vec<Box<dyn Tool>> {
        vec![
            typed_tool::<TransactionQuery, _>(
                "get_transaction",
                "Look up a transaction and its receipt by hash",
                self.clone(),
            ),
            typed_tool::<BalanceQuery, _>(
                "get_balance",
                "Get the native or ERC-20 token balance of an address",
                self,
            ),
        ]
    }
}

#[async_trait]
impl CallTool<TransactionQuery> for ChainTools {
    async fn call(&self, q: TransactionQuery) -> Result<Value> {
        let client = self.chains.client(q.chain_id)?;
        let tx = client.transaction_by_hash(q.hash).await?;
        let receipt = client.receipt(q.hash).await?;
        let status = match (&tx, &receipt) {
            (_, Some(r)) if r.success => "confirmed",
            (_, Some(_)) => "failed",
            (Some(_), None) => "pending",
            (None, None) => "not_found",
        };
        let explorer = self
            .chains
            .metadata(q.chain_id)
            .map(|m| m.tx_url(&q.hash.to_string()));
        Ok(json!({
            "status": status,
            "transaction": tx,
            "receipt": receipt,
            "explorerUrl": explorer,
        }))
    }
}

#[async_trait]
impl CallTool<BalanceQuery> for ChainTools {
    async fn call(&self, q: BalanceQuery) -> Result<Value> {
        let client = self.chains.client(q.chain_id)?;
        let reference = q.token.as_deref().unwrap_or("0x0000000000000000000000000000000000000000");
        let token = self.tokens.resolve(q.chain_id, reference).await?;
        let raw = balance_of(client.as_ref(), &token, q.address).await?;
        Ok(json!({
            "token": token,
            "balance": format_units(raw, token.decimals),
            "raw": raw.to_string(),
        }))
    }
}
