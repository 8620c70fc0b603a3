use crate::chain::{ChainMetadata, TokenInfo};
use crate::config::Config;
use crate::error::{PilotError, Result};
use crate::types::{ChainId, UnsignedTransaction};
use alloy::consensus::Transaction as ConsensusTx;
use alloy::eips::BlockNumberOrTag;
use alloy::network::{ReceiptResponse, TransactionResponse};
use alloy::providers::{Provider, RootProvider};
use alloy::rpc::types::{TransactionInput, TransactionRequest};
use alloy_primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

// ---------------------------------------------------------------------------
// Chain client contract
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeData {
    pub gas_price: u128,
    /// None when the node exposes no EIP-1559 fee market.
    pub max_fee_per_gas: Option<u128>,
    pub max_priority_fee_per_gas: Option<u128>,
}

pub const ONE_GWEI: u128 = 1_000_000_000;

impl FeeData {
    /// Node-provided EIP-1559 fees, else 120% of the legacy price with a 1 gwei tip.
    pub fn eip1559(&self) -> (u128, u128) {
        match (self.max_fee_per_gas, self.max_priority_fee_per_gas) {
            (Some(max_fee), Some(tip)) => (max_fee, tip),
            _ => {
                let max_fee = self.gas_price.saturating_mul(120) / 100;
                (max_fee, ONE_GWEI.min(max_fee))
            }
        }
    }
}

/// Gas limit and EIP-1559 pricing for one transaction; `fee` is the worst-case cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeEstimate {
    pub gas_limit: u64,
    pub max_fee_per_gas: u128,
    pub max_priority_fee_per_gas: u128,
    pub fee: U256,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionInfo {
    pub hash: B256,
    pub from: Address,
    #[serde(default)]
    pub to: Option<Address>,
    pub value: U256,
    pub nonce: u64,
    #[serde(default)]
    pub block_number: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub block_number: u64,
    pub success: bool,
    pub gas_used: u64,
}

#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn nonce(&self, address: Address) -> Result<u64>;
    async fn fee_data(&self) -> Result<FeeData>;
    async fn estimate_gas(&self, tx: &UnsignedTransaction) -> Result<u64>;
    async fn balance(&self, address: Address) -> Result<U256>;
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes>;
    async fn broadcast(&self, signed: &Bytes) -> Result<B256>;
    async fn transaction_by_hash(&self, hash: B256) -> Result<Option<TransactionInfo>>;
    async fn receipt(&self, hash: B256) -> Result<Option<Receipt>>;
    async fn block_number(&self) -> Result<u64>;

    /// A rejected `estimate_gas` surfaces as [`PilotError::FeeEstimation`].
    async fn estimate_fee(&self, tx: &UnsignedTransaction) -> Result<FeeEstimate> {
        let gas_limit = self
            .estimate_gas(tx)
            .await
            .map_err(|e| PilotError::FeeEstimation(e.to_string()))?;
        let (max_fee_per_gas, max_priority_fee_per_gas) = self.fee_data().await?.eip1559();
        Ok(FeeEstimate {
            gas_limit,
            max_fee_per_gas,
            max_priority_fee_per_gas,
            fee: U256::from(gas_limit) * U256::from(max_fee_per_gas),
        })
    }
}

// ---------------------------------------------------------------------------
// JSON-RPC implementation
// ---------------------------------------------------------------------------

/// [`ChainClient`] over an HTTP JSON-RPC endpoint.
pub struct JsonRpcClient {
    provider: RootProvider,
    url: String,
}

impl JsonRpcClient {
    pub fn new(url: &str) -> Result<Self> {
        let parsed = url
            .parse::<reqwest::Url>()
            .map_err(|e| PilotError::Config(format!("invalid RPC URL '{url}': {e}")))?;
        Ok(Self {
            provider: RootProvider::new_http(parsed),
            url: url.to_string(),
        })
    }
}

fn rpc_error<E: std::fmt::Display>(method: &'static str) -> impl Fn(E) -> PilotError {
    move |e| PilotError::Rpc(format!("{method}: {e}"))
}

fn tx_request(tx: &UnsignedTransaction) -> TransactionRequest {
    TransactionRequest::default()
        .from(tx.from)
        .to(tx.to)
        .value(tx.value)
        .input(TransactionInput::new(tx.data.clone()))
}

#[async_trait]
impl ChainClient for JsonRpcClient {
    async fn nonce(&self, address: Address) -> Result<u64> {
        self.provider
            .get_transaction_count(address)
            .pending()
            .await
            .map_err(rpc_error("eth_getTransactionCount"))
    }

    async fn fee_data(&self) -> Result<FeeData> {
        let gas_price = self
            .provider
            .get_gas_price()
            .await
            .map_err(rpc_error("eth_gasPrice"))?;
        let priority = match self.provider.get_max_priority_fee_per_gas().await {
            Ok(tip) => Some(tip),
            Err(e) => {
                debug!(url = %self.url, error = %e, "node has no eip-1559 priority fee");
                None
            }
        };
        let max_fee = match priority {
            Some(tip) => {
                let block = self
                    .provider
                    .get_block_by_number(BlockNumberOrTag::Latest)
                    .await
                    .map_err(rpc_error("eth_getBlockByNumber"))?;
                block
                    .and_then(|b| b.header.base_fee_per_gas)
                    .map(|base| u128::from(base).saturating_mul(2).saturating_add(tip))
            }
            None => None,
        };
        Ok(FeeData {
            gas_price,
            max_fee_per_gas: max_fee,
            max_priority_fee_per_gas: max_fee.and(priority),
        })
    }

    async fn estimate_gas(&self, tx: &UnsignedTransaction) -> Result<u64> {
        self.provider
            .estimate_gas(tx_request(tx))
            .await
            .map_err(rpc_error("eth_estimateGas"))
    }

    async fn balance(&self, address: Address) -> Result<U256> {
        self.provider
            .get_balance(address)
            .await
            .map_err(rpc_error("eth_getBalance"))
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes> {
        let request = TransactionRequest::default()
            .to(to)
            .input(TransactionInput::new(data));
        self.provider
            .call(request)
            .await
            .map_err(rpc_error("eth_call"))
    }

    async fn broadcast(&self, signed: &Bytes) -> Result<B256> {
        let pending = self
            .provider
            .send_raw_transaction(signed)
            .await
            .map_err(|e| PilotError::Broadcast(e.to_string()))?;
        Ok(*pending.tx_hash())
    }

    async fn transaction_by_hash(&self, hash: B256) -> Result<Option<TransactionInfo>> {
        let tx = self
            .provider
            .get_transaction_by_hash(hash)
            .await
            .map_err(rpc_error("eth_getTransactionByHash"))?;
        Ok(tx.map(|tx| TransactionInfo {
            hash,
            from: TransactionResponse::from(&tx),
            to: ConsensusTx::to(&tx),
            value: ConsensusTx::value(&tx),
            nonce: ConsensusTx::nonce(&tx),
            block_number: TransactionResponse::block_number(&tx),
        }))
    }

    async fn receipt(&self, hash: B256) -> Result<Option<Receipt>> {
        let receipt = self
            .provider
            .get_transaction_receipt(hash)
            .await
            .map_err(rpc_error("eth_getTransactionReceipt"))?;
        Ok(receipt.map(|r| Receipt {
            block_number: ReceiptResponse::block_number(&r).unwrap_or_default(),
            success: ReceiptResponse::status(&r),
            gas_used: ReceiptResponse::gas_used(&r),
        }))
    }

    async fn block_number(&self) -> Result<u64> {
        self.provider
            .get_block_number()
            .await
            .map_err(rpc_error("eth_blockNumber"))
    }
}

// ---------------------------------------------------------------------------
// ChainRegistry
// ---------------------------------------------------------------------------

struct ChainEntry {
    metadata: ChainMetadata,
    client: Option<Arc<dyn ChainClient>>,
    tokens: Vec<TokenInfo>,
}

/// Chain metadata, known tokens and RPC clients keyed by chain id.
#[derive(Default)]
pub struct ChainRegistry {
    entries: BTreeMap<ChainId, ChainEntry>,
}

impl ChainRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &Config) -> Self {
        let mut registry = Self::new();
        for chain in &config.chains {
            let client: Option<Arc<dyn ChainClient>> = match chain.rpc_url().as_deref().map(JsonRpcClient::new) {
                Some(Ok(client)) => Some(Arc::new(client)),
                Some(Err(e)) => {
                    warn!(chain_id = chain.id, error = %e, "unusable RPC URL; chain is read-only metadata");
                    None
                }
                None => {
                    warn!(chain_id = chain.id, "no RPC URL configured; chain is read-only metadata");
                    None
                }
            };
            registry.insert(chain.metadata(), client, chain.tokens.clone());
        }
        registry
    }

    pub fn insert(
        &mut self,
        metadata: ChainMetadata,
        client: Option<Arc<dyn ChainClient>>,
        tokens: Vec<TokenInfo>,
    ) {
        self.entries.insert(
            metadata.id,
            ChainEntry {
                metadata,
                client,
                tokens,
            },
        );
    }

    pub fn client(&self, chain_id: ChainId) -> Result<Arc<dyn ChainClient>> {
        self.entries
            .get(&chain_id)
            .and_then(|e| e.client.clone())
            .ok_or(PilotError::ChainNotConfigured(chain_id))
    }

    pub fn metadata(&self, chain_id: ChainId) -> Option<&ChainMetadata> {
        self.entries.get(&chain_id).map(|e| &e.metadata)
    }

    pub fn tokens(&self, chain_id: ChainId) -> &[TokenInfo] {
        self.entries
            .get(&chain_id)
            .map(|e| e.tokens.as_slice())
            .unwrap_or(&[])
    }

    /// Human-readable chain label, e.g. `Arbitrum (42161)`.
    pub fn label(&self, chain_id: ChainId) -> String {
        match self.metadata(chain_id) {
            Some(m) => format!("{} ({})", m.name, chain_id),
            None => chain_id.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockChain;
    use mockito::Matcher;
    use serde_json::json;

    fn tx() -> UnsignedTransaction {
        UnsignedTransaction {
            chain_id: 1,
            from: Address::repeat_byte(1),
            to: Address::repeat_byte(2),
            value: U256::from(10u64),
            data: Bytes::new(),
        }
    }

    #[tokio::test]
    async fn nonce_reads_pending_count() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/")
            .match_body(Matcher::PartialJson(json!({"method": "eth_getTransactionCount"})))
            .with_body(r#"{"jsonrpc":"2.0","id":0,"result":"0x1a"}"#)
            .create_async()
            .await;
        let client = JsonRpcClient::new(&server.url()).unwrap();
        assert_eq!(client.nonce(Address::repeat_byte(1)).await.unwrap(), 26);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn rpc_error_surfaces_message() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .with_body(r#"{"jsonrpc":"2.0","id":0,"error":{"code":-32000,"message":"insufficient funds for gas"}}"#)
            .create_async()
            .await;
        let client = JsonRpcClient::new(&server.url()).unwrap();
        let err = client.estimate_gas(&tx()).await.unwrap_err();
        assert!(err.to_string().contains("insufficient funds for gas"));
    }

    #[tokio::test]
    async fn broadcast_errors_are_broadcast_errors() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .with_body(r#"{"jsonrpc":"2.0","id":0,"error":{"code":-32000,"message":"nonce too low"}}"#)
            .create_async()
            .await;
        let client = JsonRpcClient::new(&server.url()).unwrap();
        let err = client.broadcast(&Bytes::from(vec![1u8, 2])).await.unwrap_err();
        assert!(matches!(err, PilotError::Broadcast(_)));
    }

    #[tokio::test]
    async fn fee_data_falls_back_without_eip1559() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .match_body(Matcher::PartialJson(json!({"method": "eth_gasPrice"})))
            .with_body(r#"{"jsonrpc":"2.0","id":0,"result":"0x3b9aca00"}"#)
            .create_async()
            .await;
        server
            .mock("POST", "/")
            .match_body(Matcher::PartialJson(json!({"method": "eth_maxPriorityFeePerGas"})))
            .with_body(r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32601,"message":"method not found"}}"#)
            .create_async()
            .await;
        let client = JsonRpcClient::new(&server.url()).unwrap();
        let fees = client.fee_data().await.unwrap();
        assert_eq!(fees.gas_price, 1_000_000_000);
        assert_eq!(fees.max_fee_per_gas, None);
        assert_eq!(fees.max_priority_fee_per_gas, None);
    }

    #[test]
    fn eip1559_prefers_node_values() {
        let fees = FeeData {
            gas_price: 5,
            max_fee_per_gas: Some(40),
            max_priority_fee_per_gas: Some(2),
        };
        assert_eq!(fees.eip1559(), (40, 2));
    }

    #[test]
    fn legacy_fallback_caps_tip_at_max_fee() {
        let fees = FeeData {
            gas_price: 100,
            max_fee_per_gas: None,
            max_priority_fee_per_gas: None,
        };
        assert_eq!(fees.eip1559(), (120, 120));
    }

    #[tokio::test]
    async fn estimate_fee_prices_gas_at_max_fee() {
        let chain = MockChain::new(1);
        chain.set_fee_data(FeeData {
            gas_price: 10 * ONE_GWEI,
            max_fee_per_gas: None,
            max_priority_fee_per_gas: None,
        });
        let estimate = chain.estimate_fee(&tx()).await.unwrap();
        assert_eq!(estimate.gas_limit, 21_000);
        assert_eq!(estimate.max_fee_per_gas, 12 * ONE_GWEI);
        assert_eq!(estimate.max_priority_fee_per_gas, ONE_GWEI);
        assert_eq!(estimate.fee, U256::from(21_000u128 * 12 * ONE_GWEI));

        chain.fail_estimate_for(tx().to);
        assert!(matches!(
            chain.estimate_fee(&tx()).await,
            Err(PilotError::FeeEstimation(m)) if m.contains("execution reverted")
        ));
    }

    #[test]
    fn invalid_rpc_url_is_a_config_error() {
        assert!(matches!(
            JsonRpcClient::new("not a url"),
            Err(PilotError::Config(_))
        ));
    }

    #[tokio::test]
    async fn missing_transaction_is_none() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .with_body(r#"{"jsonrpc":"2.0","id":0,"result":null}"#)
            .create_async()
            .await;
        let client = JsonRpcClient::new(&server.url()).unwrap();
        assert!(client.transaction_by_hash(B256::ZERO).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn receipt_status_maps_to_success() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .with_body(
                json!({
                    "jsonrpc": "2.0",
                    "id": 0,
                    "result": {
                        "transactionHash": B256::ZERO,
                        "transactionIndex": "0x0",
                        "blockHash": B256::repeat_byte(0x11),
                        "blockNumber": "0x64",
                        "from": Address::repeat_byte(1),
                        "to": Address::repeat_byte(2),
                        "cumulativeGasUsed": "0x5208",
                        "gasUsed": "0x5208",
                        "effectiveGasPrice": "0x3b9aca00",
                        "contractAddress": null,
                        "logs": [],
                        "logsBloom": format!("0x{}", "0".repeat(512)),
                        "type": "0x2",
                        "status": "0x0"
                    }
                })
                .to_string(),
            )
            .create_async()
            .await;
        let client = JsonRpcClient::new(&server.url()).unwrap();
        let receipt = client.receipt(B256::ZERO).await.unwrap().unwrap();
        assert_eq!(receipt.block_number, 100);
        assert!(!receipt.success);
        assert_eq!(receipt.gas_used, 21000);
    }

    #[test]
    fn registry_without_client_reports_chain_not_configured() {
        let mut registry = ChainRegistry::new();
        registry.insert(
            ChainMetadata {
                id: 10,
                key: "OPT".into(),
                name: "Optimism".into(),
                explorer_url: String::new(),
                native_token: TokenInfo::native("ETH", "Ether"),
            },
            None,
            Vec::new(),
        );
        assert!(matches!(
            registry.client(10),
            Err(PilotError::ChainNotConfigured(10))
        ));
        assert_eq!(registry.label(10), "Optimism (10)");
        assert_eq!(registry.label(99), "99");
    }
}
