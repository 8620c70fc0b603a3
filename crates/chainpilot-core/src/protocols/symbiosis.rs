//! Same-chain swaps and cross-chain bridging through the Symbiosis router.

use crate::chain::TokenInfo;
use crate::chain_client::ChainRegistry;
use crate::config::SymbiosisConfig;
use crate::erc20;
use crate::error::{PilotError, Result};
use crate::params::{check_amount, Params, ValidationIssue};
use crate::protocol::{ActionDefinition, BuildAction, Protocol, ProtocolMetadata};
use crate::tokens::{ensure_balance, TokenDirectory};
use crate::types::{Action, ActionKind, ArgKind, ChainId, TransactionKind, UnsignedTransaction};
use crate::units::{format_units, parse_amount};
use alloy_primitives::{Address, Bytes, U256};
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

pub const NAME: &str = "symbiosis";

pub use super::transfer::SUPPORTED_CHAINS;

// ---------------------------------------------------------------------------
// Router API
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteToken {
    pub chain_id: ChainId,
    /// Empty for the native token.
    pub address: String,
    pub symbol: String,
    pub decimals: u8,
}

impl RouteToken {
    fn new(chain_id: ChainId, token: &TokenInfo) -> Self {
        Self {
            chain_id,
            address: if token.is_native() {
                String::new()
            } else {
                token.address.to_string()
            },
            symbol: token.symbol.clone(),
            decimals: token.decimals,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteTokenAmount {
    #[serde(flatten)]
    pub token: RouteToken,
    /// Base units, decimal.
    pub amount: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteRequest {
    pub token_amount_in: RouteTokenAmount,
    pub token_out: RouteToken,
    pub from: Address,
    pub to: Address,
    pub slippage: u32,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteTx {
    pub to: Address,
    #[serde(default)]
    pub data: Bytes,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub chain_id: Option<ChainId>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteAmount {
    pub amount: String,
    pub decimals: u8,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteQuote {
    pub approve_to: Address,
    pub tx: RouteTx,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub token_amount_out: Option<RouteAmount>,
}

#[async_trait]
pub trait SwapRouter: Send + Sync {
    async fn quote(&self, request: &RouteRequest) -> Result<RouteQuote>;
}

pub struct SymbiosisClient {
    http: reqwest::Client,
    base_url: String,
}

impl SymbiosisClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl SwapRouter for SymbiosisClient {
    async fn quote(&self, request: &RouteRequest) -> Result<RouteQuote> {
        let url = format!("{}/crosschain/v1/swap", self.base_url.trim_end_matches('/'));
        let response = self.http.post(&url).json(request).send().await?;
        let status = response.status();
        let body: Value = response.json().await?;
        if !status.is_success() {
            let message = body
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("no message");
            return Err(PilotError::ExternalApi(format!(
                "swap route request failed ({status}): {message}"
            )));
        }
        serde_json::from_value(body)
            .map_err(|e| PilotError::ExternalApi(format!("unexpected swap route response: {e}")))
    }
}

fn parse_value(raw: Option<&str>) -> Result<U256> {
    let Some(raw) = raw.map(str::trim).filter(|r| !r.is_empty()) else {
        return Ok(U256::ZERO);
    };
    let parsed = match raw.strip_prefix("0x") {
        Some(hex) if hex.is_empty() => Ok(U256::ZERO),
        Some(hex) => U256::from_str_radix(hex, 16),
        None => U256::from_str_radix(raw, 10),
    };
    parsed.map_err(|e| PilotError::ExternalApi(format!("invalid route value '{raw}': {e}")))
}

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SwapParams {
    /// Token to sell (symbol or address).
    pub token_in: String,
    /// Token to buy (symbol or address).
    pub token_out: String,
    /// Human-readable amount of `tokenIn`.
    pub amount_in: String,
    pub chain_id: ChainId,
    #[schemars(with = "String")]
    pub user_address: Address,
    /// Slippage in basis points.
    #[serde(default)]
    pub slippage: Option<u32>,
}

impl Params for SwapParams {
    fn check(&self) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();
        check_amount("amountIn", &self.amount_in, &mut issues);
        if self.token_in.trim().eq_ignore_ascii_case(self.token_out.trim()) {
            issues.push(ValidationIssue::new("tokenOut", "must differ from tokenIn"));
        }
        issues
    }
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BridgeParams {
    pub token_in: String,
    pub token_out: String,
    pub amount: String,
    pub from_chain_id: ChainId,
    pub to_chain_id: ChainId,
    #[schemars(with = "String")]
    pub user_address: Address,
    #[serde(default)]
    pub slippage: Option<u32>,
}

impl Params for BridgeParams {
    fn check(&self) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();
        check_amount("amount", &self.amount, &mut issues);
        if self.from_chain_id == self.to_chain_id {
            issues.push(ValidationIssue::new("toChainId", "must differ from fromChainId"));
        }
        issues
    }
}

// ---------------------------------------------------------------------------
// Protocol
// ---------------------------------------------------------------------------

struct RoutePlan {
    token_in: TokenInfo,
    token_out: TokenInfo,
    amount_out: Option<String>,
    transactions: Vec<(TransactionKind, UnsignedTransaction)>,
}

pub struct SymbiosisProtocol {
    chains: Arc<ChainRegistry>,
    tokens: Arc<dyn TokenDirectory>,
    router: Arc<dyn SwapRouter>,
    default_slippage: u32,
}

impl SymbiosisProtocol {
    pub fn new(
        chains: Arc<ChainRegistry>,
        tokens: Arc<dyn TokenDirectory>,
        router: Arc<dyn SwapRouter>,
        config: &SymbiosisConfig,
    ) -> Self {
        Self {
            chains,
            tokens,
            router,
            default_slippage: config.default_slippage,
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn plan(
        &self,
        from_chain: ChainId,
        to_chain: ChainId,
        token_in: &str,
        token_out: &str,
        amount: &str,
        user: Address,
        slippage: Option<u32>,
    ) -> Result<RoutePlan> {
        let meta = self.metadata();
        meta.ensure_supported(from_chain)?;
        meta.ensure_supported(to_chain)?;

        let client = self.chains.client(from_chain)?;
        let token_in = self.tokens.resolve(from_chain, token_in).await?;
        let token_out = self.tokens.resolve(to_chain, token_out).await?;
        let amount = parse_amount(amount, token_in.decimals)?;
        ensure_balance(client.as_ref(), &token_in, user, amount).await?;

        let request = RouteRequest {
            token_amount_in: RouteTokenAmount {
                token: RouteToken::new(from_chain, &token_in),
                amount: amount.to_string(),
            },
            token_out: RouteToken::new(to_chain, &token_out),
            from: user,
            to: user,
            slippage: slippage.unwrap_or(self.default_slippage),
        };
        let quote = self.router.quote(&request).await?;
        if quote.kind != "evm" {
            return Err(PilotError::Handler(format!(
                "Route type '{}' is not supported; only EVM routes can be executed",
                quote.kind
            )));
        }
        info!(
            from_chain,
            to_chain,
            token_in = %token_in.symbol,
            token_out = %token_out.symbol,
            "route quoted"
        );

        let mut transactions = Vec::new();
        if !token_in.is_native() {
            let current =
                erc20::allowance(client.as_ref(), token_in.address, user, quote.approve_to).await?;
            if current < amount {
                debug!(%current, %amount, spender = %quote.approve_to, "allowance too low; adding approve");
                transactions.push((
                    TransactionKind::ContractExecution,
                    UnsignedTransaction {
                        chain_id: from_chain,
                        from: user,
                        to: token_in.address,
                        value: U256::ZERO,
                        data: erc20::approve_calldata(quote.approve_to, U256::MAX),
                    },
                ));
            }
        }
        transactions.push((
            TransactionKind::ContractExecution,
            UnsignedTransaction {
                chain_id: quote.tx.chain_id.unwrap_or(from_chain),
                from: user,
                to: quote.tx.to,
                value: parse_value(quote.tx.value.as_deref())?,
                data: quote.tx.data.clone(),
            },
        ));

        let amount_out = match &quote.token_amount_out {
            Some(out) => Some(format_units(parse_value(Some(&out.amount))?, out.decimals)),
            None => None,
        };
        Ok(RoutePlan {
            token_in,
            token_out,
            amount_out,
            transactions,
        })
    }
}

impl Protocol for SymbiosisProtocol {
    fn metadata(&self) -> ProtocolMetadata {
        ProtocolMetadata {
            name: NAME.to_string(),
            description: "Cross-chain liquidity router for swaps and bridging between EVM chains"
                .to_string(),
            supported_chains: SUPPORTED_CHAINS.to_vec(),
        }
    }

    fn actions(self: Arc<Self>) -> Vec<ActionDefinition> {
        vec![
            ActionDefinition::typed::<SwapParams, _>(
                ActionKind::Swap,
                "Swap one token for another on the same chain",
                true,
                self.clone(),
            ),
            ActionDefinition::typed::<BridgeParams, _>(
                ActionKind::Bridge,
                "Move tokens from one chain to another, optionally converting them",
                true,
                self,
            ),
        ]
    }
}

fn finish(mut action: Action, plan: RoutePlan) -> Result<Action> {
    for (kind, tx) in plan.transactions {
        action.push_transaction(kind, tx);
    }
    if let Some(out) = plan.amount_out {
        action = action.arg("Amount Out", ArgKind::Amount, out);
    }
    Ok(action)
}

#[async_trait]
impl BuildAction<SwapParams> for SymbiosisProtocol {
    async fn build(&self, p: SwapParams) -> Result<Action> {
        let plan = self
            .plan(
                p.chain_id,
                p.chain_id,
                &p.token_in,
                &p.token_out,
                &p.amount_in,
                p.user_address,
                p.slippage,
            )
            .await?;
        let action = Action::new(ActionKind::Swap, NAME, p.chain_id)
            .arg("Token In", ArgKind::Token, serde_json::to_value(&plan.token_in)?)
            .arg("Amount In", ArgKind::Amount, p.amount_in.clone())
            .arg("Token Out", ArgKind::Token, serde_json::to_value(&plan.token_out)?);
        finish(action, plan)
    }
}

#[async_trait]
impl BuildAction<BridgeParams> for SymbiosisProtocol {
    async fn build(&self, p: BridgeParams) -> Result<Action> {
        let plan = self
            .plan(
                p.from_chain_id,
                p.to_chain_id,
                &p.token_in,
                &p.token_out,
                &p.amount,
                p.user_address,
                p.slippage,
            )
            .await?;
        let action = Action::new(ActionKind::Bridge, NAME, p.from_chain_id)
            .arg("From Chain", ArgKind::Chain, self.chains.label(p.from_chain_id))
            .arg("To Chain", ArgKind::Chain, self.chains.label(p.to_chain_id))
            .arg("Token In", ArgKind::Token, serde_json::to_value(&plan.token_in)?)
            .arg("Amount In", ArgKind::Amount, p.amount.clone())
            .arg("Token Out", ArgKind::Token, serde_json::to_value(&plan.token_out)?);
        finish(action, plan)
    }
}
