//! Options venue: buying option positions against concentrated-liquidity
//! strikes and exercising them through a swapper.

use super::strike::{self, MarketToken, StrikeEntry};
use crate::chain::{TokenInfo, ARBITRUM, BASE, SONIC};
use crate::chain_client::ChainRegistry;
use crate::config::StrykeConfig;
use crate::erc20;
use crate::error::{PilotError, Result};
use crate::params::{check_amount, Params, ValidationIssue};
use crate::protocol::{ActionDefinition, BuildAction, Protocol, ProtocolMetadata};
use crate::tools::{typed_tool, CallTool, Tool, ToolProvider};
use crate::types::{Action, ActionKind, ArgKind, ChainId, TransactionKind, UnsignedTransaction};
use crate::units::{format_units, parse_amount};
use alloy_primitives::aliases::I24;
use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::{sol, SolCall};
use async_trait::async_trait;
use regex::Regex;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Arc, OnceLock};
use tracing::{debug, info};

pub const NAME: &str = "stryke";

pub const SUPPORTED_CHAINS: &[ChainId] = &[ARBITRUM, SONIC, BASE];

sol! {
    struct OptionTick {
        address handler;
        address pool;
        address hook;
        int24 tickLower;
        int24 tickUpper;
        uint256 liquidityToUse;
    }

    struct OptionParams {
        OptionTick[] optionTicks;
        int24 tickLower;
        int24 tickUpper;
        uint256 ttl;
        bool isCall;
        uint256 maxCostAllowance;
    }

    interface IOptionMarket {
        function mintOption(OptionParams params) external;
    }
}

static TICKER_RE: OnceLock<Regex> = OnceLock::new();

fn ticker_re() -> &'static Regex {
    TICKER_RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9]+/[A-Za-z0-9.]+$").unwrap())
}

// ---------------------------------------------------------------------------
// Enumerations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum Expiry {
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "2h")]
    TwoHours,
    #[serde(rename = "6h")]
    SixHours,
    #[serde(rename = "12h")]
    TwelveHours,
    #[serde(rename = "24h")]
    OneDay,
    #[serde(rename = "2d")]
    TwoDays,
    #[serde(rename = "6d")]
    SixDays,
    #[serde(rename = "1w")]
    OneWeek,
}

impl Expiry {
    pub fn as_str(self) -> &'static str {
        match self {
            Expiry::OneHour => "1h",
            Expiry::TwoHours => "2h",
            Expiry::SixHours => "6h",
            Expiry::TwelveHours => "12h",
            Expiry::OneDay => "24h",
            Expiry::TwoDays => "2d",
            Expiry::SixDays => "6d",
            Expiry::OneWeek => "1w",
        }
    }

    pub fn ttl_secs(self) -> u64 {
        const HOUR: u64 = 60 * 60;
        const DAY: u64 = HOUR * 24;
        match self {
            Expiry::OneHour => HOUR,
            Expiry::TwoHours => HOUR * 2,
            Expiry::SixHours => HOUR * 6,
            Expiry::TwelveHours => HOUR * 12,
            Expiry::OneDay => DAY,
            Expiry::TwoDays => DAY * 2,
            Expiry::SixDays => DAY * 6,
            Expiry::OneWeek => DAY * 7,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum OptionType {
    Call,
    Put,
}

impl OptionType {
    pub fn as_str(self) -> &'static str {
        match self {
            OptionType::Call => "call",
            OptionType::Put => "put",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Swapper {
    Pancakeswap,
    Uniswap,
    Sushiswap,
    Thruster,
    Agni,
    Fusionx,
    #[serde(rename = "0x")]
    ZeroEx,
    Odos,
    #[serde(rename = "1inch")]
    OneInch,
    Paraswap,
    Kyberswap,
    Openocean,
}

impl Swapper {
    pub fn as_str(self) -> &'static str {
        match self {
            Swapper::Pancakeswap => "pancakeswap",
            Swapper::Uniswap => "uniswap",
            Swapper::Sushiswap => "sushiswap",
            Swapper::Thruster => "thruster",
            Swapper::Agni => "agni",
            Swapper::Fusionx => "fusionx",
            Swapper::ZeroEx => "0x",
            Swapper::Odos => "odos",
            Swapper::OneInch => "1inch",
            Swapper::Paraswap => "paraswap",
            Swapper::Kyberswap => "kyberswap",
            Swapper::Openocean => "openocean",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum Reach {
    #[serde(rename = "100")]
    Hundred,
    #[serde(rename = "200")]
    TwoHundred,
}

impl Reach {
    pub fn as_str(self) -> &'static str {
        match self {
            Reach::Hundred => "100",
            Reach::TwoHundred => "200",
        }
    }
}

// ---------------------------------------------------------------------------
// Options market API
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionMarket {
    #[serde(default)]
    pub deprecated: bool,
    pub address: Address,
    pub pair_name: String,
    pub ticker: String,
    pub call_token: MarketToken,
    pub put_token: MarketToken,
    #[serde(default)]
    pub total_premium: String,
    #[serde(default)]
    pub total_volume: String,
    #[serde(default)]
    pub total_fees: String,
}

impl OptionMarket {
    pub fn token(&self, kind: OptionType) -> &MarketToken {
        match kind {
            OptionType::Call => &self.call_token,
            OptionType::Put => &self.put_token,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuoteRequest {
    pub chain_id: ChainId,
    pub option_market: Address,
    pub user: Address,
    pub strike: f64,
    pub kind: OptionType,
    pub amount: f64,
    pub ttl: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseQuote {
    pub premium: String,
    pub fees: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<MarketToken>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExerciseRequest {
    pub chain_id: ChainId,
    pub option_market: Address,
    pub option_id: u64,
    pub swapper: Swapper,
    pub slippage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExerciseTx {
    pub to: Address,
    pub data: Bytes,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExercisePreparation {
    pub profit: String,
    /// Address of the token the profit is paid in.
    pub token: String,
    #[serde(default)]
    pub swap_data: Vec<String>,
    #[serde(default)]
    pub swappers: Vec<String>,
    pub tx: ExerciseTx,
}

#[async_trait]
pub trait OptionsMarketApi: Send + Sync {
    async fn option_markets(&self, chain_ids: &[ChainId]) -> Result<Vec<OptionMarket>>;
    async fn strikes_chain(
        &self,
        chain_id: ChainId,
        market: Address,
        calls_reach: Reach,
        puts_reach: Reach,
    ) -> Result<Vec<StrikeEntry>>;
    async fn purchase_quote(&self, request: &QuoteRequest) -> Result<PurchaseQuote>;
    async fn prepare_exercise(&self, request: &ExerciseRequest) -> Result<ExercisePreparation>;
    async fn positions(&self, chain_id: ChainId, market: Address, user: Address) -> Result<Vec<Value>>;
}

pub struct StrykeClient {
    http: reqwest::Client,
    base_url: String,
}

impl StrykeClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    async fn get<T: DeserializeOwned>(&self, what: &str, path: &str, query: &[(&str, String)]) -> Result<T> {
        let url = format!("{}{}", self.base_url.trim_end_matches('/'), path);
        let response = self.http.get(&url).query(query).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PilotError::ExternalApi(format!(
                "Failed to fetch {what}: {status} - {body}"
            )));
        }
        response
            .json()
            .await
            .map_err(|e| PilotError::ExternalApi(format!("unexpected {what} response: {e}")))
    }
}

#[async_trait]
impl OptionsMarketApi for StrykeClient {
    async fn option_markets(&self, chain_ids: &[ChainId]) -> Result<Vec<OptionMarket>> {
        match chain_ids {
            [single] => {
                self.get("option markets", "/clamm/option-markets", &[("chainId", single.to_string())])
                    .await
            }
            many => {
                let chains = many.iter().map(ChainId::to_string).collect::<Vec<_>>().join(",");
                self.get("option markets", "/v1.1/clamm/option-markets", &[("chains", chains)])
                    .await
            }
        }
    }

    async fn strikes_chain(
        &self,
        chain_id: ChainId,
        market: Address,
        calls_reach: Reach,
        puts_reach: Reach,
    ) -> Result<Vec<StrikeEntry>> {
        self.get(
            "strikes chain",
            "/clamm/strikes-chain",
            &[
                ("optionMarket", market.to_string()),
                ("chainId", chain_id.to_string()),
                ("callsReach", calls_reach.as_str().to_string()),
                ("putsReach", puts_reach.as_str().to_string()),
            ],
        )
        .await
    }

    async fn purchase_quote(&self, request: &QuoteRequest) -> Result<PurchaseQuote> {
        self.get(
            "purchase quote",
            "/clamm/purchase/quote",
            &[
                ("chainId", request.chain_id.to_string()),
                ("optionMarket", request.option_market.to_string()),
                ("user", request.user.to_string()),
                ("strike", request.strike.to_string()),
                ("type", request.kind.as_str().to_string()),
                ("amount", request.amount.to_string()),
                ("ttl", request.ttl.to_string()),
            ],
        )
        .await
    }

    async fn prepare_exercise(&self, request: &ExerciseRequest) -> Result<ExercisePreparation> {
        self.get(
            "exercise preparation",
            "/clamm/exercise/prepare",
            &[
                ("chainId", request.chain_id.to_string()),
                ("optionMarket", request.option_market.to_string()),
                ("optionId", request.option_id.to_string()),
                ("swapperId", request.swapper.as_str().to_string()),
                ("slippage", request.slippage.to_string()),
            ],
        )
        .await
    }

    async fn positions(&self, chain_id: ChainId, market: Address, user: Address) -> Result<Vec<Value>> {
        self.get(
            "current positions",
            "/clamm/purchase/positions",
            &[
                ("chainId", chain_id.to_string()),
                ("optionMarket", market.to_string()),
                ("user", user.to_string()),
                ("first", "100".to_string()),
                ("skip", "0".to_string()),
            ],
        )
        .await
    }
}

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

fn check_ticker(path: &str, ticker: &str, issues: &mut Vec<ValidationIssue>) {
    if !ticker_re().is_match(ticker) {
        issues.push(ValidationIssue::new(
            path,
            "Market pair must be in format TOKEN/TOKEN (e.g., wS/USDC.e)",
        ));
    }
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OpenParams {
    pub chain_id: ChainId,
    /// Market pair in format TOKENx/TOKENy, e.g. "WETH/USDC".
    pub option_market: String,
    pub is_call: bool,
    pub expiration: Expiry,
    /// Option size in the call or put token.
    pub amount: String,
    /// Desired strike price; the closest listed strike is used.
    pub target_price: String,
    /// Maximum relative distance between target and strike (0.05 = 5%).
    #[serde(default)]
    pub max_difference: Option<f64>,
    #[schemars(with = "String")]
    pub user_address: Address,
}

impl Params for OpenParams {
    fn check(&self) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();
        check_ticker("optionMarket", &self.option_market, &mut issues);
        check_amount("amount", &self.amount, &mut issues);
        check_amount("targetPrice", &self.target_price, &mut issues);
        if let Some(d) = self.max_difference {
            if !d.is_finite() || d <= 0.0 {
                issues.push(ValidationIssue::new("maxDifference", "must be a positive fraction"));
            }
        }
        issues
    }
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CloseParams {
    pub chain_id: ChainId,
    pub option_market: String,
    /// ERC-721 token id of the option position.
    pub option_id: u64,
    #[serde(rename = "swapperId")]
    pub swapper: Swapper,
    /// Max slippage in percent; defaults to 0.5.
    #[serde(default)]
    pub slippage: Option<f64>,
    #[schemars(with = "String")]
    pub user_address: Address,
}

impl Params for CloseParams {
    fn check(&self) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();
        check_ticker("optionMarket", &self.option_market, &mut issues);
        if self.option_id == 0 {
            issues.push(ValidationIssue::new("optionId", "must be positive"));
        }
        if let Some(s) = self.slippage {
            if !s.is_finite() || s < 0.0 {
                issues.push(ValidationIssue::new("slippage", "must not be negative"));
            }
        }
        issues
    }
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MarketsQuery {
    pub chain_ids: Vec<ChainId>,
}

impl Params for MarketsQuery {
    fn check(&self) -> Vec<ValidationIssue> {
        if self.chain_ids.is_empty() {
            vec![ValidationIssue::new("chainIds", "At least one chain ID must be specified")]
        } else {
            Vec::new()
        }
    }
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StrikesQuery {
    pub chain_id: ChainId,
    pub option_market: String,
    pub calls_reach: Reach,
    pub puts_reach: Reach,
}

impl Params for StrikesQuery {}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct QuoteQuery {
    pub chain_id: ChainId,
    pub option_market: String,
    #[schemars(with = "String")]
    pub user_address: Address,
    pub strike: f64,
    #[serde(rename = "type")]
    pub kind: OptionType,
    pub amount: f64,
    pub expiration: Expiry,
}

impl Params for QuoteQuery {
    fn check(&self) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();
        if self.amount.is_nan() || self.amount <= 0.0 {
            issues.push(ValidationIssue::new("amount", "Invalid amount"));
        }
        if self.strike.is_nan() || self.strike <= 0.0 {
            issues.push(ValidationIssue::new("strike", "must be positive"));
        }
        issues
    }
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PositionsQuery {
    pub chain_id: ChainId,
    pub option_market: String,
    #[schemars(with = "String")]
    pub user_address: Address,
}

impl Params for PositionsQuery {}

// ---------------------------------------------------------------------------
// Protocol
// ---------------------------------------------------------------------------

pub struct StrykeProtocol {
    chains: Arc<ChainRegistry>,
    api: Arc<dyn OptionsMarketApi>,
    default_tolerance: f64,
}

impl StrykeProtocol {
    pub fn new(chains: Arc<ChainRegistry>, api: Arc<dyn OptionsMarketApi>, config: &StrykeConfig) -> Self {
        Self {
            chains,
            api,
            default_tolerance: config.default_tolerance,
        }
    }

    async fn market(&self, chain_id: ChainId, ticker: &str) -> Result<OptionMarket> {
        let markets = self.api.option_markets(&[chain_id]).await?;
        let available = markets
            .iter()
            .map(|m| m.pair_name.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        markets
            .into_iter()
            .find(|m| m.ticker.eq_ignore_ascii_case(ticker))
            .ok_or_else(|| {
                PilotError::Handler(format!(
                    "Option market {ticker} not found. Available markets: {available}"
                ))
            })
    }
}

impl Protocol for StrykeProtocol {
    fn metadata(&self) -> ProtocolMetadata {
        ProtocolMetadata {
            name: NAME.to_string(),
            description: "Concentrated-liquidity options: buy calls and puts, exercise positions"
                .to_string(),
            supported_chains: SUPPORTED_CHAINS.to_vec(),
        }
    }

    fn actions(self: Arc<Self>) -> Vec<ActionDefinition> {
        vec![
            ActionDefinition::typed::<OpenParams, _>(
                ActionKind::Open,
                "Open an option position at the listed strike closest to a target price",
                true,
                self.clone(),
            ),
            ActionDefinition::typed::<CloseParams, _>(
                ActionKind::Close,
                "Close (exercise) an option position, swapping through the chosen swapper",
                true,
                self,
            ),
        ]
    }
}

fn market_token_info(token: &MarketToken) -> TokenInfo {
    TokenInfo {
        address: token.address,
        symbol: token.symbol.clone(),
        name: token.symbol.clone(),
        decimals: token.decimals,
        logo_uri: None,
    }
}

/// Base-unit API amount rendered with at most four decimals.
fn display_amount(raw: &str, decimals: u8) -> Result<String> {
    let value = U256::from_str_radix(raw.trim(), 10)
        .map_err(|e| PilotError::ExternalApi(format!("invalid amount '{raw}': {e}")))?;
    let full = format_units(value, decimals);
    Ok(match full.split_once('.') {
        Some((int, frac)) if frac.len() > 4 => {
            let frac = frac[..4].trim_end_matches('0');
            if frac.is_empty() {
                int.to_string()
            } else {
                format!("{int}.{frac}")
            }
        }
        _ => full,
    })
}

fn sum_amounts(a: &str, b: &str) -> Result<String> {
    let parse = |raw: &str| {
        U256::from_str_radix(raw.trim(), 10)
            .map_err(|e| PilotError::ExternalApi(format!("invalid amount '{raw}': {e}")))
    };
    Ok((parse(a)? + parse(b)?).to_string())
}

fn tick(raw: i32) -> Result<I24> {
    I24::try_from(raw).map_err(|_| PilotError::ExternalApi(format!("tick {raw} does not fit int24")))
}

pub fn mint_option_calldata(
    info: &strike::StrikeInfo,
    pool: Address,
    liquidity: U256,
    ttl: u64,
    is_call: bool,
) -> Result<Bytes> {
    let tick_lower = tick(info.meta.tick_lower)?;
    let tick_upper = tick(info.meta.tick_upper)?;
    let params = OptionParams {
        optionTicks: vec![OptionTick {
            handler: info.handler.handler,
            pool,
            hook: info.meta.hook,
            tickLower: tick_lower,
            tickUpper: tick_upper,
            liquidityToUse: liquidity,
        }],
        tickLower: tick_lower,
        tickUpper: tick_upper,
        ttl: U256::from(ttl),
        isCall: is_call,
        maxCostAllowance: liquidity * U256::from(2u64),
    };
    Ok(IOptionMarket::mintOptionCall { params }.abi_encode().into())
}

#[async_trait]
impl BuildAction<OpenParams> for StrykeProtocol {
    async fn build(&self, p: OpenParams) -> Result<Action> {
        self.metadata().ensure_supported(p.chain_id)?;
        let market = self.market(p.chain_id, &p.option_market).await?;
        let kind = if p.is_call { OptionType::Call } else { OptionType::Put };
        let token = market.token(kind).clone();

        let ladder = self
            .api
            .strikes_chain(p.chain_id, market.address, Reach::Hundred, Reach::Hundred)
            .await?;
        let ladder = strike::filter_by_token(ladder, token.address);
        let target = strike::liquidity(&p.target_price);
        let tolerance = p.max_difference.unwrap_or(self.default_tolerance);
        let matched = strike::find_closest(&ladder, target, tolerance)
            .ok_or_else(|| PilotError::Handler(strike::no_strike_message(tolerance, &p.target_price)))?;
        let primary = matched.primary();

        if strike::liquidity(&primary.available_liquidity) < strike::liquidity(&p.amount) {
            return Err(PilotError::Handler(strike::insufficient_liquidity_message(
                &market.pair_name,
                &p.amount,
                &token.symbol,
                &matched,
                target,
            )));
        }
        info!(
            chain_id = p.chain_id,
            market = %market.ticker,
            strike = matched.strike_price,
            "matched option strike"
        );

        let mut action = Action::new(ActionKind::Open, NAME, p.chain_id);
        if let Some(warning) = strike::deviation_warning(&matched, &p.target_price, target) {
            action.warn(warning);
        }

        let client = self.chains.client(p.chain_id)?;
        let amount = parse_amount(&p.amount, token.decimals)?;
        let current = erc20::allowance(client.as_ref(), token.address, p.user_address, market.address).await?;
        if current < amount {
            debug!(%current, %amount, spender = %market.address, "allowance too low; adding approve");
            action.push_transaction(
                TransactionKind::ContractExecution,
                UnsignedTransaction {
                    chain_id: p.chain_id,
                    from: p.user_address,
                    to: token.address,
                    value: U256::ZERO,
                    data: erc20::approve_calldata(market.address, U256::MAX),
                },
            );
        }

        let quote = self
            .api
            .purchase_quote(&QuoteRequest {
                chain_id: p.chain_id,
                option_market: market.address,
                user: p.user_address,
                strike: matched.strike_price,
                kind,
                amount: strike::liquidity(&p.amount),
                ttl: p.expiration.ttl_secs(),
            })
            .await?;

        let pool = primary
            .handler
            .pool
            .trim()
            .parse::<Address>()
            .ok()
            .filter(|a| *a != Address::ZERO)
            .ok_or_else(|| PilotError::Handler("Invalid pool address".to_string()))?;
        action.push_transaction(
            TransactionKind::ContractExecution,
            UnsignedTransaction {
                chain_id: p.chain_id,
                from: p.user_address,
                to: market.address,
                value: U256::ZERO,
                data: mint_option_calldata(primary, pool, amount, p.expiration.ttl_secs(), p.is_call)?,
            },
        );

        let total = sum_amounts(&quote.premium, &quote.fees)?;
        let token_label = if p.is_call { "Call Token" } else { "Put Token" };
        Ok(action
            .arg("Option Market", ArgKind::String, market.pair_name.clone())
            .arg("Option Type", ArgKind::String, if p.is_call { "Call" } else { "Put" })
            .arg("Option Amount", ArgKind::Number, p.amount.clone())
            .arg("Target Price", ArgKind::Number, p.target_price.clone())
            .arg("Total Cost", ArgKind::Number, display_amount(&total, token.decimals)?)
            .arg("Premium", ArgKind::Number, display_amount(&quote.premium, token.decimals)?)
            .arg("Fees", ArgKind::Number, display_amount(&quote.fees, token.decimals)?)
            .arg("Expiration", ArgKind::String, p.expiration.as_str())
            .arg(
                token_label,
                ArgKind::Token,
                serde_json::to_value(market_token_info(&token))?,
            ))
    }
}

#[async_trait]
impl BuildAction<CloseParams> for StrykeProtocol {
    async fn build(&self, p: CloseParams) -> Result<Action> {
        self.metadata().ensure_supported(p.chain_id)?;
        let market = self.market(p.chain_id, &p.option_market).await?;
        let slippage = p.slippage.unwrap_or(0.5);

        let prepared = self
            .api
            .prepare_exercise(&ExerciseRequest {
                chain_id: p.chain_id,
                option_market: market.address,
                option_id: p.option_id,
                swapper: p.swapper,
                slippage,
            })
            .await?;
        if strike::liquidity(&prepared.profit) <= 0.0 {
            return Err(PilotError::Handler(format!(
                "No profit available for exercise. Current profit: {} {}",
                prepared.profit, prepared.token
            )));
        }

        let profit_token = prepared
            .token
            .parse::<Address>()
            .ok()
            .and_then(|addr| {
                [&market.call_token, &market.put_token]
                    .into_iter()
                    .find(|t| t.address == addr)
            })
            .map(market_token_info);
        let profit_symbol = profit_token
            .as_ref()
            .map(|t| t.symbol.clone())
            .unwrap_or_else(|| prepared.token.clone());

        let mut action = Action::new(ActionKind::Close, NAME, p.chain_id)
            .arg("Option Market", ArgKind::String, market.pair_name.clone())
            .arg("Option ID", ArgKind::Number, p.option_id.to_string())
            .arg(
                "Expected Profit",
                ArgKind::String,
                format!("{} {}", prepared.profit, profit_symbol),
            )
            .arg("Swapper", ArgKind::String, p.swapper.as_str())
            .arg("Max Slippage", ArgKind::String, format!("{slippage}%"));
        if let Some(token) = profit_token {
            action = action.arg("Profit Token", ArgKind::Token, serde_json::to_value(token)?);
        }
        action.warn(format!(
            "Exercise will be executed through {} with {}% max slippage. \
             The actual profit may be lower due to slippage and market conditions.",
            p.swapper.as_str(),
            slippage
        ));
        action.push_transaction(
            TransactionKind::ContractExecution,
            UnsignedTransaction {
                chain_id: p.chain_id,
                from: p.user_address,
                to: prepared.tx.to,
                value: U256::ZERO,
                data: prepared.tx.data,
            },
        );
        Ok(action)
    }
}

// ---------------------------------------------------------------------------
// Tools
// ---------------------------------------------------------------------------

impl ToolProvider for StrykeProtocol {
    fn owner(&self) -> &str {
        NAME
    }

    fn tools(self: Arc<Self>) -> Vec<Box<dyn Tool>> {
        vec![
            typed_tool::<MarketsQuery, _>(
                "get_option_markets",
                "Get option markets for the given chain ids. At least one chain id is required.",
                self.clone(),
            ),
            typed_tool::<StrikesQuery, _>(
                "get_strikes_chain",
                "Get the strikes chain (calls and puts) for an option market",
                self.clone(),
            ),
            typed_tool::<QuoteQuery, _>(
                "get_purchase_quote",
                "Get the premium and fees for purchasing an option",
                self.clone(),
            ),
            typed_tool::<PositionsQuery, _>(
                "get_positions",
                "Get current option positions of a user in a market",
                self,
            ),
        ]
    }
}

#[async_trait]
impl CallTool<MarketsQuery> for StrykeProtocol {
    async fn call(&self, q: MarketsQuery) -> Result<Value> {
        Ok(serde_json::to_value(self.api.option_markets(&q.chain_ids).await?)?)
    }
}

#[async_trait]
impl CallTool<StrikesQuery> for StrykeProtocol {
    async fn call(&self, q: StrikesQuery) -> Result<Value> {
        let market = self.market(q.chain_id, &q.option_market).await?;
        let ladder = self
            .api
            .strikes_chain(q.chain_id, market.address, q.calls_reach, q.puts_reach)
            .await?;
        Ok(serde_json::to_value(ladder)?)
    }
}

#[async_trait]
impl CallTool<QuoteQuery> for StrykeProtocol {
    async fn call(&self, q: QuoteQuery) -> Result<Value> {
        let market = self.market(q.chain_id, &q.option_market).await?;
        let quote = self
            .api
            .purchase_quote(&QuoteRequest {
                chain_id: q.chain_id,
                option_market: market.address,
                user: q.user_address,
                strike: q.strike,
                kind: q.kind,
                amount: q.amount,
                ttl: q.expiration.ttl_secs(),
            })
            .await?;
        Ok(serde_json::to_value(quote)?)
    }
}

#[async_trait]
impl CallTool<PositionsQuery> for StrykeProtocol {
    async fn call(&self, q: PositionsQuery) -> Result<Value> {
        let market = self.market(q.chain_id, &q.option_market).await?;
        Ok(Value::Array(
            self.api.positions(q.chain_id, market.address, q.user_address).await?,
        ))
    }
}
