//! In-memory collaborators for tests: a scriptable chain, signer, job queue
//! and protocol APIs.

use crate::chain::{ChainMetadata, TokenInfo};
use crate::chain_client::{ChainClient, ChainRegistry, FeeData, Receipt, TransactionInfo};
use crate::config::Config;
use crate::erc20::IERC20;
use crate::error::{PilotError, Result};
use crate::protocols::strike::{
    MarketToken, StrikeEntry, StrikeHandler, StrikeInfo, StrikeMeta,
};
use crate::protocols::stryke::{
    ExercisePreparation, ExerciseRequest, OptionMarket, OptionsMarketApi, PurchaseQuote,
    QuoteRequest, Reach,
};
use crate::protocols::symbiosis::{RouteAmount, RouteQuote, RouteRequest, RouteTx, SwapRouter};
use crate::queue::{EnqueueOptions, JobQueue};
use crate::signer::{CustodialSigner, SignResponse};
use crate::types::{ChainId, PreparedTransaction, UnsignedTransaction};
use alloy_primitives::{address, keccak256, Address, Bytes, B256, U256};
use alloy_sol_types::{SolCall, SolValue};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};

pub const USDC: Address = address!("a0b86991c6218b36c1d19d4a2e9eb0ce3606eb48");

const GWEI: u128 = 1_000_000_000;

/// Registry holding one entry per mock, with metadata and tokens from the
/// default config where the chain id is known.
pub fn chain_registry(mocks: Vec<MockChain>) -> ChainRegistry {
    let config = Config::default();
    let mut registry = ChainRegistry::new();
    for mock in mocks {
        let (metadata, tokens) = match config.chain(mock.chain_id) {
            Some(chain) => (chain.metadata(), chain.tokens.clone()),
            None => (
                ChainMetadata {
                    id: mock.chain_id,
                    key: format!("C{}", mock.chain_id),
                    name: format!("Chain {}", mock.chain_id),
                    explorer_url: "https://explorer.invalid".to_string(),
                    native_token: TokenInfo::native("ETH", "Ether"),
                },
                Vec::new(),
            ),
        };
        let client: Arc<dyn ChainClient> = Arc::new(mock);
        registry.insert(metadata, Some(client), tokens);
    }
    registry
}

// ---------------------------------------------------------------------------
// MockChain
// ---------------------------------------------------------------------------

struct ChainState {
    native: HashMap<Address, U256>,
    token_balances: HashMap<(Address, Address), U256>,
    allowances: HashMap<(Address, Address, Address), U256>,
    token_metadata: HashMap<Address, (String, u8)>,
    fee_data: FeeData,
    failing_estimates: HashSet<Address>,
    reverting: HashSet<Address>,
    fail_broadcasts: bool,
    fail_lookups: bool,
    hold_receipts: bool,
    block: u64,
    nonces: HashMap<Address, u64>,
    transactions: HashMap<B256, TransactionInfo>,
    receipts: HashMap<B256, Receipt>,
    broadcasts: Vec<PreparedTransaction>,
    calls: usize,
}

impl Default for ChainState {
    fn default() -> Self {
        Self {
            native: HashMap::new(),
            token_balances: HashMap::new(),
            allowances: HashMap::new(),
            token_metadata: HashMap::new(),
            fee_data: FeeData {
                gas_price: 2 * GWEI,
                max_fee_per_gas: Some(3 * GWEI),
                max_priority_fee_per_gas: Some(GWEI),
            },
            failing_estimates: HashSet::new(),
            reverting: HashSet::new(),
            fail_broadcasts: false,
            fail_lookups: false,
            hold_receipts: false,
            block: 100,
            nonces: HashMap::new(),
            transactions: HashMap::new(),
            receipts: HashMap::new(),
            broadcasts: Vec::new(),
            calls: 0,
        }
    }
}

/// Scriptable chain. Clones share state, so a test can keep a handle after
/// moving one into a registry.
///
/// Broadcast transactions are mined immediately unless receipts are held.
#[derive(Clone)]
pub struct MockChain {
    pub chain_id: ChainId,
    state: Arc<Mutex<ChainState>>,
}

impl MockChain {
    pub fn new(chain_id: ChainId) -> Self {
        Self {
            chain_id,
            state: Arc::new(Mutex::new(ChainState::default())),
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut ChainState) -> R) -> R {
        let mut state = self.state.lock().unwrap();
        f(&mut state)
    }

    pub fn set_native_balance(&self, owner: Address, amount: U256) {
        self.with(|s| s.native.insert(owner, amount));
    }

    pub fn set_token_balance(&self, token: Address, owner: Address, amount: U256) {
        self.with(|s| s.token_balances.insert((token, owner), amount));
    }

    pub fn set_allowance(&self, token: Address, owner: Address, spender: Address, amount: U256) {
        self.with(|s| s.allowances.insert((token, owner, spender), amount));
    }

    pub fn set_token_metadata(&self, token: Address, symbol: &str, decimals: u8) {
        self.with(|s| s.token_metadata.insert(token, (symbol.to_string(), decimals)));
    }

    pub fn set_fee_data(&self, fees: FeeData) {
        self.with(|s| s.fee_data = fees);
    }

    /// Gas estimation for transactions to `to` fails as a would-revert.
    pub fn fail_estimate_for(&self, to: Address) {
        self.with(|s| s.failing_estimates.insert(to));
    }

    /// Transactions sent to `to` are mined with a failed receipt.
    pub fn revert_calls_to(&self, to: Address) {
        self.with(|s| s.reverting.insert(to));
    }

    pub fn fail_broadcasts(&self) {
        self.with(|s| s.fail_broadcasts = true);
    }

    /// Receipt and transaction lookups return RPC errors.
    pub fn fail_lookups(&self) {
        self.with(|s| s.fail_lookups = true);
    }

    /// Stop mining broadcasts; use [`MockChain::mine`] to settle them.
    pub fn hold_receipts(&self) {
        self.with(|s| s.hold_receipts = true);
    }

    pub fn mine(&self, hash: B256, success: bool) {
        self.with(|s| {
            s.block += 1;
            let block = s.block;
            s.receipts.insert(
                hash,
                Receipt {
                    block_number: block,
                    success,
                    gas_used: 21_000,
                },
            );
            if let Some(tx) = s.transactions.get_mut(&hash) {
                tx.block_number = Some(block);
            }
        });
    }

    pub fn advance_blocks(&self, n: u64) {
        self.with(|s| s.block += n);
    }

    /// Prepared transactions decoded from every successful broadcast.
    pub fn broadcast_log(&self) -> Vec<PreparedTransaction> {
        self.with(|s| s.broadcasts.clone())
    }

    /// Number of [`ChainClient`] calls served so far.
    pub fn call_count(&self) -> usize {
        self.with(|s| s.calls)
    }

    fn lookup_guard(&self) -> Result<()> {
        self.with(|s| {
            s.calls += 1;
            if s.fail_lookups {
                Err(PilotError::Rpc("mock lookup failure".to_string()))
            } else {
                Ok(())
            }
        })
    }
}

fn reverted() -> PilotError {
    PilotError::Rpc("execution reverted".to_string())
}

#[async_trait]
impl ChainClient for MockChain {
    async fn nonce(&self, address: Address) -> Result<u64> {
        Ok(self.with(|s| {
            s.calls += 1;
            s.nonces.get(&address).copied().unwrap_or(0)
        }))
    }

    async fn fee_data(&self) -> Result<FeeData> {
        Ok(self.with(|s| {
            s.calls += 1;
            s.fee_data
        }))
    }

    async fn estimate_gas(&self, tx: &UnsignedTransaction) -> Result<u64> {
        self.with(|s| {
            s.calls += 1;
            if s.failing_estimates.contains(&tx.to) {
                Err(reverted())
            } else if tx.data.is_empty() {
                Ok(21_000)
            } else {
                Ok(120_000)
            }
        })
    }

    async fn balance(&self, address: Address) -> Result<U256> {
        Ok(self.with(|s| {
            s.calls += 1;
            s.native.get(&address).copied().unwrap_or_default()
        }))
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes> {
        self.with(|s| {
            s.calls += 1;
            let selector: [u8; 4] = match data.get(..4).and_then(|b| b.try_into().ok()) {
                Some(sel) => sel,
                None => return Err(reverted()),
            };
            match selector {
                IERC20::allowanceCall::SELECTOR => {
                    let args = IERC20::allowanceCall::abi_decode(&data).map_err(|_| reverted())?;
                    let key = (to, args.owner, args.spender);
                    Ok(Bytes::from(s.allowances.get(&key).copied().unwrap_or_default().abi_encode()))
                }
                IERC20::balanceOfCall::SELECTOR => {
                    let args = IERC20::balanceOfCall::abi_decode(&data).map_err(|_| reverted())?;
                    let key = (to, args.owner);
                    Ok(Bytes::from(s.token_balances.get(&key).copied().unwrap_or_default().abi_encode()))
                }
                IERC20::decimalsCall::SELECTOR => s
                    .token_metadata
                    .get(&to)
                    .map(|(_, decimals)| Bytes::from(IERC20::decimalsCall::abi_encode_returns(decimals)))
                    .ok_or_else(reverted),
                IERC20::symbolCall::SELECTOR => s
                    .token_metadata
                    .get(&to)
                    .map(|(symbol, _)| Bytes::from(symbol.abi_encode()))
                    .ok_or_else(reverted),
                _ => Err(reverted()),
            }
        })
    }

    async fn broadcast(&self, signed: &Bytes) -> Result<B256> {
        self.with(|s| {
            s.calls += 1;
            if s.fail_broadcasts {
                return Err(PilotError::Broadcast("mock broadcast rejected".to_string()));
            }
            let hash = keccak256(signed);
            let prepared: Option<PreparedTransaction> = serde_json::from_slice(signed).ok();
            let mut info = TransactionInfo {
                hash,
                from: Address::ZERO,
                to: None,
                value: U256::ZERO,
                nonce: 0,
                block_number: None,
            };
            let mut reverts = false;
            if let Some(p) = prepared {
                info.from = p.transaction.from;
                info.to = Some(p.transaction.to);
                info.value = p.transaction.value;
                info.nonce = p.gas.nonce;
                reverts = s.reverting.contains(&p.transaction.to);
                s.nonces.insert(p.transaction.from, p.gas.nonce + 1);
                s.broadcasts.push(p);
            }
            if !s.hold_receipts {
                s.block += 1;
                info.block_number = Some(s.block);
                s.receipts.insert(
                    hash,
                    Receipt {
                        block_number: s.block,
                        success: !reverts,
                        gas_used: 21_000,
                    },
                );
            }
            s.transactions.insert(hash, info);
            Ok(hash)
        })
    }

    async fn transaction_by_hash(&self, hash: B256) -> Result<Option<TransactionInfo>> {
        self.lookup_guard()?;
        Ok(self.with(|s| s.transactions.get(&hash).cloned()))
    }

    async fn receipt(&self, hash: B256) -> Result<Option<Receipt>> {
        self.lookup_guard()?;
        Ok(self.with(|s| s.receipts.get(&hash).copied()))
    }

    async fn block_number(&self) -> Result<u64> {
        self.lookup_guard()?;
        Ok(self.with(|s| s.block))
    }
}

// ---------------------------------------------------------------------------
// MockSigner
// ---------------------------------------------------------------------------

struct SignerState {
    status: u16,
    wallets: Vec<String>,
}

/// "Signs" by serializing the prepared transaction to JSON, which
/// [`MockChain`] decodes again on broadcast.
#[derive(Clone)]
pub struct MockSigner {
    state: Arc<Mutex<SignerState>>,
}

impl MockSigner {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SignerState {
                status: 200,
                wallets: Vec::new(),
            })),
        }
    }

    pub fn respond_with_status(&self, status: u16) {
        self.state.lock().unwrap().status = status;
    }

    /// Wallet ids of every sign request, in order.
    pub fn wallets(&self) -> Vec<String> {
        self.state.lock().unwrap().wallets.clone()
    }
}

impl Default for MockSigner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CustodialSigner for MockSigner {
    async fn sign(&self, wallet_id: &str, tx: &PreparedTransaction) -> Result<SignResponse> {
        let status = {
            let mut state = self.state.lock().unwrap();
            state.wallets.push(wallet_id.to_string());
            state.status
        };
        if status != 200 {
            return Ok(SignResponse {
                status,
                signed_transaction: None,
                error: Some("mock signer refused".to_string()),
            });
        }
        Ok(SignResponse {
            status,
            signed_transaction: Some(Bytes::from(serde_json::to_vec(tx)?)),
            error: None,
        })
    }
}

// ---------------------------------------------------------------------------
// RecordingQueue
// ---------------------------------------------------------------------------

/// Records every enqueue and never runs anything.
#[derive(Clone, Default)]
pub struct RecordingQueue {
    jobs: Arc<Mutex<Vec<(String, Value, EnqueueOptions)>>>,
}

impl RecordingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn jobs(&self) -> Vec<(String, Value, EnqueueOptions)> {
        self.jobs.lock().unwrap().clone()
    }
}

#[async_trait]
impl JobQueue for RecordingQueue {
    async fn enqueue(&self, name: &str, payload: Value, options: EnqueueOptions) -> Result<bool> {
        self.jobs
            .lock()
            .unwrap()
            .push((name.to_string(), payload, options));
        Ok(true)
    }
}

// ---------------------------------------------------------------------------
// MockRouter
// ---------------------------------------------------------------------------

/// Swap router answering every request with a route through `router`.
#[derive(Clone)]
pub struct MockRouter {
    router: Address,
    kind: String,
    last: Arc<Mutex<Option<RouteRequest>>>,
}

impl MockRouter {
    pub fn evm(router: Address) -> Self {
        Self::with_kind(router, "evm")
    }

    pub fn with_kind(router: Address, kind: &str) -> Self {
        Self {
            router,
            kind: kind.to_string(),
            last: Arc::new(Mutex::new(None)),
        }
    }

    pub fn last_request(&self) -> Option<RouteRequest> {
        self.last.lock().unwrap().clone()
    }
}

#[async_trait]
impl SwapRouter for MockRouter {
    async fn quote(&self, request: &RouteRequest) -> Result<RouteQuote> {
        *self.last.lock().unwrap() = Some(request.clone());
        let amount_in = &request.token_amount_in;
        let value = if amount_in.token.address.is_empty() {
            amount_in.amount.clone()
        } else {
            "0".to_string()
        };
        Ok(RouteQuote {
            approve_to: self.router,
            tx: RouteTx {
                to: self.router,
                data: Bytes::from(vec![0x12, 0x34, 0x56, 0x78]),
                value: Some(value),
                chain_id: Some(amount_in.token.chain_id),
            },
            kind: self.kind.clone(),
            token_amount_out: Some(RouteAmount {
                amount: amount_in.amount.clone(),
                decimals: request.token_out.decimals,
            }),
        })
    }
}

// ---------------------------------------------------------------------------
// Options market fixtures
// ---------------------------------------------------------------------------

/// Market whose call side is an 18-decimal WETH and put side a 6-decimal USDC.
pub fn option_market(address: Address, ticker: &str, call_token: Address, put_token: Address) -> OptionMarket {
    OptionMarket {
        deprecated: false,
        address,
        pair_name: ticker.to_string(),
        ticker: ticker.to_string(),
        call_token: MarketToken {
            address: call_token,
            symbol: "WETH".to_string(),
            decimals: 18,
        },
        put_token: MarketToken {
            address: put_token,
            symbol: "USDC".to_string(),
            decimals: 6,
        },
        total_premium: "0".to_string(),
        total_volume: "0".to_string(),
        total_fees: "0".to_string(),
    }
}

/// A single-handler rung at `price` with `available` liquidity of `token`.
pub fn strike_entry(price: &str, token: Address, pool: Address, available: &str) -> StrikeEntry {
    let info = StrikeInfo {
        total_liquidity: available.to_string(),
        available_liquidity: available.to_string(),
        utilization: "0".to_string(),
        apr: "0".to_string(),
        handler: StrikeHandler {
            name: "uniswap".to_string(),
            deprecated: false,
            handler: Address::repeat_byte(0x44),
            pool: pool.to_string(),
        },
        meta: StrikeMeta {
            hook: Address::repeat_byte(0x55),
            tick_lower: -200_000,
            tick_upper: -199_990,
            total_token_liquidity: available.to_string(),
            available_token_liquidity: available.to_string(),
            total_liquidity: available.to_string(),
            available_liquidity: available.to_string(),
        },
        token: MarketToken {
            address: token,
            symbol: "WETH".to_string(),
            decimals: 18,
        },
    };
    BTreeMap::from([(price.to_string(), vec![info])])
}

/// Options API serving fixed markets, a fixed ladder and canned answers.
#[derive(Clone)]
pub struct MockOptionsApi {
    markets: Vec<OptionMarket>,
    strikes: Vec<StrikeEntry>,
    quote: Option<PurchaseQuote>,
    exercise: Option<ExercisePreparation>,
    last_quote: Arc<Mutex<Option<QuoteRequest>>>,
}

impl MockOptionsApi {
    pub fn new(markets: Vec<OptionMarket>) -> Self {
        Self {
            markets,
            strikes: Vec::new(),
            quote: None,
            exercise: None,
            last_quote: Arc::new(Mutex::new(None)),
        }
    }

    pub fn with_strikes(mut self, strikes: Vec<StrikeEntry>) -> Self {
        self.strikes = strikes;
        self
    }

    pub fn with_quote(mut self, quote: PurchaseQuote) -> Self {
        self.quote = Some(quote);
        self
    }

    pub fn with_exercise(mut self, exercise: ExercisePreparation) -> Self {
        self.exercise = Some(exercise);
        self
    }

    pub fn last_quote(&self) -> Option<QuoteRequest> {
        self.last_quote.lock().unwrap().clone()
    }
}

#[async_trait]
impl OptionsMarketApi for MockOptionsApi {
    async fn option_markets(&self, _chain_ids: &[ChainId]) -> Result<Vec<OptionMarket>> {
        Ok(self.markets.clone())
    }

    async fn strikes_chain(
        &self,
        _chain_id: ChainId,
        _market: Address,
        _calls_reach: Reach,
        _puts_reach: Reach,
    ) -> Result<Vec<StrikeEntry>> {
        Ok(self.strikes.clone())
    }

    async fn purchase_quote(&self, request: &QuoteRequest) -> Result<PurchaseQuote> {
        *self.last_quote.lock().unwrap() = Some(request.clone());
        self.quote
            .clone()
            .ok_or_else(|| PilotError::ExternalApi("no purchase quote available".to_string()))
    }

    async fn prepare_exercise(&self, _request: &ExerciseRequest) -> Result<ExercisePreparation> {
        self.exercise
            .clone()
            .ok_or_else(|| PilotError::ExternalApi("no exercise preparation available".to_string()))
    }

    async fn positions(&self, _chain_id: ChainId, _market: Address, _user: Address) -> Result<Vec<Value>> {
        Ok(Vec::new())
    }
}
