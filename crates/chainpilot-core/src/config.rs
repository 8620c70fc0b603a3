use crate::chain::{ChainMetadata, TokenInfo, KNOWN_CHAINS};
use crate::error::Result;
use crate::types::ChainId;
use alloy_primitives::{address, Address};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILE: &str = "chainpilot.yaml";

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// ServerConfig / StorageConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    3141
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_path")]
    pub path: PathBuf,
}

fn default_storage_path() -> PathBuf {
    PathBuf::from(".chainpilot/sequences.redb")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
        }
    }
}

// ---------------------------------------------------------------------------
// SignerConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignerConfig {
    #[serde(default)]
    pub base_url: String,
    /// Name of the environment variable holding the signer API key.
    #[serde(default = "default_signer_key_env")]
    pub api_key_env: String,
}

fn default_signer_key_env() -> String {
    "CHAINPILOT_SIGNER_API_KEY".to_string()
}

impl Default for SignerConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key_env: default_signer_key_env(),
        }
    }
}

impl SignerConfig {
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env).ok().filter(|k| !k.is_empty())
    }
}

// ---------------------------------------------------------------------------
// ExecutorConfig / ReconcilerConfig / StreamConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    #[serde(default = "default_confirmation_attempts")]
    pub confirmation_attempts: u32,
    #[serde(default = "default_confirmation_interval")]
    pub confirmation_interval_secs: u64,
    #[serde(default = "default_inter_tx_delay")]
    pub inter_transaction_delay_secs: u64,
    #[serde(default = "default_reconcile_delay")]
    pub reconcile_delay_secs: u64,
}

fn default_confirmation_attempts() -> u32 {
    5
}

fn default_confirmation_interval() -> u64 {
    10
}

fn default_inter_tx_delay() -> u64 {
    5
}

fn default_reconcile_delay() -> u64 {
    30
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            confirmation_attempts: default_confirmation_attempts(),
            confirmation_interval_secs: default_confirmation_interval(),
            inter_transaction_delay_secs: default_inter_tx_delay(),
            reconcile_delay_secs: default_reconcile_delay(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcilerConfig {
    #[serde(default = "default_recheck_delay")]
    pub recheck_delay_secs: u64,
    /// A SENT transaction older than this is failed as timed out. 0 disables.
    #[serde(default = "default_stale_after")]
    pub stale_after_secs: u64,
}

fn default_recheck_delay() -> u64 {
    10
}

fn default_stale_after() -> u64 {
    6 * 60 * 60
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            recheck_delay_secs: default_recheck_delay(),
            stale_after_secs: default_stale_after(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    #[serde(default = "default_stream_interval")]
    pub interval_ms: u64,
    #[serde(default = "default_stream_iterations")]
    pub max_iterations: u32,
}

fn default_stream_interval() -> u64 {
    2000
}

fn default_stream_iterations() -> u32 {
    30
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_stream_interval(),
            max_iterations: default_stream_iterations(),
        }
    }
}

impl StreamConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

// ---------------------------------------------------------------------------
// Protocol API configs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbiosisConfig {
    #[serde(default = "default_symbiosis_url")]
    pub api_url: String,
    #[serde(default = "default_slippage")]
    pub default_slippage: u32,
}

fn default_symbiosis_url() -> String {
    "https://api.symbiosis.finance".to_string()
}

fn default_slippage() -> u32 {
    20
}

impl Default for SymbiosisConfig {
    fn default() -> Self {
        Self {
            api_url: default_symbiosis_url(),
            default_slippage: default_slippage(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrykeConfig {
    #[serde(default = "default_stryke_url")]
    pub api_url: String,
    #[serde(default = "default_tolerance")]
    pub default_tolerance: f64,
}

fn default_stryke_url() -> String {
    "https://api.stryke.xyz".to_string()
}

fn default_tolerance() -> f64 {
    0.05
}

impl Default for StrykeConfig {
    fn default() -> Self {
        Self {
            api_url: default_stryke_url(),
            default_tolerance: default_tolerance(),
        }
    }
}

// ---------------------------------------------------------------------------
// ChainConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    pub id: ChainId,
    pub key: String,
    pub name: String,
    #[serde(default)]
    pub explorer_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rpc_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rpc_url_env: Option<String>,
    pub native_token: TokenInfo,
    #[serde(default)]
    pub tokens: Vec<TokenInfo>,
}

impl ChainConfig {
    /// Explicit URL first, then the named environment variable.
    pub fn rpc_url(&self) -> Option<String> {
        self.rpc_url
            .clone()
            .filter(|u| !u.is_empty())
            .or_else(|| {
                self.rpc_url_env
                    .as_deref()
                    .and_then(|name| std::env::var(name).ok())
                    .filter(|u| !u.is_empty())
            })
    }

    pub fn metadata(&self) -> ChainMetadata {
        ChainMetadata {
            id: self.id,
            key: self.key.clone(),
            name: self.name.clone(),
            explorer_url: self.explorer_url.clone(),
            native_token: self.native_token.clone(),
        }
    }
}

fn token(address: Address, symbol: &str, name: &str, decimals: u8) -> TokenInfo {
    TokenInfo {
        address,
        symbol: symbol.to_string(),
        name: name.to_string(),
        decimals,
        logo_uri: None,
    }
}

fn default_tokens(chain_id: ChainId) -> Vec<TokenInfo> {
    match chain_id {
        1 => vec![
            token(address!("a0b86991c6218b36c1d19d4a2e9eb0ce3606eb48"), "USDC", "USD Coin", 6),
            token(address!("dac17f958d2ee523a2206206994597c13d831ec7"), "USDT", "Tether USD", 6),
            token(address!("c02aaa39b223fe8d0a0e5c4f27ead9083c756cc2"), "WETH", "Wrapped Ether", 18),
        ],
        42161 => vec![
            token(address!("af88d065e77c8cc2239327c5edb3a432268e5831"), "USDC", "USD Coin", 6),
            token(address!("82af49447d8a07e3bd95bd0d56f35241523fbab1"), "WETH", "Wrapped Ether", 18),
        ],
        8453 => vec![
            token(address!("833589fcd6edb6e08f4c7c32d4f71b54bda02913"), "USDC", "USD Coin", 6),
            token(address!("4200000000000000000000000000000000000006"), "WETH", "Wrapped Ether", 18),
        ],
        _ => Vec::new(),
    }
}

fn default_chains() -> Vec<ChainConfig> {
    KNOWN_CHAINS
        .iter()
        .map(|(id, key, name, explorer, symbol, native_name, env)| ChainConfig {
            id: *id,
            key: key.to_string(),
            name: name.to_string(),
            explorer_url: explorer.to_string(),
            rpc_url: None,
            rpc_url_env: Some(env.to_string()),
            native_token: TokenInfo::native(symbol, native_name),
            tokens: default_tokens(*id),
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub signer: SignerConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub reconciler: ReconcilerConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub symbiosis: SymbiosisConfig,
    #[serde(default)]
    pub stryke: StrykeConfig,
    #[serde(default = "default_chains")]
    pub chains: Vec<ChainConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            signer: SignerConfig::default(),
            executor: ExecutorConfig::default(),
            reconciler: ReconcilerConfig::default(),
            stream: StreamConfig::default(),
            symbiosis: SymbiosisConfig::default(),
            stryke: StrykeConfig::default(),
            chains: default_chains(),
        }
    }
}

impl Config {
    /// Load from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }
        let data = std::fs::read_to_string(path)?;
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let data = serde_yaml::to_string(self)?;
        std::fs::write(path, data)?;
        Ok(())
    }

    /// The sequence database path; relative paths resolve against `root`.
    pub fn storage_path(&self, root: &Path) -> PathBuf {
        if self.storage.path.is_absolute() {
            self.storage.path.clone()
        } else {
            root.join(&self.storage.path)
        }
    }

    pub fn chain(&self, id: ChainId) -> Option<&ChainConfig> {
        self.chains.iter().find(|c| c.id == id)
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        let mut seen = HashSet::new();
        for chain in &self.chains {
            if !seen.insert(chain.id) {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: format!("chain id {} is configured more than once", chain.id),
                });
            }
            if chain.rpc_url().is_none() {
                let hint = chain
                    .rpc_url_env
                    .as_deref()
                    .map(|env| format!(" (set {env})"))
                    .unwrap_or_default();
                warnings.push(ConfigWarning {
                    level: WarnLevel::Warning,
                    message: format!("chain {} ({}) has no RPC URL{}", chain.name, chain.id, hint),
                });
            }
        }

        if self.signer.base_url.is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "signer.base_url is empty; sequences cannot be executed".to_string(),
            });
        }

        if self.executor.confirmation_attempts == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "executor.confirmation_attempts is 0; every confirmation is left to the reconciler"
                    .to_string(),
            });
        }
        if self.stream.max_iterations == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "stream.max_iterations must be at least 1".to_string(),
            });
        }
        if !(0.0..1.0).contains(&self.stryke.default_tolerance) {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: format!(
                    "stryke.default_tolerance {} must be a fraction in [0, 1)",
                    self.stryke.default_tolerance
                ),
            });
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
