use crate::chain::{ARBITRUM, AVALANCHE, BASE, BSC, ETHEREUM, OPTIMISM, POLYGON, SONIC};
use crate::chain_client::ChainRegistry;
use crate::erc20;
use crate::error::Result;
use crate::params::{check_amount, Params, ValidationIssue};
use crate::protocol::{ActionDefinition, BuildAction, Protocol, ProtocolMetadata};
use crate::tokens::{ensure_balance, TokenDirectory};
use crate::types::{Action, ActionKind, ArgKind, ChainId, TransactionKind, UnsignedTransaction};
use crate::units::parse_amount;
use alloy_primitives::{Address, Bytes, U256};
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

pub const NAME: &str = "transfer";

pub const SUPPORTED_CHAINS: &[ChainId] = &[
    ETHEREUM, BSC, POLYGON, OPTIMISM, ARBITRUM, BASE, AVALANCHE, SONIC,
];

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransferParams {
    /// Token symbol or contract address; the zero address means the native token.
    pub token: String,
    /// Human-readable amount, e.g. "1.5".
    pub amount: String,
    pub chain_id: ChainId,
    #[schemars(with = "String")]
    pub recipient: Address,
    /// Address sending the tokens.
    #[schemars(with = "String")]
    pub user_address: Address,
}

impl Params for TransferParams {
    fn check(&self) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();
        check_amount("amount", &self.amount, &mut issues);
        if self.recipient == Address::ZERO {
            issues.push(ValidationIssue::new("recipient", "must not be the zero address"));
        }
        issues
    }
}

/// Plain value transfers of native or ERC-20 tokens.
pub struct TransferProtocol {
    chains: Arc<ChainRegistry>,
    tokens: Arc<dyn TokenDirectory>,
}

impl TransferProtocol {
    pub fn new(chains: Arc<ChainRegistry>, tokens: Arc<dyn TokenDirectory>) -> Self {
        Self { chains, tokens }
    }
}

impl Protocol for TransferProtocol {
    fn metadata(&self) -> ProtocolMetadata {
        ProtocolMetadata {
            name: NAME.to_string(),
            description: "Send native or ERC-20 tokens to another address".to_string(),
            supported_chains: SUPPORTED_CHAINS.to_vec(),
        }
    }

    fn actions(self: Arc<Self>) -> Vec<ActionDefinition> {
        vec![ActionDefinition::typed::<TransferParams, _>(
            ActionKind::Transfer,
            "Transfer a token amount from the user's wallet to a recipient",
            true,
            self,
        )]
    }
}

#[async_trait]
impl BuildAction<TransferParams> for TransferProtocol {
    async fn build(&self, p: TransferParams) -> Result<Action> {
        self.metadata().ensure_supported(p.chain_id)?;
        let client = self.chains.client(p.chain_id)?;
        let token = self.tokens.resolve(p.chain_id, &p.token).await?;
        let amount = parse_amount(&p.amount, token.decimals)?;
        ensure_balance(client.as_ref(), &token, p.user_address, amount).await?;

        let (kind, tx) = if token.is_native() {
            (
                TransactionKind::Transfer,
                UnsignedTransaction {
                    chain_id: p.chain_id,
                    from: p.user_address,
                    to: p.recipient,
                    value: amount,
                    data: Bytes::new(),
                },
            )
        } else {
            (
                TransactionKind::ContractExecution,
                UnsignedTransaction {
                    chain_id: p.chain_id,
                    from: p.user_address,
                    to: token.address,
                    value: U256::ZERO,
                    data: erc20::transfer_calldata(p.recipient, amount),
                },
            )
        };
        debug!(chain_id = p.chain_id, token = %token.symbol, %amount, "built transfer");

        let mut action = Action::new(ActionKind::Transfer, NAME, p.chain_id)
            .arg("Token", ArgKind::Token, serde_json::to_value(&token)?)
            .arg("Amount", ArgKind::Amount, p.amount.clone())
            .arg("Recipient", ArgKind::Address, p.recipient.to_string());
        action.push_transaction(kind, tx);
        Ok(action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PilotError;
    use crate::test_support::{chain_registry, MockChain, USDC};
    use crate::tokens::ChainTokenDirectory;

    const USER: Address = Address::repeat_byte(0xa1);
    const RECIPIENT: Address = Address::repeat_byte(0xb2);

    fn protocol(chain: MockChain) -> TransferProtocol {
        let chains = Arc::new(chain_registry(vec![chain]));
        let tokens = Arc::new(ChainTokenDirectory::new(chains.clone()));
        TransferProtocol::new(chains, tokens)
    }

    fn params(token: &str, amount: &str, chain_id: ChainId) -> TransferParams {
        TransferParams {
            token: token.to_string(),
            amount: amount.to_string(),
            chain_id,
            recipient: RECIPIENT,
            user_address: USER,
        }
    }

    fn one_ether() -> U256 {
        U256::from(10u64).pow(U256::from(18u64))
    }

    #[tokio::test]
    async fn native_transfer_sets_value_and_recipient() {
        let chain = MockChain::new(1);
        chain.set_native_balance(USER, one_ether() * U256::from(2u64));
        let action = protocol(chain).build(params("ETH", "1.0", 1)).await.unwrap();

        assert_eq!(action.kind, ActionKind::Transfer);
        assert_eq!(action.transactions.len(), 1);
        let tx = &action.transactions[0];
        assert_eq!(tx.kind, TransactionKind::Transfer);
        assert_eq!(tx.transaction.to, RECIPIENT);
        assert_eq!(tx.transaction.from, USER);
        assert_eq!(tx.transaction.value, one_ether());
        assert!(tx.transaction.data.is_empty());
    }

    #[tokio::test]
    async fn erc20_transfer_calls_token_contract() {
        let chain = MockChain::new(1);
        chain.set_token_balance(USDC, USER, U256::from(10_000_000u64));
        let action = protocol(chain).build(params("USDC", "2.5", 1)).await.unwrap();

        let tx = &action.transactions[0];
        assert_eq!(tx.kind, TransactionKind::ContractExecution);
        assert_eq!(tx.transaction.to, USDC);
        assert_eq!(tx.transaction.value, U256::ZERO);
        assert_eq!(
            tx.transaction.data,
            erc20::transfer_calldata(RECIPIENT, U256::from(2_500_000u64))
        );
    }

    #[tokio::test]
    async fn insufficient_balance_is_a_handler_error() {
        let chain = MockChain::new(1);
        let err = protocol(chain).build(params("ETH", "1", 1)).await.unwrap_err();
        assert!(matches!(err, PilotError::Handler(m) if m.starts_with("Insufficient ETH balance")));
    }

    #[tokio::test]
    async fn dust_amount_builds_no_transaction() {
        let chain = MockChain::new(1);
        chain.set_token_balance(USDC, USER, U256::from(10_000_000u64));
        let err = protocol(chain)
            .build(params("USDC", "0.0000001", 1))
            .await
            .unwrap_err();
        assert!(matches!(err, PilotError::Handler(m) if m.contains("smallest unit")));
    }

    #[tokio::test]
    async fn unsupported_chain_is_rejected() {
        let chain = MockChain::new(1);
        let err = protocol(chain).build(params("ETH", "1", 250)).await.unwrap_err();
        assert!(matches!(err, PilotError::UnsupportedChain { chain_id: 250, .. }));
    }

    #[test]
    fn zero_recipient_fails_validation() {
        let mut p = params("ETH", "1", 1);
        p.recipient = Address::ZERO;
        assert_eq!(p.check()[0].path, "recipient");
    }
}
