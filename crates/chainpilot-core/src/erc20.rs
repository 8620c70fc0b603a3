//! ERC-20 calldata builders and read helpers over a [`ChainClient`].

use crate::chain_client::ChainClient;
use crate::error::{PilotError, Result};
use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::{sol, SolCall};

sol! {
    interface IERC20 {
        function transfer(address to, uint256 amount) external returns (bool);
        function approve(address spender, uint256 amount) external returns (bool);
        function allowance(address owner, address spender) external view returns (uint256);
        function balanceOf(address owner) external view returns (uint256);
        function decimals() external view returns (uint8);
        function symbol() external view returns (string);
    }
}

pub fn transfer_calldata(recipient: Address, amount: U256) -> Bytes {
    IERC20::transferCall {
        to: recipient,
        amount,
    }
    .abi_encode()
    .into()
}

pub fn approve_calldata(spender: Address, amount: U256) -> Bytes {
    IERC20::approveCall { spender, amount }.abi_encode().into()
}

/// `eth_call` a view function on `token` and decode its return value.
async fn read<C: SolCall>(client: &dyn ChainClient, token: Address, call: C) -> Result<C::Return> {
    let out = client.call(token, call.abi_encode().into()).await?;
    C::abi_decode_returns(&out)
        .map_err(|e| PilotError::Rpc(format!("failed to decode {} result: {e}", C::SIGNATURE)))
}

pub async fn allowance(
    client: &dyn ChainClient,
    token: Address,
    owner: Address,
    spender: Address,
) -> Result<U256> {
    read(client, token, IERC20::allowanceCall { owner, spender }).await
}

pub async fn balance_of(client: &dyn ChainClient, token: Address, owner: Address) -> Result<U256> {
    read(client, token, IERC20::balanceOfCall { owner }).await
}

pub async fn decimals(client: &dyn ChainClient, token: Address) -> Result<u8> {
    read(client, token, IERC20::decimalsCall {}).await
}

pub async fn symbol(client: &dyn ChainClient, token: Address) -> Result<String> {
    read(client, token, IERC20::symbolCall {}).await
}
