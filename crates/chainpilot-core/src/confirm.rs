//! On-chain confirmation checks shared by the executor and the reconciler.

use crate::chain_client::ChainClient;
use crate::error::Result;
use alloy_primitives::B256;
use std::time::Duration;
use tracing::debug;

/// Blocks a receipt must be buried under before it counts as confirmed.
pub const MIN_CONFIRMATIONS: u64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    Confirmed { block: u64 },
    Reverted { block: u64 },
    /// Known to the node but not yet mined deep enough.
    Pending,
    /// Neither a receipt nor the transaction itself is known.
    Missing,
}

impl Confirmation {
    pub fn is_final(self) -> bool {
        matches!(self, Confirmation::Confirmed { .. } | Confirmation::Reverted { .. })
    }
}

/// One look at the chain for `hash`.
pub async fn check(client: &dyn ChainClient, hash: B256, min_confirmations: u64) -> Result<Confirmation> {
    if let Some(receipt) = client.receipt(hash).await? {
        if !receipt.success {
            return Ok(Confirmation::Reverted {
                block: receipt.block_number,
            });
        }
        let latest = client.block_number().await?;
        let depth = latest.saturating_sub(receipt.block_number) + 1;
        if depth >= min_confirmations {
            return Ok(Confirmation::Confirmed {
                block: receipt.block_number,
            });
        }
        return Ok(Confirmation::Pending);
    }
    match client.transaction_by_hash(hash).await? {
        Some(_) => Ok(Confirmation::Pending),
        None => Ok(Confirmation::Missing),
    }
}

/// Poll up to `attempts` times, `interval` apart, until the outcome is final.
///
/// Returns the last observation; `Pending` or `Missing` means the budget ran out.
pub async fn wait(
    client: &dyn ChainClient,
    hash: B256,
    attempts: u32,
    interval: Duration,
) -> Result<Confirmation> {
    let mut last = Confirmation::Pending;
    for attempt in 1..=attempts {
        last = check(client, hash, MIN_CONFIRMATIONS).await?;
        if last.is_final() {
            return Ok(last);
        }
        debug!(%hash, attempt, attempts, "transaction not yet confirmed");
        if attempt < attempts && !interval.is_zero() {
            tokio::time::sleep(interval).await;
        }
    }
    Ok(last)
}
