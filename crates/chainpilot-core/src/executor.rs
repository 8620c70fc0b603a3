//! Signs, broadcasts and confirms the transactions of a stored sequence.
//!
//! Actions run in order and so do the transactions inside each action. A
//! transaction that does not confirm stops its action: the remaining
//! siblings are failed as skipped and the executor moves to the next
//! action. Transactions still in flight when the confirmation budget runs
//! out are left `SENT` for the reconciler, which is always scheduled at the
//! end of a run.

use crate::chain_client::{ChainClient, ChainRegistry};
use crate::config::ExecutorConfig;
use crate::confirm::{self, Confirmation};
use crate::error::{PilotError, Result};
use crate::queue::{JobQueue, ReconcileJob, RECONCILE_JOB};
use crate::signer::CustodialSigner;
use crate::store::SequenceStore;
use crate::types::{
    Action, ActionTransaction, GasParameters, PreparedTransaction, TransactionPatch,
    TransactionStatus,
};
use alloy_primitives::B256;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const ESTIMATION_FAILED: &str = "Could not estimate gas. There may be insufficient balance to pay for the transaction or the transaction is invalid";
pub const SKIPPED: &str = "Skipped: an earlier transaction in this action did not confirm";


/// Counts of what one executor run did, by transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionReport {
    pub sequence_id: Uuid,
    pub confirmed: usize,
    pub failed: usize,
    /// Still `SENT` when the run finished.
    pub outstanding: usize,
    /// Already terminal before the run started.
    pub skipped: usize,
    pub reconcile_scheduled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Confirmed,
    Failed,
    Outstanding,
}

pub struct SequenceExecutor {
    chains: Arc<ChainRegistry>,
    signer: Arc<dyn CustodialSigner>,
    store: Arc<dyn SequenceStore>,
    queue: Arc<dyn JobQueue>,
    config: ExecutorConfig,
}

impl SequenceExecutor {
    pub fn new(
        chains: Arc<ChainRegistry>,
        signer: Arc<dyn CustodialSigner>,
        store: Arc<dyn SequenceStore>,
        queue: Arc<dyn JobQueue>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            chains,
            signer,
            store,
            queue,
            config,
        }
    }

    /// Run every non-terminal transaction of the sequence with `wallet_id`.
    ///
    /// Re-running a finished sequence touches nothing but the reconcile job.
    pub async fn execute(&self, sequence_id: Uuid, wallet_id: &str) -> Result<ExecutionReport> {
        let sequence = self.store.get(sequence_id)?;
        let mut report = ExecutionReport {
            sequence_id,
            ..ExecutionReport::default()
        };
        info!(
            %sequence_id,
            actions = sequence.actions.len(),
            "executing sequence"
        );

        for stored in &sequence.actions {
            self.run_action(sequence_id, &stored.action, wallet_id, &mut report)
                .await?;
        }

        let job = ReconcileJob { sequence_id };
        let delay = Duration::from_secs(self.config.reconcile_delay_secs);
        match self
            .queue
            .enqueue(RECONCILE_JOB, serde_json::to_value(job)?, job.options(delay))
            .await
        {
            Ok(_) => report.reconcile_scheduled = true,
            Err(e) => warn!(%sequence_id, error = %e, "failed to schedule reconciliation"),
        }

        info!(
            %sequence_id,
            confirmed = report.confirmed,
            failed = report.failed,
            outstanding = report.outstanding,
            skipped = report.skipped,
            "sequence execution finished"
        );
        Ok(report)
    }

    async fn run_action(
        &self,
        sequence_id: Uuid,
        action: &Action,
        wallet_id: &str,
        report: &mut ExecutionReport,
    ) -> Result<()> {
        let count = action.transactions.len();
        for (index, tx) in action.transactions.iter().enumerate() {
            let outcome = match tx.status {
                TransactionStatus::Confirmed => {
                    report.skipped += 1;
                    continue;
                }
                TransactionStatus::Failed => {
                    report.skipped += 1;
                    Outcome::Failed
                }
                TransactionStatus::Sent => {
                    self.resume(sequence_id, action.id, index, tx).await?
                }
                TransactionStatus::Unsigned | TransactionStatus::Pending => {
                    self.send(sequence_id, action, index, tx, wallet_id).await?
                }
            };

            match outcome {
                Outcome::Confirmed => {
                    report.confirmed += 1;
                    if index + 1 < count && self.config.inter_transaction_delay_secs > 0 {
                        tokio::time::sleep(Duration::from_secs(
                            self.config.inter_transaction_delay_secs,
                        ))
                        .await;
                    }
                }
                Outcome::Failed | Outcome::Outstanding => {
                    if outcome == Outcome::Outstanding {
                        report.outstanding += 1;
                    } else if tx.status != TransactionStatus::Failed {
                        report.failed += 1;
                    }
                    report.failed += self
                        .skip_rest(sequence_id, action, index + 1)
                        .await?;
                    break;
                }
            }
        }
        Ok(())
    }

    /// Fail every non-terminal transaction from `from` on. Returns how many changed.
    async fn skip_rest(&self, sequence_id: Uuid, action: &Action, from: usize) -> Result<usize> {
        let mut skipped = 0;
        for (index, tx) in action.transactions.iter().enumerate().skip(from) {
            if tx.status.is_terminal() {
                continue;
            }
            self.store.update_transaction(
                sequence_id,
                action.id,
                index,
                &TransactionPatch::failed(SKIPPED),
            )?;
            skipped += 1;
        }
        if skipped > 0 {
            debug!(action_id = %action.id, skipped, "skipped remaining transactions");
        }
        Ok(skipped)
    }

    fn fail(
        &self,
        sequence_id: Uuid,
        action_id: Uuid,
        index: usize,
        message: impl Into<String>,
    ) -> Result<Outcome> {
        let message = message.into();
        warn!(%action_id, index, error = %message, "transaction failed");
        self.store.update_transaction(
            sequence_id,
            action_id,
            index,
            &TransactionPatch::failed(message),
        )?;
        Ok(Outcome::Failed)
    }

    async fn send(
        &self,
        sequence_id: Uuid,
        action: &Action,
        index: usize,
        tx: &ActionTransaction,
        wallet_id: &str,
    ) -> Result<Outcome> {
        let client = match self.chains.client(tx.transaction.chain_id) {
            Ok(client) => client,
            Err(e) => return self.fail(sequence_id, action.id, index, e.to_string()),
        };

        let prepared = match prepare(client.as_ref(), tx).await {
            Ok(prepared) => prepared,
            Err(e) => {
                debug!(error = %e, "gas preparation failed");
                return self.fail(sequence_id, action.id, index, e.to_string());
            }
        };
        self.store.update_transaction(
            sequence_id,
            action.id,
            index,
            &TransactionPatch::prepared(prepared.gas),
        )?;

        let signed = match self.signer.sign(wallet_id, &prepared).await {
            Ok(response) => response.into_signed(),
            Err(e) => Err(e),
        };
        let signed = match signed {
            Ok(signed) => signed,
            Err(e) => return self.fail(sequence_id, action.id, index, e.to_string()),
        };

        let hash = match client.broadcast(&signed).await {
            Ok(hash) => hash,
            Err(e) => return self.fail(sequence_id, action.id, index, e.to_string()),
        };
        self.store.update_transaction(
            sequence_id,
            action.id,
            index,
            &TransactionPatch::sent(hash, Utc::now()),
        )?;
        info!(
            action_id = %action.id,
            index,
            %hash,
            chain_id = tx.transaction.chain_id,
            "transaction broadcast"
        );

        self.await_confirmation(client.as_ref(), sequence_id, action.id, index, hash)
            .await
    }

    /// A transaction left `SENT` by an earlier run: only watch it.
    async fn resume(
        &self,
        sequence_id: Uuid,
        action_id: Uuid,
        index: usize,
        tx: &ActionTransaction,
    ) -> Result<Outcome> {
        let Some(hash) = tx.hash else {
            return self.fail(sequence_id, action_id, index, "Transaction was never broadcast");
        };
        let client = match self.chains.client(tx.transaction.chain_id) {
            Ok(client) => client,
            Err(e) => return self.fail(sequence_id, action_id, index, e.to_string()),
        };
        self.await_confirmation(client.as_ref(), sequence_id, action_id, index, hash)
            .await
    }

    async fn await_confirmation(
        &self,
        client: &dyn ChainClient,
        sequence_id: Uuid,
        action_id: Uuid,
        index: usize,
        hash: B256,
    ) -> Result<Outcome> {
        let interval = Duration::from_secs(self.config.confirmation_interval_secs);
        match confirm::wait(client, hash, self.config.confirmation_attempts, interval).await {
            Ok(Confirmation::Confirmed { block }) => {
                self.store.update_transaction(
                    sequence_id,
                    action_id,
                    index,
                    &TransactionPatch::status(TransactionStatus::Confirmed),
                )?;
                info!(%hash, block, "transaction confirmed");
                Ok(Outcome::Confirmed)
            }
            Ok(Confirmation::Reverted { block }) => self.fail(
                sequence_id,
                action_id,
                index,
                format!("Transaction reverted on-chain in block {block}"),
            ),
            Ok(Confirmation::Pending | Confirmation::Missing) => {
                info!(%hash, "confirmation budget exhausted; leaving for reconciliation");
                Ok(Outcome::Outstanding)
            }
            Err(e) => {
                warn!(%hash, error = %e, "confirmation lookup failed; leaving for reconciliation");
                Ok(Outcome::Outstanding)
            }
        }
    }
}

/// Fix nonce, gas limit and fees for `tx`.
async fn prepare(client: &dyn ChainClient, tx: &ActionTransaction) -> Result<PreparedTransaction> {
    let unsigned = &tx.transaction;
    let estimate = client.estimate_fee(unsigned).await.map_err(|e| match e {
        PilotError::FeeEstimation(reason) => {
            debug!(error = %reason, to = %unsigned.to, "gas estimation rejected");
            PilotError::FeeEstimation(ESTIMATION_FAILED.to_string())
        }
        other => other,
    })?;
    let nonce = client.nonce(unsigned.from).await?;
    Ok(PreparedTransaction {
        transaction: unsigned.clone(),
        gas: GasParameters {
            nonce,
            gas_limit: estimate.gas_limit,
            max_fee_per_gas: estimate.max_fee_per_gas,
            max_priority_fee_per_gas: estimate.max_priority_fee_per_gas,
        },
    })
}
