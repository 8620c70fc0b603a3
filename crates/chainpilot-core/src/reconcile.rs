//! Background reconciliation of transactions left in flight.
//!
//! Runs as the handler of the `update-transaction` job. Each pass looks at
//! every non-terminal transaction of one sequence, settles what the chain
//! has decided, and re-schedules itself while anything is still pending.

use crate::chain_client::ChainRegistry;
use crate::config::ReconcilerConfig;
use crate::confirm::{self, Confirmation, MIN_CONFIRMATIONS};
use crate::error::{PilotError, Result};
use crate::queue::{Job, JobHandler, JobQueue, ReconcileJob, RECONCILE_JOB};
use crate::store::SequenceStore;
use crate::types::{ActionTransaction, TransactionPatch, TransactionStatus};
use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    pub sequence_id: Uuid,
    pub confirmed: usize,
    pub failed: usize,
    pub outstanding: usize,
    pub requeued: bool,
}

pub struct Reconciler {
    chains: Arc<ChainRegistry>,
    store: Arc<dyn SequenceStore>,
    queue: Arc<dyn JobQueue>,
    config: ReconcilerConfig,
}

impl Reconciler {
    pub fn new(
        chains: Arc<ChainRegistry>,
        store: Arc<dyn SequenceStore>,
        queue: Arc<dyn JobQueue>,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            chains,
            store,
            queue,
            config,
        }
    }

    /// One pass over `sequence_id`. A sequence with nothing in flight is left untouched.
    pub async fn reconcile(&self, sequence_id: Uuid) -> Result<ReconcileReport> {
        let sequence = self.store.get(sequence_id)?;
        let mut report = ReconcileReport {
            sequence_id,
            ..ReconcileReport::default()
        };

        for stored in &sequence.actions {
            let action = &stored.action;
            for (index, tx) in action.transactions.iter().enumerate() {
                if tx.status.is_terminal() {
                    continue;
                }
                let patch = self.settle(tx).await;
                match patch.status {
                    Some(TransactionStatus::Confirmed) => report.confirmed += 1,
                    Some(TransactionStatus::Failed) => report.failed += 1,
                    _ => {
                        report.outstanding += 1;
                        continue;
                    }
                }
                self.store
                    .update_transaction(sequence_id, action.id, index, &patch)?;
                debug!(
                    action_id = %action.id,
                    index,
                    status = ?patch.status,
                    "transaction reconciled"
                );
            }
        }

        if report.outstanding > 0 {
            self.schedule(sequence_id).await?;
            report.requeued = true;
        }

        if report.confirmed + report.failed > 0 || report.requeued {
            info!(
                %sequence_id,
                confirmed = report.confirmed,
                failed = report.failed,
                outstanding = report.outstanding,
                "reconciliation pass"
            );
        }
        Ok(report)
    }

    /// Queue another pass after the recheck delay.
    async fn schedule(&self, sequence_id: Uuid) -> Result<()> {
        let job = ReconcileJob { sequence_id };
        let delay = Duration::from_secs(self.config.recheck_delay_secs);
        self.queue
            .enqueue(RECONCILE_JOB, serde_json::to_value(job)?, job.options(delay))
            .await?;
        Ok(())
    }

    /// The patch the chain dictates for `tx`; an empty patch means still pending.
    async fn settle(&self, tx: &ActionTransaction) -> TransactionPatch {
        let Some(hash) = tx.hash else {
            return TransactionPatch::failed("Transaction was never broadcast");
        };
        let client = match self.chains.client(tx.transaction.chain_id) {
            Ok(client) => client,
            Err(e) => return TransactionPatch::failed(e.to_string()),
        };
        match confirm::check(client.as_ref(), hash, MIN_CONFIRMATIONS).await {
            Ok(Confirmation::Confirmed { .. }) => {
                TransactionPatch::status(TransactionStatus::Confirmed)
            }
            Ok(Confirmation::Reverted { block }) => {
                TransactionPatch::failed(format!("Transaction reverted on-chain in block {block}"))
            }
            Ok(Confirmation::Missing) => TransactionPatch::failed("Transaction not found on chain"),
            Ok(Confirmation::Pending) => self.stale_patch(tx).unwrap_or_default(),
            Err(e) => {
                warn!(%hash, error = %e, "transaction lookup failed");
                TransactionPatch::failed(format!("Transaction lookup failed: {e}"))
            }
        }
    }

    fn stale_patch(&self, tx: &ActionTransaction) -> Option<TransactionPatch> {
        if self.config.stale_after_secs == 0 {
            return None;
        }
        let sent_at = tx.sent_at?;
        let age = Utc::now().signed_duration_since(sent_at).num_seconds();
        let limit = i64::try_from(self.config.stale_after_secs).unwrap_or(i64::MAX);
        (age > limit).then(|| {
            TransactionPatch::failed(format!(
                "Confirmation timed out after {} seconds",
                self.config.stale_after_secs
            ))
        })
    }
}

#[async_trait]
impl JobHandler for Reconciler {
    async fn handle(&self, job: Job) -> Result<()> {
        if job.name != RECONCILE_JOB {
            return Err(PilotError::Queue(format!("unexpected job: {}", job.name)));
        }
        let ReconcileJob { sequence_id } = serde_json::from_value(job.payload)?;
        match self.reconcile(sequence_id).await {
            Ok(_) => Ok(()),
            Err(PilotError::SequenceNotFound(id)) => {
                debug!(sequence_id = %id, "sequence deleted before reconciliation");
                Ok(())
            }
            Err(e) => {
                // A failed pass may leave SENT transactions behind; try again later.
                debug!(%sequence_id, error = %e, "reconciliation pass failed; rescheduling");
                self.schedule(sequence_id).await?;
                Err(e)
            }
        }
    }
}
