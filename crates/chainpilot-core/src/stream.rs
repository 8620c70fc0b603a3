//! Polling status stream for one stored sequence.

use crate::config::StreamConfig;
use crate::error::Result;
use crate::sequence::StoredSequence;
use crate::store::SequenceStore;
use crate::types::{ActionStatus, TransactionStatus};
use alloy_primitives::B256;
use futures::stream::{self, Stream};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionView {
    pub index: usize,
    pub status: TransactionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<B256>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionView {
    pub id: Uuid,
    pub description: String,
    pub status: ActionStatus,
    pub transactions: Vec<TransactionView>,
}

/// One poll of a sequence, as sent to stream subscribers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub sequence_id: Uuid,
    pub iteration: u32,
    pub actions: Vec<ActionView>,
    /// Set on the last snapshot, once every transaction is terminal.
    #[serde(rename = "final")]
    pub is_final: bool,
    pub has_failed: bool,
    pub has_ongoing_transactions: bool,
}

impl StatusSnapshot {
    pub fn of(sequence: &StoredSequence, iteration: u32) -> Self {
        let actions = sequence
            .actions
            .iter()
            .map(|stored| ActionView {
                id: stored.action.id,
                description: stored.description.clone(),
                status: stored.action.status,
                transactions: stored
                    .action
                    .transactions
                    .iter()
                    .enumerate()
                    .map(|(index, tx)| TransactionView {
                        index,
                        status: tx.status,
                        hash: tx.hash,
                        message: tx.message.clone(),
                    })
                    .collect(),
            })
            .collect();
        Self {
            sequence_id: sequence.id,
            iteration,
            actions,
            is_final: sequence.all_terminal(),
            has_failed: sequence.has_failed(),
            has_ongoing_transactions: sequence.has_ongoing(),
        }
    }
}

struct Watch {
    store: Arc<dyn SequenceStore>,
    sequence_id: Uuid,
    interval: Duration,
    max_iterations: u32,
    iteration: u32,
    done: bool,
}

/// Snapshots of `sequence_id`, one per `config.interval()`.
///
/// Ends after the final snapshot, after a read error, or silently once
/// `config.max_iterations` polls have been made.
pub fn watch_sequence(
    store: Arc<dyn SequenceStore>,
    sequence_id: Uuid,
    config: &StreamConfig,
) -> impl Stream<Item = Result<StatusSnapshot>> + Send + 'static {
    let state = Watch {
        store,
        sequence_id,
        interval: config.interval(),
        max_iterations: config.max_iterations,
        iteration: 0,
        done: false,
    };
    stream::unfold(state, |mut w| async move {
        if w.done || w.iteration >= w.max_iterations {
            return None;
        }
        if w.iteration > 0 {
            tokio::time::sleep(w.interval).await;
        }
        w.iteration += 1;
        match w.store.get(w.sequence_id) {
            Ok(sequence) => {
                let snapshot = StatusSnapshot::of(&sequence, w.iteration);
                w.done = snapshot.is_final;
                Some((Ok(snapshot), w))
            }
            Err(e) => {
                w.done = true;
                Some((Err(e), w))
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequence::{ActionResult, ActionSequence};
    use crate::store::MemorySequenceStore;
    use crate::types::{Action, ActionKind, TransactionKind, TransactionPatch, UnsignedTransaction};
    use alloy_primitives::{Address, Bytes, U256};
    use futures::StreamExt;
    use serde_json::json;

    fn config(max_iterations: u32) -> StreamConfig {
        StreamConfig {
            interval_ms: 1,
            max_iterations,
        }
    }

    fn seed(store: &MemorySequenceStore) -> (Uuid, Uuid) {
        let mut action = Action::new(ActionKind::Transfer, "transfer", 1);
        action.push_transaction(
            TransactionKind::Transfer,
            UnsignedTransaction {
                chain_id: 1,
                from: Address::repeat_byte(1),
                to: Address::repeat_byte(2),
                value: U256::from(1u64),
                data: Bytes::new(),
            },
        );
        let action_id = action.id;
        let seq = StoredSequence::from_draft(
            ActionSequence::new(None, vec![ActionResult::ok("send", action)]),
            "alice",
        )
        .unwrap();
        store.create(&seq).unwrap();
        (seq.id, action_id)
    }

    #[tokio::test]
    async fn finished_sequence_emits_one_final_snapshot() {
        let store = Arc::new(MemorySequenceStore::new());
        let (id, action_id) = seed(&store);
        store
            .update_transaction(id, action_id, 0, &TransactionPatch::failed("boom"))
            .unwrap();

        let events: Vec<_> = watch_sequence(store, id, &config(5)).collect().await;
        assert_eq!(events.len(), 1);
        let snapshot = events[0].as_ref().unwrap();
        assert!(snapshot.is_final);
        assert!(snapshot.has_failed);
        assert!(!snapshot.has_ongoing_transactions);

        let json = serde_json::to_value(snapshot).unwrap();
        assert_eq!(json["final"], json!(true));
        assert_eq!(json["hasFailed"], json!(true));
        assert_eq!(json["actions"][0]["transactions"][0]["message"], json!("boom"));
    }

    #[tokio::test]
    async fn budget_exhaustion_ends_without_final_event() {
        let store = Arc::new(MemorySequenceStore::new());
        let (id, action_id) = seed(&store);
        store
            .update_transaction(
                id,
                action_id,
                0,
                &TransactionPatch::sent(alloy_primitives::B256::repeat_byte(1), chrono::Utc::now()),
            )
            .unwrap();

        let events: Vec<_> = watch_sequence(store, id, &config(3)).collect().await;
        assert_eq!(events.len(), 3);
        for (i, event) in events.iter().enumerate() {
            let snapshot = event.as_ref().unwrap();
            assert_eq!(snapshot.iteration, i as u32 + 1);
            assert!(!snapshot.is_final);
            assert!(snapshot.has_ongoing_transactions);
        }
    }

    #[tokio::test]
    async fn stream_observes_progress() {
        let store = Arc::new(MemorySequenceStore::new());
        let (id, action_id) = seed(&store);
        let mut events = Box::pin(watch_sequence(store.clone(), id, &config(10)));

        let first = events.next().await.unwrap().unwrap();
        assert!(!first.is_final);

        store
            .update_transaction(
                id,
                action_id,
                0,
                &TransactionPatch::status(TransactionStatus::Confirmed),
            )
            .unwrap();
        let second = events.next().await.unwrap().unwrap();
        assert!(second.is_final);
        assert!(!second.has_failed);
        assert!(events.next().await.is_none());
    }

    #[tokio::test]
    async fn unknown_sequence_yields_one_error() {
        let store = Arc::new(MemorySequenceStore::new());
        let events: Vec<_> = watch_sequence(store, Uuid::new_v4(), &config(5)).collect().await;
        assert_eq!(events.len(), 1);
        assert!(events[0].is_err());
    }
}
