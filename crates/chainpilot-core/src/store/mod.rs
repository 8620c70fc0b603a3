//! Persistence of confirmed action sequences.

mod memory;
mod redb_store;

pub use memory::MemorySequenceStore;
pub use redb_store::RedbSequenceStore;

use crate::error::Result;
use crate::sequence::StoredSequence;
use crate::types::{Action, TransactionPatch};
use uuid::Uuid;

/// Create/read/update contract over persisted sequences.
///
/// Writes for one transaction come from a single owner at a time (executor,
/// then reconciler), so implementations apply patches last-writer-wins.
pub trait SequenceStore: Send + Sync {
    fn create(&self, sequence: &StoredSequence) -> Result<()>;

    /// Fails with `SequenceNotFound` for an unknown id.
    fn get(&self, id: Uuid) -> Result<StoredSequence>;

    /// Sequences of `user_id`, newest first.
    fn list_by_user(&self, user_id: &str) -> Result<Vec<StoredSequence>>;

    /// Every sequence, newest first.
    fn list(&self) -> Result<Vec<StoredSequence>>;

    /// Patch one transaction and return its action with the recomputed status.
    fn update_transaction(
        &self,
        sequence_id: Uuid,
        action_id: Uuid,
        index: usize,
        patch: &TransactionPatch,
    ) -> Result<Action>;

    /// Returns false when nothing was stored under `id`.
    fn delete(&self, id: Uuid) -> Result<bool>;
}

#[cfg(test)]
pub(crate) mod contract {
    //! Behaviour every store implementation must share.

    use super::SequenceStore;
    use crate::error::PilotError;
    use crate::sequence::{ActionResult, ActionSequence, StoredSequence};
    use crate::types::{
        Action, ActionKind, ActionStatus, TransactionKind, TransactionPatch, TransactionStatus,
        UnsignedTransaction,
    };
    use alloy_primitives::{Address, Bytes, B256, U256};
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    fn draft(user: &str, minutes_ago: i64) -> ActionSequence {
        let mut action = Action::new(ActionKind::Transfer, "transfer", 1);
        for _ in 0..2 {
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
        }
        let mut draft = ActionSequence::new(Some(user.into()), vec![ActionResult::ok("send", action)]);
        draft.created_at = Utc::now() - Duration::minutes(minutes_ago);
        draft
    }

    fn sequence(user: &str, minutes_ago: i64) -> StoredSequence {
        StoredSequence::from_draft(draft(user, minutes_ago), user).unwrap()
    }

    pub fn create_get_delete(store: &dyn SequenceStore) {
        let seq = sequence("alice", 0);
        store.create(&seq).unwrap();
        assert_eq!(store.get(seq.id).unwrap(), seq);

        assert!(store.delete(seq.id).unwrap());
        assert!(!store.delete(seq.id).unwrap());
        assert!(matches!(
            store.get(seq.id).unwrap_err(),
            PilotError::SequenceNotFound(id) if id == seq.id
        ));
    }

    pub fn list_by_user_newest_first(store: &dyn SequenceStore) {
        let old = sequence("alice", 30);
        let new = sequence("alice", 1);
        let other = sequence("bob", 5);
        let prefix = sequence("alicex", 0);
        for s in [&old, &other, &new, &prefix] {
            store.create(s).unwrap();
        }
        let ids: Vec<Uuid> = store.list_by_user("alice").unwrap().iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![new.id, old.id]);
        assert!(store.list_by_user("carol").unwrap().is_empty());
        assert_eq!(store.list().unwrap().len(), 4);
        assert_eq!(store.list().unwrap()[0].id, prefix.id);

        store.delete(new.id).unwrap();
        assert_eq!(store.list_by_user("alice").unwrap().len(), 1);
    }

    pub fn create_rejects_existing_id(store: &dyn SequenceStore) {
        let saved = draft("alice", 0);
        let seq = StoredSequence::from_draft(saved.clone(), "alice").unwrap();
        store.create(&seq).unwrap();
        let action_id = seq.actions[0].action.id;
        let hash = B256::repeat_byte(9);
        store
            .update_transaction(seq.id, action_id, 0, &TransactionPatch::sent(hash, Utc::now()))
            .unwrap();
        store
            .update_transaction(seq.id, action_id, 0, &TransactionPatch::status(TransactionStatus::Confirmed))
            .unwrap();

        let again = StoredSequence::from_draft(saved, "alice").unwrap();
        assert!(matches!(
            store.create(&again).unwrap_err(),
            PilotError::SequenceExists(id) if id == seq.id
        ));
        let tx = &store.get(seq.id).unwrap().actions[0].action.transactions[0];
        assert_eq!(tx.status, TransactionStatus::Confirmed);
        assert_eq!(tx.hash, Some(hash));
        assert_eq!(store.list_by_user("alice").unwrap().len(), 1);
    }

    pub fn update_transaction_persists(store: &dyn SequenceStore) {
        let seq = sequence("alice", 0);
        store.create(&seq).unwrap();
        let action_id = seq.actions[0].action.id;
        let hash = B256::repeat_byte(7);

        let action = store
            .update_transaction(seq.id, action_id, 0, &TransactionPatch::sent(hash, Utc::now()))
            .unwrap();
        assert_eq!(action.transactions[0].status, TransactionStatus::Sent);
        assert_eq!(action.status, ActionStatus::Pending);

        store
            .update_transaction(seq.id, action_id, 0, &TransactionPatch::status(TransactionStatus::Confirmed))
            .unwrap();
        let action = store
            .update_transaction(seq.id, action_id, 1, &TransactionPatch::failed("boom"))
            .unwrap();
        assert_eq!(action.status, ActionStatus::Failed);

        let reloaded = store.get(seq.id).unwrap();
        let txs = &reloaded.actions[0].action.transactions;
        assert_eq!(txs[0].hash, Some(hash));
        assert_eq!(txs[0].status, TransactionStatus::Confirmed);
        assert_eq!(txs[1].message.as_deref(), Some("boom"));
        assert_eq!(reloaded.actions[0].action.status, ActionStatus::Failed);
    }

    pub fn update_rejects_bad_targets(store: &dyn SequenceStore) {
        let seq = sequence("alice", 0);
        store.create(&seq).unwrap();
        let action_id = seq.actions[0].action.id;
        let patch = TransactionPatch::status(TransactionStatus::Confirmed);

        assert!(matches!(
            store.update_transaction(Uuid::new_v4(), action_id, 0, &patch).unwrap_err(),
            PilotError::SequenceNotFound(_)
        ));
        assert!(matches!(
            store.update_transaction(seq.id, Uuid::new_v4(), 0, &patch).unwrap_err(),
            PilotError::ActionMissing { .. }
        ));
        assert!(matches!(
            store.update_transaction(seq.id, action_id, 9, &patch).unwrap_err(),
            PilotError::TransactionMissing { index: 9, .. }
        ));

        store.update_transaction(seq.id, action_id, 0, &patch).unwrap();
        assert!(matches!(
            store
                .update_transaction(seq.id, action_id, 0, &TransactionPatch::failed("late"))
                .unwrap_err(),
            PilotError::TransactionFinalized { .. }
        ));
        assert_eq!(
            store.get(seq.id).unwrap().actions[0].action.transactions[0].status,
            TransactionStatus::Confirmed
        );
    }
}
