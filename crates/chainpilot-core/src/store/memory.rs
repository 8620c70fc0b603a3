use super::SequenceStore;
use crate::error::{PilotError, Result};
use crate::sequence::StoredSequence;
use crate::types::{Action, TransactionPatch};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

/// Process-local store for tests and ephemeral runs.
#[derive(Default)]
pub struct MemorySequenceStore {
    sequences: Mutex<HashMap<Uuid, StoredSequence>>,
}

impl MemorySequenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<Uuid, StoredSequence>>> {
        self.sequences
            .lock()
            .map_err(|_| PilotError::Store("sequence store lock poisoned".to_string()))
    }

    fn newest_first(mut sequences: Vec<StoredSequence>) -> Vec<StoredSequence> {
        sequences.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        sequences
    }
}

impl SequenceStore for MemorySequenceStore {
    fn create(&self, sequence: &StoredSequence) -> Result<()> {
        match self.lock()?.entry(sequence.id) {
            Entry::Occupied(_) => Err(PilotError::SequenceExists(sequence.id)),
            Entry::Vacant(slot) => {
                slot.insert(sequence.clone());
                Ok(())
            }
        }
    }

    fn get(&self, id: Uuid) -> Result<StoredSequence> {
        self.lock()?
            .get(&id)
            .cloned()
            .ok_or(PilotError::SequenceNotFound(id))
    }

    fn list_by_user(&self, user_id: &str) -> Result<Vec<StoredSequence>> {
        let matching = self
            .lock()?
            .values()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect();
        Ok(Self::newest_first(matching))
    }

    fn list(&self) -> Result<Vec<StoredSequence>> {
        Ok(Self::newest_first(self.lock()?.values().cloned().collect()))
    }

    fn update_transaction(
        &self,
        sequence_id: Uuid,
        action_id: Uuid,
        index: usize,
        patch: &TransactionPatch,
    ) -> Result<Action> {
        let mut sequences = self.lock()?;
        let sequence = sequences
            .get_mut(&sequence_id)
            .ok_or(PilotError::SequenceNotFound(sequence_id))?;
        // A rejected patch leaves the stored sequence untouched.
        let mut updated = sequence.clone();
        let action = updated.apply_patch(action_id, index, patch)?;
        *sequence = updated;
        Ok(action)
    }

    fn delete(&self, id: Uuid) -> Result<bool> {
        Ok(self.lock()?.remove(&id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::contract;

    #[test]
    fn create_get_delete() {
        contract::create_get_delete(&MemorySequenceStore::new());
    }

    #[test]
    fn list_by_user_newest_first() {
        contract::list_by_user_newest_first(&MemorySequenceStore::new());
    }

    #[test]
    fn create_rejects_existing_id() {
        contract::create_rejects_existing_id(&MemorySequenceStore::new());
    }

    #[test]
    fn update_transaction_persists() {
        contract::update_transaction_persists(&MemorySequenceStore::new());
    }

    #[test]
    fn update_rejects_bad_targets() {
        contract::update_rejects_bad_targets(&MemorySequenceStore::new());
    }
}
