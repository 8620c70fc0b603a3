//! redb-backed sequence store.
//!
//! # Table design
//!
//! `SEQUENCES` maps the 16-byte sequence id to the JSON-encoded sequence.
//! `USER_INDEX` holds one empty-valued row per sequence keyed by
//! ```text
//! [ user_id bytes | 0x00 | created_at_ms: u64 big-endian | uuid: 16 bytes ]
//! ```
//! so a prefix range scan yields one user's sequences in creation order.

use super::SequenceStore;
use crate::error::{PilotError, Result};
use crate::sequence::StoredSequence;
use crate::types::{Action, TransactionPatch};
use chrono::{DateTime, Utc};
use redb::{Database, ReadableTable, TableDefinition};
use std::path::Path;
use tracing::debug;
use uuid::Uuid;

const SEQUENCES: TableDefinition<&[u8], &[u8]> = TableDefinition::new("sequences");
const USER_INDEX: TableDefinition<&[u8], &[u8]> = TableDefinition::new("sequences_by_user");

fn store_err(e: impl std::fmt::Display) -> PilotError {
    PilotError::Store(e.to_string())
}

fn user_prefix(user_id: &str) -> Vec<u8> {
    let mut key = user_id.as_bytes().to_vec();
    key.push(0x00);
    key
}

/// Exclusive upper bound for a user's prefix scan.
fn user_prefix_end(user_id: &str) -> Vec<u8> {
    let mut key = user_id.as_bytes().to_vec();
    key.push(0x01);
    key
}

fn index_key(user_id: &str, created_at: DateTime<Utc>, id: Uuid) -> Vec<u8> {
    let mut key = user_prefix(user_id);
    let ms = created_at.timestamp_millis().max(0) as u64;
    key.extend_from_slice(&ms.to_be_bytes());
    key.extend_from_slice(id.as_bytes());
    key
}

fn decode(bytes: &[u8]) -> Result<StoredSequence> {
    serde_json::from_slice(bytes).map_err(store_err)
}

pub struct RedbSequenceStore {
    db: Database,
}

impl RedbSequenceStore {
    /// Open or create the database at `path`, creating parent directories.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path).map_err(store_err)?;
        let wt = db.begin_write().map_err(store_err)?;
        wt.open_table(SEQUENCES).map_err(store_err)?;
        wt.open_table(USER_INDEX).map_err(store_err)?;
        wt.commit().map_err(store_err)?;
        debug!(path = %path.display(), "opened sequence store");
        Ok(Self { db })
    }
}

impl SequenceStore for RedbSequenceStore {
    fn create(&self, sequence: &StoredSequence) -> Result<()> {
        let value = serde_json::to_vec(sequence).map_err(store_err)?;
        let index = index_key(&sequence.user_id, sequence.created_at, sequence.id);
        let wt = self.db.begin_write().map_err(store_err)?;
        {
            let mut table = wt.open_table(SEQUENCES).map_err(store_err)?;
            let key = sequence.id.as_bytes().as_slice();
            if table.get(key).map_err(store_err)?.is_some() {
                return Err(PilotError::SequenceExists(sequence.id));
            }
            table
                .insert(key, value.as_slice())
                .map_err(store_err)?;
            let mut by_user = wt.open_table(USER_INDEX).map_err(store_err)?;
            let empty: &[u8] = &[];
            by_user.insert(index.as_slice(), empty).map_err(store_err)?;
        }
        wt.commit().map_err(store_err)?;
        Ok(())
    }

    fn get(&self, id: Uuid) -> Result<StoredSequence> {
        let rt = self.db.begin_read().map_err(store_err)?;
        let table = rt.open_table(SEQUENCES).map_err(store_err)?;
        let value = table
            .get(id.as_bytes().as_slice())
            .map_err(store_err)?
            .ok_or(PilotError::SequenceNotFound(id))?;
        decode(value.value())
    }

    fn list_by_user(&self, user_id: &str) -> Result<Vec<StoredSequence>> {
        let rt = self.db.begin_read().map_err(store_err)?;
        let by_user = rt.open_table(USER_INDEX).map_err(store_err)?;
        let sequences = rt.open_table(SEQUENCES).map_err(store_err)?;

        let start = user_prefix(user_id);
        let end = user_prefix_end(user_id);
        let mut result = Vec::new();
        for entry in by_user
            .range(start.as_slice()..end.as_slice())
            .map_err(store_err)?
        {
            let (key, _) = entry.map_err(store_err)?;
            let id_bytes = &key.value()[key.value().len() - 16..];
            if let Some(value) = sequences.get(id_bytes).map_err(store_err)? {
                result.push(decode(value.value())?);
            }
        }
        result.reverse();
        Ok(result)
    }

    fn list(&self) -> Result<Vec<StoredSequence>> {
        let rt = self.db.begin_read().map_err(store_err)?;
        let table = rt.open_table(SEQUENCES).map_err(store_err)?;
        let mut result = Vec::new();
        for entry in table.iter().map_err(store_err)? {
            let (_, v) = entry.map_err(store_err)?;
            result.push(decode(v.value())?);
        }
        result.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(result)
    }

    fn update_transaction(
        &self,
        sequence_id: Uuid,
        action_id: Uuid,
        index: usize,
        patch: &TransactionPatch,
    ) -> Result<Action> {
        let wt = self.db.begin_write().map_err(store_err)?;
        let action = {
            let mut table = wt.open_table(SEQUENCES).map_err(store_err)?;
            let current = table
                .get(sequence_id.as_bytes().as_slice())
                .map_err(store_err)?
                .map(|v| v.value().to_vec())
                .ok_or(PilotError::SequenceNotFound(sequence_id))?;
            let mut sequence = decode(&current)?;
            let action = sequence.apply_patch(action_id, index, patch)?;
            let value = serde_json::to_vec(&sequence).map_err(store_err)?;
            table
                .insert(sequence_id.as_bytes().as_slice(), value.as_slice())
                .map_err(store_err)?;
            action
        };
        wt.commit().map_err(store_err)?;
        Ok(action)
    }

    fn delete(&self, id: Uuid) -> Result<bool> {
        let wt = self.db.begin_write().map_err(store_err)?;
        let removed = {
            let mut table = wt.open_table(SEQUENCES).map_err(store_err)?;
            let removed = table
                .remove(id.as_bytes().as_slice())
                .map_err(store_err)?
                .map(|v| v.value().to_vec());
            match removed {
                Some(bytes) => {
                    let sequence = decode(&bytes)?;
                    let mut by_user = wt.open_table(USER_INDEX).map_err(store_err)?;
                    let key = index_key(&sequence.user_id, sequence.created_at, sequence.id);
                    by_user.remove(key.as_slice()).map_err(store_err)?;
                    true
                }
                None => false,
            }
        };
        wt.commit().map_err(store_err)?;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::contract;
    use tempfile::TempDir;

    fn open_tmp() -> (TempDir, RedbSequenceStore) {
        let dir = TempDir::new().unwrap();
        let store = RedbSequenceStore::open(&dir.path().join("nested/sequences.redb")).unwrap();
        (dir, store)
    }

    #[test]
    fn create_get_delete() {
        let (_dir, store) = open_tmp();
        contract::create_get_delete(&store);
    }

    #[test]
    fn list_by_user_newest_first() {
        let (_dir, store) = open_tmp();
        contract::list_by_user_newest_first(&store);
    }

    #[test]
    fn create_rejects_existing_id() {
        let (_dir, store) = open_tmp();
        contract::create_rejects_existing_id(&store);
    }

    #[test]
    fn update_transaction_persists() {
        let (_dir, store) = open_tmp();
        contract::update_transaction_persists(&store);
    }

    #[test]
    fn update_rejects_bad_targets() {
        let (_dir, store) = open_tmp();
        contract::update_rejects_bad_targets(&store);
    }

    #[test]
    fn data_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sequences.redb");
        let id = {
            let store = RedbSequenceStore::open(&path).unwrap();
            contract::create_get_delete(&store);
            let seq = store.list().unwrap();
            assert!(seq.is_empty());
            contract::update_transaction_persists(&store);
            store.list().unwrap()[0].id
        };
        let store = RedbSequenceStore::open(&path).unwrap();
        assert_eq!(store.get(id).unwrap().id, id);
    }
}
