use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::debug;
use uuid::Uuid;

use super::{CommitInfo, DocumentStore, Query};
use crate::core::{DbError, Document, DocumentKey, Fields, Result};
use crate::transaction::{SetMode, Transaction, TransactionManager, TransactionStats};

/// Committed state of one document address.
///
/// A slot with `fields == None` only lives while a commit that validated
/// the document's absence holds it; it is pruned once that commit ends.
#[derive(Debug)]
struct Slot {
    fields: Option<Fields>,
    version: u64,
    update_time: DateTime<Utc>,
}

impl Slot {
    fn empty() -> Self {
        Self {
            fields: None,
            version: 0,
            update_time: DateTime::<Utc>::MIN_UTC,
        }
    }

    fn to_document(&self, key: &DocumentKey) -> Option<Document> {
        self.fields
            .as_ref()
            .map(|fields| Document::new(key.clone(), fields.clone(), self.version, self.update_time))
    }
}

/// In-memory transactional document store.
///
/// Every document lives in its own slot with an individual lock. A commit
/// locks only the slots its transaction touched, in key order, so
/// transactions over disjoint documents never wait on each other.
pub struct InMemoryDocumentStore {
    slots: RwLock<HashMap<DocumentKey, Arc<Mutex<Slot>>>>,
    transactions: Arc<TransactionManager>,
}

impl Default for InMemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            transactions: Arc::new(TransactionManager::new()),
        }
    }

    /// Write `fields` to `key` in a transaction of its own
    pub async fn insert_document(&self, key: DocumentKey, fields: Fields) -> Result<CommitInfo> {
        let mut txn = self.begin().await?;
        txn.set(key, fields, SetMode::Overwrite)?;
        self.commit(txn).await
    }

    /// Number of existing documents in `collection`
    pub async fn document_count(&self, collection: &str) -> usize {
        // Slot locks are never awaited while the map lock is held
        let candidates: Vec<Arc<Mutex<Slot>>> = {
            let slots = self.slots.read().await;
            slots
                .iter()
                .filter(|(key, _)| key.collection == collection)
                .map(|(_, slot)| Arc::clone(slot))
                .collect()
        };

        let mut count = 0;
        for slot in candidates {
            if slot.lock().await.fields.is_some() {
                count += 1;
            }
        }
        count
    }

    pub fn transaction_stats(&self) -> TransactionStats {
        self.transactions.stats()
    }

    async fn existing_slot(&self, key: &DocumentKey) -> Option<Arc<Mutex<Slot>>> {
        self.slots.read().await.get(key).cloned()
    }

    async fn slot_for_commit(&self, key: &DocumentKey) -> Arc<Mutex<Slot>> {
        if let Some(slot) = self.existing_slot(key).await {
            return slot;
        }
        let mut slots = self.slots.write().await;
        Arc::clone(
            slots
                .entry(key.clone())
                .or_insert_with(|| Arc::new(Mutex::new(Slot::empty()))),
        )
    }

    /// Drops slots that were locked by a commit but never received a
    /// document. An empty slot at version 0 reads the same as no slot.
    ///
    /// A slot is kept while another commit holds it; that commit prunes
    /// it on its own way out. Handles are only cloned under the map lock,
    /// so a removed slot can never be locked again.
    async fn prune_empty_slots(&self, keys: &[DocumentKey]) {
        let mut slots = self.slots.write().await;
        for key in keys {
            let vacant = slots.get(key).is_some_and(|slot| {
                Arc::strong_count(slot) == 1
                    && slot
                        .try_lock()
                        .is_ok_and(|slot| slot.fields.is_none() && slot.version == 0)
            });
            if vacant {
                slots.remove(key);
            }
        }
    }

    #[cfg(test)]
    async fn slot_count(&self) -> usize {
        self.slots.read().await.len()
    }

    async fn read_committed(&self, key: &DocumentKey) -> (Option<Document>, u64) {
        match self.existing_slot(key).await {
            Some(slot) => {
                let slot = slot.lock().await;
                (slot.to_document(key), slot.version)
            }
            None => (None, 0),
        }
    }

    /// Validates the read set and applies every change under the held
    /// slot locks. Contains no await point, so it runs to completion or
    /// not at all.
    fn apply_locked(
        &self,
        txn: &mut Transaction,
        guards: &mut BTreeMap<DocumentKey, OwnedMutexGuard<Slot>>,
    ) -> Result<CommitInfo> {
        let txn_id = txn.id();
        let stale = txn.reads().iter().find_map(|(key, seen)| {
            let current = guards.get(key).map(|slot| slot.version).unwrap_or(0);
            (current != *seen).then(|| {
                DbError::WriteConflict(format!(
                    "{} read at version {} but is now at version {} ({})",
                    key, seen, current, txn_id
                ))
            })
        });
        if let Some(err) = stale {
            self.abort_on_conflict(txn, &err);
            return Err(err);
        }

        let commit_time = Utc::now();
        let changes = txn.take_changes();
        let mut staged: BTreeMap<DocumentKey, Fields> = BTreeMap::new();
        for change in &changes {
            let key = change.key();
            let current = match staged.get(key) {
                Some(fields) => Some(fields),
                None => guards.get(key).and_then(|slot| slot.fields.as_ref()),
            };
            match change.apply(current, commit_time) {
                Ok(fields) => {
                    staged.insert(key.clone(), fields);
                }
                Err(err) => {
                    self.abort_on_conflict(txn, &err);
                    return Err(err);
                }
            }
        }

        let documents_written = staged.len();
        for (key, fields) in staged {
            if let Some(slot) = guards.get_mut(&key) {
                slot.fields = Some(fields);
                slot.version += 1;
                slot.update_time = commit_time;
            }
        }
        txn.commit()?;

        debug!(
            txn = %txn_id,
            documents_written,
            elapsed_us = txn.duration().as_micros() as u64,
            "transaction committed"
        );

        Ok(CommitInfo {
            txn_id,
            commit_time,
            documents_written,
        })
    }

    fn abort_on_conflict(&self, txn: &mut Transaction, err: &DbError) {
        if err.is_conflict() {
            self.transactions.record_conflict();
        }
        // Already-closed transactions are fine here; the error is what matters
        let _ = txn.rollback();
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    fn new_document_id(&self, _collection: &str) -> String {
        Uuid::new_v4().simple().to_string()
    }

    async fn begin(&self) -> Result<Transaction> {
        self.transactions.begin()
    }

    async fn get_in(&self, txn: &mut Transaction, key: &DocumentKey) -> Result<Option<Document>> {
        let (committed, version) = self.read_committed(key).await;
        txn.record_read(key.clone(), version)?;

        let pending: Vec<_> = txn.pending_for(key).collect();
        if pending.is_empty() {
            return Ok(committed);
        }

        // Read-your-writes: overlay buffered changes on the committed state
        let now = Utc::now();
        let mut view = committed.as_ref().map(|doc| doc.fields().clone());
        for change in pending {
            view = Some(change.apply(view.as_ref(), now)?);
        }
        Ok(view.map(|fields| Document::new(key.clone(), fields, version, now)))
    }

    async fn commit(&self, mut txn: Transaction) -> Result<CommitInfo> {
        let keys: BTreeSet<DocumentKey> = txn
            .reads()
            .keys()
            .cloned()
            .chain(txn.changes().iter().map(|change| change.key().clone()))
            .collect();

        // Lock in key order so concurrent commits cannot deadlock
        let mut guards: BTreeMap<DocumentKey, OwnedMutexGuard<Slot>> = BTreeMap::new();
        for key in keys {
            let slot = self.slot_for_commit(&key).await;
            guards.insert(key, slot.lock_owned().await);
        }

        let outcome = self.apply_locked(&mut txn, &mut guards);

        let vacant: Vec<DocumentKey> = guards
            .iter()
            .filter(|(_, slot)| slot.fields.is_none() && slot.version == 0)
            .map(|(key, _)| key.clone())
            .collect();
        drop(guards);

        if !vacant.is_empty() {
            self.prune_empty_slots(&vacant).await;
        }
        outcome
    }

    async fn rollback(&self, mut txn: Transaction) -> Result<()> {
        txn.rollback()
    }

    async fn get(&self, key: &DocumentKey) -> Result<Option<Document>> {
        Ok(self.read_committed(key).await.0)
    }

    async fn query(&self, query: &Query) -> Result<Vec<Document>> {
        let candidates: Vec<(DocumentKey, Arc<Mutex<Slot>>)> = {
            let slots = self.slots.read().await;
            slots
                .iter()
                .filter(|(key, _)| key.collection == query.collection_name())
                .map(|(key, slot)| (key.clone(), Arc::clone(slot)))
                .collect()
        };

        let mut documents = Vec::new();
        for (key, slot) in candidates {
            let slot = slot.lock().await;
            if let Some(doc) = slot.to_document(&key) {
                if query.matches(doc.fields()) {
                    documents.push(doc);
                }
            }
        }

        query.arrange(&mut documents)?;
        Ok(documents)
    }
}
