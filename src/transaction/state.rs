// ============================================================================
// Transaction State Management
// ============================================================================
//
// Each transaction moves through Active -> Committed/Aborted.
//
// Optimistic concurrency:
// - every read records the version of the document it observed
//   (0 when the document did not exist)
// - writes are buffered and become visible only at commit
// - the store rejects the commit if any recorded version moved
//
// ============================================================================

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use super::{Change, SetMode, TransactionManager};
use crate::core::{DbError, DocumentKey, Fields, Result};

/// Global transaction ID counter
static NEXT_TXN_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(pub u64);

impl TransactionId {
    /// Generate a new unique transaction ID
    pub fn new() -> Self {
        TransactionId(NEXT_TXN_ID.fetch_add(1, Ordering::SeqCst))
    }

    /// Get the raw ID value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "txn_{}", self.0)
    }
}

/// Transaction state
///
/// ```text
/// Active ──commit──> Committed
///   │
///   └──rollback/conflict/drop──> Aborted
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Active,
    Committed,
    Aborted,
}

impl TransactionState {
    pub fn is_active(&self) -> bool {
        matches!(self, TransactionState::Active)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionState::Committed | TransactionState::Aborted
        )
    }
}

impl std::fmt::Display for TransactionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionState::Active => write!(f, "ACTIVE"),
            TransactionState::Committed => write!(f, "COMMITTED"),
            TransactionState::Aborted => write!(f, "ABORTED"),
        }
    }
}

/// An optimistic document transaction.
///
/// Owned by a single task. Dropping an active transaction aborts it, so a
/// cancelled or timed-out future never leaves buffered writes behind.
#[derive(Debug)]
pub struct Transaction {
    id: TransactionId,
    state: TransactionState,

    /// Versions observed by reads (0 = document absent)
    reads: HashMap<DocumentKey, u64>,

    /// Buffered writes in program order
    changes: Vec<Change>,

    start_time: std::time::Instant,

    manager: Option<Arc<TransactionManager>>,
}

impl Transaction {
    /// Create a detached transaction not tracked by any manager
    pub fn new(id: TransactionId) -> Self {
        Self {
            id,
            state: TransactionState::Active,
            reads: HashMap::new(),
            changes: Vec::new(),
            start_time: std::time::Instant::now(),
            manager: None,
        }
    }

    pub(crate) fn tracked(id: TransactionId, manager: Arc<TransactionManager>) -> Self {
        let mut txn = Self::new(id);
        txn.manager = Some(manager);
        txn
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn changes(&self) -> &[Change] {
        &self.changes
    }

    pub fn change_count(&self) -> usize {
        self.changes.len()
    }

    pub fn reads(&self) -> &HashMap<DocumentKey, u64> {
        &self.reads
    }

    pub fn duration(&self) -> std::time::Duration {
        self.start_time.elapsed()
    }

    /// Record the version a read observed.
    ///
    /// Reading the same document twice at different versions means another
    /// transaction committed in between; the transaction can no longer
    /// succeed and the conflict is reported immediately.
    pub fn record_read(&mut self, key: DocumentKey, version: u64) -> Result<()> {
        self.ensure_active()?;

        match self.reads.get(&key) {
            Some(seen) if *seen != version => Err(DbError::WriteConflict(format!(
                "{} changed from version {} to {} during {}",
                key, seen, version, self.id
            ))),
            Some(_) => Ok(()),
            None => {
                self.reads.insert(key, version);
                Ok(())
            }
        }
    }

    /// Buffer a write of `fields` to `key`
    pub fn set(&mut self, key: DocumentKey, fields: Fields, mode: SetMode) -> Result<()> {
        self.record_change(Change::Set { key, fields, mode })
    }

    /// Buffer the creation of a new document at `key`
    pub fn create(&mut self, key: DocumentKey, fields: Fields) -> Result<()> {
        self.record_change(Change::Create { key, fields })
    }

    pub fn record_change(&mut self, change: Change) -> Result<()> {
        self.ensure_active()?;
        self.changes.push(change);
        Ok(())
    }

    /// Buffered changes touching `key`, in the order they were recorded
    pub fn pending_for<'a>(&'a self, key: &'a DocumentKey) -> impl Iterator<Item = &'a Change> + 'a {
        self.changes.iter().filter(move |change| change.key() == key)
    }

    pub(crate) fn take_changes(&mut self) -> Vec<Change> {
        std::mem::take(&mut self.changes)
    }

    /// Mark transaction as committed
    pub fn commit(&mut self) -> Result<()> {
        self.ensure_active()?;
        self.state = TransactionState::Committed;
        self.notify_finished();
        Ok(())
    }

    /// Mark transaction as aborted and discard changes
    pub fn rollback(&mut self) -> Result<()> {
        self.ensure_active()?;
        self.changes.clear();
        self.state = TransactionState::Aborted;
        self.notify_finished();
        Ok(())
    }

    fn ensure_active(&self) -> Result<()> {
        if !self.state.is_active() {
            return Err(DbError::TransactionClosed(format!("{} ({})", self.id, self.state)));
        }
        Ok(())
    }

    fn notify_finished(&self) {
        if let Some(manager) = &self.manager {
            manager.finish(self.id, self.state);
        }
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.state.is_active() {
            self.changes.clear();
            self.state = TransactionState::Aborted;
            self.notify_finished();
        }
    }
}
