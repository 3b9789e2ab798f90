// ============================================================================
// Transaction Manager
// ============================================================================

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use super::{Transaction, TransactionId, TransactionState};
use crate::core::Result;

/// Issues transactions and keeps lifecycle counters.
///
/// Bookkeeping uses a std mutex so that transactions dropped mid-flight
/// (cancelled futures) can deregister from `Drop` without awaiting.
#[derive(Debug, Default)]
pub struct TransactionManager {
    active_ids: Mutex<HashSet<u64>>,
    begun: AtomicU64,
    committed: AtomicU64,
    aborted: AtomicU64,
    conflicted: AtomicU64,
}

/// Point-in-time counters of a `TransactionManager`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransactionStats {
    pub begun: u64,
    pub committed: u64,
    pub aborted: u64,
    pub conflicted: u64,
    pub active: usize,
}

impl TransactionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(self: &Arc<Self>) -> Result<Transaction> {
        let transaction_id = TransactionId::new();
        self.active_ids.lock()?.insert(transaction_id.0);
        self.begun.fetch_add(1, Ordering::Relaxed);
        Ok(Transaction::tracked(transaction_id, Arc::clone(self)))
    }

    /// Count a commit rejected by conflict detection
    pub fn record_conflict(&self) {
        self.conflicted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn finish(&self, txn_id: TransactionId, outcome: TransactionState) {
        // Called from Drop: a poisoned set is tolerated rather than panicking
        let mut active = match self.active_ids.lock() {
            Ok(active) => active,
            Err(poisoned) => poisoned.into_inner(),
        };
        if !active.remove(&txn_id.0) {
            return;
        }

        match outcome {
            TransactionState::Committed => {
                self.committed.fetch_add(1, Ordering::Relaxed);
            }
            TransactionState::Aborted => {
                self.aborted.fetch_add(1, Ordering::Relaxed);
            }
            TransactionState::Active => {}
        }
    }

    pub fn is_active(&self, txn_id: TransactionId) -> bool {
        self.active_ids
            .lock()
            .map(|active| active.contains(&txn_id.0))
            .unwrap_or(false)
    }

    pub fn stats(&self) -> TransactionStats {
        let active = self
            .active_ids
            .lock()
            .map(|active| active.len())
            .unwrap_or(0);

        TransactionStats {
            begun: self.begun.load(Ordering::Relaxed),
            committed: self.committed.load(Ordering::Relaxed),
            aborted: self.aborted.load(Ordering::Relaxed),
            conflicted: self.conflicted.load(Ordering::Relaxed),
            active,
        }
    }
}
