use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::Query;
use crate::core::{Document, DocumentKey, Result};
use crate::transaction::{Transaction, TransactionId};

/// Transactional document store contract.
///
/// Implementations must provide:
/// - read-your-writes inside a transaction (`get_in` sees buffered writes)
/// - atomic commit of every buffered write, or none of them
/// - conflict detection: `commit` fails with `DbError::WriteConflict` when
///   a document read by the transaction was changed by another commit
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Allocate a fresh, collision-free document id in `collection`
    fn new_document_id(&self, collection: &str) -> String;

    /// Begin a new transaction
    async fn begin(&self) -> Result<Transaction>;

    /// Point read inside `txn`; the observed version joins its read set
    async fn get_in(&self, txn: &mut Transaction, key: &DocumentKey) -> Result<Option<Document>>;

    /// Validate and atomically apply all writes buffered in `txn`
    async fn commit(&self, txn: Transaction) -> Result<CommitInfo>;

    /// Discard `txn` without applying anything
    async fn rollback(&self, txn: Transaction) -> Result<()>;

    /// Point read of the latest committed document
    async fn get(&self, key: &DocumentKey) -> Result<Option<Document>>;

    /// Equality-filtered, ordered read of one collection
    async fn query(&self, query: &Query) -> Result<Vec<Document>>;
}

/// Outcome of a successful commit
#[derive(Debug, Clone, PartialEq)]
pub struct CommitInfo {
    pub txn_id: TransactionId,
    pub commit_time: DateTime<Utc>,
    pub documents_written: usize,
}
