//! Shared fixtures for integration tests: store seeding and a fault
//! injecting wrapper around the in-memory document store.

#![allow(dead_code)]

use std::future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use storereviews::storage::{CommitInfo, Query};
use storereviews::transaction::Transaction;
use storereviews::{
    ConflictRetryPolicy, DbError, Document, DocumentKey, DocumentStore, Fields,
    InMemoryDocumentStore, ReviewConfig, Value,
};

pub async fn seed_store(
    store: &InMemoryDocumentStore,
    store_id: &str,
    rating: Option<Value>,
    number_of_review: Option<i64>,
) {
    let mut fields = Fields::new();
    fields.insert("name".to_string(), Value::from(format!("Store {}", store_id)));
    if let Some(rating) = rating {
        fields.insert("rating".to_string(), rating);
    }
    if let Some(count) = number_of_review {
        fields.insert("numberOfReview".to_string(), Value::Integer(count));
    }
    store
        .insert_document(DocumentKey::new("stores", store_id), fields)
        .await
        .unwrap();
}

pub async fn fresh_store(store_ids: &[&str]) -> Arc<InMemoryDocumentStore> {
    let store = Arc::new(InMemoryDocumentStore::new());
    for store_id in store_ids {
        seed_store(&store, store_id, Some(Value::from("0")), Some(0)).await;
    }
    store
}

/// Retry settings that let heavily contended tests always converge
pub fn patient_config() -> ReviewConfig {
    ReviewConfig::default().conflict_retry(
        ConflictRetryPolicy::default()
            .max_attempts(500)
            .backoff_ms(1, 10),
    )
}

pub fn fast_retry_config(max_attempts: usize) -> ReviewConfig {
    ReviewConfig::default().conflict_retry(
        ConflictRetryPolicy::default()
            .max_attempts(max_attempts)
            .backoff_ms(1, 2),
    )
}

/// Wraps an `InMemoryDocumentStore` and injects failures on demand.
pub struct FaultyStore {
    pub inner: Arc<InMemoryDocumentStore>,
    calls: AtomicUsize,
    commits_attempted: AtomicUsize,
    commit_failures: AtomicUsize,
    commit_error: DbError,
    hang_after_commits: AtomicUsize,
    stall_reads: AtomicBool,
    fail_queries: AtomicBool,
}

impl FaultyStore {
    pub fn new(inner: Arc<InMemoryDocumentStore>) -> Self {
        Self {
            inner,
            calls: AtomicUsize::new(0),
            commits_attempted: AtomicUsize::new(0),
            commit_failures: AtomicUsize::new(0),
            commit_error: DbError::ExecutionError("injected".to_string()),
            hang_after_commits: AtomicUsize::new(0),
            stall_reads: AtomicBool::new(false),
            fail_queries: AtomicBool::new(false),
        }
    }

    /// Reject the next `times` commits with `error` without applying them
    pub fn fail_commits(mut self, times: usize, error: DbError) -> Self {
        self.commit_failures = AtomicUsize::new(times);
        self.commit_error = error;
        self
    }

    /// Apply the next `times` commits, then never report back
    pub fn hang_after_commits(self, times: usize) -> Self {
        self.hang_after_commits.store(times, Ordering::SeqCst);
        self
    }

    pub fn stall_reads(self) -> Self {
        self.stall_reads.store(true, Ordering::SeqCst);
        self
    }

    pub fn fail_queries(self) -> Self {
        self.fail_queries.store(true, Ordering::SeqCst);
        self
    }

    /// Number of trait calls made so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn commits_attempted(&self) -> usize {
        self.commits_attempted.load(Ordering::SeqCst)
    }

    fn touch(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }

    fn take_one(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl DocumentStore for FaultyStore {
    fn new_document_id(&self, collection: &str) -> String {
        self.touch();
        self.inner.new_document_id(collection)
    }

    async fn begin(&self) -> storereviews::Result<Transaction> {
        self.touch();
        self.inner.begin().await
    }

    async fn get_in(
        &self,
        txn: &mut Transaction,
        key: &DocumentKey,
    ) -> storereviews::Result<Option<Document>> {
        self.touch();
        if self.stall_reads.load(Ordering::SeqCst) {
            future::pending::<()>().await;
        }
        self.inner.get_in(txn, key).await
    }

    async fn commit(&self, txn: Transaction) -> storereviews::Result<CommitInfo> {
        self.touch();
        self.commits_attempted.fetch_add(1, Ordering::SeqCst);

        if Self::take_one(&self.commit_failures) {
            self.inner.rollback(txn).await?;
            return Err(self.commit_error.clone());
        }

        let info = self.inner.commit(txn).await?;
        if Self::take_one(&self.hang_after_commits) {
            future::pending::<()>().await;
        }
        Ok(info)
    }

    async fn rollback(&self, txn: Transaction) -> storereviews::Result<()> {
        self.touch();
        self.inner.rollback(txn).await
    }

    async fn get(&self, key: &DocumentKey) -> storereviews::Result<Option<Document>> {
        self.touch();
        self.inner.get(key).await
    }

    async fn query(&self, query: &Query) -> storereviews::Result<Vec<Document>> {
        self.touch();
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(DbError::ExecutionError("index unavailable".to_string()));
        }
        self.inner.query(query).await
    }
}
