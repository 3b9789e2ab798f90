// ============================================================================
// StoreReviews Library
// ============================================================================

pub mod config;
pub mod core;
pub mod review;
pub mod storage;
pub mod transaction;

use std::future::Future;
use std::sync::Arc;

pub use config::{ConflictRetryPolicy, RatingRange, ReviewConfig};
pub use crate::core::{DbError, Document, DocumentKey, Fields, Result, Value};
pub use review::{
    Review, ReviewDraft, ReviewError, ReviewQueryService, ReviewSubmissionCoordinator,
    StoreAggregate,
};
pub use storage::{DocumentStore, InMemoryDocumentStore};

// ============================================================================
// High-level Service API
// ============================================================================

/// Review service over a transactional document store
///
/// Bundles the submission coordinator and the query service behind one
/// handle. This is the recommended entry point for applications.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use storereviews::{DocumentKey, Fields, InMemoryDocumentStore, ReviewDraft, ReviewService};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let store = Arc::new(InMemoryDocumentStore::new());
/// store.insert_document(DocumentKey::new("stores", "s1"), Fields::new()).await?;
///
/// let service = ReviewService::new(store);
/// service.submit(ReviewDraft::new("s1", 4.0).text("Great coffee")).await?;
///
/// let summary = service.store_summary("s1").await?;
/// assert_eq!(summary.number_of_review, 1);
/// # Ok(())
/// # }
/// ```
pub struct ReviewService {
    submissions: ReviewSubmissionCoordinator,
    queries: ReviewQueryService,
}

impl ReviewService {
    /// Create a service with the default configuration
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self::with_config(store, ReviewConfig::default())
    }

    /// Create a service with a custom configuration
    pub fn with_config(store: Arc<dyn DocumentStore>, config: ReviewConfig) -> Self {
        Self {
            submissions: ReviewSubmissionCoordinator::with_config(Arc::clone(&store), config.clone()),
            queries: ReviewQueryService::with_config(store, config),
        }
    }

    pub fn config(&self) -> &ReviewConfig {
        self.submissions.config()
    }

    /// Submit a review, updating the store aggregate atomically
    pub async fn submit(&self, draft: ReviewDraft) -> std::result::Result<Review, ReviewError> {
        self.submissions.submit(draft).await
    }

    /// Submit a review that may be abandoned once `cancel` completes
    pub async fn submit_with_cancel<C>(
        &self,
        draft: ReviewDraft,
        cancel: C,
    ) -> std::result::Result<Review, ReviewError>
    where
        C: Future<Output = ()>,
    {
        self.submissions.submit_with_cancel(draft, cancel).await
    }

    /// Reviews of a store, newest first
    pub async fn list_by_store(&self, store_id: &str) -> std::result::Result<Vec<Review>, ReviewError> {
        self.queries.list_by_store(store_id).await
    }

    /// Current rating aggregate of a store
    pub async fn store_summary(&self, store_id: &str) -> std::result::Result<StoreAggregate, ReviewError> {
        self.queries.store_summary(store_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn service_with_store(store_id: &str) -> ReviewService {
        let store = Arc::new(InMemoryDocumentStore::new());
        store
            .insert_document(DocumentKey::new("stores", store_id), Fields::new())
            .await
            .unwrap();
        ReviewService::new(store)
    }

    #[tokio::test]
    async fn test_service_submit_and_list() {
        let service = service_with_store("s1").await;

        let review = service
            .submit(ReviewDraft::new("s1", 4.0).text("Fresh bread"))
            .await
            .unwrap();

        let listed = service.list_by_store("s1").await.unwrap();
        assert_eq!(listed, vec![review]);
    }

    #[tokio::test]
    async fn test_service_summary_of_unknown_store() {
        let service = service_with_store("s1").await;
        let err = service.store_summary("missing").await.unwrap_err();
        assert_eq!(err, ReviewError::StoreNotFound("missing".to_string()));
    }
}
