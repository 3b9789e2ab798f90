use std::sync::Arc;

use tracing::debug;

use super::model::field;
use super::{Review, ReviewError, StoreAggregate};
use crate::config::ReviewConfig;
use crate::core::DocumentKey;
use crate::storage::{Direction, DocumentStore, Query};

/// Read side: review history and the current store summary.
pub struct ReviewQueryService {
    store: Arc<dyn DocumentStore>,
    config: ReviewConfig,
}

impl ReviewQueryService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self::with_config(store, ReviewConfig::default())
    }

    pub fn with_config(store: Arc<dyn DocumentStore>, config: ReviewConfig) -> Self {
        Self { store, config }
    }

    /// All reviews of `store_id`, newest first.
    ///
    /// A store without reviews yields an empty list.
    pub async fn list_by_store(&self, store_id: &str) -> Result<Vec<Review>, ReviewError> {
        let query = Query::collection(&self.config.reviews_collection)
            .where_eq(field::STORE_ID, store_id)
            .order_by(field::CREATED_AT, Direction::Descending);

        let documents = self
            .store
            .query(&query)
            .await
            .map_err(|err| ReviewError::QueryFailed(err.to_string()))?;

        let reviews = documents
            .iter()
            .map(Review::from_document)
            .collect::<Result<Vec<_>, _>>()
            .map_err(ReviewError::QueryFailed)?;

        debug!(store_id, count = reviews.len(), "listed reviews");
        Ok(reviews)
    }

    /// Current rating aggregate of `store_id`
    pub async fn store_summary(&self, store_id: &str) -> Result<StoreAggregate, ReviewError> {
        let key = DocumentKey::new(&self.config.stores_collection, store_id);
        let doc = self
            .store
            .get(&key)
            .await
            .map_err(|err| ReviewError::QueryFailed(err.to_string()))?
            .ok_or_else(|| ReviewError::StoreNotFound(store_id.to_string()))?;

        StoreAggregate::from_document(&doc, &self.config.rating_range)
    }
}
