use std::future::{self, Future};
use std::sync::Arc;

use tracing::{Instrument, debug, info, info_span, warn};

use super::{Review, ReviewDraft, ReviewError, StoreAggregate};
use crate::config::ReviewConfig;
use crate::core::{DbError, DocumentKey, Fields};
use crate::storage::DocumentStore;
use crate::transaction::{SetMode, Transaction};

/// Why a single transactional attempt did not commit
enum AttemptError {
    /// Lost a race with another commit (or ran out of time); replayable
    Conflict(String),
    Failed(ReviewError),
}

impl From<ReviewError> for AttemptError {
    fn from(err: ReviewError) -> Self {
        Self::Failed(err)
    }
}

impl From<DbError> for AttemptError {
    fn from(err: DbError) -> Self {
        if err.is_conflict() {
            Self::Conflict(err.to_string())
        } else {
            Self::Failed(ReviewError::Storage(err))
        }
    }
}

/// What an attempt found once it had read the documents it depends on
enum Staged {
    Write(StoreAggregate),
    /// The review id already exists: an earlier attempt of this same
    /// submission committed even though its caller never saw the result
    AlreadyCommitted,
}

/// Per-submission inputs that stay fixed across retries
struct Submission {
    store_key: DocumentKey,
    review_key: DocumentKey,
    review_fields: Fields,
    rating: f64,
    seed: u64,
}

/// Submits reviews and keeps each store's rating aggregate consistent.
///
/// Each submission runs read-aggregate, compute, write-both inside a single
/// transaction. When the commit loses a race with another submission, the
/// whole transaction is replayed from a fresh read, up to
/// `ConflictRetryPolicy::max_attempts` times.
pub struct ReviewSubmissionCoordinator {
    store: Arc<dyn DocumentStore>,
    config: ReviewConfig,
}

impl ReviewSubmissionCoordinator {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self::with_config(store, ReviewConfig::default())
    }

    pub fn with_config(store: Arc<dyn DocumentStore>, config: ReviewConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &ReviewConfig {
        &self.config
    }

    /// Persist `draft` and fold its rating into the store aggregate.
    ///
    /// Returns the stored review including its server-assigned `created_at`.
    /// Invalid drafts fail with `InvalidInput` before any storage access.
    pub async fn submit(&self, draft: ReviewDraft) -> Result<Review, ReviewError> {
        self.submit_with_cancel(draft, future::pending()).await
    }

    /// Like [`submit`](Self::submit), abandoning the submission once
    /// `cancel` completes.
    ///
    /// Cancellation is best effort. If it fires before the commit took
    /// effect the result is `Cancelled` and nothing was written. If the
    /// commit already landed, the review stays submitted and is returned.
    pub async fn submit_with_cancel<C>(
        &self,
        draft: ReviewDraft,
        cancel: C,
    ) -> Result<Review, ReviewError>
    where
        C: Future<Output = ()>,
    {
        let rating = draft.validate(&self.config.rating_range)?;

        let review_id = self.store.new_document_id(&self.config.reviews_collection);
        let submission = Submission {
            store_key: DocumentKey::new(&self.config.stores_collection, draft.store_id.as_str()),
            review_key: DocumentKey::new(&self.config.reviews_collection, review_id.as_str()),
            review_fields: draft.to_fields(rating),
            rating,
            seed: seed_from(&review_id),
        };

        let span = info_span!(
            "review_submit",
            store_id = %draft.store_id,
            review_id = %review_id,
            rating
        );

        self.run(&submission, cancel).instrument(span).await
    }

    async fn run<C>(&self, submission: &Submission, cancel: C) -> Result<Review, ReviewError>
    where
        C: Future<Output = ()>,
    {
        tokio::select! {
            biased;
            committed = self.commit_with_retry(submission) => committed?,
            _ = cancel => {
                // The commit future is no longer polled and its apply step
                // has no await point, so the review either fully exists or not
                if self.store.get(&submission.review_key).await?.is_none() {
                    info!("submission cancelled before commit");
                    return Err(ReviewError::Cancelled);
                }
                info!("cancellation arrived after commit; review kept");
            }
        }
        self.read_back(&submission.review_key).await
    }

    async fn commit_with_retry(&self, submission: &Submission) -> Result<(), ReviewError> {
        let retry = &self.config.conflict_retry;
        let max_attempts = retry.effective_max_attempts();
        let mut attempt = 1usize;

        loop {
            let outcome = match retry.attempt_timeout_duration() {
                Some(limit) => tokio::time::timeout(limit, self.attempt(submission))
                    .await
                    .unwrap_or_else(|_| {
                        Err(AttemptError::Conflict(format!(
                            "attempt timed out after {}ms",
                            limit.as_millis()
                        )))
                    }),
                None => self.attempt(submission).await,
            };

            match outcome {
                Ok(()) => return Ok(()),
                Err(AttemptError::Failed(err)) => return Err(err),
                Err(AttemptError::Conflict(reason)) => {
                    if attempt >= max_attempts {
                        warn!(attempts = attempt, %reason, "retry budget exhausted");
                        return Err(ReviewError::TransactionConflict { attempts: attempt });
                    }

                    let backoff = retry.backoff(attempt, submission.seed);
                    warn!(
                        "review submission retry on conflict (attempt {} of {}): {} (backoff={}ms)",
                        attempt,
                        max_attempts,
                        reason,
                        backoff.as_millis()
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
            }
        }
    }

    /// One read-compute-write pass inside a fresh transaction
    async fn attempt(&self, submission: &Submission) -> Result<(), AttemptError> {
        let mut txn = self.store.begin().await?;

        match self.stage(&mut txn, submission).await {
            Ok(Staged::Write(updated)) => {
                let info = self.store.commit(txn).await?;
                debug!(
                    txn = %info.txn_id,
                    rating = updated.rating,
                    number_of_review = updated.number_of_review,
                    "aggregate updated"
                );
                Ok(())
            }
            Ok(Staged::AlreadyCommitted) => {
                info!("review already committed by an earlier attempt");
                self.store.rollback(txn).await?;
                Ok(())
            }
            Err(err) => {
                if let Err(rollback_err) = self.store.rollback(txn).await {
                    warn!(error = %rollback_err, "rollback after failed attempt did not complete");
                }
                Err(err)
            }
        }
    }

    async fn stage(
        &self,
        txn: &mut Transaction,
        submission: &Submission,
    ) -> Result<Staged, AttemptError> {
        let store_doc = self
            .store
            .get_in(txn, &submission.store_key)
            .await?
            .ok_or_else(|| ReviewError::StoreNotFound(submission.store_key.id.clone()))?;

        if self
            .store
            .get_in(txn, &submission.review_key)
            .await?
            .is_some()
        {
            return Ok(Staged::AlreadyCommitted);
        }

        let range = &self.config.rating_range;
        let current = StoreAggregate::from_document(&store_doc, range)?;
        let updated = current.with_review(submission.rating, range);

        txn.set(
            submission.store_key.clone(),
            updated.to_fields(),
            SetMode::Merge,
        )?;
        txn.create(
            submission.review_key.clone(),
            submission.review_fields.clone(),
        )?;

        Ok(Staged::Write(updated))
    }

    async fn read_back(&self, review_key: &DocumentKey) -> Result<Review, ReviewError> {
        let doc = self
            .store
            .get(review_key)
            .await?
            .ok_or_else(|| DbError::DocumentNotFound(review_key.to_string()))?;

        Review::from_document(&doc).map_err(|reason| DbError::TypeMismatch(reason).into())
    }
}

// FNV-1a over the review id; only used to spread retry backoff
fn seed_from(id: &str) -> u64 {
    id.bytes().fold(0xcbf29ce484222325, |hash, byte| {
        (hash ^ byte as u64).wrapping_mul(0x100000001b3)
    })
}
