//! Review submission and the per-store rating aggregate.
//!
//! Submitting a review creates the review document and folds its rating
//! into the store's running mean inside one transaction. Concurrent
//! submissions never lose updates: a transaction that read a stale
//! aggregate is rejected at commit and replayed from a fresh read.

pub mod coordinator;
pub mod error;
pub mod model;
pub mod query;

pub use coordinator::ReviewSubmissionCoordinator;
pub use error::ReviewError;
pub use model::{Review, ReviewDraft, StoreAggregate};
pub use query::ReviewQueryService;
