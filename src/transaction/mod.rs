// ============================================================================
// Transaction Management Module
// ============================================================================
//
// Optimistic document transactions:
// - Reads are recorded with the document version they observed
// - Writes are buffered as Changes and applied only at commit
// - Commit validates the read set (first committer wins) and applies all
//   buffered changes atomically, or none of them
//
// ============================================================================

pub mod change;
pub mod manager;
pub mod state;

pub use change::{Change, SetMode};
pub use manager::{TransactionManager, TransactionStats};
pub use state::{Transaction, TransactionId, TransactionState};
