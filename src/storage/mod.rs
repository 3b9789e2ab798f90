pub mod engine;
pub mod memory;
pub mod query;

pub use engine::{CommitInfo, DocumentStore};
pub use memory::InMemoryDocumentStore;
pub use query::{Direction, Query};
