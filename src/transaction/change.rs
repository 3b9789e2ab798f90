// ============================================================================
// Buffered Transaction Writes
// ============================================================================
//
// A Change is recorded while the transaction runs and applied to the
// committed document state only when the transaction commits. Rolling back
// simply discards the buffer.
//
// ============================================================================

use chrono::{DateTime, Utc};

use crate::core::{DbError, DocumentKey, Fields, Result};

/// How a `Change::Set` combines with an existing document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetMode {
    /// Replace every field of the document.
    Overwrite,
    /// Update only the given fields, keeping all others.
    Merge,
}

#[derive(Debug, Clone)]
pub enum Change {
    /// Create a document; fails the commit if the id is already taken.
    Create { key: DocumentKey, fields: Fields },

    /// Write a document, creating it when absent.
    Set {
        key: DocumentKey,
        fields: Fields,
        mode: SetMode,
    },
}

impl Change {
    pub fn key(&self) -> &DocumentKey {
        match self {
            Change::Create { key, .. } => key,
            Change::Set { key, .. } => key,
        }
    }

    pub fn is_create(&self) -> bool {
        matches!(self, Change::Create { .. })
    }

    /// Produces the new field set for the document from its current state.
    ///
    /// Server timestamp sentinels are resolved to `commit_time`.
    pub fn apply(&self, current: Option<&Fields>, commit_time: DateTime<Utc>) -> Result<Fields> {
        let resolve = |fields: &Fields| -> Fields {
            fields
                .iter()
                .map(|(name, value)| (name.clone(), value.clone().resolve(commit_time)))
                .collect()
        };

        match self {
            Change::Create { key, fields } => {
                if current.is_some() {
                    return Err(DbError::AlreadyExists(key.to_string()));
                }
                Ok(resolve(fields))
            }
            Change::Set {
                fields,
                mode: SetMode::Overwrite,
                ..
            } => Ok(resolve(fields)),
            Change::Set {
                fields,
                mode: SetMode::Merge,
                ..
            } => {
                let mut merged = current.cloned().unwrap_or_default();
                merged.extend(resolve(fields));
                Ok(merged)
            }
        }
    }
}
