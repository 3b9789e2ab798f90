use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};

use super::Value;

/// Field name to value map of a single document.
pub type Fields = BTreeMap<String, Value>;

/// Address of a document: collection plus id.
///
/// Ordering is used to lock documents in a stable order during commit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentKey {
    pub collection: String,
    pub id: String,
}

impl DocumentKey {
    pub fn new(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

/// A committed document as observed by a reader.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    key: DocumentKey,
    fields: Fields,
    version: u64,
    update_time: DateTime<Utc>,
}

impl Document {
    pub fn new(key: DocumentKey, fields: Fields, version: u64, update_time: DateTime<Utc>) -> Self {
        Self {
            key,
            fields,
            version,
            update_time,
        }
    }

    pub fn key(&self) -> &DocumentKey {
        &self.key
    }

    pub fn id(&self) -> &str {
        &self.key.id
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Monotonic per-document version, bumped by every committed write.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn update_time(&self) -> DateTime<Utc> {
        self.update_time
    }
}
