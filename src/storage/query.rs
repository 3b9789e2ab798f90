use std::cmp::Ordering;

use crate::core::{Document, Fields, Result, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// A single-collection query: equality filters, one sort key, optional limit.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    collection: String,
    filters: Vec<(String, Value)>,
    order_by: Option<(String, Direction)>,
    limit: Option<usize>,
}

impl Query {
    pub fn collection(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            filters: Vec::new(),
            order_by: None,
            limit: None,
        }
    }

    pub fn where_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push((field.into(), value.into()));
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order_by = Some((field.into(), direction));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn collection_name(&self) -> &str {
        &self.collection
    }

    pub fn matches(&self, fields: &Fields) -> bool {
        self.filters
            .iter()
            .all(|(field, expected)| fields.get(field) == Some(expected))
    }

    /// Sort, then truncate `documents` in place.
    ///
    /// Documents missing the sort field sort as NULL (last when ascending).
    /// Ties are broken by document id in the same direction so the output
    /// is deterministic.
    pub fn arrange(&self, documents: &mut Vec<Document>) -> Result<()> {
        if let Some((field, direction)) = &self.order_by {
            let mut failure = None;
            documents.sort_by(|a, b| {
                let left = a.get(field).unwrap_or(&Value::Null);
                let right = b.get(field).unwrap_or(&Value::Null);
                let ordering = match left.compare(right) {
                    Ok(ordering) => ordering,
                    Err(err) => {
                        failure.get_or_insert(err);
                        Ordering::Equal
                    }
                }
                .then_with(|| a.id().cmp(b.id()));

                match direction {
                    Direction::Ascending => ordering,
                    Direction::Descending => ordering.reverse(),
                }
            });
            if let Some(err) = failure {
                return Err(err);
            }
        } else {
            documents.sort_by(|a, b| a.id().cmp(b.id()));
        }

        if let Some(limit) = self.limit {
            documents.truncate(limit);
        }
        Ok(())
    }
}
