use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ReviewError;
use crate::config::RatingRange;
use crate::core::{Document, Fields, Value};

/// Document field names shared by the `stores` and `reviews` collections
pub mod field {
    pub const STORE_ID: &str = "storeId";
    pub const RATING: &str = "rating";
    pub const TEXT: &str = "text";
    pub const IMAGES: &str = "images";
    pub const CREATED_AT: &str = "createdAt";
    pub const NUMBER_OF_REVIEW: &str = "numberOfReview";
}

/// A review as requested by the caller, before it is persisted.
///
/// `rating` is optional only so that a missing score can be rejected
/// explicitly; it is never defaulted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReviewDraft {
    pub store_id: String,
    pub rating: Option<f64>,
    pub text: String,
    pub images: Vec<String>,
}

impl ReviewDraft {
    pub fn new(store_id: impl Into<String>, rating: f64) -> Self {
        Self {
            store_id: store_id.into(),
            rating: Some(rating),
            ..Self::default()
        }
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn image(mut self, image: impl Into<String>) -> Self {
        self.images.push(image.into());
        self
    }

    /// Check preconditions and return the validated rating
    pub fn validate(&self, range: &RatingRange) -> Result<f64, ReviewError> {
        if self.store_id.trim().is_empty() {
            return Err(ReviewError::InvalidInput("storeId is required".to_string()));
        }

        let rating = self
            .rating
            .ok_or_else(|| ReviewError::InvalidInput("rating is required".to_string()))?;

        if !range.contains(rating) {
            return Err(ReviewError::InvalidInput(format!(
                "rating {} is outside [{}, {}]",
                rating, range.min, range.max
            )));
        }
        Ok(rating)
    }

    /// Fields of the review document; `createdAt` is left to the store
    pub(crate) fn to_fields(&self, rating: f64) -> Fields {
        let mut fields = Fields::new();
        fields.insert(field::STORE_ID.into(), self.store_id.as_str().into());
        fields.insert(field::RATING.into(), Value::Float(rating));
        fields.insert(field::TEXT.into(), self.text.as_str().into());
        fields.insert(field::IMAGES.into(), self.images.clone().into());
        fields.insert(field::CREATED_AT.into(), Value::ServerTimestamp);
        fields
    }
}

/// A persisted review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub id: String,
    pub store_id: String,
    pub rating: f64,
    pub text: String,
    pub images: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Review {
    /// Decode a review document; the error names the offending field
    pub fn from_document(doc: &Document) -> Result<Self, String> {
        let store_id = doc
            .get(field::STORE_ID)
            .and_then(Value::as_str)
            .ok_or_else(|| format!("review {}: missing text field '{}'", doc.id(), field::STORE_ID))?
            .to_string();

        let rating = doc
            .get(field::RATING)
            .and_then(Value::as_f64)
            .ok_or_else(|| format!("review {}: missing numeric field '{}'", doc.id(), field::RATING))?;

        let created_at = doc
            .get(field::CREATED_AT)
            .and_then(Value::as_timestamp)
            .ok_or_else(|| {
                format!("review {}: missing timestamp field '{}'", doc.id(), field::CREATED_AT)
            })?;

        let text = doc
            .get(field::TEXT)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let images = match doc.get(field::IMAGES) {
            None | Some(Value::Null) => Vec::new(),
            Some(value) => value
                .as_array()
                .ok_or_else(|| format!("review {}: '{}' is not an array", doc.id(), field::IMAGES))?
                .iter()
                .map(|item| item.as_str().map(str::to_string))
                .collect::<Option<Vec<_>>>()
                .ok_or_else(|| format!("review {}: '{}' holds non-text items", doc.id(), field::IMAGES))?,
        };

        Ok(Self {
            id: doc.id().to_string(),
            store_id,
            rating,
            text,
            images,
            created_at,
        })
    }
}

/// The running rating summary of one store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreAggregate {
    pub store_id: String,
    pub rating: f64,
    pub number_of_review: u64,
}

impl StoreAggregate {
    pub fn empty(store_id: impl Into<String>) -> Self {
        Self {
            store_id: store_id.into(),
            rating: 0.0,
            number_of_review: 0,
        }
    }

    /// Decode the aggregate fields of a store document.
    ///
    /// The stored rating may be text (`"3.5"`) or numeric. Absent fields read
    /// as the empty aggregate, except that a positive count without a rating
    /// cannot be reconstructed and is reported as corrupt.
    pub fn from_document(doc: &Document, range: &RatingRange) -> Result<Self, ReviewError> {
        let store_id = doc.id().to_string();
        let corrupt = |reason: String| ReviewError::CorruptAggregate {
            store_id: store_id.clone(),
            reason,
        };

        let number_of_review = match doc.get(field::NUMBER_OF_REVIEW) {
            None | Some(Value::Null) => 0,
            Some(value) => decode_count(value).map_err(corrupt)?,
        };

        let rating = match doc.get(field::RATING) {
            None | Some(Value::Null) if number_of_review == 0 => 0.0,
            None | Some(Value::Null) => {
                return Err(corrupt(format!(
                    "no rating stored for {} review(s)",
                    number_of_review
                )));
            }
            Some(value) => decode_rating(value).map_err(corrupt)?,
        };

        if number_of_review > 0 && !range.contains(rating) {
            return Err(corrupt(format!(
                "mean rating {} is outside [{}, {}]",
                rating, range.min, range.max
            )));
        }

        Ok(Self {
            store_id,
            rating,
            number_of_review,
        })
    }

    /// Fold one more review into the mean.
    ///
    /// The result is clamped to `range` so rounding can never push a mean of
    /// in-range ratings past the bounds.
    pub fn with_review(&self, rating: f64, range: &RatingRange) -> Self {
        let count = self.number_of_review as f64;
        let new_count = self.number_of_review + 1;
        let mean = (self.rating * count + rating) / new_count as f64;

        Self {
            store_id: self.store_id.clone(),
            rating: mean.clamp(range.min, range.max),
            number_of_review: new_count,
        }
    }

    /// Aggregate fields to merge into the store document.
    ///
    /// The rating is stored as shortest round-trip decimal text, so decoding
    /// it yields exactly the same `f64`.
    pub(crate) fn to_fields(&self) -> Fields {
        let mut fields = Fields::new();
        fields.insert(field::RATING.into(), Value::Text(self.rating.to_string()));
        fields.insert(
            field::NUMBER_OF_REVIEW.into(),
            Value::Integer(self.number_of_review as i64),
        );
        fields
    }
}

fn decode_rating(value: &Value) -> Result<f64, String> {
    let rating = match value {
        Value::Text(text) => text
            .trim()
            .parse::<f64>()
            .map_err(|_| format!("rating '{}' is not a number", text))?,
        Value::Float(_) | Value::Integer(_) => value.as_f64().unwrap_or(f64::NAN),
        other => return Err(format!("rating has unsupported type {}", other.type_name())),
    };

    if !rating.is_finite() {
        return Err(format!("rating {} is not finite", rating));
    }
    Ok(rating)
}

fn decode_count(value: &Value) -> Result<u64, String> {
    match value {
        Value::Integer(n) => u64::try_from(*n).map_err(|_| format!("review count {} is negative", n)),
        Value::Float(f) if f.is_finite() && *f >= 0.0 && f.fract() == 0.0 && *f <= u64::MAX as f64 => {
            Ok(*f as u64)
        }
        Value::Text(text) => text
            .trim()
            .parse::<u64>()
            .map_err(|_| format!("review count '{}' is not a non-negative integer", text)),
        other => Err(format!("review count {} is not a non-negative integer", other)),
    }
}
