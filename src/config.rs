use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::review::ReviewError;

/// Bounded retry policy for conflicting submission transactions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConflictRetryPolicy {
    /// Total attempts per submission, including the first one.
    pub max_attempts: usize,
    /// First backoff in milliseconds; doubles per attempt.
    pub base_backoff_ms: u64,
    /// Upper bound for a single backoff in milliseconds.
    pub max_backoff_ms: u64,
    /// Per-attempt deadline; an attempt that exceeds it counts as a conflict.
    pub attempt_timeout_ms: Option<u64>,
}

impl Default for ConflictRetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            base_backoff_ms: 5,
            max_backoff_ms: 200,
            attempt_timeout_ms: Some(5_000),
        }
    }
}

impl ConflictRetryPolicy {
    pub fn max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn backoff_ms(mut self, base: u64, max: u64) -> Self {
        self.base_backoff_ms = base;
        self.max_backoff_ms = max;
        self
    }

    pub fn attempt_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.attempt_timeout_ms = timeout.map(|t| t.as_millis() as u64);
        self
    }

    pub fn effective_max_attempts(&self) -> usize {
        self.max_attempts.max(1)
    }

    pub fn attempt_timeout_duration(&self) -> Option<Duration> {
        self.attempt_timeout_ms.map(Duration::from_millis)
    }

    /// Backoff to wait after the failed `attempt` (1-based).
    ///
    /// Exponential from `base_backoff_ms`, capped at `max_backoff_ms`, with
    /// "equal jitter": half the window is fixed and the other half is drawn
    /// from `seed` so that colliding submissions drift apart.
    pub fn backoff(&self, attempt: usize, seed: u64) -> Duration {
        let base = self.base_backoff_ms.max(1);
        let cap = self.max_backoff_ms.max(base);

        let mut backoff = base;
        for _ in 1..attempt {
            backoff = backoff.saturating_mul(2).min(cap);
        }

        let half = backoff / 2;
        let jitter = mix(seed ^ attempt as u64) % (backoff - half + 1);
        Duration::from_millis(half + jitter)
    }
}

// One LCG step followed by an xorshift finalizer
fn mix(seed: u64) -> u64 {
    let mut state = seed
        .wrapping_mul(6364136223846793005)
        .wrapping_add(1442695040888963407);
    state ^= state >> 33;
    state = state.wrapping_mul(0xff51afd7ed558ccd);
    state ^ (state >> 33)
}

/// Inclusive range of valid review scores.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RatingRange {
    pub min: f64,
    pub max: f64,
}

impl Default for RatingRange {
    fn default() -> Self {
        Self { min: 0.0, max: 5.0 }
    }
}

impl RatingRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: f64) -> bool {
        value.is_finite() && value >= self.min && value <= self.max
    }
}

/// Configuration of the review core.
///
/// Built with `Default` plus builder methods, or deserialized from JSON
/// where every omitted key keeps its default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewConfig {
    pub stores_collection: String,
    pub reviews_collection: String,
    pub rating_range: RatingRange,
    pub conflict_retry: ConflictRetryPolicy,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            stores_collection: "stores".to_string(),
            reviews_collection: "reviews".to_string(),
            rating_range: RatingRange::default(),
            conflict_retry: ConflictRetryPolicy::default(),
        }
    }
}

impl ReviewConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON document and validate it
    pub fn from_json_str(json: &str) -> Result<Self, ReviewError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|err| ReviewError::InvalidInput(format!("invalid config: {}", err)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn stores_collection(mut self, name: &str) -> Self {
        self.stores_collection = name.to_string();
        self
    }

    pub fn reviews_collection(mut self, name: &str) -> Self {
        self.reviews_collection = name.to_string();
        self
    }

    pub fn rating_range(mut self, range: RatingRange) -> Self {
        self.rating_range = range;
        self
    }

    pub fn conflict_retry(mut self, policy: ConflictRetryPolicy) -> Self {
        self.conflict_retry = policy;
        self
    }

    pub fn validate(&self) -> Result<(), ReviewError> {
        let range = &self.rating_range;
        if !range.min.is_finite() || !range.max.is_finite() || range.min > range.max {
            return Err(ReviewError::InvalidInput(format!(
                "rating range [{}, {}] is not a valid interval",
                range.min, range.max
            )));
        }
        if self.stores_collection.is_empty() || self.reviews_collection.is_empty() {
            return Err(ReviewError::InvalidInput(
                "collection names must not be empty".to_string(),
            ));
        }
        if self.stores_collection == self.reviews_collection {
            return Err(ReviewError::InvalidInput(
                "stores and reviews must live in different collections".to_string(),
            ));
        }
        Ok(())
    }
}
