use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const MS_PER_HOUR: i64 = 60 * 60 * 1000;

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("price cannot be less than zero (got {price})")]
    InvalidPrice { price: i64 },

    #[error("malformed price record: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Lowest price ever seen for one item, plus when it was set and when
/// tracking began. Timestamps are milliseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "StoredRecord", into = "StoredRecord")]
pub struct HistoricalRecord {
    best: i64,
    best_set_at: i64,
    tracking_started_at: i64,
}

/// On-disk field names. Kept stable across releases.
#[derive(Serialize, Deserialize)]
struct StoredRecord {
    best: i64,
    best_date: i64,
    added_date: i64,
}

impl HistoricalRecord {
    pub fn new(best: i64, best_set_at: i64, tracking_started_at: i64) -> Result<Self, RecordError> {
        if best < 0 {
            return Err(RecordError::InvalidPrice { price: best });
        }
        Ok(Self {
            best,
            best_set_at,
            tracking_started_at,
        })
    }

    /// First sighting: both timestamps are `now_ms`.
    pub fn first_seen(best: i64, now_ms: i64) -> Result<Self, RecordError> {
        Self::new(best, now_ms, now_ms)
    }

    pub fn best(&self) -> i64 {
        self.best
    }

    pub fn best_set_at(&self) -> i64 {
        self.best_set_at
    }

    pub fn tracking_started_at(&self) -> i64 {
        self.tracking_started_at
    }

    /// `best - price`. Positive when `price` is worse than the best, zero on a
    /// tie, negative when `price` beats it.
    pub fn compare_to(&self, price: i64) -> i64 {
        self.best - price
    }

    /// Same item with a new best set at `now_ms`; tracking start is kept.
    pub fn rebased(&self, price: i64, now_ms: i64) -> Result<Self, RecordError> {
        Self::new(price, now_ms, self.tracking_started_at)
    }

    pub fn hours_since_best(&self, now_ms: i64) -> i64 {
        hours_apart(self.best_set_at, now_ms)
    }

    pub fn to_json(&self) -> Result<String, RecordError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(raw: &str) -> Result<Self, RecordError> {
        Ok(serde_json::from_str(raw)?)
    }
}

impl TryFrom<StoredRecord> for HistoricalRecord {
    type Error = RecordError;

    fn try_from(stored: StoredRecord) -> Result<Self, Self::Error> {
        Self::new(stored.best, stored.best_date, stored.added_date)
    }
}

impl From<HistoricalRecord> for StoredRecord {
    fn from(record: HistoricalRecord) -> Self {
        Self {
            best: record.best,
            best_date: record.best_set_at,
            added_date: record.tracking_started_at,
        }
    }
}

/// Whole hours between two timestamps, rounded down. Defined for any pair of
/// stored timestamps, however far apart.
pub fn hours_apart(a_ms: i64, b_ms: i64) -> i64 {
    let hours = a_ms.abs_diff(b_ms) / MS_PER_HOUR.unsigned_abs();
    i64::try_from(hours).unwrap_or(i64::MAX)
}

pub fn days_apart(a_ms: i64, b_ms: i64) -> i64 {
    hours_apart(a_ms, b_ms) / 24
}
