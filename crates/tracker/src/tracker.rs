use history::{Classification, Clock, HistoricalRecord, RecordError, SystemClock};
use storage::KeyValueStore;
use tracing::{debug, warn};

use crate::migrate::SchemaMigrator;

/// Hours after a best-price update during which observations are not
/// reclassified.
pub const RECENCY_WINDOW_HOURS: i64 = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerConfig {
    pub recency_window_hours: i64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            recency_window_hours: RECENCY_WINDOW_HOURS,
        }
    }
}

/// Result of reading one item's record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    Found(HistoricalRecord),
    Absent,
    /// The store failed or held something that is not a record.
    Unreadable,
}

/// Read-modify-write owner of per-item price records.
pub struct PriceTracker<S, C = SystemClock> {
    store: S,
    clock: C,
    config: TrackerConfig,
}

impl<S: KeyValueStore> PriceTracker<S> {
    pub fn new(store: S, config: TrackerConfig) -> Self {
        Self::with_clock(store, SystemClock, config)
    }
}

impl<S: KeyValueStore, C: Clock> PriceTracker<S, C> {
    pub fn with_clock(store: S, clock: C, config: TrackerConfig) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Migrator over the same store and clock.
    pub fn migrator(&self) -> SchemaMigrator<'_, S, C> {
        SchemaMigrator::new(&self.store, &self.clock)
    }

    /// Reads the structured record for `item_id`. Legacy values are never
    /// interpreted here; they only exist until the migrator has run.
    pub async fn lookup(&self, item_id: &str) -> Lookup {
        match self.store.get(item_id).await {
            Ok(Some(raw)) => match HistoricalRecord::from_json(&raw) {
                Ok(record) => Lookup::Found(record),
                Err(err) => {
                    warn!(item_id, raw = %raw, error = %err, "ignoring malformed price record");
                    Lookup::Unreadable
                }
            },
            Ok(None) => Lookup::Absent,
            Err(err) => {
                warn!(item_id, error = %err, "failed to read price record");
                Lookup::Unreadable
            }
        }
    }

    /// Compares `price` with the item's history and records it when it ties
    /// or beats the best. Issues at most one write.
    pub async fn evaluate(&self, item_id: &str, price: i64) -> Result<Classification, RecordError> {
        if price < 0 {
            return Err(RecordError::InvalidPrice { price });
        }
        let now = self.clock.now_ms();

        let record = match self.lookup(item_id).await {
            Lookup::Found(record) => record,
            Lookup::Absent => {
                let record = HistoricalRecord::first_seen(price, now)?;
                self.persist(item_id, &record).await;
                debug!(item_id, price, "started tracking item");
                return Ok(Classification::NewlyRecorded);
            }
            // Left untouched so the stored value can still be recovered.
            Lookup::Unreadable => return Ok(Classification::NewlyRecorded),
        };

        let age_hours = record.hours_since_best(now);
        if age_hours <= self.config.recency_window_hours {
            debug!(item_id, price, age_hours, "within recency window");
            return Ok(Classification::NewlyRecorded);
        }

        let best = record.best();
        let best_set_at = record.best_set_at();
        let difference = record.compare_to(price);
        let classification = if difference >= 0 {
            self.persist(item_id, &record.rebased(price, now)?).await;
            if difference > 0 {
                Classification::NewBest { best, best_set_at }
            } else {
                Classification::MatchesBest { best, best_set_at }
            }
        } else {
            Classification::Worse { best, best_set_at }
        };

        debug!(item_id, price, best, kind = classification.kind(), "observation classified");
        Ok(classification)
    }

    async fn persist(&self, item_id: &str, record: &HistoricalRecord) {
        let raw = match record.to_json() {
            Ok(raw) => raw,
            Err(err) => {
                warn!(item_id, error = %err, "failed to encode price record");
                return;
            }
        };
        if let Err(err) = self.store.set(item_id, &raw).await {
            warn!(item_id, error = %err, "failed to write price record; update dropped");
        }
    }
}
