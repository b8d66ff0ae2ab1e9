//! Forward-only upgrades of stored values, keyed by a schema version marker.
//!
//! Each [`MigrationStep`] is a pure transform of one stored value. The
//! migrator walks every non-reserved key, applies the steps whose target is
//! newer than the stored marker, and advances the marker after each step that
//! completed without I/O failures.

use std::fmt;
use std::str::FromStr;

use history::{Clock, HistoricalRecord};
use storage::{KeyValueStore, StoreError};
use thiserror::Error;
use tracing::{debug, info, warn};

pub const VERSION_KEY: &str = "version";

/// Keys that never hold item records.
pub const RESERVED_KEYS: &[&str] = &[VERSION_KEY];

/// Flat numbers keyed by item id.
pub const LEGACY_VERSION: SchemaVersion = SchemaVersion::new(0, 1, 0);
/// JSON [`HistoricalRecord`]s keyed by item id.
pub const CURRENT_VERSION: SchemaVersion = SchemaVersion::new(0, 2, 0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SchemaVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl SchemaVersion {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

#[derive(Debug, Error)]
#[error("invalid schema version `{0}`, expected major.minor.patch")]
pub struct ParseVersionError(String);

impl FromStr for SchemaVersion {
    type Err = ParseVersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseVersionError(s.to_string());
        let mut parts = s.trim().split('.');
        let mut next = || -> Result<u32, ParseVersionError> {
            parts
                .next()
                .and_then(|part| part.parse().ok())
                .ok_or_else(invalid)
        };
        let version = Self::new(next()?, next()?, next()?);
        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(version)
    }
}

pub trait MigrationStep: Send + Sync {
    /// Version the store is at once this step has run.
    fn target(&self) -> SchemaVersion;

    fn name(&self) -> &'static str;

    /// Replacement for `raw`, or `None` to leave the key as it is. Must return
    /// `None` for values it already produced.
    fn migrate_value(&self, raw: &str, now_ms: i64) -> Option<String>;
}

/// Rewrites flat legacy prices as structured records first seen at `now_ms`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StructuredRecords;

impl MigrationStep for StructuredRecords {
    fn target(&self) -> SchemaVersion {
        CURRENT_VERSION
    }

    fn name(&self) -> &'static str {
        "structured_records"
    }

    fn migrate_value(&self, raw: &str, now_ms: i64) -> Option<String> {
        if HistoricalRecord::from_json(raw).is_ok() {
            return None;
        }
        let price = parse_legacy_price(raw)?;
        HistoricalRecord::first_seen(price, now_ms)
            .and_then(|record| record.to_json())
            .ok()
    }
}

fn parse_legacy_price(raw: &str) -> Option<i64> {
    let trimmed = raw.trim();
    if let Ok(price) = trimmed.parse::<i64>() {
        return (price >= 0).then_some(price);
    }
    let value: f64 = trimmed.parse().ok()?;
    let whole = value.is_finite() && value >= 0.0 && value.fract() == 0.0;
    (whole && value <= i64::MAX as f64).then_some(value as i64)
}

pub fn default_steps() -> Vec<Box<dyn MigrationStep>> {
    vec![Box::new(StructuredRecords)]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MigrationReport {
    /// Marker found before migrating.
    pub from: SchemaVersion,
    /// Marker after migrating.
    pub to: SchemaVersion,
    pub migrated: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl MigrationReport {
    pub fn is_noop(&self) -> bool {
        self.from == self.to && self.migrated == 0 && self.failed == 0
    }
}

#[derive(Default)]
struct StepOutcome {
    migrated: usize,
    skipped: usize,
    failed: usize,
}

pub struct SchemaMigrator<'a, S, C> {
    store: &'a S,
    clock: &'a C,
    steps: Vec<Box<dyn MigrationStep>>,
}

impl<'a, S: KeyValueStore, C: Clock> SchemaMigrator<'a, S, C> {
    pub fn new(store: &'a S, clock: &'a C) -> Self {
        Self::with_steps(store, clock, default_steps())
    }

    pub fn with_steps(
        store: &'a S,
        clock: &'a C,
        mut steps: Vec<Box<dyn MigrationStep>>,
    ) -> Self {
        steps.sort_by_key(|step| step.target());
        Self {
            store,
            clock,
            steps,
        }
    }

    pub fn current_version(&self) -> SchemaVersion {
        self.steps
            .last()
            .map(|step| step.target())
            .unwrap_or(LEGACY_VERSION)
    }

    /// Marker as stored; absent or unparseable markers read as the legacy
    /// version.
    pub async fn stored_version(&self) -> Result<SchemaVersion, StoreError> {
        let Some(raw) = self.store.get(VERSION_KEY).await? else {
            return Ok(LEGACY_VERSION);
        };
        match raw.parse() {
            Ok(version) => Ok(version),
            Err(err) => {
                warn!(error = %err, "unreadable schema marker, assuming legacy layout");
                Ok(LEGACY_VERSION)
            }
        }
    }

    /// Brings every stored value up to [`Self::current_version`]. Performs no
    /// writes when the marker is already current.
    pub async fn migrate_if_needed(&self) -> Result<MigrationReport, StoreError> {
        let from = self.stored_version().await?;
        let current = self.current_version();
        let mut report = MigrationReport {
            from,
            to: from,
            migrated: 0,
            skipped: 0,
            failed: 0,
        };
        if from >= current {
            if from > current {
                warn!(stored = %from, %current, "schema marker is newer than this build");
            }
            return Ok(report);
        }

        for step in self.steps.iter().filter(|step| step.target() > from) {
            let outcome = self.apply(step.as_ref()).await?;
            report.migrated += outcome.migrated;
            report.skipped += outcome.skipped;
            report.failed += outcome.failed;
            if outcome.failed > 0 {
                warn!(
                    step = step.name(),
                    failed = outcome.failed,
                    "migration step incomplete, marker left at {}",
                    report.to
                );
                return Ok(report);
            }
            self.store
                .set(VERSION_KEY, &step.target().to_string())
                .await?;
            report.to = step.target();
            info!(
                step = step.name(),
                version = %report.to,
                migrated = outcome.migrated,
                skipped = outcome.skipped,
                "migration step applied"
            );
        }
        Ok(report)
    }

    async fn apply(&self, step: &dyn MigrationStep) -> Result<StepOutcome, StoreError> {
        let keys = self.store.list_keys().await?;
        let now = self.clock.now_ms();
        let mut outcome = StepOutcome::default();

        for key in keys {
            if RESERVED_KEYS.contains(&key.as_str()) {
                continue;
            }
            let raw = match self.store.get(&key).await {
                Ok(Some(raw)) => raw,
                Ok(None) => {
                    outcome.skipped += 1;
                    continue;
                }
                Err(err) => {
                    warn!(key = %key, error = %err, "failed to read value during migration");
                    outcome.failed += 1;
                    continue;
                }
            };
            let Some(value) = step.migrate_value(&raw, now) else {
                debug!(key = %key, step = step.name(), "value left as is");
                outcome.skipped += 1;
                continue;
            };
            match self.store.set(&key, &value).await {
                Ok(()) => outcome.migrated += 1,
                Err(err) => {
                    warn!(key = %key, error = %err, "failed to write migrated value");
                    outcome.failed += 1;
                }
            }
        }
        Ok(outcome)
    }
}
