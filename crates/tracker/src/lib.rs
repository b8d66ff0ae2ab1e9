//! Price-history tracking engine.
//!
//! [`PriceTracker`] classifies observations against stored records,
//! [`SchemaMigrator`] upgrades stored values between releases, and
//! [`process_page`] ties both to a set of [`ListingSource`]s.

pub mod migrate;
pub mod session;
pub mod source;
pub mod tracker;

pub use migrate::{
    MigrationReport, MigrationStep, SchemaMigrator, SchemaVersion, CURRENT_VERSION,
    LEGACY_VERSION, RESERVED_KEYS, VERSION_KEY,
};
pub use session::{process_page, Annotation, PageReport};
pub use source::{JsonLinesSource, ListingSource};
pub use tracker::{Lookup, PriceTracker, TrackerConfig, RECENCY_WINDOW_HOURS};
