use history::{Classification, Clock, Observation};
use serde::Serialize;
use storage::KeyValueStore;
use tracing::{debug, warn};

use crate::migrate::MigrationReport;
use crate::source::ListingSource;
use crate::tracker::PriceTracker;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Annotation {
    pub source: String,
    pub observation: Observation,
    pub classification: Classification,
}

#[derive(Debug, Default)]
pub struct PageReport {
    /// `None` when the migrator could not reach the store.
    pub migration: Option<MigrationReport>,
    pub annotations: Vec<Annotation>,
    /// Observations rejected by the tracker.
    pub skipped: Vec<Observation>,
}

/// One page load: migrate, then evaluate every observation of every source
/// in order, one at a time. Never fails; problems are logged and the affected
/// observation is skipped or degraded.
pub async fn process_page<S, C>(
    tracker: &PriceTracker<S, C>,
    sources: &[&dyn ListingSource],
) -> PageReport
where
    S: KeyValueStore,
    C: Clock,
{
    let mut report = PageReport::default();

    match tracker.migrator().migrate_if_needed().await {
        Ok(migration) => report.migration = Some(migration),
        Err(err) => warn!(error = %err, "schema migration failed, continuing with stored data"),
    }

    for source in sources {
        let observations = source.observations();
        debug!(source = source.name(), count = observations.len(), "evaluating listings");
        for observation in observations {
            match tracker
                .evaluate(&observation.item_id, observation.price)
                .await
            {
                Ok(classification) => report.annotations.push(Annotation {
                    source: source.name().to_string(),
                    observation,
                    classification,
                }),
                Err(err) => {
                    warn!(
                        source = source.name(),
                        item_id = %observation.item_id,
                        error = %err,
                        "skipping observation"
                    );
                    report.skipped.push(observation);
                }
            }
        }
    }
    report
}
