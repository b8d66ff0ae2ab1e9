use history::{Classification, HistoricalRecord, ManualClock, Observation};
use storage::{init_sqlite, KeyValueStore, MemoryStore};
use tracker::{
    process_page, JsonLinesSource, ListingSource, PriceTracker, TrackerConfig, CURRENT_VERSION,
    VERSION_KEY,
};

const T0: i64 = 1_760_000_000_000;

struct Listings(&'static str, Vec<Observation>);

impl ListingSource for Listings {
    fn name(&self) -> &str {
        self.0
    }

    fn observations(&self) -> Vec<Observation> {
        self.1.clone()
    }
}

async fn best_of<S: KeyValueStore>(store: &S, item: &str) -> i64 {
    let raw = store.get(item).await.expect("get").expect("record stored");
    HistoricalRecord::from_json(&raw).expect("structured").best()
}

#[tokio::test]
async fn price_drops_are_tracked_across_visits() {
    let store = init_sqlite("sqlite::memory:").await.expect("memory db");
    let clock = ManualClock::new(T0);
    let tracker = PriceTracker::with_clock(store, clock.clone(), TrackerConfig::default());

    let first = tracker.evaluate("A", 1000).await.unwrap();
    assert_eq!(first, Classification::NewlyRecorded);
    assert_eq!(best_of(tracker.store(), "A").await, 1000);

    clock.advance_hours(13);
    let second = tracker.evaluate("A", 900).await.unwrap();
    assert_eq!(
        second,
        Classification::NewBest {
            best: 1000,
            best_set_at: T0
        }
    );
    assert_eq!(best_of(tracker.store(), "A").await, 900);

    clock.advance_hours(1);
    let third = tracker.evaluate("A", 800).await.unwrap();
    assert_eq!(third, Classification::NewlyRecorded);
    assert_eq!(best_of(tracker.store(), "A").await, 900);

    clock.advance_hours(20);
    let fourth = tracker.evaluate("A", 950).await.unwrap();
    assert!(matches!(fourth, Classification::Worse { best: 900, .. }));
    assert_eq!(fourth.label(""), "Best seen: 900");
    assert_eq!(best_of(tracker.store(), "A").await, 900);
}

#[tokio::test]
async fn page_load_migrates_before_evaluating() {
    let store = MemoryStore::with_entries([("RJ01", "1200"), ("RJ02", "500")]);
    let clock = ManualClock::new(T0);
    let tracker = PriceTracker::with_clock(store.clone(), clock.clone(), TrackerConfig::default());

    let carousel = Listings(
        "carousel",
        vec![Observation::new("RJ01", 1100), Observation::new("RJ03", 300)],
    );
    let report = process_page(&tracker, &[&carousel]).await;

    let migration = report.migration.expect("migration ran");
    assert_eq!(migration.migrated, 2);
    assert_eq!(migration.to, CURRENT_VERSION);
    // Migrated records start their recency window at migration time.
    assert!(report
        .annotations
        .iter()
        .all(|a| a.classification == Classification::NewlyRecorded));
    assert_eq!(best_of(&store, "RJ01").await, 1200);
    assert_eq!(
        store.snapshot().get(VERSION_KEY).map(String::as_str),
        Some("0.2.0")
    );

    clock.advance_hours(24);
    let grid = JsonLinesSource::from_text(
        "grid",
        r#"{"item_id": "RJ01", "price": "1,100 JPY"}
{"item_id": "RJ02", "price": 650}
{"item_id": "RJ02", "price": -1}"#,
    );
    let writes_before = store.writes();
    let report = process_page(&tracker, &[&grid]).await;

    assert!(report.migration.expect("migration checked").is_noop());
    let kinds: Vec<_> = report
        .annotations
        .iter()
        .map(|a| (a.observation.item_id.as_str(), a.classification.kind()))
        .collect();
    assert_eq!(kinds, vec![("RJ01", "new_best"), ("RJ02", "worse")]);
    assert_eq!(report.skipped, vec![Observation::new("RJ02", -1)]);
    assert_eq!(best_of(&store, "RJ01").await, 1100);
    assert_eq!(store.writes(), writes_before + 1);
}

#[tokio::test]
async fn repeated_listing_sees_its_own_update() {
    let store = MemoryStore::new();
    let clock = ManualClock::new(T0);
    let tracker = PriceTracker::with_clock(store.clone(), clock.clone(), TrackerConfig::default());
    tracker.evaluate("RJ09", 1000).await.unwrap();
    clock.advance_hours(48);

    let carousel = Listings("carousel", vec![Observation::new("RJ09", 700)]);
    let grid = Listings("grid", vec![Observation::new("RJ09", 700)]);
    let report = process_page(&tracker, &[&carousel, &grid]).await;

    let classifications: Vec<_> = report
        .annotations
        .iter()
        .map(|a| (a.source.as_str(), a.classification))
        .collect();
    assert_eq!(
        classifications,
        vec![
            (
                "carousel",
                Classification::NewBest {
                    best: 1000,
                    best_set_at: T0
                }
            ),
            ("grid", Classification::NewlyRecorded),
        ]
    );
    assert_eq!(best_of(&store, "RJ09").await, 700);
}
