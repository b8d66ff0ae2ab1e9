use std::fs::File;
use std::io::{self, BufReader};
use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use history::{parse_price, Badge, Clock, Observation};
use metrics::MetricsHandle;
use serde::Serialize;
use storage::{init_sqlite, KeyValueStore};
use tracing::{info, Level};
use tracker::{
    process_page, Annotation, JsonLinesSource, ListingSource, Lookup, PageReport, PriceTracker,
    TrackerConfig, RECENCY_WINDOW_HOURS, RESERVED_KEYS,
};

mod paths;

use paths::{ensure_sqlite_parent_dir, validate_sqlite_url};

#[derive(Parser, Debug)]
#[command(about = "Remembers the lowest price seen for each listing")]
struct Cli {
    #[arg(
        long,
        env = "PRICEHIST_DATABASE_URL",
        default_value = "sqlite://price_history.db"
    )]
    database_url: String,

    #[arg(
        long,
        env = "PRICEHIST_RECENCY_WINDOW_HOURS",
        default_value_t = RECENCY_WINDOW_HOURS,
        value_parser = clap::value_parser!(i64).range(0..)
    )]
    recency_window_hours: i64,

    #[arg(long, env = "PRICEHIST_CURRENCY", default_value = "JPY")]
    currency: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upgrade stored values to the current schema.
    Migrate,
    /// Evaluate one listing, e.g. `observe RJ01 "1,320 JPY"`.
    Observe { item_id: String, price: String },
    /// Evaluate listings from a JSON-lines file, or `-` for stdin.
    Ingest {
        path: PathBuf,
        /// Print Prometheus counters after the badges.
        #[arg(long)]
        metrics: bool,
    },
    /// Print the stored record for an item.
    Show { item_id: String },
    /// Print every tracked item id.
    List,
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Command::Migrate => "migrate",
            Command::Observe { .. } => "observe",
            Command::Ingest { .. } => "ingest",
            Command::Show { .. } => "show",
            Command::List => "list",
        }
    }
}

fn log_startup(cli: &Cli) {
    info!(url = %cli.database_url, "database configured");
    info!(hours = cli.recency_window_hours, "recency window configured");
    info!(currency = %cli.currency, "badge currency configured");
    info!(command = cli.command.name(), "command selected");
}

/// Single listing given on the command line.
struct CommandLineListing(Observation);

impl ListingSource for CommandLineListing {
    fn name(&self) -> &str {
        "command-line"
    }

    fn observations(&self) -> Vec<Observation> {
        vec![self.0.clone()]
    }
}

#[derive(Serialize)]
struct BadgeLine<'a> {
    source: &'a str,
    item_id: &'a str,
    price: i64,
    #[serde(flatten)]
    badge: Badge,
}

fn badge_lines(
    annotations: &[Annotation],
    currency: &str,
    now_ms: i64,
) -> anyhow::Result<Vec<String>> {
    annotations
        .iter()
        .map(|annotation| -> anyhow::Result<String> {
            let line = BadgeLine {
                source: &annotation.source,
                item_id: &annotation.observation.item_id,
                price: annotation.observation.price,
                badge: annotation.classification.badge(currency, now_ms),
            };
            Ok(serde_json::to_string(&line)?)
        })
        .collect()
}

fn record_page(metrics: &MetricsHandle, report: &PageReport) {
    if let Some(migration) = &report.migration {
        metrics.record_migrated(migration.migrated);
    }
    for annotation in &report.annotations {
        metrics.record_classification(annotation.classification.kind());
    }
    for _ in &report.skipped {
        metrics.record_skipped();
    }
}

async fn run<S, C>(
    command: &Command,
    tracker: &PriceTracker<S, C>,
    currency: &str,
) -> anyhow::Result<Vec<String>>
where
    S: KeyValueStore,
    C: Clock,
{
    match command {
        Command::Migrate => {
            let report = tracker.migrator().migrate_if_needed().await?;
            let line = serde_json::json!({
                "from": report.from.to_string(),
                "to": report.to.to_string(),
                "migrated": report.migrated,
                "skipped": report.skipped,
                "failed": report.failed,
            });
            Ok(vec![line.to_string()])
        }
        Command::Observe { item_id, price } => {
            let Some(price) = parse_price(price) else {
                bail!("could not read a price from `{price}`");
            };
            let listing = CommandLineListing(Observation::new(item_id.as_str(), price));
            let report = process_page(tracker, &[&listing]).await;
            badge_lines(&report.annotations, currency, tracker.clock().now_ms())
        }
        Command::Ingest { path, metrics } => {
            let source = if path.as_os_str() == "-" {
                JsonLinesSource::from_reader("stdin", io::stdin().lock())?
            } else {
                let file = File::open(path)
                    .with_context(|| format!("failed to open {}", path.display()))?;
                JsonLinesSource::from_reader(path.display().to_string(), BufReader::new(file))?
            };
            let report = process_page(tracker, &[&source]).await;
            let mut lines = badge_lines(&report.annotations, currency, tracker.clock().now_ms())?;
            if *metrics {
                let handle = MetricsHandle::new()?;
                record_page(&handle, &report);
                lines.push(handle.render()?);
            }
            Ok(lines)
        }
        Command::Show { item_id } => match tracker.lookup(item_id).await {
            Lookup::Found(record) => {
                let line = serde_json::json!({
                    "item_id": item_id,
                    "best": record.best(),
                    "best_set_at": record.best_set_at(),
                    "tracking_started_at": record.tracking_started_at(),
                    "seen": history::seen_at(record.best_set_at(), tracker.clock().now_ms()),
                });
                Ok(vec![line.to_string()])
            }
            Lookup::Absent => bail!("no price history for `{item_id}`"),
            Lookup::Unreadable => {
                bail!("stored value for `{item_id}` is not a price record; try `pricehist migrate`")
            }
        },
        Command::List => {
            let keys = tracker.store().list_keys().await?;
            Ok(keys
                .into_iter()
                .filter(|key| !RESERVED_KEYS.contains(&key.as_str()))
                .collect())
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    validate_sqlite_url(&cli.database_url)?;
    ensure_sqlite_parent_dir(&cli.database_url)?;
    log_startup(&cli);

    let store = init_sqlite(&cli.database_url).await?;
    let tracker = PriceTracker::new(
        store,
        TrackerConfig {
            recency_window_hours: cli.recency_window_hours,
        },
    );

    for line in run(&cli.command, &tracker, &cli.currency).await? {
        println!("{line}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use history::ManualClock;
    use std::sync::{Arc, Mutex};
    use storage::MemoryStore;
    use tracing_subscriber::fmt::MakeWriter;

    const T0: i64 = 1_791_187_200_000;

    #[derive(Clone)]
    struct VecWriter(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for VecWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            let mut guard = self.0.lock().unwrap();
            guard.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for VecWriter {
        type Writer = VecWriter;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    type TestTracker = PriceTracker<MemoryStore, ManualClock>;

    fn tracker_at(store: &MemoryStore, now: i64) -> (TestTracker, ManualClock) {
        let clock = ManualClock::new(now);
        let tracker =
            PriceTracker::with_clock(store.clone(), clock.clone(), TrackerConfig::default());
        (tracker, clock)
    }

    fn observe(item_id: &str, price: &str) -> Command {
        Command::Observe {
            item_id: item_id.to_string(),
            price: price.to_string(),
        }
    }

    #[test]
    fn parses_defaults_and_subcommand() {
        let cli = Cli::parse_from(["pricehist", "observe", "RJ01", "1,320 JPY"]);
        assert_eq!(cli.database_url, "sqlite://price_history.db");
        assert_eq!(cli.recency_window_hours, 12);
        assert_eq!(cli.currency, "JPY");
        assert!(matches!(cli.command, Command::Observe { ref price, .. } if price == "1,320 JPY"));
    }

    #[test]
    fn rejects_negative_recency_window() {
        let result = Cli::try_parse_from(["pricehist", "--recency-window-hours", "-1", "list"]);
        assert!(result.is_err());
    }

    #[test]
    fn startup_logs_include_configuration() {
        let cli = Cli::parse_from([
            "pricehist",
            "--database-url",
            "sqlite:///tmp/pricehist-test.db",
            "--recency-window-hours",
            "6",
            "--currency",
            "EUR",
            "list",
        ]);
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let writer = VecWriter(buffer.clone());
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(Level::INFO)
            .with_writer(writer)
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            log_startup(&cli);
        });

        let output =
            String::from_utf8(buffer.lock().unwrap().clone()).expect("log output should be utf8");
        assert!(output.contains("database configured"));
        assert!(output.contains("recency window configured"));
        assert!(output.contains("badge currency configured"));
        assert!(output.contains("command selected"));
        assert!(output.contains(&cli.database_url));
        assert!(output.contains("EUR"));
        assert!(output.contains("list"));
    }

    #[tokio::test]
    async fn observe_prints_badges_over_time() {
        let store = MemoryStore::new();
        let (tracker, clock) = tracker_at(&store, T0);

        let first = run(&observe("RJ01", "1,000 JPY"), &tracker, "JPY").await.unwrap();
        let first: serde_json::Value = serde_json::from_str(&first[0]).unwrap();
        assert_eq!(first["kind"], "newly_recorded");
        assert_eq!(first["label"], "Newly recorded");
        assert_eq!(first["price"], 1000);
        assert!(first["title"].is_null());

        clock.advance_hours(72);
        let worse = run(&observe("RJ01", "1200"), &tracker, "JPY").await.unwrap();
        let worse: serde_json::Value = serde_json::from_str(&worse[0]).unwrap();
        assert_eq!(worse["kind"], "worse");
        assert_eq!(worse["label"], "Best seen: 1000 JPY");
        assert_eq!(worse["title"], "Seen 3 days ago on 2026-Oct-5");
    }

    #[tokio::test]
    async fn observe_rejects_unreadable_price() {
        let store = MemoryStore::new();
        let (tracker, _) = tracker_at(&store, T0);
        let err = run(&observe("RJ01", "sold out"), &tracker, "JPY")
            .await
            .expect_err("no digits");
        assert!(err.to_string().contains("could not read a price"));
        assert!(store.snapshot().is_empty());
    }

    #[tokio::test]
    async fn migrate_show_and_list() {
        let store = MemoryStore::with_entries([("RJ02", "880"), ("RJ03", "1320")]);
        let (tracker, _) = tracker_at(&store, T0);

        let migrated = run(&Command::Migrate, &tracker, "JPY").await.unwrap();
        let migrated: serde_json::Value = serde_json::from_str(&migrated[0]).unwrap();
        assert_eq!(migrated["from"], "0.1.0");
        assert_eq!(migrated["to"], "0.2.0");
        assert_eq!(migrated["migrated"], 2);

        let shown = run(
            &Command::Show {
                item_id: "RJ02".to_string(),
            },
            &tracker,
            "JPY",
        )
        .await
        .unwrap();
        let shown: serde_json::Value = serde_json::from_str(&shown[0]).unwrap();
        assert_eq!(shown["best"], 880);
        assert_eq!(shown["tracking_started_at"], T0);

        let listed = run(&Command::List, &tracker, "JPY").await.unwrap();
        assert_eq!(listed, vec!["RJ02", "RJ03"]);

        let missing = run(
            &Command::Show {
                item_id: "RJ99".to_string(),
            },
            &tracker,
            "JPY",
        )
        .await
        .expect_err("untracked item");
        assert!(missing.to_string().contains("no price history"));
    }

    #[tokio::test]
    async fn ingest_reads_file_and_reports_metrics() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("grid.jsonl");
        std::fs::write(
            &path,
            "{\"item_id\": \"RJ05\", \"price\": 500}\n{\"item_id\": \"RJ06\", \"price\": -1}\n",
        )
        .expect("write listings");
        let store = MemoryStore::new();
        let (tracker, _) = tracker_at(&store, T0);

        let lines = run(
            &Command::Ingest {
                path: path.clone(),
                metrics: true,
            },
            &tracker,
            "",
        )
        .await
        .unwrap();

        assert_eq!(lines.len(), 2);
        let badge: serde_json::Value = serde_json::from_str(&lines[0]).unwrap();
        assert_eq!(badge["item_id"], "RJ05");
        assert_eq!(badge["source"], path.display().to_string());
        assert!(lines[1].contains(r#"pricehist_classifications_total{kind="newly_recorded"} 1"#));
        assert!(lines[1].contains("pricehist_skipped_observations_total 1"));
    }
}
