use chrono::DateTime;
use serde::{Deserialize, Serialize};

use crate::record::days_apart;

/// Outcome of evaluating one observation against an item's history.
///
/// `best` and `best_set_at` describe the record as it stood before the
/// observation was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Classification {
    NewlyRecorded,
    NewBest { best: i64, best_set_at: i64 },
    MatchesBest { best: i64, best_set_at: i64 },
    Worse { best: i64, best_set_at: i64 },
}

impl Classification {
    pub fn kind(&self) -> &'static str {
        match self {
            Classification::NewlyRecorded => "newly_recorded",
            Classification::NewBest { .. } => "new_best",
            Classification::MatchesBest { .. } => "matches_best",
            Classification::Worse { .. } => "worse",
        }
    }

    pub fn best_set_at(&self) -> Option<i64> {
        match self {
            Classification::NewlyRecorded => None,
            Classification::NewBest { best_set_at, .. }
            | Classification::MatchesBest { best_set_at, .. }
            | Classification::Worse { best_set_at, .. } => Some(*best_set_at),
        }
    }

    /// Text shown on the listing badge.
    pub fn label(&self, currency: &str) -> String {
        match self {
            Classification::NewlyRecorded => "Newly recorded".to_string(),
            Classification::NewBest { .. } => "New best".to_string(),
            Classification::MatchesBest { .. } => "Matches best".to_string(),
            Classification::Worse { best, .. } if currency.is_empty() => {
                format!("Best seen: {best}")
            }
            Classification::Worse { best, .. } => format!("Best seen: {best} {currency}"),
        }
    }

    pub fn badge(&self, currency: &str, now_ms: i64) -> Badge {
        Badge {
            kind: self.kind(),
            label: self.label(currency),
            title: self.best_set_at().map(|at| seen_at(at, now_ms)),
        }
    }
}

/// Render-ready badge text for an external renderer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Badge {
    pub kind: &'static str,
    pub label: String,
    pub title: Option<String>,
}

/// "Seen 3 days ago on 2026-Oct-5". The date is the UTC calendar day of
/// `seen_ms`.
pub fn seen_at(seen_ms: i64, now_ms: i64) -> String {
    let days = days_apart(seen_ms, now_ms);
    let ago = if days == 1 {
        "1 day ago".to_string()
    } else {
        format!("{days} days ago")
    };
    match DateTime::from_timestamp_millis(seen_ms) {
        Some(date) => format!("Seen {ago} on {}", date.format("%Y-%b-%-d")),
        None => format!("Seen {ago}"),
    }
}
