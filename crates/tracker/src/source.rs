use std::io::{self, BufRead};

use history::{parse_price, Observation};
use serde::Deserialize;
use tracing::warn;

/// Something that can surface the listings rendered on a page. Each page
/// layout gets its own implementation; the tracker never sees page structure.
pub trait ListingSource {
    fn name(&self) -> &str;

    /// Observations in page order. Listings whose id or price could not be
    /// extracted are left out.
    fn observations(&self) -> Vec<Observation>;
}

/// Observations recorded as one JSON object per line, e.g.
/// `{"item_id": "RJ01", "price": "1,320 JPY"}`.
#[derive(Debug, Clone)]
pub struct JsonLinesSource {
    name: String,
    observations: Vec<Observation>,
}

#[derive(Deserialize)]
struct Line {
    item_id: String,
    price: LinePrice,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LinePrice {
    Amount(i64),
    Display(String),
}

impl JsonLinesSource {
    pub fn from_reader(name: impl Into<String>, reader: impl BufRead) -> io::Result<Self> {
        let name = name.into();
        let mut observations = Vec::new();
        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            if let Some(observation) = parse_line(&name, idx + 1, &line) {
                observations.push(observation);
            }
        }
        Ok(Self { name, observations })
    }

    pub fn from_text(name: impl Into<String>, text: &str) -> Self {
        let name = name.into();
        let observations = text
            .lines()
            .enumerate()
            .filter_map(|(idx, line)| parse_line(&name, idx + 1, line))
            .collect();
        Self { name, observations }
    }
}

fn parse_line(source: &str, line_no: usize, line: &str) -> Option<Observation> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    let parsed: Line = match serde_json::from_str(trimmed) {
        Ok(parsed) => parsed,
        Err(err) => {
            warn!(source, line = line_no, error = %err, "unreadable listing line");
            return None;
        }
    };
    if parsed.item_id.trim().is_empty() {
        warn!(source, line = line_no, "listing has no item id");
        return None;
    }
    let price = match parsed.price {
        LinePrice::Amount(price) => price,
        LinePrice::Display(text) => match parse_price(&text) {
            Some(price) => price,
            None => {
                warn!(source, line = line_no, item_id = %parsed.item_id, "failed to read price");
                return None;
            }
        },
    };
    Some(Observation::new(parsed.item_id.trim(), price))
}

impl ListingSource for JsonLinesSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn observations(&self) -> Vec<Observation> {
        self.observations.clone()
    }
}
