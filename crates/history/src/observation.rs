use serde::{Deserialize, Serialize};

/// One sighting of an item's displayed price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    pub item_id: String,
    pub price: i64,
}

impl Observation {
    pub fn new(item_id: impl Into<String>, price: i64) -> Self {
        Self {
            item_id: item_id.into(),
            price,
        }
    }
}

/// Reads a displayed price such as `"1,320 JPY"` by keeping only its digits.
/// Returns `None` when there are no digits or the value overflows.
pub fn parse_price(text: &str) -> Option<i64> {
    let digits: String = text.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}
