//! Per-item price history: the stored record, observations, and the
//! classification handed to badge renderers.

mod classification;
mod clock;
mod observation;
mod record;

pub use classification::{seen_at, Badge, Classification};
pub use clock::{Clock, ManualClock, SystemClock};
pub use observation::{parse_price, Observation};
pub use record::{days_apart, hours_apart, HistoricalRecord, RecordError, MS_PER_HOUR};
