//! Key-value persistence for price records.
//!
//! Keys are item ids plus a few reserved scalars; values are text. Both
//! backends are last-write-wins and never delete.

use std::future::Future;

use thiserror::Error;

mod memory;
#[cfg(feature = "sqlite")]
mod sqlite;

pub use memory::MemoryStore;
#[cfg(feature = "sqlite")]
pub use sqlite::{init_sqlite, SqliteStore, INIT_SQL};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("persistence unavailable: {reason}")]
    Unavailable { reason: String },

    #[cfg(feature = "sqlite")]
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        StoreError::Unavailable {
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Async get/set/list-keys over string keys and string values.
pub trait KeyValueStore: Send + Sync {
    /// Value stored under `key`, or `None` when nothing has been written.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<String>>> + Send;

    /// Replace whatever is stored under `key`.
    fn set(&self, key: &str, value: &str) -> impl Future<Output = Result<()>> + Send;

    /// Every key currently stored, reserved keys included.
    fn list_keys(&self) -> impl Future<Output = Result<Vec<String>>> + Send;
}
