//! Persistent key-value storage contract.
//!
//! # Responsibility
//! - Define the synchronous single-key get/set/remove seam the registry and
//!   migration engine are built on.
//! - Name the logical keys that make up the storage footprint.
//!
//! # Invariants
//! - Operations are atomic per key; nothing spans multiple keys atomically.
//! - A write may fail (capacity-bounded backends); reads of absent keys are
//!   not errors.

use std::error::Error;
use std::fmt::{Display, Formatter};

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Logical keys used on the underlying store.
///
/// Three tier partitions, the applied-migrations record, and the legacy
/// flat-list key consumed once by the one-time upgrade.
pub mod keys {
    pub const TEMPLATES_BUILT_IN: &str = "templates.built-in";
    pub const TEMPLATES_ORGANIZATION: &str = "templates.organization";
    pub const TEMPLATES_USER: &str = "templates.user";
    pub const APPLIED_MIGRATIONS: &str = "templates.migrations";
    pub const LEGACY_TEMPLATES: &str = "templates";
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Storage adapter failure.
#[derive(Debug)]
pub enum StoreError {
    /// The backend rejected a write, e.g. its capacity is exhausted.
    CapacityExceeded { key: String },
    Sqlite(rusqlite::Error),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CapacityExceeded { key } => {
                write!(f, "store rejected write for key `{key}`: capacity exceeded")
            }
            Self::Sqlite(err) => write!(f, "{err}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::CapacityExceeded { .. } => None,
            Self::Sqlite(err) => Some(err),
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

/// Synchronous single-key string storage.
///
/// The registry is the only production caller; everything above it treats
/// stored values as opaque payloads.
pub trait KeyValueStore {
    /// Returns the value stored under `key`, or `None` when absent.
    fn get(&self, key: &str) -> StoreResult<Option<String>>;
    /// Stores `value` under `key`, replacing any existing value.
    fn set(&mut self, key: &str, value: &str) -> StoreResult<()>;
    /// Removes `key`. Removing an absent key is not an error.
    fn remove(&mut self, key: &str) -> StoreResult<()>;
}
