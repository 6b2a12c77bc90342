//! Core persistence and reconciliation layer for the stencil message-template
//! editor. This crate is the single source of truth for storage invariants:
//! cross-tier uniqueness, monotonic versioning, idempotent migration, and
//! deterministic conflict resolution.

pub mod backup;
pub mod logging;
pub mod migrate;
pub mod model;
pub mod registry;
pub mod store;

pub use backup::{
    BackupCounts, BackupDocument, BackupParseError, BackupService, BackupValidationError,
    ImportReport, ImportStrategy, TierBuckets,
};
pub use logging::{default_log_level, init_logging, logging_status};
pub use migrate::{
    latest_version, MigrateError, MigrateResult, Migration, MigrationEngine,
    LEGACY_MIGRATION_VERSION,
};
pub use model::template::{
    now_epoch_ms, Template, TemplateId, TemplateValidationError, Tier, CURRENT_SCHEMA_VERSION,
};
pub use registry::{RegistryError, RegistryResult, SeedCatalog, TemplateRegistry};
pub use store::{keys, KeyValueStore, MemoryStore, SqliteStore, StoreError, StoreResult};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
