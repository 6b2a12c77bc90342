//! Migration engine for structural upgrades of stored template data.
//!
//! # Responsibility
//! - Upgrade the pre-partition flat list into the tiered layout exactly once.
//! - Apply registered record migrations in strictly increasing version order.
//! - Track the set of applied versions independently of the partitions.
//!
//! # Invariants
//! - Applying an already-applied version is a no-op.
//! - The legacy upgrade runs before any later migration and halts the run on
//!   failure.
//! - Re-running the legacy upgrade against already-migrated data must not
//!   duplicate records.

use crate::model::template::{now_epoch_ms, Template, Tier, CURRENT_SCHEMA_VERSION};
use crate::registry::{RegistryError, TemplateRegistry};
use crate::store::{keys, KeyValueStore, StoreError};
use log::{info, warn};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Version number recorded for the one-time legacy flat-list upgrade.
pub const LEGACY_MIGRATION_VERSION: u32 = 1;

/// Record migrations beyond the legacy upgrade register here. Adding an entry
/// must not require changes to any caller.
const MIGRATIONS: &[Migration] = &[];

/// One structural upgrade of persisted records.
#[derive(Clone, Copy)]
pub struct Migration {
    /// Strictly greater than [`LEGACY_MIGRATION_VERSION`] for table entries.
    pub version: u32,
    pub name: &'static str,
    /// Old records in, new records out.
    pub up: fn(Vec<Template>) -> Vec<Template>,
    /// Inverse of `up`; kept for completeness, rarely exercised.
    pub down: fn(Vec<Template>) -> Vec<Template>,
}

impl std::fmt::Debug for Migration {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Migration")
            .field("version", &self.version)
            .field("name", &self.name)
            .finish()
    }
}

/// Latest migration version known by this binary.
pub fn latest_version() -> u32 {
    MIGRATIONS
        .last()
        .map_or(LEGACY_MIGRATION_VERSION, |migration| migration.version)
}

pub type MigrateResult<T> = Result<T, MigrateError>;

#[derive(Debug)]
pub enum MigrateError {
    Registry(RegistryError),
    Store(StoreError),
    /// Corrupt payload under the legacy or applied-versions key.
    InvalidData { key: &'static str, message: String },
}

impl Display for MigrateError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Registry(err) => write!(f, "{err}"),
            Self::Store(err) => write!(f, "{err}"),
            Self::InvalidData { key, message } => {
                write!(f, "invalid persisted data under `{key}`: {message}")
            }
        }
    }
}

impl Error for MigrateError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Registry(err) => Some(err),
            Self::Store(err) => Some(err),
            Self::InvalidData { .. } => None,
        }
    }
}

impl From<RegistryError> for MigrateError {
    fn from(value: RegistryError) -> Self {
        Self::Registry(value)
    }
}

impl From<StoreError> for MigrateError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

/// Lenient decode of pre-partition records: only `id` is required, everything
/// else predating the tiered scheme is defaulted.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyRecord {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    message_kind: String,
    #[serde(default)]
    body: serde_json::Value,
    #[serde(default)]
    tag_ids: Vec<String>,
    #[serde(default)]
    created_at: Option<i64>,
    #[serde(default)]
    updated_at: Option<i64>,
    #[serde(default)]
    is_starred: Option<bool>,
    #[serde(default)]
    last_used_at: Option<i64>,
    #[serde(default)]
    use_count: Option<u64>,
    #[serde(default)]
    version: Option<u32>,
}

impl LegacyRecord {
    fn into_user_template(self) -> Template {
        let now = now_epoch_ms();
        Template {
            id: self.id,
            name: self.name,
            message_kind: self.message_kind,
            body: self.body,
            tag_ids: self.tag_ids,
            created_at: self.created_at.unwrap_or(now),
            updated_at: self.updated_at.unwrap_or(now),
            is_starred: self.is_starred,
            last_used_at: self.last_used_at,
            use_count: self.use_count,
            tier: Tier::User,
            version: self.version.filter(|version| *version > 0).unwrap_or(1),
            schema_version: CURRENT_SCHEMA_VERSION,
        }
    }
}

/// Runs structural upgrades against one registry.
///
/// Intended to run at startup, before the first read. Mutates template data
/// exclusively through the registry surface; only the legacy flat-list key
/// and the applied-versions record are touched directly, since both predate
/// the partition scheme.
pub struct MigrationEngine<'reg, S: KeyValueStore> {
    registry: &'reg mut TemplateRegistry<S>,
    migrations: Vec<Migration>,
}

impl<'reg, S: KeyValueStore> MigrationEngine<'reg, S> {
    pub fn new(registry: &'reg mut TemplateRegistry<S>) -> Self {
        Self::with_migrations(registry, MIGRATIONS.to_vec())
    }

    /// Builds an engine over a caller-supplied migration table. Entries are
    /// ordered by version before use.
    pub fn with_migrations(
        registry: &'reg mut TemplateRegistry<S>,
        mut migrations: Vec<Migration>,
    ) -> Self {
        migrations.sort_by_key(|migration| migration.version);
        Self {
            registry,
            migrations,
        }
    }

    fn applied_versions(&self) -> MigrateResult<BTreeSet<u32>> {
        match self.registry.store().get(keys::APPLIED_MIGRATIONS)? {
            None => Ok(BTreeSet::new()),
            Some(payload) => serde_json::from_str::<Vec<u32>>(&payload)
                .map(|versions| versions.into_iter().collect())
                .map_err(|err| MigrateError::InvalidData {
                    key: keys::APPLIED_MIGRATIONS,
                    message: err.to_string(),
                }),
        }
    }

    fn mark_applied(&mut self, version: u32) -> MigrateResult<()> {
        let mut applied = self.applied_versions()?;
        applied.insert(version);
        let payload = serde_json::to_string(&applied.iter().collect::<Vec<_>>())
            .map_err(|err| MigrateError::InvalidData {
                key: keys::APPLIED_MIGRATIONS,
                message: err.to_string(),
            })?;
        self.registry
            .store_mut()
            .set(keys::APPLIED_MIGRATIONS, &payload)?;
        Ok(())
    }

    /// Maximum applied migration version, or 0 when none have run.
    pub fn current_version(&self) -> MigrateResult<u32> {
        Ok(self
            .applied_versions()?
            .iter()
            .next_back()
            .copied()
            .unwrap_or(0))
    }

    /// True iff the legacy flat-list key is present and the legacy upgrade
    /// has not been recorded as applied.
    pub fn needs_legacy_migration(&self) -> MigrateResult<bool> {
        let legacy_present = self
            .registry
            .store()
            .get(keys::LEGACY_TEMPLATES)?
            .is_some();
        if !legacy_present {
            return Ok(false);
        }
        Ok(!self
            .applied_versions()?
            .contains(&LEGACY_MIGRATION_VERSION))
    }

    /// Moves the legacy flat list into the user partition.
    ///
    /// Entries whose id matches a built-in seed are skipped: built-in
    /// templates must never be duplicated into user storage. The sequence
    /// write-partition / mark-applied / delete-legacy-key is not atomic; a
    /// retry after a crash in between is safe because already-migrated ids
    /// surface as duplicates and are skipped.
    ///
    /// Returns the number of records migrated.
    pub fn run_legacy_migration(&mut self) -> MigrateResult<usize> {
        let Some(payload) = self.registry.store().get(keys::LEGACY_TEMPLATES)? else {
            self.mark_applied(LEGACY_MIGRATION_VERSION)?;
            return Ok(0);
        };
        let legacy: Vec<LegacyRecord> =
            serde_json::from_str(&payload).map_err(|err| MigrateError::InvalidData {
                key: keys::LEGACY_TEMPLATES,
                message: err.to_string(),
            })?;

        let mut migrated = 0usize;
        for record in legacy {
            if self.registry.seeds().is_built_in_seed(&record.id) {
                warn!(
                    "event=legacy_skip_builtin module=migrate status=skipped id={}",
                    record.id
                );
                continue;
            }
            let template = record.into_user_template();
            match self.registry.create(&template) {
                Ok(_) => migrated += 1,
                Err(RegistryError::DuplicateId { id, .. }) => {
                    // Already present from a previous, interrupted attempt.
                    info!(
                        "event=legacy_already_migrated module=migrate status=skipped id={id}"
                    );
                }
                Err(err) => return Err(err.into()),
            }
        }

        self.mark_applied(LEGACY_MIGRATION_VERSION)?;
        self.registry.store_mut().remove(keys::LEGACY_TEMPLATES)?;
        info!(
            "event=legacy_migration module=migrate status=ok migrated={migrated}"
        );
        Ok(migrated)
    }

    /// Applies every pending migration in increasing version order.
    ///
    /// The legacy upgrade runs first and halts the whole run on failure, so
    /// later migrations never compound corruption. Returns the number of
    /// migrations applied.
    pub fn run_pending_migrations(&mut self) -> MigrateResult<usize> {
        let mut applied_count = 0usize;

        if self.needs_legacy_migration()? {
            self.run_legacy_migration()?;
            applied_count += 1;
        }

        let applied = self.applied_versions()?;
        let pending: Vec<Migration> = self
            .migrations
            .iter()
            .filter(|migration| {
                migration.version > LEGACY_MIGRATION_VERSION
                    && !applied.contains(&migration.version)
            })
            .copied()
            .collect();

        for migration in pending {
            self.apply_record_migration(migration)?;
            applied_count += 1;
        }

        Ok(applied_count)
    }

    fn apply_record_migration(&mut self, migration: Migration) -> MigrateResult<()> {
        info!(
            "event=migration_apply module=migrate status=start version={} name={}",
            migration.version, migration.name
        );
        for tier in Tier::PRIORITY {
            let records = self.registry.list_tier(tier)?;
            let mut upgraded = (migration.up)(records);
            for record in &mut upgraded {
                record.schema_version = migration.version;
            }
            self.registry.replace_tier(tier, upgraded)?;
        }
        self.mark_applied(migration.version)?;
        info!(
            "event=migration_apply module=migrate status=ok version={}",
            migration.version
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{latest_version, CURRENT_SCHEMA_VERSION};

    #[test]
    fn records_are_stamped_with_the_latest_known_version() {
        assert_eq!(latest_version(), CURRENT_SCHEMA_VERSION);
    }
}
