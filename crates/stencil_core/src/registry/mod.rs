//! Template registry: sole owner of the three tier partitions.
//!
//! # Responsibility
//! - Provide CRUD over tier-partitioned template storage.
//! - Merge partitions on read with deterministic collision resolution.
//! - Heal missing defaults from the seed catalog and clean up historical
//!   duplicate records.
//!
//! # Invariants
//! - No other component reads or writes the partition keys directly.
//! - `update` always advances `version` by exactly 1 and produces a strictly
//!   later `updated_at`, regardless of caller-supplied values.
//! - Collision resolution order is built-in > organization > user.

use crate::model::template::{
    now_epoch_ms, Template, TemplateId, TemplateValidationError, Tier,
};
use crate::store::{keys, KeyValueStore, StoreError};
use log::{info, warn};
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

mod seed;

pub use seed::SeedCatalog;

pub type RegistryResult<T> = Result<T, RegistryError>;

/// Registry error taxonomy. Discriminated so callers branch without string
/// matching.
#[derive(Debug)]
pub enum RegistryError {
    /// `create` against an id that already exists in the target tier.
    DuplicateId { tier: Tier, id: TemplateId },
    /// `update`/`delete` against an id absent from the searched tier(s).
    NotFound(TemplateId),
    Validation(TemplateValidationError),
    Store(StoreError),
    /// Corrupt persisted payload under a partition key.
    InvalidData { key: &'static str, message: String },
}

impl Display for RegistryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateId { tier, id } => {
                write!(f, "template id `{id}` already exists in tier `{tier}`")
            }
            Self::NotFound(id) => write!(f, "template not found: {id}"),
            Self::Validation(err) => write!(f, "{err}"),
            Self::Store(err) => write!(f, "{err}"),
            Self::InvalidData { key, message } => {
                write!(f, "invalid persisted data under `{key}`: {message}")
            }
        }
    }
}

impl Error for RegistryError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Store(err) => Some(err),
            _ => None,
        }
    }
}

impl From<TemplateValidationError> for RegistryError {
    fn from(value: TemplateValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<StoreError> for RegistryError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

fn tier_key(tier: Tier) -> &'static str {
    match tier {
        Tier::BuiltIn => keys::TEMPLATES_BUILT_IN,
        Tier::Organization => keys::TEMPLATES_ORGANIZATION,
        Tier::User => keys::TEMPLATES_USER,
    }
}

/// Tier-partitioned template store.
///
/// Constructed explicitly and passed by reference to consumers; there is no
/// process-wide instance, so tests build fresh isolated registries.
pub struct TemplateRegistry<S: KeyValueStore> {
    store: S,
    seeds: SeedCatalog,
}

impl<S: KeyValueStore> TemplateRegistry<S> {
    pub fn new(store: S, seeds: SeedCatalog) -> Self {
        Self { store, seeds }
    }

    pub fn seeds(&self) -> &SeedCatalog {
        &self.seeds
    }

    /// Consumes the registry, returning the underlying store.
    pub fn into_store(self) -> S {
        self.store
    }

    // The migration engine's legacy flat-list key and applied-version record
    // predate the partition scheme and have no registry-level operation.
    pub(crate) fn store(&self) -> &S {
        &self.store
    }

    pub(crate) fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    fn read_tier(&self, tier: Tier) -> RegistryResult<Vec<Template>> {
        match self.store.get(tier_key(tier))? {
            None => Ok(Vec::new()),
            Some(payload) => {
                serde_json::from_str(&payload).map_err(|err| RegistryError::InvalidData {
                    key: tier_key(tier),
                    message: err.to_string(),
                })
            }
        }
    }

    fn write_tier(&mut self, tier: Tier, records: &[Template]) -> RegistryResult<()> {
        let payload =
            serde_json::to_string(records).map_err(|err| RegistryError::InvalidData {
                key: tier_key(tier),
                message: err.to_string(),
            })?;
        self.store.set(tier_key(tier), &payload)?;
        Ok(())
    }

    /// Raw contents of one partition, without per-record validation.
    pub fn list_tier(&self, tier: Tier) -> RegistryResult<Vec<Template>> {
        self.read_tier(tier)
    }

    /// Merges all three partitions, deduplicated by id.
    ///
    /// On a cross-tier collision the higher-priority tier wins; the loser is
    /// dropped and logged as an expected, non-fatal event. Survivor order
    /// follows partition precedence.
    pub fn list_all(&self) -> RegistryResult<Vec<Template>> {
        let mut seen: HashSet<TemplateId> = HashSet::new();
        let mut merged = Vec::new();
        for tier in Tier::PRIORITY {
            for record in self.read_tier(tier)? {
                if seen.contains(&record.id) {
                    warn!(
                        "event=tier_collision module=registry status=resolved id={} dropped_tier={}",
                        record.id, tier
                    );
                    continue;
                }
                seen.insert(record.id.clone());
                merged.push(record);
            }
        }
        Ok(merged)
    }

    /// Finds one template by id across all tiers.
    pub fn get(&self, id: &str) -> RegistryResult<Option<Template>> {
        Ok(self.list_all()?.into_iter().find(|record| record.id == id))
    }

    /// Inserts a template into the partition matching its tier.
    ///
    /// Uniqueness is checked within the target tier only: a record created
    /// here can share an id with another tier's record and be shadowed by
    /// `list_all` without any error at creation time. The record is persisted
    /// as given; callers supply the initial `version` (expected to be 1).
    pub fn create(&mut self, template: &Template) -> RegistryResult<TemplateId> {
        template.validate()?;

        let mut records = self.read_tier(template.tier)?;
        if records.iter().any(|record| record.id == template.id) {
            return Err(RegistryError::DuplicateId {
                tier: template.tier,
                id: template.id.clone(),
            });
        }

        records.push(template.clone());
        self.write_tier(template.tier, &records)?;
        info!(
            "event=template_create module=registry status=ok id={} tier={}",
            template.id, template.tier
        );
        Ok(template.id.clone())
    }

    /// Updates an existing record in its own tier; last write wins.
    ///
    /// The stored `version` is advanced by exactly 1 and `updated_at` is set
    /// strictly later than the stored value, whatever the caller supplied.
    /// There is no staleness check: callers racing each other silently
    /// overwrite.
    pub fn update(&mut self, template: &Template) -> RegistryResult<Template> {
        template.validate()?;

        let mut records = self.read_tier(template.tier)?;
        let Some(slot) = records
            .iter_mut()
            .find(|record| record.id == template.id)
        else {
            return Err(RegistryError::NotFound(template.id.clone()));
        };

        let mut stored = template.clone();
        stored.version = slot.version + 1;
        stored.updated_at = now_epoch_ms().max(slot.updated_at + 1);
        *slot = stored.clone();

        self.write_tier(template.tier, &records)?;
        info!(
            "event=template_update module=registry status=ok id={} tier={} version={}",
            stored.id, stored.tier, stored.version
        );
        Ok(stored)
    }

    /// Deletes the first record matching `id`, searching tiers in priority
    /// order.
    pub fn delete(&mut self, id: &str) -> RegistryResult<Tier> {
        for tier in Tier::PRIORITY {
            let mut records = self.read_tier(tier)?;
            if let Some(position) = records.iter().position(|record| record.id == id) {
                records.remove(position);
                self.write_tier(tier, &records)?;
                info!(
                    "event=template_delete module=registry status=ok id={id} tier={tier}"
                );
                return Ok(tier);
            }
        }
        Err(RegistryError::NotFound(id.to_string()))
    }

    /// Re-inserts any seed records missing from the tier's partition.
    ///
    /// Missing seeds are prepended with synthesized, strictly decreasing
    /// timestamps so catalog order survives recency-based sorts. Returns the
    /// number restored; a second consecutive call restores 0.
    pub fn restore_defaults(&mut self, tier: Tier) -> RegistryResult<usize> {
        let mut records = self.read_tier(tier)?;
        let existing: HashSet<TemplateId> =
            records.iter().map(|record| record.id.clone()).collect();
        let missing: Vec<Template> = self
            .seeds
            .for_tier(tier)
            .iter()
            .filter(|seed| !existing.contains(&seed.id))
            .cloned()
            .collect();
        if missing.is_empty() {
            return Ok(0);
        }

        let base = now_epoch_ms();
        let mut restored = Vec::with_capacity(missing.len() + records.len());
        for (index, seed) in missing.into_iter().enumerate() {
            let mut record = seed;
            record.tier = tier;
            let stamp = base - index as i64;
            record.created_at = stamp;
            record.updated_at = stamp;
            restored.push(record);
        }
        let count = restored.len();
        restored.append(&mut records);

        self.write_tier(tier, &restored)?;
        info!(
            "event=defaults_restored module=registry status=ok tier={tier} count={count}"
        );
        Ok(count)
    }

    /// Deletes user-tier records whose id collides with a built-in-tier id.
    ///
    /// Compensates for a historical migration defect that copied built-in
    /// templates into user storage. Returns the count removed.
    pub fn remove_shadowed_duplicates(&mut self) -> RegistryResult<usize> {
        let built_in_ids: HashSet<TemplateId> = self
            .read_tier(Tier::BuiltIn)?
            .into_iter()
            .map(|record| record.id)
            .collect();
        let mut user_records = self.read_tier(Tier::User)?;
        let before = user_records.len();
        user_records.retain(|record| !built_in_ids.contains(&record.id));
        let removed = before - user_records.len();
        if removed > 0 {
            self.write_tier(Tier::User, &user_records)?;
            info!(
                "event=duplicate_cleanup module=registry status=ok removed={removed}"
            );
        }
        Ok(removed)
    }

    /// Replaces one partition wholesale, re-tagging each record to `tier`.
    ///
    /// Registry-surface primitive used by import and schema migrations so
    /// neither touches partition keys directly. Returns the record count
    /// written.
    pub fn replace_tier(
        &mut self,
        tier: Tier,
        records: Vec<Template>,
    ) -> RegistryResult<usize> {
        let mut retagged = records;
        for record in &mut retagged {
            record.tier = tier;
        }
        self.write_tier(tier, &retagged)?;
        Ok(retagged.len())
    }

    /// Session-start orchestration: duplicate cleanup, then default
    /// restoration for the seeded tiers, then the merged read.
    ///
    /// Intended to run once per application session; repeating it is safe but
    /// wasteful.
    pub fn initialize(&mut self) -> RegistryResult<Vec<Template>> {
        let removed = self.remove_shadowed_duplicates()?;
        let built_in = self.restore_defaults(Tier::BuiltIn)?;
        let organization = self.restore_defaults(Tier::Organization)?;
        info!(
            "event=registry_init module=registry status=ok removed_duplicates={removed} restored_built_in={built_in} restored_organization={organization}"
        );
        self.list_all()
    }

    /// Unconditionally empties all three partitions. Irreversible; used only
    /// by explicit replace-everything import flows.
    pub fn clear_all(&mut self) -> RegistryResult<()> {
        for tier in Tier::PRIORITY {
            self.write_tier(tier, &[])?;
        }
        warn!("event=registry_clear module=registry status=ok");
        Ok(())
    }
}
