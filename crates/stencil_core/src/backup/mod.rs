//! Backup export and import reconciliation.
//!
//! # Responsibility
//! - Serialize the registry's full state into the portable backup document.
//! - Reconcile an imported document against live state via the replace and
//!   merge strategies.
//!
//! # Invariants
//! - All mutation goes through the registry surface, never the store.
//! - Import never raises: every outcome, including internal failures, is
//!   reported through `ImportReport`. (Registry CRUD raises; the asymmetry
//!   is deliberate.)
//! - After either strategy completes, missing built-in defaults are healed.

use crate::model::template::{now_epoch_ms, Template, Tier};
use crate::registry::{RegistryResult, TemplateRegistry};
use crate::store::KeyValueStore;
use log::{error, info};

pub mod document;

pub use document::{
    BackupCounts, BackupDocument, BackupParseError, BackupValidationError, TierBuckets,
};

/// How an imported document is reconciled against live state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportStrategy {
    /// Wipe the destination partitions and write the backup's arrays
    /// verbatim. With `preserve_user_tier`, the live user partition is
    /// captured before the wipe and restored unchanged afterward; the
    /// backup's own user array is ignored entirely.
    Replace { preserve_user_tier: bool },
    /// Reconcile tier by tier, resolving id conflicts by version comparison.
    Merge,
}

/// Outcome of one import, successful or not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportReport {
    pub success: bool,
    /// Human-readable summary for the UI.
    pub message: String,
    /// Records taken from the backup, per tier plus total.
    pub imported: BackupCounts,
    /// Id collisions encountered during merge, counted regardless of which
    /// side won.
    pub conflicts: usize,
    pub errors: Vec<String>,
}

impl ImportReport {
    fn failure(message: impl Into<String>, errors: Vec<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            imported: BackupCounts::default(),
            conflicts: 0,
            errors,
        }
    }
}

struct TierMergeOutcome {
    records: Vec<Template>,
    imported: usize,
    conflicts: usize,
}

/// Reconciles one tier's incoming records against its existing ones.
///
/// Existing records seed the working set, so records absent from the backup
/// are preserved. Conflicts resolve by version: strictly higher incoming
/// wins outright; equal versions favor the incoming record (import intent
/// takes precedence) with `updated_at` refreshed; strictly lower incoming
/// loses.
fn merge_tier(
    existing: Vec<Template>,
    incoming: &[Template],
    tier: Tier,
    now: i64,
) -> TierMergeOutcome {
    let mut records = existing;
    let mut positions: std::collections::HashMap<String, usize> = records
        .iter()
        .enumerate()
        .map(|(position, record)| (record.id.clone(), position))
        .collect();
    let mut imported = 0usize;
    let mut conflicts = 0usize;

    for candidate in incoming {
        let mut candidate = candidate.clone();
        candidate.tier = tier;
        match positions.get(&candidate.id).copied() {
            None => {
                positions.insert(candidate.id.clone(), records.len());
                records.push(candidate);
                imported += 1;
            }
            Some(position) => {
                conflicts += 1;
                let existing_version = records[position].version;
                if candidate.version > existing_version {
                    records[position] = candidate;
                    imported += 1;
                } else if candidate.version == existing_version {
                    candidate.updated_at = now;
                    records[position] = candidate;
                    imported += 1;
                }
            }
        }
    }

    TierMergeOutcome {
        records,
        imported,
        conflicts,
    }
}

/// Export/import facade over one registry.
pub struct BackupService<'reg, S: KeyValueStore> {
    registry: &'reg mut TemplateRegistry<S>,
}

impl<'reg, S: KeyValueStore> BackupService<'reg, S> {
    pub fn new(registry: &'reg mut TemplateRegistry<S>) -> Self {
        Self { registry }
    }

    /// Assembles the current three-partition state into a portable document.
    /// Pure read; no mutation.
    pub fn export_snapshot(&self) -> RegistryResult<BackupDocument> {
        let buckets = TierBuckets {
            built_in: self.registry.list_tier(Tier::BuiltIn)?,
            organization: self.registry.list_tier(Tier::Organization)?,
            user: self.registry.list_tier(Tier::User)?,
        };
        let counts = buckets.counts();
        Ok(BackupDocument {
            exported_at: jiff::Timestamp::now().to_string(),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            schema_version: crate::migrate::latest_version(),
            templates_by_tier: buckets,
            counts,
        })
    }

    /// Reconciles `document` against live state using `strategy`.
    ///
    /// Always returns a report. When an internal failure interrupts the
    /// procedure mid-way the registry may be left partially mutated; there is
    /// no rollback, and the failure is carried in the report's error list.
    pub fn import_snapshot(
        &mut self,
        document: &BackupDocument,
        strategy: ImportStrategy,
    ) -> ImportReport {
        if let Err(err) = document.validate() {
            return ImportReport::failure(
                "Backup document failed validation; nothing was imported.",
                vec![err.to_string()],
            );
        }

        match self.apply_strategy(document, strategy) {
            Ok(report) => {
                info!(
                    "event=backup_import module=backup status=ok imported={} conflicts={}",
                    report.imported.total, report.conflicts
                );
                report
            }
            Err(err) => {
                error!("event=backup_import module=backup status=error error={err}");
                ImportReport::failure(
                    "Import failed; the registry may be partially updated.",
                    vec![err.to_string()],
                )
            }
        }
    }

    fn apply_strategy(
        &mut self,
        document: &BackupDocument,
        strategy: ImportStrategy,
    ) -> RegistryResult<ImportReport> {
        let (imported, conflicts) = match strategy {
            ImportStrategy::Replace { preserve_user_tier } => {
                (self.apply_replace(document, preserve_user_tier)?, 0)
            }
            ImportStrategy::Merge => self.apply_merge(document)?,
        };

        // Heal any built-in templates the backup might have omitted.
        let healed = self.registry.restore_defaults(Tier::BuiltIn)?;
        if healed > 0 {
            info!("event=backup_import_heal module=backup status=ok restored={healed}");
        }

        Ok(ImportReport {
            success: true,
            message: format!(
                "Imported {} templates ({} conflicts resolved).",
                imported.total, conflicts
            ),
            imported,
            conflicts,
            errors: Vec::new(),
        })
    }

    fn apply_replace(
        &mut self,
        document: &BackupDocument,
        preserve_user_tier: bool,
    ) -> RegistryResult<BackupCounts> {
        // Capture the live user partition before anything is wiped.
        let preserved_user = if preserve_user_tier {
            Some(self.registry.list_tier(Tier::User)?)
        } else {
            None
        };

        let buckets = &document.templates_by_tier;
        let imported = BackupCounts {
            built_in: buckets.built_in.len(),
            organization: buckets.organization.len(),
            user: if preserve_user_tier {
                0
            } else {
                buckets.user.len()
            },
            total: 0,
        };
        let imported = BackupCounts {
            total: imported.built_in + imported.organization + imported.user,
            ..imported
        };

        // Stage every tier's final record set before the first partition
        // write; only store-level write failures can interrupt from here on.
        let staged: Vec<(Tier, Vec<Template>)> = vec![
            (Tier::BuiltIn, buckets.built_in.clone()),
            (Tier::Organization, buckets.organization.clone()),
            (
                Tier::User,
                preserved_user.unwrap_or_else(|| buckets.user.clone()),
            ),
        ];
        for (tier, records) in staged {
            self.registry.replace_tier(tier, records)?;
        }
        Ok(imported)
    }

    fn apply_merge(&mut self, document: &BackupDocument) -> RegistryResult<(BackupCounts, usize)> {
        let now = now_epoch_ms();
        let mut staged: Vec<(Tier, Vec<Template>)> = Vec::with_capacity(3);
        let mut per_tier = [0usize; 3];
        let mut conflicts = 0usize;

        for (index, tier) in Tier::PRIORITY.into_iter().enumerate() {
            let existing = self.registry.list_tier(tier)?;
            let incoming = document.templates_by_tier.for_tier(tier);
            let outcome = merge_tier(existing, incoming, tier, now);
            per_tier[index] = outcome.imported;
            conflicts += outcome.conflicts;
            staged.push((tier, outcome.records));
        }

        for (tier, records) in staged {
            self.registry.replace_tier(tier, records)?;
        }

        let imported = BackupCounts {
            built_in: per_tier[0],
            organization: per_tier[1],
            user: per_tier[2],
            total: per_tier.iter().sum(),
        };
        Ok((imported, conflicts))
    }
}
