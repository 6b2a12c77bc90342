//! Static seed catalog supplied by the host application.
//!
//! # Responsibility
//! - Hold the read-only built-in/organization template lists used to heal
//!   missing records.
//!
//! # Invariants
//! - The registry never mutates catalog contents.
//! - The user tier has no seeds by definition.

use crate::model::template::{Template, Tier};

/// Read-only ground truth for default templates.
#[derive(Debug, Clone, Default)]
pub struct SeedCatalog {
    built_in: Vec<Template>,
    organization: Vec<Template>,
}

impl SeedCatalog {
    pub fn new(built_in: Vec<Template>, organization: Vec<Template>) -> Self {
        Self {
            built_in,
            organization,
        }
    }

    /// Catalog with no seeds; useful for tests and headless tooling.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Seed records for one tier, in catalog order. The user tier is always
    /// empty.
    pub fn for_tier(&self, tier: Tier) -> &[Template] {
        match tier {
            Tier::BuiltIn => &self.built_in,
            Tier::Organization => &self.organization,
            Tier::User => &[],
        }
    }

    /// Whether `id` names a built-in seed record.
    ///
    /// Used by the legacy migration to keep built-in templates out of user
    /// storage.
    pub fn is_built_in_seed(&self, id: &str) -> bool {
        self.built_in.iter().any(|seed| seed.id == id)
    }
}
