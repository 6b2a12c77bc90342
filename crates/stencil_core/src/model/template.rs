//! Template domain model.
//!
//! # Responsibility
//! - Define the canonical record stored in all three tier partitions.
//! - Provide constructors and validation for write paths.
//!
//! # Invariants
//! - `id` is opaque and intended to be unique across the union of tiers.
//! - `version` starts at 1 and only the registry advances it.
//! - `body` is an opaque structured document; this layer never interprets it.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Opaque stable identifier for a template.
///
/// Kept as a type alias to make semantic intent explicit in signatures. Ids
/// originate outside this layer (imports, legacy data), so no structure is
/// assumed beyond non-emptiness.
pub type TemplateId = String;

/// Migration generation stamped onto records written by this build.
///
/// Must match `migrate::latest_version()`; a unit test in `migrate` keeps the
/// two in sync.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// Trust/ownership partition a template belongs to.
///
/// Doubles as the physical storage partition boundary. Collision resolution
/// on read follows the order of [`Tier::PRIORITY`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tier {
    /// Shipped with the application; healed from the seed catalog.
    #[serde(rename = "built-in")]
    BuiltIn,
    /// Provisioned by the user's organization.
    #[serde(rename = "organization")]
    Organization,
    /// Created locally by the user.
    #[serde(rename = "user")]
    User,
}

impl Tier {
    /// Tiers in collision-resolution order: built-in > organization > user.
    pub const PRIORITY: [Tier; 3] = [Tier::BuiltIn, Tier::Organization, Tier::User];

    /// Stable wire/storage label for this tier.
    pub fn as_str(self) -> &'static str {
        match self {
            Tier::BuiltIn => "built-in",
            Tier::Organization => "organization",
            Tier::User => "user",
        }
    }
}

impl Display for Tier {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Record-level validation failures rejected before persistence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateValidationError {
    /// `id` is empty or whitespace-only.
    EmptyId,
    /// `version` is 0; the logical clock starts at 1.
    ZeroVersion(TemplateId),
}

impl Display for TemplateValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyId => write!(f, "template id must not be empty"),
            Self::ZeroVersion(id) => write!(f, "template `{id}` has version 0; versions start at 1"),
        }
    }
}

impl Error for TemplateValidationError {}

/// Canonical reusable-message record.
///
/// Field names serialize in camelCase because the same shape travels in the
/// backup interchange document consumed by other versions of the host
/// application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    /// Opaque stable id, intended globally unique across all tiers.
    pub id: TemplateId,
    pub name: String,
    /// Delivery channel hint, e.g. `"email"` or `"sms"`.
    pub message_kind: String,
    /// Opaque rich-text document owned by the editor; stored verbatim.
    pub body: serde_json::Value,
    /// Ordered references into the external tag store.
    #[serde(default)]
    pub tag_ids: Vec<String>,
    /// Epoch milliseconds.
    pub created_at: i64,
    /// Epoch milliseconds. Advanced by the registry on every update.
    pub updated_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_starred: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_count: Option<u64>,
    /// Storage partition. Immutable outside cross-tier import.
    pub tier: Tier,
    /// Logical clock, starts at 1. Advanced only by `TemplateRegistry::update`.
    pub version: u32,
    /// Migration generation that produced/validated this record.
    pub schema_version: u32,
}

impl Template {
    /// Creates a new record with a generated id and current timestamps.
    ///
    /// # Invariants
    /// - `version` starts at 1.
    /// - `schema_version` is stamped with [`CURRENT_SCHEMA_VERSION`].
    pub fn new(
        name: impl Into<String>,
        message_kind: impl Into<String>,
        body: serde_json::Value,
        tier: Tier,
    ) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), name, message_kind, body, tier)
    }

    /// Creates a new record with a caller-provided id.
    ///
    /// Used by import/seed paths where identity already exists externally.
    pub fn with_id(
        id: impl Into<TemplateId>,
        name: impl Into<String>,
        message_kind: impl Into<String>,
        body: serde_json::Value,
        tier: Tier,
    ) -> Self {
        let now = now_epoch_ms();
        Self {
            id: id.into(),
            name: name.into(),
            message_kind: message_kind.into(),
            body,
            tag_ids: Vec::new(),
            created_at: now,
            updated_at: now,
            is_starred: None,
            last_used_at: None,
            use_count: None,
            tier,
            version: 1,
            schema_version: CURRENT_SCHEMA_VERSION,
        }
    }

    /// Validates invariants that must hold before any write.
    pub fn validate(&self) -> Result<(), TemplateValidationError> {
        if self.id.trim().is_empty() {
            return Err(TemplateValidationError::EmptyId);
        }
        if self.version == 0 {
            return Err(TemplateValidationError::ZeroVersion(self.id.clone()));
        }
        Ok(())
    }
}

/// Current wall-clock time in epoch milliseconds.
pub fn now_epoch_ms() -> i64 {
    jiff::Timestamp::now().as_millisecond()
}
