//! Portable backup document: the literal interchange format users download
//! and re-upload.
//!
//! # Responsibility
//! - Define the stable wire shape (camelCase, tier-keyed buckets, counts).
//! - Decode and validate candidate documents defensively; they may originate
//!   from a different, possibly older, version of the host application.
//!
//! # Invariants
//! - `counts` must match the actual array lengths.
//! - A document failing structural validation is rejected wholesale, never
//!   partially accepted.

use crate::model::template::{Template, Tier};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Per-tier template arrays. All three keys are required; each array may be
/// empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierBuckets {
    #[serde(rename = "built-in")]
    pub built_in: Vec<Template>,
    pub organization: Vec<Template>,
    pub user: Vec<Template>,
}

impl TierBuckets {
    pub fn for_tier(&self, tier: Tier) -> &[Template] {
        match tier {
            Tier::BuiltIn => &self.built_in,
            Tier::Organization => &self.organization,
            Tier::User => &self.user,
        }
    }

    /// Counts computed from the actual array lengths.
    pub fn counts(&self) -> BackupCounts {
        BackupCounts {
            built_in: self.built_in.len(),
            organization: self.organization.len(),
            user: self.user.len(),
            total: self.built_in.len() + self.organization.len() + self.user.len(),
        }
    }
}

/// Declared record counts, per tier plus total.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupCounts {
    #[serde(rename = "built-in")]
    pub built_in: usize,
    pub organization: usize,
    pub user: usize,
    pub total: usize,
}

/// Portable snapshot of the registry's full state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupDocument {
    /// RFC 3339 export timestamp.
    pub exported_at: String,
    pub app_version: String,
    /// Migration generation of the exporting build.
    pub schema_version: u32,
    pub templates_by_tier: TierBuckets,
    pub counts: BackupCounts,
}

/// Structural validation failure for a decoded document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupValidationError {
    /// A declared count disagrees with the actual array length.
    CountMismatch {
        field: &'static str,
        declared: usize,
        actual: usize,
    },
}

impl Display for BackupValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CountMismatch {
                field,
                declared,
                actual,
            } => write!(
                f,
                "declared count for `{field}` is {declared} but the document holds {actual} records"
            ),
        }
    }
}

impl Error for BackupValidationError {}

/// Parse failure: either the text is not a structurally complete document or
/// its declared counts are inconsistent.
#[derive(Debug)]
pub enum BackupParseError {
    Malformed(serde_json::Error),
    Invalid(BackupValidationError),
}

impl Display for BackupParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Malformed(err) => write!(f, "backup document is malformed: {err}"),
            Self::Invalid(err) => write!(f, "backup document is invalid: {err}"),
        }
    }
}

impl Error for BackupParseError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Malformed(err) => Some(err),
            Self::Invalid(err) => Some(err),
        }
    }
}

impl BackupDocument {
    /// Checks declared counts against actual array lengths.
    ///
    /// Presence of the structural fields is enforced by decoding; this is the
    /// remaining cross-field consistency check.
    pub fn validate(&self) -> Result<(), BackupValidationError> {
        let actual = self.templates_by_tier.counts();
        let checks = [
            ("built-in", self.counts.built_in, actual.built_in),
            ("organization", self.counts.organization, actual.organization),
            ("user", self.counts.user, actual.user),
            ("total", self.counts.total, actual.total),
        ];
        for (field, declared, found) in checks {
            if declared != found {
                return Err(BackupValidationError::CountMismatch {
                    field,
                    declared,
                    actual: found,
                });
            }
        }
        Ok(())
    }

    /// Decodes and validates one candidate document. Never panics; callers
    /// surface the error as a user-facing message.
    pub fn parse(text: &str) -> Result<Self, BackupParseError> {
        let document: Self = serde_json::from_str(text).map_err(BackupParseError::Malformed)?;
        document.validate().map_err(BackupParseError::Invalid)?;
        Ok(document)
    }

    /// Serializes the document for download.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::{BackupDocument, BackupParseError, BackupValidationError, TierBuckets};
    use crate::model::template::{Template, Tier};
    use serde_json::json;

    fn document_with(user: Vec<Template>) -> BackupDocument {
        let buckets = TierBuckets {
            built_in: Vec::new(),
            organization: Vec::new(),
            user,
        };
        let counts = buckets.counts();
        BackupDocument {
            exported_at: "2026-08-07T00:00:00Z".to_string(),
            app_version: "0.1.0".to_string(),
            schema_version: 1,
            templates_by_tier: buckets,
            counts,
        }
    }

    #[test]
    fn parse_roundtrips_a_valid_document() {
        let template = Template::with_id("t-1", "Welcome", "email", json!("hi"), Tier::User);
        let document = document_with(vec![template]);
        let text = document.to_json().unwrap();

        let parsed = BackupDocument::parse(&text).unwrap();
        assert_eq!(parsed, document);
    }

    #[test]
    fn parse_rejects_document_missing_counts() {
        let document = document_with(Vec::new());
        let mut value = serde_json::to_value(&document).unwrap();
        value.as_object_mut().unwrap().remove("counts");

        let err = BackupDocument::parse(&value.to_string()).unwrap_err();
        assert!(matches!(err, BackupParseError::Malformed(_)));
    }

    #[test]
    fn parse_rejects_document_missing_a_tier_array() {
        let document = document_with(Vec::new());
        let mut value = serde_json::to_value(&document).unwrap();
        value["templatesByTier"]
            .as_object_mut()
            .unwrap()
            .remove("organization");

        let err = BackupDocument::parse(&value.to_string()).unwrap_err();
        assert!(matches!(err, BackupParseError::Malformed(_)));
    }

    #[test]
    fn validate_rejects_count_mismatch() {
        let template = Template::with_id("t-1", "Welcome", "email", json!("hi"), Tier::User);
        let mut document = document_with(vec![template]);
        document.counts.user = 5;

        assert!(matches!(
            document.validate(),
            Err(BackupValidationError::CountMismatch {
                field: "user",
                declared: 5,
                actual: 1,
            })
        ));
    }
}
