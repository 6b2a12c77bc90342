//! Canonical domain model for message templates.
//!
//! # Responsibility
//! - Define the template record shared by every storage tier.
//! - Own tier semantics and record-level validation.
//!
//! # Invariants
//! - Every record is identified by an opaque string `TemplateId`.
//! - `version` is a logical clock: positive, advanced only by the registry.

pub mod template;
