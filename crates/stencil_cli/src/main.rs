//! CLI smoke entry point.
//!
//! # Responsibility
//! - Provide a minimal executable to verify `stencil_core` linkage.
//! - Keep output deterministic for quick local sanity checks.

use stencil_core::{MemoryStore, SeedCatalog, TemplateRegistry};

fn main() {
    println!("stencil_core version={}", stencil_core::core_version());

    let mut registry = TemplateRegistry::new(MemoryStore::new(), SeedCatalog::empty());
    match registry.initialize() {
        Ok(templates) => println!("stencil_core templates={}", templates.len()),
        Err(err) => eprintln!("stencil_core init error={err}"),
    }
}
