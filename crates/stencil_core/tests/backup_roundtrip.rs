use serde_json::json;
use stencil_core::{
    BackupDocument, BackupService, ImportStrategy, MemoryStore, SeedCatalog, Template,
    TemplateRegistry, Tier, TierBuckets,
};

fn seeded_registry() -> TemplateRegistry<MemoryStore> {
    let seeds = SeedCatalog::new(
        vec![Template::with_id(
            "seed-welcome",
            "Welcome",
            "email",
            json!({"text": "hi"}),
            Tier::BuiltIn,
        )],
        Vec::new(),
    );
    TemplateRegistry::new(MemoryStore::new(), seeds)
}

fn template(id: &str, tier: Tier, version: u32) -> Template {
    let mut record = Template::with_id(
        id,
        format!("Template {id}"),
        "email",
        json!({"text": id}),
        tier,
    );
    record.version = version;
    record.created_at = 1_700_000_000_000;
    record.updated_at = 1_700_000_000_000;
    record
}

fn document_from(buckets: TierBuckets) -> BackupDocument {
    let counts = buckets.counts();
    BackupDocument {
        exported_at: "2026-08-07T00:00:00Z".to_string(),
        app_version: "0.1.0".to_string(),
        schema_version: 1,
        templates_by_tier: buckets,
        counts,
    }
}

fn user_only_document(records: Vec<Template>) -> BackupDocument {
    document_from(TierBuckets {
        built_in: Vec::new(),
        organization: Vec::new(),
        user: records,
    })
}

#[test]
fn export_snapshot_counts_match_arrays() {
    let mut registry = seeded_registry();
    registry.initialize().unwrap();
    registry.create(&template("mine", Tier::User, 1)).unwrap();

    let service = BackupService::new(&mut registry);
    let document = service.export_snapshot().unwrap();

    assert_eq!(document.counts.built_in, 1);
    assert_eq!(document.counts.user, 1);
    assert_eq!(document.counts.total, 2);
    assert!(document.validate().is_ok());
    assert!(!document.exported_at.is_empty());
}

#[test]
fn export_then_merge_import_is_a_noop() {
    let mut registry = seeded_registry();
    registry.initialize().unwrap();
    registry.create(&template("a", Tier::User, 1)).unwrap();
    registry.create(&template("b", Tier::User, 3)).unwrap();

    let before: Vec<(String, u32, String)> = sorted_summary(&registry);

    let mut service = BackupService::new(&mut registry);
    let document = service.export_snapshot().unwrap();
    let report = service.import_snapshot(&document, ImportStrategy::Merge);
    assert!(report.success);

    let after = sorted_summary(&registry);
    assert_eq!(before, after);
}

fn sorted_summary(registry: &TemplateRegistry<MemoryStore>) -> Vec<(String, u32, String)> {
    let mut summary: Vec<_> = registry
        .list_all()
        .unwrap()
        .into_iter()
        .map(|record| (record.id, record.version, record.name))
        .collect();
    summary.sort();
    summary
}

#[test]
fn merge_strictly_higher_incoming_version_wins() {
    let mut registry = seeded_registry();
    registry.create(&template("a", Tier::User, 1)).unwrap();

    let mut incoming = template("a", Tier::User, 2);
    incoming.name = "Incoming".to_string();
    let document = user_only_document(vec![incoming]);

    let mut service = BackupService::new(&mut registry);
    let report = service.import_snapshot(&document, ImportStrategy::Merge);

    assert!(report.success);
    assert_eq!(report.conflicts, 1);
    assert_eq!(report.imported.user, 1);

    let stored = registry.get("a").unwrap().unwrap();
    assert_eq!(stored.version, 2);
    assert_eq!(stored.name, "Incoming");
}

#[test]
fn merge_strictly_lower_incoming_version_keeps_existing() {
    let mut registry = seeded_registry();
    registry.create(&template("a", Tier::User, 2)).unwrap();

    let document = user_only_document(vec![template("a", Tier::User, 1)]);

    let mut service = BackupService::new(&mut registry);
    let report = service.import_snapshot(&document, ImportStrategy::Merge);

    assert!(report.success);
    assert_eq!(report.conflicts, 1);
    assert_eq!(report.imported.user, 0);

    let stored = registry.get("a").unwrap().unwrap();
    assert_eq!(stored.version, 2);
    assert_eq!(stored.name, "Template a");
}

#[test]
fn merge_equal_version_favors_incoming_and_advances_updated_at() {
    let mut registry = seeded_registry();
    registry.create(&template("a", Tier::User, 1)).unwrap();

    let mut incoming = template("a", Tier::User, 1);
    incoming.name = "Incoming".to_string();
    let document = user_only_document(vec![incoming]);

    let mut service = BackupService::new(&mut registry);
    let report = service.import_snapshot(&document, ImportStrategy::Merge);

    assert!(report.success);
    assert_eq!(report.conflicts, 1);

    let stored = registry.get("a").unwrap().unwrap();
    assert_eq!(stored.name, "Incoming");
    assert!(stored.updated_at > 1_700_000_000_000);
}

#[test]
fn merge_preserves_existing_records_missing_from_backup() {
    let mut registry = seeded_registry();
    registry.create(&template("kept", Tier::User, 1)).unwrap();

    let document = user_only_document(vec![template("new", Tier::User, 1)]);

    let mut service = BackupService::new(&mut registry);
    let report = service.import_snapshot(&document, ImportStrategy::Merge);
    assert!(report.success);
    assert_eq!(report.conflicts, 0);

    let user = registry.list_tier(Tier::User).unwrap();
    let ids: Vec<_> = user.iter().map(|record| record.id.as_str()).collect();
    assert_eq!(ids, vec!["kept", "new"]);
}

#[test]
fn replace_preserve_user_tier_keeps_user_records_byte_for_byte() {
    let mut registry = seeded_registry();
    registry.create(&template("mine", Tier::User, 7)).unwrap();
    let before = serde_json::to_string(&registry.list_tier(Tier::User).unwrap()).unwrap();

    let document = document_from(TierBuckets {
        built_in: vec![template("seed-welcome", Tier::BuiltIn, 1)],
        organization: vec![template("org-1", Tier::Organization, 1)],
        // The backup's own user array must be ignored entirely.
        user: vec![template("from-backup", Tier::User, 1)],
    });

    let mut service = BackupService::new(&mut registry);
    let report = service.import_snapshot(
        &document,
        ImportStrategy::Replace {
            preserve_user_tier: true,
        },
    );

    assert!(report.success);
    assert_eq!(report.imported.user, 0);
    assert_eq!(report.imported.organization, 1);

    let after = serde_json::to_string(&registry.list_tier(Tier::User).unwrap()).unwrap();
    assert_eq!(before, after);
    assert!(registry.get("from-backup").unwrap().is_none());
}

#[test]
fn replace_overwrites_destination_tiers_and_retags_records() {
    let mut registry = seeded_registry();
    registry.create(&template("old-org", Tier::Organization, 1)).unwrap();
    registry.create(&template("old-user", Tier::User, 1)).unwrap();

    // Records in the organization bucket arrive mislabeled; replace re-tags.
    let document = document_from(TierBuckets {
        built_in: Vec::new(),
        organization: vec![template("new-org", Tier::User, 1)],
        user: Vec::new(),
    });

    let mut service = BackupService::new(&mut registry);
    let report = service.import_snapshot(
        &document,
        ImportStrategy::Replace {
            preserve_user_tier: false,
        },
    );
    assert!(report.success);

    let organization = registry.list_tier(Tier::Organization).unwrap();
    assert_eq!(organization.len(), 1);
    assert_eq!(organization[0].id, "new-org");
    assert_eq!(organization[0].tier, Tier::Organization);
    assert!(registry.list_tier(Tier::User).unwrap().is_empty());
}

#[test]
fn import_heals_missing_builtin_defaults() {
    let mut registry = seeded_registry();

    // Backup carries no built-in templates at all.
    let document = user_only_document(vec![template("mine", Tier::User, 1)]);

    let mut service = BackupService::new(&mut registry);
    let report = service.import_snapshot(
        &document,
        ImportStrategy::Replace {
            preserve_user_tier: false,
        },
    );
    assert!(report.success);

    let built_in = registry.list_tier(Tier::BuiltIn).unwrap();
    assert_eq!(built_in.len(), 1);
    assert_eq!(built_in[0].id, "seed-welcome");
}

#[test]
fn invalid_document_is_rejected_wholesale() {
    let mut registry = seeded_registry();
    registry.create(&template("kept", Tier::User, 1)).unwrap();
    let before = sorted_summary(&registry);

    let mut document = user_only_document(vec![template("new", Tier::User, 1)]);
    document.counts.total = 42;

    let mut service = BackupService::new(&mut registry);
    let report = service.import_snapshot(&document, ImportStrategy::Merge);

    assert!(!report.success);
    assert_eq!(report.imported.total, 0);
    assert!(!report.errors.is_empty());
    assert_eq!(sorted_summary(&registry), before);
}

#[test]
fn store_failure_is_reported_not_raised() {
    let store = MemoryStore::with_value_limit(16);
    let mut registry = TemplateRegistry::new(store, SeedCatalog::empty());

    let document = user_only_document(vec![template("too-big", Tier::User, 1)]);

    let mut service = BackupService::new(&mut registry);
    let report = service.import_snapshot(
        &document,
        ImportStrategy::Replace {
            preserve_user_tier: false,
        },
    );

    assert!(!report.success);
    assert!(report
        .errors
        .iter()
        .any(|error| error.contains("capacity exceeded")));
}
