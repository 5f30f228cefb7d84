//! Integration tests for change-set checks and configuration loading

mod common;

use common::{init_tracing, social_graph};
use nexus_consistency::{
    ChangeSet, CheckConfig, CheckMode, CollectingReport, ConsistencyError, DirectRecordAccess,
    IncrementalCheck,
};
use nexus_record::{DynamicStoreKind, NONE, Record, StoreSchemaRuleLoader};
use std::io::Write;
use std::sync::Arc;

fn base(builder: &nexus_record::testing::StoreBuilder) -> DirectRecordAccess {
    let stores = builder.access();
    DirectRecordAccess::new(
        stores.clone(),
        Arc::new(StoreSchemaRuleLoader::new(stores.schema.clone())),
    )
}

#[test]
fn test_deleting_a_property_chain_head_alone() -> Result<(), ConsistencyError> {
    init_tracing();
    let (builder, social) = social_graph();
    let head = builder.node(social.bob).next_prop;
    let before = builder.property(head);
    let mut after = before.clone();
    after.in_use = false;

    let mut changes = ChangeSet::new();
    changes.change_property(before, after);

    let report = CollectingReport::new();
    let found = IncrementalCheck::new(&builder.access()).check_diff(&base(&builder), &changes, &report)?;
    // The values the head held are still in use but nothing refers to them
    assert_eq!(found, report.len());
    assert_eq!(report.count("value_unreferenced_but_not_deleted"), 2);
    Ok(())
}

#[test]
fn test_removing_node_properties_consistently() -> Result<(), ConsistencyError> {
    let (builder, social) = social_graph();
    let node_before = builder.node(social.bob);
    let mut node_after = node_before.clone();
    node_after.next_prop = NONE;

    let mut changes = ChangeSet::new();
    let property = builder.property(node_before.next_prop);
    for (kind, id) in property.value_chains() {
        let mut id = id;
        while id != NONE {
            let record = builder.dynamic(kind, id);
            let next = record.next_block;
            changes.change_dynamic(kind, record.clone(), nexus_record::DynamicRecord::not_in_use(id));
            id = next;
        }
    }
    changes.change_property(property.clone(), nexus_record::PropertyRecord::not_in_use(property.id));
    changes.change_node(node_before, node_after);

    let report = CollectingReport::new();
    let found = IncrementalCheck::new(&builder.access()).check_diff(&base(&builder), &changes, &report)?;
    assert_eq!(found, 0, "{:?}", report.inconsistencies());
    assert!(changes.dynamic.keys().any(|(kind, _)| *kind == DynamicStoreKind::Array));
    Ok(())
}

#[test]
fn test_config_file_round_trip() -> Result<(), ConsistencyError> {
    let mut file = tempfile::NamedTempFile::new()?;
    writeln!(
        file,
        r#"
mode = "multi_pass"
worker_threads = 2
batch_size = 64
check_schema = false

[ownership]
property_chains = true
dynamic_chains = ["string", "node_label"]
"#
    )?;

    let config = CheckConfig::load(file.path())?;
    assert_eq!(config.mode, CheckMode::MultiPass);
    assert_eq!(config.worker_threads, 2);
    assert_eq!(config.batch_size, 64);
    assert!(!config.check_schema);
    assert!(config.ownership.tracks(DynamicStoreKind::NodeLabel));
    assert!(!config.ownership.tracks(DynamicStoreKind::Array));

    let (builder, _) = social_graph();
    let (report, summary) = common::full_check(&builder, config)?;
    assert!(report.is_empty(), "{:?}", report.inconsistencies());
    assert_eq!(summary.schema_rules, 0);
    assert!(summary.reference_passes > 0);
    Ok(())
}

#[test]
fn test_missing_config_file() {
    let dir = tempfile::tempdir().expect("temp dir");
    let err = CheckConfig::load(dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, ConsistencyError::Io(_)));
}
