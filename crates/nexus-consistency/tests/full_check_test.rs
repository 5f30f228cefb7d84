//! Integration tests for the full store check
//!
//! Each test corrupts an otherwise consistent store in one place and checks
//! that the finding, and only the finding, comes out in both modes.

mod common;

use common::{full_check, social_graph};
use nexus_consistency::{
    CheckConfig, ConsistencyError, Inconsistency, NodeViolation, OwnershipConfig, RecordKind,
};
use nexus_record::testing::{Owner, StoreBuilder, Value};
use nexus_record::{DynamicStoreKind, NONE};

fn both_modes() -> [CheckConfig; 2] {
    [
        CheckConfig::sequential(),
        CheckConfig {
            worker_threads: 4,
            batch_size: 2,
            ..CheckConfig::multi_pass()
        },
    ]
}

#[test]
fn test_consistent_store_has_no_findings() -> Result<(), ConsistencyError> {
    let (builder, _) = social_graph();
    for config in both_modes() {
        let (report, summary) = full_check(&builder, config)?;
        assert!(report.is_empty(), "unexpected findings: {:?}", report.inconsistencies());
        assert!(summary.is_consistent());
        assert_eq!(summary.schema_rules, 4);
        assert!(summary.records > 0);
    }
    Ok(())
}

#[test]
fn test_single_broken_back_reference() -> Result<(), ConsistencyError> {
    let mut builder = StoreBuilder::new();
    let knows = builder.relationship_type("KNOWS");
    let a = builder.create_node();
    let b = builder.create_node();
    let older = builder.create_relationship(a, b, knows);
    let newer = builder.create_relationship(a, b, knows);
    builder
        .stores()
        .relationships
        .update(older, |r| r.first_prev_rel = NONE);

    for config in both_modes() {
        let (report, _) = full_check(&builder, config)?;
        assert_eq!(report.len(), 1, "{:?}", report.inconsistencies());
        let finding = &report.inconsistencies()[0];
        assert_eq!(finding.record_kind(), RecordKind::Relationship);
        assert_eq!(finding.record_id(), newer);
        assert_eq!(finding.violation_name(), "source_next_does_not_reference_back");
    }
    Ok(())
}

#[test]
fn test_unsorted_duplicate_labels() -> Result<(), ConsistencyError> {
    let mut builder = StoreBuilder::new();
    for i in 0..6 {
        builder.label(&format!("L{i}"));
    }
    let node = builder.create_node();
    builder.set_dynamic_labels(node, &[5, 3, 3]);

    let (report, _) = full_check(&builder, CheckConfig::sequential())?;
    let findings = report.inconsistencies();
    assert_eq!(findings.len(), 2, "{findings:?}");
    assert!(matches!(
        &findings[0],
        Inconsistency::Node {
            violation: NodeViolation::LabelsOutOfOrder {
                largest: 5,
                smallest: 3
            },
            ..
        }
    ));
    assert!(matches!(
        &findings[1],
        Inconsistency::Node {
            violation: NodeViolation::LabelDuplicate(3),
            ..
        }
    ));
    Ok(())
}

#[test]
fn test_self_loop_checks_both_roles() -> Result<(), ConsistencyError> {
    let mut builder = StoreBuilder::new();
    let knows = builder.relationship_type("KNOWS");
    let node = builder.create_node();
    let rel = builder.create_relationship(node, node, knows);
    builder.stores().nodes.update(node, |n| n.next_rel = NONE);

    for config in both_modes() {
        let (report, _) = full_check(&builder, config)?;
        assert_eq!(report.len(), 2, "{:?}", report.inconsistencies());
        assert_eq!(report.count("source_node_does_not_reference_back"), 1);
        assert_eq!(report.count("target_node_does_not_reference_back"), 1);
        assert!(report.inconsistencies().iter().all(|i| i.record_id() == rel));
    }
    Ok(())
}

#[test]
fn test_shared_property_chain_is_reported_once() -> Result<(), ConsistencyError> {
    let (builder, social) = social_graph();
    let head = builder.node(social.alice).next_prop;
    builder
        .stores()
        .nodes
        .update(social.carol, |n| n.next_prop = head);

    for config in both_modes() {
        let (report, _) = full_check(&builder, config)?;
        assert_eq!(report.len(), 1, "{:?}", report.inconsistencies());
        let finding = &report.inconsistencies()[0];
        assert_eq!(finding.record_id(), social.carol);
        assert_eq!(finding.violation_name(), "property_chain_multiple_owners");
    }
    Ok(())
}

#[test]
fn test_orphans_are_swept() -> Result<(), ConsistencyError> {
    let (mut builder, _) = social_graph();
    let key = builder.property_key("nickname");
    let spare = builder.create_node();
    let lost = builder.set_properties(Owner::Node(spare), &[(key, Value::Int(7))]);
    builder.stores().nodes.update(spare, |n| n.next_prop = NONE);
    let stray = builder.write_chain(DynamicStoreKind::String, b"never referenced");

    for config in both_modes() {
        let (report, summary) = full_check(&builder, config)?;
        assert_eq!(summary.orphans, 2);
        assert_eq!(report.len(), 2, "{:?}", report.inconsistencies());
        let orphans: Vec<_> = report
            .inconsistencies()
            .iter()
            .map(|i| (i.record_kind(), i.record_id()))
            .collect();
        assert!(orphans.contains(&(RecordKind::Property, lost)));
        assert!(orphans.contains(&(RecordKind::Dynamic(DynamicStoreKind::String), stray)));
    }
    Ok(())
}

#[test]
fn test_disabled_ownership_skips_the_sweep() -> Result<(), ConsistencyError> {
    let mut builder = StoreBuilder::new();
    builder.write_chain(DynamicStoreKind::Array, &[1, 2, 3]);
    let config = CheckConfig {
        ownership: OwnershipConfig::disabled(),
        ..CheckConfig::default()
    };
    let (report, summary) = full_check(&builder, config)?;
    assert!(report.is_empty());
    assert_eq!(summary.orphans, 0);
    Ok(())
}

#[test]
fn test_dynamic_store_corruption() -> Result<(), ConsistencyError> {
    let (builder, social) = social_graph();
    // Alice's bio is the only string spanning several blocks
    let chain = builder.property(builder.node(social.alice).next_prop);
    let bio = chain
        .value_chains()
        .into_iter()
        .filter(|(kind, _)| *kind == DynamicStoreKind::String)
        .map(|(_, head)| head)
        .find(|head| builder.dynamic(DynamicStoreKind::String, *head).next_block != NONE)
        .expect("alice has a long bio");
    let second = builder.dynamic(DynamicStoreKind::String, bio).next_block;
    builder
        .stores()
        .strings
        .update(second, |r| r.length = 0);

    for config in both_modes() {
        let (report, _) = full_check(&builder, config)?;
        assert_eq!(report.count("empty_block"), 1, "{:?}", report.inconsistencies());
        assert_eq!(report.count("empty_next_block"), 1);
    }
    Ok(())
}

#[test]
fn test_schema_obligation_mismatch() -> Result<(), ConsistencyError> {
    use nexus_record::SchemaRule;

    let mut builder = StoreBuilder::new();
    let person = builder.label("Person");
    let name = builder.property_key("name");
    let email = builder.property_key("email");
    let index = builder.reserve_schema_id();
    let constraint = builder.reserve_schema_id();
    let plain = builder.create_index(person, email);
    builder.write_schema_rule(&SchemaRule::Index {
        id: index,
        label: person,
        property_key: name,
        owning_constraint: Some(constraint),
    });
    builder.write_schema_rule(&SchemaRule::UniquenessConstraint {
        id: constraint,
        label: person,
        property_key: name,
        owned_index: plain,
    });

    let (report, summary) = full_check(&builder, CheckConfig::default())?;
    assert_eq!(summary.schema_rules, 3);
    assert_eq!(report.count("uniqueness_constraint_not_referencing_back"), 1);
    assert_eq!(report.count("missing_obligation"), 1);
    let mismatch = report
        .inconsistencies()
        .into_iter()
        .find(|i| i.violation_name() == "uniqueness_constraint_not_referencing_back")
        .expect("mismatch reported");
    assert_eq!(mismatch.record_kind(), RecordKind::Schema);
    assert_eq!(mismatch.record_id(), constraint);
    Ok(())
}

#[test]
fn test_malformed_schema_rule_is_reported_once() -> Result<(), ConsistencyError> {
    let mut builder = StoreBuilder::new();
    let id = builder.write_raw_schema_record(&[0xff; 6]);
    let (report, _) = full_check(&builder, CheckConfig::default())?;
    assert_eq!(report.count("malformed_schema_rule"), 1);
    assert_eq!(report.inconsistencies()[0].record_id(), id);
    Ok(())
}

#[test]
fn test_graph_only_check() -> Result<(), ConsistencyError> {
    let (builder, social) = social_graph();
    let name_chain = builder.token(nexus_record::TokenKind::Label, u64::from(social.person)).name_id;
    builder
        .stores()
        .label_names
        .update(name_chain, |r| r.in_use = false);

    let config = CheckConfig {
        check_dynamic: false,
        check_schema: false,
        ownership: OwnershipConfig {
            property_chains: true,
            dynamic_chains: Vec::new(),
        },
        ..CheckConfig::default()
    };
    let (report, _) = full_check(&builder, config)?;
    assert!(report.is_empty(), "{:?}", report.inconsistencies());

    let (report, _) = full_check(&builder, CheckConfig::default())?;
    assert_eq!(report.count("name_block_not_in_use"), 1);
    Ok(())
}
