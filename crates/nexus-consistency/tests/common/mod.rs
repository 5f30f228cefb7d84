//! Shared fixtures for the integration tests

#![allow(dead_code)]

use nexus_consistency::{CheckConfig, CheckSummary, CollectingReport, ConsistencyError, FullCheck};
use nexus_record::testing::{Owner, StoreBuilder, Value};
use nexus_record::StoreSchemaRuleLoader;
use std::sync::{Arc, Once};

static TRACING: Once = Once::new();

/// Route checker logs to the test output (`RUST_LOG=debug cargo test`)
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Ids of the records in [`social_graph`]
#[derive(Debug, Clone, Copy)]
pub struct Social {
    pub alice: u64,
    pub bob: u64,
    pub carol: u64,
    /// Dense node with grouped chains
    pub hub: u64,
    pub knows: u32,
    pub follows: u32,
    pub person: u32,
    pub name: u32,
}

/// A small but complete, internally consistent store
pub fn social_graph() -> (StoreBuilder, Social) {
    let mut builder = StoreBuilder::new();
    let person = builder.label("Person");
    let extra: Vec<u32> = (0..20).map(|i| builder.label(&format!("Tag{i}"))).collect();
    let name = builder.property_key("name");
    let bio = builder.property_key("bio");
    let scores = builder.property_key("scores");
    let age = builder.property_key("age");
    let knows = builder.relationship_type("KNOWS");
    let follows = builder.relationship_type("FOLLOWS");
    let likes = builder.relationship_type("LIKES");

    let alice = builder.create_node();
    let bob = builder.create_node();
    let carol = builder.create_node();
    let hub = builder.create_dense_node();

    builder.set_labels(alice, &[person]);
    builder.set_labels(bob, &[person]);
    let mut many = extra.clone();
    many.push(person);
    builder.set_labels(carol, &many);

    builder.set_properties(
        Owner::Node(alice),
        &[
            (name, Value::from("Alice")),
            (bio, Value::String("a".repeat(300))),
            (age, Value::Int(34)),
        ],
    );
    builder.set_properties(
        Owner::Node(bob),
        &[(name, Value::from("Bob")), (scores, Value::LongArray(vec![3, 1, 4, 1, 5, 9, 2, 6]))],
    );
    builder.set_properties(Owner::NeoStore, &[(age, Value::from(1i64))]);

    let friendship = builder.create_relationship(alice, bob, knows);
    builder.set_properties(Owner::Relationship(friendship), &[(age, Value::from(true))]);
    builder.create_relationship(bob, carol, knows);
    builder.create_relationship(carol, alice, follows);
    builder.create_relationship(carol, carol, likes);
    for node in [alice, bob, carol] {
        builder.create_relationship(node, hub, follows);
    }
    builder.create_relationship(hub, alice, knows);
    builder.create_relationship(hub, hub, likes);

    builder.create_index(person, age);
    builder.create_uniqueness_constraint(person, name);
    builder.create_relationship_property_existence(knows, age);

    let social = Social {
        alice,
        bob,
        carol,
        hub,
        knows,
        follows,
        person,
        name,
    };
    (builder, social)
}

pub fn full_check(
    builder: &StoreBuilder,
    config: CheckConfig,
) -> Result<(CollectingReport, CheckSummary), ConsistencyError> {
    init_tracing();
    let stores = builder.access();
    let loader = Arc::new(StoreSchemaRuleLoader::new(stores.schema.clone()));
    let report = CollectingReport::new();
    let summary = FullCheck::new(config).execute(&stores, loader, &report)?;
    Ok((report, summary))
}
