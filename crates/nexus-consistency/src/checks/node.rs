//! Node record checks
//!
//! A sparse node points at the first relationship of its chain, a dense
//! node at its first relationship group. Both own a property chain and a
//! label field that is either inline or the head of a NODE_LABEL chain.

use super::primitive::{FirstProperty, PrimitiveRecord};
use super::{RecordCheck, RecordField, check_fields};
use crate::access::{DiffRecordAccess, RecordAccess};
use crate::engine::{
    CheckerEngine, ComparativeRecordChecker, ConsistencyRecord, PendingCheck, ReferenceCheck,
};
use crate::error::Result;
use crate::report::{Inconsistency, NodeViolation, RecordKind};
use nexus_record::record::decode_label_chain;
use nexus_record::{
    DynamicRecord, DynamicStoreKind, LabelFieldKind, NONE, NodeRecord, PropertyRecord,
    RelationshipGroupRecord, RelationshipRecord, TokenKind,
};

/// Deferred checks of a node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeCheck {
    NextRelationship(u64),
    NextGroup(u64),
    FirstProperty(u64),
    Label(u32),
    /// Next block of the node's label chain, with what was read so far
    LabelChain { next: u64, walker: LabelChainWalker },
}

/// Progress through a NODE_LABEL chain
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelChainWalker {
    visited: Vec<u64>,
    bytes: Vec<u8>,
}

impl ReferenceCheck<NodeRecord> for NodeCheck {
    fn target(&self, _context: ()) -> (RecordKind, u64) {
        match self {
            NodeCheck::NextRelationship(id) => (RecordKind::Relationship, *id),
            NodeCheck::NextGroup(id) => (RecordKind::RelationshipGroup, *id),
            NodeCheck::FirstProperty(id) => (RecordKind::Property, *id),
            NodeCheck::Label(id) => (RecordKind::Token(TokenKind::Label), u64::from(*id)),
            NodeCheck::LabelChain { next, .. } => {
                (RecordKind::Dynamic(DynamicStoreKind::NodeLabel), *next)
            }
        }
    }

    fn resolve(
        &self,
        engine: &mut CheckerEngine<'_, NodeRecord>,
        records: &dyn RecordAccess,
    ) -> Result<()> {
        let node = engine.record();
        match self {
            NodeCheck::NextRelationship(id) => {
                let relationship = records.relationship(*id)?;
                NodeNextRelationship.check_reference(node, &relationship, engine, records)
            }
            NodeCheck::NextGroup(id) => {
                let group = records.relationship_group(*id)?;
                NodeNextGroup.check_reference(node, &group, engine, records)
            }
            NodeCheck::FirstProperty(id) => {
                let property = records.property(*id)?;
                FirstProperty.check_reference(node, &property, engine, records)
            }
            NodeCheck::Label(id) => {
                let token = records.label(u64::from(*id))?;
                if !token.in_use {
                    engine.report(NodeViolation::LabelNotInUse(token));
                }
                Ok(())
            }
            NodeCheck::LabelChain { next, walker } => {
                let block = records.node_labels(*next)?;
                walker.clone().step(block, engine);
                Ok(())
            }
        }
    }
}

impl LabelChainWalker {
    /// Consume one block: queue the next one or judge the whole payload
    fn step(mut self, block: DynamicRecord, engine: &mut CheckerEngine<'_, NodeRecord>) {
        if !block.in_use {
            engine.report(NodeViolation::DynamicLabelRecordNotInUse(block));
            return;
        }
        if self.visited.contains(&block.id) {
            engine.report(NodeViolation::DynamicRecordChainCycle(block));
            return;
        }
        self.visited.push(block.id);
        let length = (block.length as usize).min(block.data.len());
        self.bytes.extend_from_slice(&block.data[..length]);

        if block.next_block != NONE {
            engine.comparative_check(NodeCheck::LabelChain {
                next: block.next_block,
                walker: self,
            });
            return;
        }
        match decode_label_chain(&self.bytes) {
            Some((_owner, labels)) => validate_labels(&labels, engine),
            None => engine.report(NodeViolation::DynamicLabelChainMalformed),
        }
    }
}

/// Order, uniqueness and token checks of a label list in stored order
fn validate_labels(labels: &[u32], engine: &mut CheckerEngine<'_, NodeRecord>) {
    for pair in labels.windows(2) {
        if pair[0] > pair[1] {
            engine.report(NodeViolation::LabelsOutOfOrder {
                largest: pair[0],
                smallest: pair[1],
            });
        }
    }

    let mut sorted = labels.to_vec();
    sorted.sort_unstable();
    for pair in sorted.windows(2) {
        if pair[0] == pair[1] {
            engine.report(NodeViolation::LabelDuplicate(pair[0]));
        }
    }

    sorted.dedup();
    for label in sorted {
        engine.comparative_check(NodeCheck::Label(label));
    }
}

/// `next_rel` of a sparse node
struct NodeNextRelationship;

impl RecordField<NodeRecord> for NodeNextRelationship {
    fn check_consistency(&self, record: &NodeRecord, engine: &mut CheckerEngine<'_, NodeRecord>) {
        if record.next_rel != NONE {
            engine.comparative_check(NodeCheck::NextRelationship(record.next_rel));
        }
    }

    fn check_change(
        &self,
        old: &NodeRecord,
        new: &NodeRecord,
        engine: &mut CheckerEngine<'_, NodeRecord>,
        records: &dyn DiffRecordAccess,
    ) -> Result<()> {
        let moved = !new.in_use || new.dense || old.next_rel != new.next_rel;
        if old.next_rel != NONE && moved && records.changed_relationship(old.next_rel).is_none() {
            engine.report(NodeViolation::RelationshipNotUpdated);
        }
        Ok(())
    }
}

impl ComparativeRecordChecker<NodeRecord, RelationshipRecord> for NodeNextRelationship {
    fn check_reference(
        &self,
        node: &NodeRecord,
        relationship: &RelationshipRecord,
        engine: &mut CheckerEngine<'_, NodeRecord>,
        _records: &dyn RecordAccess,
    ) -> Result<()> {
        if !relationship.in_use {
            engine.report(NodeViolation::RelationshipNotInUse(relationship.clone()));
            return Ok(());
        }

        let mut participates = false;
        if relationship.first_node == node.id {
            participates = true;
            if !relationship.first_in_first_chain {
                engine.report(NodeViolation::RelationshipNotFirstInSourceChain(
                    relationship.clone(),
                ));
            }
        }
        if relationship.second_node == node.id {
            participates = true;
            if !relationship.first_in_second_chain {
                engine.report(NodeViolation::RelationshipNotFirstInTargetChain(
                    relationship.clone(),
                ));
            }
        }
        if !participates {
            engine.report(NodeViolation::RelationshipForOtherNode(relationship.clone()));
        }
        Ok(())
    }
}

/// `next_rel` of a dense node, pointing at its first group
struct NodeNextGroup;

impl RecordField<NodeRecord> for NodeNextGroup {
    fn check_consistency(&self, record: &NodeRecord, engine: &mut CheckerEngine<'_, NodeRecord>) {
        if record.next_rel != NONE {
            engine.comparative_check(NodeCheck::NextGroup(record.next_rel));
        }
    }
}

impl ComparativeRecordChecker<NodeRecord, RelationshipGroupRecord> for NodeNextGroup {
    fn check_reference(
        &self,
        node: &NodeRecord,
        group: &RelationshipGroupRecord,
        engine: &mut CheckerEngine<'_, NodeRecord>,
        _records: &dyn RecordAccess,
    ) -> Result<()> {
        if !group.in_use {
            engine.report(NodeViolation::RelationshipGroupNotInUse(group.clone()));
        } else if group.owning_node != node.id {
            engine.report(NodeViolation::RelationshipGroupHasOtherOwner(group.clone()));
        }
        Ok(())
    }
}

/// The label field
struct NodeLabels;

impl RecordField<NodeRecord> for NodeLabels {
    fn check_consistency(&self, record: &NodeRecord, engine: &mut CheckerEngine<'_, NodeRecord>) {
        match record.labels.kind() {
            LabelFieldKind::Inline(labels) => validate_labels(&labels, engine),
            LabelFieldKind::Dynamic(head) => engine.comparative_check(NodeCheck::LabelChain {
                next: head,
                walker: LabelChainWalker::default(),
            }),
            LabelFieldKind::Invalid(tag) => engine.report(NodeViolation::InvalidLabelField(tag)),
        }
    }
}

impl ConsistencyRecord for NodeRecord {
    type Context = ();
    type Violation = NodeViolation;
    type Check = NodeCheck;

    fn inconsistency(_context: (), record: Self, violation: NodeViolation) -> Inconsistency {
        Inconsistency::Node { record, violation }
    }

    fn pending(_context: (), record: Self, check: NodeCheck) -> PendingCheck {
        PendingCheck::Node { record, check }
    }
}

impl PrimitiveRecord for NodeRecord {
    fn next_prop(&self) -> u64 {
        self.next_prop
    }

    fn first_property_check(property: u64) -> NodeCheck {
        NodeCheck::FirstProperty(property)
    }

    fn property_not_in_use(property: PropertyRecord) -> NodeViolation {
        NodeViolation::PropertyNotInUse(property)
    }

    fn property_not_first_in_chain(property: PropertyRecord) -> NodeViolation {
        NodeViolation::PropertyNotFirstInChain(property)
    }

    fn property_not_updated() -> NodeViolation {
        NodeViolation::PropertyNotUpdated
    }
}

/// Node checker; picks the sparse or dense field set per record
pub struct NodeRecordCheck {
    sparse: Vec<Box<dyn RecordField<NodeRecord>>>,
    dense: Vec<Box<dyn RecordField<NodeRecord>>>,
}

impl NodeRecordCheck {
    pub fn new() -> Self {
        Self {
            sparse: vec![
                Box::new(NodeNextRelationship),
                Box::new(FirstProperty),
                Box::new(NodeLabels),
            ],
            dense: vec![
                Box::new(NodeNextGroup),
                Box::new(FirstProperty),
                Box::new(NodeLabels),
            ],
        }
    }

    fn fields(&self, record: &NodeRecord) -> &[Box<dyn RecordField<NodeRecord>>] {
        if record.dense { &self.dense } else { &self.sparse }
    }
}

impl Default for NodeRecordCheck {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordCheck<NodeRecord> for NodeRecordCheck {
    fn check(
        &self,
        record: &NodeRecord,
        engine: &mut CheckerEngine<'_, NodeRecord>,
        _records: &dyn RecordAccess,
    ) -> Result<()> {
        check_fields(self.fields(record), record, engine);
        Ok(())
    }

    fn check_change(
        &self,
        old: &NodeRecord,
        new: &NodeRecord,
        engine: &mut CheckerEngine<'_, NodeRecord>,
        records: &dyn DiffRecordAccess,
    ) -> Result<()> {
        // change rules follow the layout the old image was written with
        check_fields(self.fields(new), new, engine);
        for field in self.fields(old) {
            field.check_change(old, new, engine, records)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::ChangeSet;
    use crate::checks::testing::{check_change_with, check_record};
    use nexus_record::LabelField;
    use nexus_record::testing::{Owner, StoreBuilder, Value};

    fn check(builder: &StoreBuilder, node: u64) -> crate::report::CollectingReport {
        check_record(builder, &NodeRecordCheck::new(), (), &builder.node(node))
    }

    #[test]
    fn test_consistent_node() {
        let mut builder = StoreBuilder::new();
        let person = builder.label("Person");
        let name = builder.property_key("name");
        let knows = builder.relationship_type("KNOWS");
        let a = builder.create_node();
        let b = builder.create_node();
        builder.set_labels(a, &[person]);
        builder.set_properties(Owner::Node(a), &[(name, Value::from("Ada"))]);
        builder.create_relationship(a, b, knows);

        assert!(check(&builder, a).is_empty(), "{:?}", check(&builder, a).inconsistencies());
        assert!(check(&builder, b).is_empty());
    }

    #[test]
    fn test_not_in_use_node_is_skipped() {
        let builder = StoreBuilder::new();
        assert!(check(&builder, 3).is_empty());
    }

    #[test]
    fn test_relationship_not_first_in_chain() {
        let mut builder = StoreBuilder::new();
        let t = builder.relationship_type("T");
        let a = builder.create_node();
        let b = builder.create_node();
        let older = builder.create_relationship(a, b, t);
        builder.create_relationship(a, b, t);
        builder.stores().nodes.update(a, |n| n.next_rel = older);
        builder.stores().nodes.update(b, |n| n.next_rel = older);

        assert_eq!(check(&builder, a).count("relationship_not_first_in_source_chain"), 1);
        assert_eq!(check(&builder, b).count("relationship_not_first_in_target_chain"), 1);
    }

    #[test]
    fn test_relationship_for_other_node() {
        let mut builder = StoreBuilder::new();
        let t = builder.relationship_type("T");
        let a = builder.create_node();
        let b = builder.create_node();
        let c = builder.create_node();
        let rel = builder.create_relationship(a, b, t);
        builder.stores().nodes.update(c, |n| n.next_rel = rel);
        assert_eq!(check(&builder, c).count("relationship_for_other_node"), 1);
    }

    #[test]
    fn test_dense_node_group_owner() {
        let mut builder = StoreBuilder::new();
        let t = builder.relationship_type("T");
        let hub = builder.create_dense_node();
        let other = builder.create_dense_node();
        let leaf = builder.create_node();
        builder.create_relationship(hub, leaf, t);
        assert!(check(&builder, hub).is_empty());

        let group = builder.node(hub).next_rel;
        builder.stores().nodes.update(other, |n| n.next_rel = group);
        assert_eq!(check(&builder, other).count("relationship_group_has_other_owner"), 1);

        builder.stores().relationship_groups.update(group, |g| g.in_use = false);
        assert_eq!(check(&builder, hub).count("relationship_group_not_in_use"), 1);
    }

    #[test]
    fn test_inline_labels_out_of_order_and_duplicate() {
        let mut builder = StoreBuilder::new();
        for name in ["A", "B", "C", "D", "E", "F"] {
            builder.label(name);
        }
        let node = builder.create_node();
        let field = LabelField::inline(&[5, 3, 3]).unwrap();
        builder.stores().nodes.update(node, |n| n.labels = field);

        let report = check(&builder, node);
        assert_eq!(report.count("labels_out_of_order"), 1);
        assert_eq!(report.count("label_duplicate"), 1);
        assert_eq!(report.len(), 2);
    }

    #[test]
    fn test_label_not_in_use() {
        let mut builder = StoreBuilder::new();
        let node = builder.create_node();
        builder.set_labels(node, &[4]);
        assert_eq!(check(&builder, node).count("label_not_in_use"), 1);
    }

    #[test]
    fn test_invalid_label_field() {
        let mut builder = StoreBuilder::new();
        let node = builder.create_node();
        builder
            .stores()
            .nodes
            .update(node, |n| n.labels = LabelField(0xF << 60));
        assert_eq!(check(&builder, node).count("invalid_label_field"), 1);
    }

    #[test]
    fn test_dynamic_labels_walk_the_chain() {
        let mut builder = StoreBuilder::new();
        let labels: Vec<u32> = (0..20).map(|i| builder.label(&format!("L{i}"))).collect();
        let node = builder.create_node();
        builder.set_labels(node, &labels);
        let head = builder.node(node).labels.dynamic_head().unwrap();
        assert_ne!(builder.dynamic(DynamicStoreKind::NodeLabel, head).next_block, NONE);
        assert!(check(&builder, node).is_empty());

        let mut reversed = labels.clone();
        reversed.reverse();
        builder.set_dynamic_labels(node, &reversed);
        assert_eq!(check(&builder, node).count("labels_out_of_order"), 19);
    }

    #[test]
    fn test_dynamic_label_chain_cycle() {
        let mut builder = StoreBuilder::new();
        let labels: Vec<u32> = (0..20).map(|i| builder.label(&format!("L{i}"))).collect();
        let node = builder.create_node();
        builder.set_labels(node, &labels);
        let head = builder.node(node).labels.dynamic_head().unwrap();
        let second = builder.dynamic(DynamicStoreKind::NodeLabel, head).next_block;
        builder
            .stores()
            .dynamic(DynamicStoreKind::NodeLabel)
            .update(second, |r| r.next_block = head);

        let report = check(&builder, node);
        assert_eq!(report.count("dynamic_record_chain_cycle"), 1);
        assert_eq!(report.len(), 1);
    }

    #[test]
    fn test_dynamic_label_record_not_in_use() {
        let mut builder = StoreBuilder::new();
        let node = builder.create_node();
        builder
            .stores()
            .nodes
            .update(node, |n| n.labels = LabelField::dynamic(9).unwrap());
        assert_eq!(check(&builder, node).count("dynamic_label_record_not_in_use"), 1);
    }

    #[test]
    fn test_dynamic_label_chain_malformed() {
        let mut builder = StoreBuilder::new();
        let node = builder.create_node();
        let head = builder.write_chain(DynamicStoreKind::NodeLabel, &[1, 2, 3]);
        builder
            .stores()
            .nodes
            .update(node, |n| n.labels = LabelField::dynamic(head).unwrap());
        assert_eq!(check(&builder, node).count("dynamic_label_chain_malformed"), 1);
    }

    #[test]
    fn test_relationship_not_updated() {
        let mut builder = StoreBuilder::new();
        let t = builder.relationship_type("T");
        let a = builder.create_node();
        let b = builder.create_node();
        builder.create_relationship(a, b, t);
        let before = builder.node(a);
        let mut after = before.clone();
        after.next_rel = NONE;

        let mut changes = ChangeSet::new();
        changes.change_node(before.clone(), after.clone());
        let report = check_change_with(&builder, &NodeRecordCheck::new(), (), &before, &after, &changes);
        assert_eq!(report.count("relationship_not_updated"), 1);
    }
}
