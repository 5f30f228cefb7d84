//! Relationship group checks
//!
//! Groups of a dense node form a singly-linked list ordered by relationship
//! type. Each group heads up to three relationship chains of its type.

use super::{RecordCheck, RecordField, check_field_changes, check_fields};
use crate::access::{DiffRecordAccess, RecordAccess};
use crate::engine::{
    CheckerEngine, ComparativeRecordChecker, ConsistencyRecord, PendingCheck, ReferenceCheck,
};
use crate::error::Result;
use crate::report::{Inconsistency, RecordKind, RelationshipGroupViolation};
use nexus_record::{NONE, NodeRecord, Record, RelationshipGroupRecord, RelationshipRecord};

type Violation = RelationshipGroupViolation;

/// Which chain of the group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GroupDirection {
    Outgoing,
    Incoming,
    Loop,
}

impl GroupDirection {
    const ALL: [GroupDirection; 3] = [
        GroupDirection::Outgoing,
        GroupDirection::Incoming,
        GroupDirection::Loop,
    ];

    fn head(self, group: &RelationshipGroupRecord) -> u64 {
        match self {
            GroupDirection::Outgoing => group.first_out,
            GroupDirection::Incoming => group.first_in,
            GroupDirection::Loop => group.first_loop,
        }
    }

    fn belongs_to(self, relationship: &RelationshipRecord, node: u64) -> bool {
        match self {
            GroupDirection::Outgoing => {
                relationship.first_node == node && relationship.second_node != node
            }
            GroupDirection::Incoming => {
                relationship.second_node == node && relationship.first_node != node
            }
            GroupDirection::Loop => {
                relationship.first_node == node && relationship.second_node == node
            }
        }
    }

    fn first_in_chain(self, relationship: &RelationshipRecord) -> bool {
        match self {
            GroupDirection::Outgoing => relationship.first_in_first_chain,
            GroupDirection::Incoming => relationship.first_in_second_chain,
            GroupDirection::Loop => {
                relationship.first_in_first_chain && relationship.first_in_second_chain
            }
        }
    }

    fn not_in_use(self) -> fn(RelationshipRecord) -> Violation {
        match self {
            GroupDirection::Outgoing => Violation::FirstOutgoingNotInUse,
            GroupDirection::Incoming => Violation::FirstIncomingNotInUse,
            GroupDirection::Loop => Violation::FirstLoopNotInUse,
        }
    }

    fn of_other_node(self) -> fn(RelationshipRecord) -> Violation {
        match self {
            GroupDirection::Outgoing => Violation::FirstOutgoingOfOtherNode,
            GroupDirection::Incoming => Violation::FirstIncomingOfOtherNode,
            GroupDirection::Loop => Violation::FirstLoopOfOtherNode,
        }
    }

    fn not_first_in_chain(self) -> fn(RelationshipRecord) -> Violation {
        match self {
            GroupDirection::Outgoing => Violation::FirstOutgoingNotFirstInChain,
            GroupDirection::Incoming => Violation::FirstIncomingNotFirstInChain,
            GroupDirection::Loop => Violation::FirstLoopNotFirstInChain,
        }
    }

    fn of_other_type(self) -> fn(RelationshipRecord) -> Violation {
        match self {
            GroupDirection::Outgoing => Violation::FirstOutgoingOfOtherType,
            GroupDirection::Incoming => Violation::FirstIncomingOfOtherType,
            GroupDirection::Loop => Violation::FirstLoopOfOtherType,
        }
    }
}

/// Deferred checks of a relationship group
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupCheck {
    Owner(u64),
    Next(u64),
    FirstRelationship(GroupDirection, u64),
}

impl ReferenceCheck<RelationshipGroupRecord> for GroupCheck {
    fn target(&self, _context: ()) -> (RecordKind, u64) {
        match self {
            GroupCheck::Owner(id) => (RecordKind::Node, *id),
            GroupCheck::Next(id) => (RecordKind::RelationshipGroup, *id),
            GroupCheck::FirstRelationship(_, id) => (RecordKind::Relationship, *id),
        }
    }

    fn resolve(
        &self,
        engine: &mut CheckerEngine<'_, RelationshipGroupRecord>,
        records: &dyn RecordAccess,
    ) -> Result<()> {
        let group = engine.record();
        match self {
            GroupCheck::Owner(id) => {
                let node = records.node(*id)?;
                GroupOwner.check_reference(group, &node, engine, records)
            }
            GroupCheck::Next(id) => {
                let next = records.relationship_group(*id)?;
                NextGroup.check_reference(group, &next, engine, records)
            }
            GroupCheck::FirstRelationship(direction, id) => {
                let relationship = records.relationship(*id)?;
                FirstRelationship(*direction).check_reference(group, &relationship, engine, records)
            }
        }
    }
}

struct GroupOwner;

impl RecordField<RelationshipGroupRecord> for GroupOwner {
    fn check_consistency(
        &self,
        record: &RelationshipGroupRecord,
        engine: &mut CheckerEngine<'_, RelationshipGroupRecord>,
    ) {
        if record.owning_node == NONE {
            engine.report(Violation::OwnerNotInUse(NodeRecord::not_in_use(NONE)));
        } else {
            engine.comparative_check(GroupCheck::Owner(record.owning_node));
        }
    }
}

impl ComparativeRecordChecker<RelationshipGroupRecord, NodeRecord> for GroupOwner {
    fn check_reference(
        &self,
        _group: &RelationshipGroupRecord,
        node: &NodeRecord,
        engine: &mut CheckerEngine<'_, RelationshipGroupRecord>,
        _records: &dyn RecordAccess,
    ) -> Result<()> {
        if !node.in_use {
            engine.report(Violation::OwnerNotInUse(node.clone()));
        }
        Ok(())
    }
}

struct NextGroup;

impl RecordField<RelationshipGroupRecord> for NextGroup {
    fn check_consistency(
        &self,
        record: &RelationshipGroupRecord,
        engine: &mut CheckerEngine<'_, RelationshipGroupRecord>,
    ) {
        if record.next != NONE {
            engine.comparative_check(GroupCheck::Next(record.next));
        }
    }
}

impl ComparativeRecordChecker<RelationshipGroupRecord, RelationshipGroupRecord> for NextGroup {
    fn check_reference(
        &self,
        group: &RelationshipGroupRecord,
        next: &RelationshipGroupRecord,
        engine: &mut CheckerEngine<'_, RelationshipGroupRecord>,
        _records: &dyn RecordAccess,
    ) -> Result<()> {
        if !next.in_use {
            engine.report(Violation::NextGroupNotInUse(next.clone()));
            return Ok(());
        }
        if next.owning_node != group.owning_node {
            engine.report(Violation::NextGroupHasOtherOwner(next.clone()));
        }
        if next.rel_type <= group.rel_type {
            engine.report(Violation::NextGroupTypeNotAscending(next.clone()));
        }
        Ok(())
    }
}

struct FirstRelationship(GroupDirection);

impl RecordField<RelationshipGroupRecord> for FirstRelationship {
    fn check_consistency(
        &self,
        record: &RelationshipGroupRecord,
        engine: &mut CheckerEngine<'_, RelationshipGroupRecord>,
    ) {
        let head = self.0.head(record);
        if head != NONE {
            engine.comparative_check(GroupCheck::FirstRelationship(self.0, head));
        }
    }
}

impl ComparativeRecordChecker<RelationshipGroupRecord, RelationshipRecord> for FirstRelationship {
    fn check_reference(
        &self,
        group: &RelationshipGroupRecord,
        relationship: &RelationshipRecord,
        engine: &mut CheckerEngine<'_, RelationshipGroupRecord>,
        _records: &dyn RecordAccess,
    ) -> Result<()> {
        let direction = self.0;
        if !relationship.in_use {
            engine.report(direction.not_in_use()(relationship.clone()));
            return Ok(());
        }
        if !direction.belongs_to(relationship, group.owning_node) {
            engine.report(direction.of_other_node()(relationship.clone()));
            return Ok(());
        }
        if !direction.first_in_chain(relationship) {
            engine.report(direction.not_first_in_chain()(relationship.clone()));
        }
        if relationship.rel_type != group.rel_type {
            engine.report(direction.of_other_type()(relationship.clone()));
        }
        Ok(())
    }
}

impl ConsistencyRecord for RelationshipGroupRecord {
    type Context = ();
    type Violation = RelationshipGroupViolation;
    type Check = GroupCheck;

    fn inconsistency(_context: (), record: Self, violation: Violation) -> Inconsistency {
        Inconsistency::RelationshipGroup { record, violation }
    }

    fn pending(_context: (), record: Self, check: GroupCheck) -> PendingCheck {
        PendingCheck::RelationshipGroup { record, check }
    }
}

/// Relationship group checker
pub struct RelationshipGroupRecordCheck {
    fields: Vec<Box<dyn RecordField<RelationshipGroupRecord>>>,
}

impl RelationshipGroupRecordCheck {
    pub fn new() -> Self {
        let mut fields: Vec<Box<dyn RecordField<RelationshipGroupRecord>>> =
            vec![Box::new(GroupOwner), Box::new(NextGroup)];
        for direction in GroupDirection::ALL {
            fields.push(Box::new(FirstRelationship(direction)));
        }
        Self { fields }
    }
}

impl Default for RelationshipGroupRecordCheck {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordCheck<RelationshipGroupRecord> for RelationshipGroupRecordCheck {
    fn check(
        &self,
        record: &RelationshipGroupRecord,
        engine: &mut CheckerEngine<'_, RelationshipGroupRecord>,
        _records: &dyn RecordAccess,
    ) -> Result<()> {
        check_fields(&self.fields, record, engine);
        Ok(())
    }

    fn check_change(
        &self,
        old: &RelationshipGroupRecord,
        new: &RelationshipGroupRecord,
        engine: &mut CheckerEngine<'_, RelationshipGroupRecord>,
        records: &dyn DiffRecordAccess,
    ) -> Result<()> {
        check_field_changes(&self.fields, old, new, engine, records)
    }
}
