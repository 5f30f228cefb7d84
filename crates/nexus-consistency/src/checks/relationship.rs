//! Relationship record checks
//!
//! A relationship sits in two doubly-linked chains, one per end node. The
//! first record of a chain keeps the chain length in its `prev` slot instead
//! of a pointer, so `prev` is only followed when the record is not first.

use super::primitive::{FirstProperty, PrimitiveRecord};
use super::{RecordCheck, RecordField, check_field_changes, check_fields};
use crate::access::{DiffRecordAccess, RecordAccess};
use crate::engine::{
    CheckerEngine, ComparativeRecordChecker, ConsistencyRecord, PendingCheck, ReferenceCheck,
};
use crate::error::Result;
use crate::report::{Inconsistency, RecordKind, RelationshipViolation};
use nexus_record::{NONE, NodeRecord, PropertyRecord, RelationshipRecord, TokenKind};

type Violation = RelationshipViolation;

/// Which end of the relationship
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeRole {
    Source,
    Target,
}

impl NodeRole {
    fn node(self, record: &RelationshipRecord) -> u64 {
        match self {
            NodeRole::Source => record.first_node,
            NodeRole::Target => record.second_node,
        }
    }

    fn first_in_chain(self, record: &RelationshipRecord) -> bool {
        match self {
            NodeRole::Source => record.first_in_first_chain,
            NodeRole::Target => record.first_in_second_chain,
        }
    }

    fn illegal(self) -> Violation {
        match self {
            NodeRole::Source => Violation::IllegalSourceNode,
            NodeRole::Target => Violation::IllegalTargetNode,
        }
    }

    fn not_in_use(self) -> fn(NodeRecord) -> Violation {
        match self {
            NodeRole::Source => Violation::SourceNodeNotInUse,
            NodeRole::Target => Violation::TargetNodeNotInUse,
        }
    }

    fn does_not_reference_back(self) -> fn(NodeRecord) -> Violation {
        match self {
            NodeRole::Source => Violation::SourceNodeDoesNotReferenceBack,
            NodeRole::Target => Violation::TargetNodeDoesNotReferenceBack,
        }
    }

    fn not_updated(self) -> Violation {
        match self {
            NodeRole::Source => Violation::SourceNodeNotUpdated,
            NodeRole::Target => Violation::TargetNodeNotUpdated,
        }
    }
}

/// One of the four chain pointers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChainSegment {
    SourcePrev,
    SourceNext,
    TargetPrev,
    TargetNext,
}

impl ChainSegment {
    const ALL: [ChainSegment; 4] = [
        ChainSegment::SourcePrev,
        ChainSegment::SourceNext,
        ChainSegment::TargetPrev,
        ChainSegment::TargetNext,
    ];

    fn role(self) -> NodeRole {
        match self {
            ChainSegment::SourcePrev | ChainSegment::SourceNext => NodeRole::Source,
            ChainSegment::TargetPrev | ChainSegment::TargetNext => NodeRole::Target,
        }
    }

    fn is_prev(self) -> bool {
        matches!(self, ChainSegment::SourcePrev | ChainSegment::TargetPrev)
    }

    fn pointer(self, record: &RelationshipRecord) -> u64 {
        match self {
            ChainSegment::SourcePrev => record.first_prev_rel,
            ChainSegment::SourceNext => record.first_next_rel,
            ChainSegment::TargetPrev => record.second_prev_rel,
            ChainSegment::TargetNext => record.second_next_rel,
        }
    }

    /// The pointer, or NONE when the slot holds a degree
    fn followed_pointer(self, record: &RelationshipRecord) -> u64 {
        if self.is_prev() && self.role().first_in_chain(record) {
            NONE
        } else {
            self.pointer(record)
        }
    }

    fn not_in_use(self) -> fn(RelationshipRecord) -> Violation {
        match self {
            ChainSegment::SourcePrev => Violation::SourcePrevNotInUse,
            ChainSegment::SourceNext => Violation::SourceNextNotInUse,
            ChainSegment::TargetPrev => Violation::TargetPrevNotInUse,
            ChainSegment::TargetNext => Violation::TargetNextNotInUse,
        }
    }

    fn references_other_nodes(self) -> fn(RelationshipRecord) -> Violation {
        match self {
            ChainSegment::SourcePrev => Violation::SourcePrevReferencesOtherNodes,
            ChainSegment::SourceNext => Violation::SourceNextReferencesOtherNodes,
            ChainSegment::TargetPrev => Violation::TargetPrevReferencesOtherNodes,
            ChainSegment::TargetNext => Violation::TargetNextReferencesOtherNodes,
        }
    }

    fn does_not_reference_back(self) -> fn(RelationshipRecord) -> Violation {
        match self {
            ChainSegment::SourcePrev => Violation::SourcePrevDoesNotReferenceBack,
            ChainSegment::SourceNext => Violation::SourceNextDoesNotReferenceBack,
            ChainSegment::TargetPrev => Violation::TargetPrevDoesNotReferenceBack,
            ChainSegment::TargetNext => Violation::TargetNextDoesNotReferenceBack,
        }
    }

    fn not_updated(self) -> Violation {
        match self {
            ChainSegment::SourcePrev => Violation::SourcePrevNotUpdated,
            ChainSegment::SourceNext => Violation::SourceNextNotUpdated,
            ChainSegment::TargetPrev => Violation::TargetPrevNotUpdated,
            ChainSegment::TargetNext => Violation::TargetNextNotUpdated,
        }
    }
}

/// Deferred checks of a relationship
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationshipCheck {
    Node(NodeRole, u64),
    Type(u32),
    Chain(ChainSegment, u64),
    FirstProperty(u64),
}

impl ReferenceCheck<RelationshipRecord> for RelationshipCheck {
    fn target(&self, _context: ()) -> (RecordKind, u64) {
        match self {
            RelationshipCheck::Node(_, id) => (RecordKind::Node, *id),
            RelationshipCheck::Type(id) => (
                RecordKind::Token(TokenKind::RelationshipType),
                u64::from(*id),
            ),
            RelationshipCheck::Chain(_, id) => (RecordKind::Relationship, *id),
            RelationshipCheck::FirstProperty(id) => (RecordKind::Property, *id),
        }
    }

    fn resolve(
        &self,
        engine: &mut CheckerEngine<'_, RelationshipRecord>,
        records: &dyn RecordAccess,
    ) -> Result<()> {
        let relationship = engine.record();
        match self {
            RelationshipCheck::Node(role, id) => {
                let node = records.node(*id)?;
                RelationshipNode(*role).check_reference(relationship, &node, engine, records)
            }
            RelationshipCheck::Type(id) => {
                let token = records.relationship_type(u64::from(*id))?;
                if !token.in_use {
                    engine.report(Violation::RelationshipTypeNotInUse(token));
                }
                Ok(())
            }
            RelationshipCheck::Chain(segment, id) => {
                let other = records.relationship(*id)?;
                RelationshipChain(*segment).check_reference(relationship, &other, engine, records)
            }
            RelationshipCheck::FirstProperty(id) => {
                let property = records.property(*id)?;
                FirstProperty.check_reference(relationship, &property, engine, records)
            }
        }
    }
}

/// One end node
struct RelationshipNode(NodeRole);

impl RecordField<RelationshipRecord> for RelationshipNode {
    fn check_consistency(
        &self,
        record: &RelationshipRecord,
        engine: &mut CheckerEngine<'_, RelationshipRecord>,
    ) {
        let node = self.0.node(record);
        if node == NONE {
            engine.report(self.0.illegal());
        } else {
            engine.comparative_check(RelationshipCheck::Node(self.0, node));
        }
    }

    fn check_change(
        &self,
        old: &RelationshipRecord,
        new: &RelationshipRecord,
        engine: &mut CheckerEngine<'_, RelationshipRecord>,
        records: &dyn DiffRecordAccess,
    ) -> Result<()> {
        let role = self.0;
        let node = role.node(old);
        if node == NONE || !role.first_in_chain(old) {
            return Ok(());
        }
        let still_first = new.in_use && role.node(new) == node && role.first_in_chain(new);
        if still_first || records.changed_node(node).is_some() {
            return Ok(());
        }
        // a dense node's chain heads live in its groups
        if !records.node(node)?.dense {
            engine.report(role.not_updated());
        }
        Ok(())
    }
}

impl ComparativeRecordChecker<RelationshipRecord, NodeRecord> for RelationshipNode {
    fn check_reference(
        &self,
        relationship: &RelationshipRecord,
        node: &NodeRecord,
        engine: &mut CheckerEngine<'_, RelationshipRecord>,
        _records: &dyn RecordAccess,
    ) -> Result<()> {
        let role = self.0;
        if !node.in_use {
            engine.report(role.not_in_use()(node.clone()));
        } else if role.first_in_chain(relationship)
            && !node.dense
            && node.next_rel != relationship.id
        {
            engine.report(role.does_not_reference_back()(node.clone()));
        }
        Ok(())
    }
}

/// The relationship type token
struct RelationshipType;

impl RecordField<RelationshipRecord> for RelationshipType {
    fn check_consistency(
        &self,
        record: &RelationshipRecord,
        engine: &mut CheckerEngine<'_, RelationshipRecord>,
    ) {
        engine.comparative_check(RelationshipCheck::Type(record.rel_type));
    }
}

/// One chain pointer
struct RelationshipChain(ChainSegment);

impl RecordField<RelationshipRecord> for RelationshipChain {
    fn check_consistency(
        &self,
        record: &RelationshipRecord,
        engine: &mut CheckerEngine<'_, RelationshipRecord>,
    ) {
        let pointer = self.0.followed_pointer(record);
        if pointer != NONE {
            engine.comparative_check(RelationshipCheck::Chain(self.0, pointer));
        }
    }

    fn check_change(
        &self,
        old: &RelationshipRecord,
        new: &RelationshipRecord,
        engine: &mut CheckerEngine<'_, RelationshipRecord>,
        records: &dyn DiffRecordAccess,
    ) -> Result<()> {
        let segment = self.0;
        let pointer = segment.followed_pointer(old);
        if pointer == NONE {
            return Ok(());
        }
        let kept = new.in_use
            && segment.role().node(new) == segment.role().node(old)
            && segment.followed_pointer(new) == pointer;
        if !kept && records.changed_relationship(pointer).is_none() {
            engine.report(segment.not_updated());
        }
        Ok(())
    }
}

impl ComparativeRecordChecker<RelationshipRecord, RelationshipRecord> for RelationshipChain {
    fn check_reference(
        &self,
        relationship: &RelationshipRecord,
        other: &RelationshipRecord,
        engine: &mut CheckerEngine<'_, RelationshipRecord>,
        _records: &dyn RecordAccess,
    ) -> Result<()> {
        let segment = self.0;
        if !other.in_use {
            engine.report(segment.not_in_use()(other.clone()));
            return Ok(());
        }

        let node = segment.role().node(relationship);
        let (prev, next, first) = if other.first_node == node {
            (
                other.first_prev_rel,
                other.first_next_rel,
                other.first_in_first_chain,
            )
        } else if other.second_node == node {
            (
                other.second_prev_rel,
                other.second_next_rel,
                other.first_in_second_chain,
            )
        } else {
            engine.report(segment.references_other_nodes()(other.clone()));
            return Ok(());
        };

        let back = if segment.is_prev() {
            next
        } else if first {
            NONE
        } else {
            prev
        };
        if back != relationship.id {
            engine.report(segment.does_not_reference_back()(other.clone()));
        }
        Ok(())
    }
}

impl ConsistencyRecord for RelationshipRecord {
    type Context = ();
    type Violation = RelationshipViolation;
    type Check = RelationshipCheck;

    fn inconsistency(_context: (), record: Self, violation: Violation) -> Inconsistency {
        Inconsistency::Relationship { record, violation }
    }

    fn pending(_context: (), record: Self, check: RelationshipCheck) -> PendingCheck {
        PendingCheck::Relationship { record, check }
    }
}

impl PrimitiveRecord for RelationshipRecord {
    fn next_prop(&self) -> u64 {
        self.next_prop
    }

    fn first_property_check(property: u64) -> RelationshipCheck {
        RelationshipCheck::FirstProperty(property)
    }

    fn property_not_in_use(property: PropertyRecord) -> Violation {
        Violation::PropertyNotInUse(property)
    }

    fn property_not_first_in_chain(property: PropertyRecord) -> Violation {
        Violation::PropertyNotFirstInChain(property)
    }

    fn property_not_updated() -> Violation {
        Violation::PropertyNotUpdated
    }
}

/// Relationship checker
pub struct RelationshipRecordCheck {
    fields: Vec<Box<dyn RecordField<RelationshipRecord>>>,
}

impl RelationshipRecordCheck {
    pub fn new() -> Self {
        let mut fields: Vec<Box<dyn RecordField<RelationshipRecord>>> = vec![
            Box::new(RelationshipNode(NodeRole::Source)),
            Box::new(RelationshipNode(NodeRole::Target)),
            Box::new(RelationshipType),
        ];
        for segment in ChainSegment::ALL {
            fields.push(Box::new(RelationshipChain(segment)));
        }
        fields.push(Box::new(FirstProperty));
        Self { fields }
    }
}

impl Default for RelationshipRecordCheck {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordCheck<RelationshipRecord> for RelationshipRecordCheck {
    fn check(
        &self,
        record: &RelationshipRecord,
        engine: &mut CheckerEngine<'_, RelationshipRecord>,
        _records: &dyn RecordAccess,
    ) -> Result<()> {
        check_fields(&self.fields, record, engine);
        Ok(())
    }

    fn check_change(
        &self,
        old: &RelationshipRecord,
        new: &RelationshipRecord,
        engine: &mut CheckerEngine<'_, RelationshipRecord>,
        records: &dyn DiffRecordAccess,
    ) -> Result<()> {
        check_field_changes(&self.fields, old, new, engine, records)
    }
}
