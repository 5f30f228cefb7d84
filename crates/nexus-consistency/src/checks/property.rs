//! Property record checks
//!
//! Property records form a doubly-linked chain. Each block names a property
//! key token and holds either an inline value or the head of a string or
//! array chain.

use super::{RecordCheck, RecordField, check_field_changes, check_fields};
use crate::access::{DiffRecordAccess, RecordAccess};
use crate::engine::{
    CheckerEngine, ComparativeRecordChecker, ConsistencyRecord, PendingCheck, ReferenceCheck,
};
use crate::error::Result;
use crate::report::{Inconsistency, PropertyViolation, RecordKind};
use nexus_record::{DynamicStoreKind, NONE, PropertyBlock, PropertyRecord, TokenKind};
use std::collections::BTreeSet;

type Violation = PropertyViolation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyLink {
    Prev,
    Next,
}

impl PropertyLink {
    fn pointer(self, record: &PropertyRecord) -> u64 {
        match self {
            PropertyLink::Prev => record.prev_prop,
            PropertyLink::Next => record.next_prop,
        }
    }

    /// The pointer of the neighbour that should lead back here
    fn back(self, neighbour: &PropertyRecord) -> u64 {
        match self {
            PropertyLink::Prev => neighbour.next_prop,
            PropertyLink::Next => neighbour.prev_prop,
        }
    }

    fn not_in_use(self) -> fn(PropertyRecord) -> Violation {
        match self {
            PropertyLink::Prev => Violation::PrevNotInUse,
            PropertyLink::Next => Violation::NextNotInUse,
        }
    }

    fn does_not_reference_back(self) -> fn(PropertyRecord) -> Violation {
        match self {
            PropertyLink::Prev => Violation::PrevDoesNotReferenceBack,
            PropertyLink::Next => Violation::NextDoesNotReferenceBack,
        }
    }

    fn not_updated(self) -> Violation {
        match self {
            PropertyLink::Prev => Violation::PrevNotUpdated,
            PropertyLink::Next => Violation::NextNotUpdated,
        }
    }
}

/// Deferred checks of a property record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyCheck {
    Link(PropertyLink, u64),
    Key {
        block: PropertyBlock,
    },
    Value {
        block: PropertyBlock,
        store: DynamicStoreKind,
        head: u64,
    },
}

impl ReferenceCheck<PropertyRecord> for PropertyCheck {
    fn target(&self, _context: ()) -> (RecordKind, u64) {
        match self {
            PropertyCheck::Link(_, id) => (RecordKind::Property, *id),
            PropertyCheck::Key { block } => (
                RecordKind::Token(TokenKind::PropertyKey),
                u64::from(block.key_id),
            ),
            PropertyCheck::Value { store, head, .. } => (RecordKind::Dynamic(*store), *head),
        }
    }

    fn resolve(
        &self,
        engine: &mut CheckerEngine<'_, PropertyRecord>,
        records: &dyn RecordAccess,
    ) -> Result<()> {
        match self {
            PropertyCheck::Link(link, id) => {
                let neighbour = records.property(*id)?;
                PropertyLinkField(*link).check_reference(
                    engine.record(),
                    &neighbour,
                    engine,
                    records,
                )
            }
            PropertyCheck::Key { block } => {
                let key = records.property_key(u64::from(block.key_id))?;
                if !key.in_use {
                    engine.report(Violation::KeyNotInUse { block: *block, key });
                }
                Ok(())
            }
            PropertyCheck::Value { block, store, head } => {
                let value = records.dynamic(*store, *head)?;
                if !value.in_use {
                    engine.report(Violation::ValueNotInUse {
                        block: *block,
                        value,
                    });
                } else if value.length == 0 {
                    engine.report(Violation::ValueEmpty {
                        block: *block,
                        value,
                    });
                }
                Ok(())
            }
        }
    }
}

struct PropertyLinkField(PropertyLink);

impl RecordField<PropertyRecord> for PropertyLinkField {
    fn check_consistency(
        &self,
        record: &PropertyRecord,
        engine: &mut CheckerEngine<'_, PropertyRecord>,
    ) {
        let pointer = self.0.pointer(record);
        if pointer != NONE {
            engine.comparative_check(PropertyCheck::Link(self.0, pointer));
        }
    }

    fn check_change(
        &self,
        old: &PropertyRecord,
        new: &PropertyRecord,
        engine: &mut CheckerEngine<'_, PropertyRecord>,
        records: &dyn DiffRecordAccess,
    ) -> Result<()> {
        let pointer = self.0.pointer(old);
        let moved = !new.in_use || self.0.pointer(new) != pointer;
        if pointer != NONE && moved && records.changed_property(pointer).is_none() {
            engine.report(self.0.not_updated());
        }
        Ok(())
    }
}

impl ComparativeRecordChecker<PropertyRecord, PropertyRecord> for PropertyLinkField {
    fn check_reference(
        &self,
        record: &PropertyRecord,
        neighbour: &PropertyRecord,
        engine: &mut CheckerEngine<'_, PropertyRecord>,
        _records: &dyn RecordAccess,
    ) -> Result<()> {
        if !neighbour.in_use {
            engine.report(self.0.not_in_use()(neighbour.clone()));
        } else if self.0.back(neighbour) != record.id {
            engine.report(self.0.does_not_reference_back()(neighbour.clone()));
        }
        Ok(())
    }
}

/// Keys and values of every block
struct PropertyBlocks;

impl RecordField<PropertyRecord> for PropertyBlocks {
    fn check_consistency(
        &self,
        record: &PropertyRecord,
        engine: &mut CheckerEngine<'_, PropertyRecord>,
    ) {
        for block in &record.blocks {
            if block.property_type().is_none() {
                engine.report(Violation::InvalidPropertyType(*block));
                continue;
            }
            if block.decode().is_err() {
                engine.report(Violation::InvalidPropertyValue(*block));
                continue;
            }
            engine.comparative_check(PropertyCheck::Key { block: *block });
            if let Some((store, head)) = block.value_chain() {
                engine.comparative_check(PropertyCheck::Value {
                    block: *block,
                    store,
                    head,
                });
            }
        }
    }

    fn check_change(
        &self,
        old: &PropertyRecord,
        new: &PropertyRecord,
        engine: &mut CheckerEngine<'_, PropertyRecord>,
        records: &dyn DiffRecordAccess,
    ) -> Result<()> {
        let kept: BTreeSet<(DynamicStoreKind, u64)> = if new.in_use {
            new.value_chains().collect()
        } else {
            BTreeSet::new()
        };
        for block in &old.blocks {
            let Some((store, head)) = block.value_chain() else {
                continue;
            };
            if !kept.contains(&(store, head)) && records.changed_dynamic(store, head).is_none() {
                engine.report(Violation::ValueUnreferencedButNotDeleted(*block));
            }
        }
        Ok(())
    }
}

impl ConsistencyRecord for PropertyRecord {
    type Context = ();
    type Violation = PropertyViolation;
    type Check = PropertyCheck;

    fn inconsistency(_context: (), record: Self, violation: Violation) -> Inconsistency {
        Inconsistency::Property { record, violation }
    }

    fn pending(_context: (), record: Self, check: PropertyCheck) -> PendingCheck {
        PendingCheck::Property { record, check }
    }
}

/// Property record checker
pub struct PropertyRecordCheck {
    fields: Vec<Box<dyn RecordField<PropertyRecord>>>,
}

impl PropertyRecordCheck {
    pub fn new() -> Self {
        Self {
            fields: vec![
                Box::new(PropertyLinkField(PropertyLink::Prev)),
                Box::new(PropertyLinkField(PropertyLink::Next)),
                Box::new(PropertyBlocks),
            ],
        }
    }
}

impl Default for PropertyRecordCheck {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordCheck<PropertyRecord> for PropertyRecordCheck {
    fn check(
        &self,
        record: &PropertyRecord,
        engine: &mut CheckerEngine<'_, PropertyRecord>,
        _records: &dyn RecordAccess,
    ) -> Result<()> {
        check_fields(&self.fields, record, engine);
        Ok(())
    }

    fn check_change(
        &self,
        old: &PropertyRecord,
        new: &PropertyRecord,
        engine: &mut CheckerEngine<'_, PropertyRecord>,
        records: &dyn DiffRecordAccess,
    ) -> Result<()> {
        check_field_changes(&self.fields, old, new, engine, records)
    }
}
