//! Primitive records: nodes, relationships and the neo store
//!
//! Every primitive heads a property chain. [`FirstProperty`] checks that the
//! head is in use and really is the first record of its chain.

use super::{RecordCheck, RecordField, check_field_changes, check_fields};
use crate::access::{DiffRecordAccess, RecordAccess};
use crate::engine::{CheckerEngine, ComparativeRecordChecker, ConsistencyRecord, PendingCheck, ReferenceCheck};
use crate::error::Result;
use crate::report::{Inconsistency, NeoStoreViolation, RecordKind};
use nexus_record::{NONE, NeoStoreRecord, PropertyRecord};

/// A record kind that heads a property chain
pub trait PrimitiveRecord: ConsistencyRecord {
    fn next_prop(&self) -> u64;

    fn first_property_check(property: u64) -> Self::Check;

    fn property_not_in_use(property: PropertyRecord) -> Self::Violation;

    fn property_not_first_in_chain(property: PropertyRecord) -> Self::Violation;

    fn property_not_updated() -> Self::Violation;
}

/// The `next_prop` field of a primitive
pub struct FirstProperty;

impl<R: PrimitiveRecord> RecordField<R> for FirstProperty {
    fn check_consistency(&self, record: &R, engine: &mut CheckerEngine<'_, R>) {
        if record.next_prop() != NONE {
            engine.comparative_check(R::first_property_check(record.next_prop()));
        }
    }

    fn check_change(
        &self,
        old: &R,
        new: &R,
        engine: &mut CheckerEngine<'_, R>,
        records: &dyn DiffRecordAccess,
    ) -> Result<()> {
        let head = old.next_prop();
        let moved = !new.in_use() || head != new.next_prop();
        if head != NONE && moved && records.changed_property(head).is_none() {
            engine.report(R::property_not_updated());
        }
        Ok(())
    }
}

impl<R: PrimitiveRecord> ComparativeRecordChecker<R, PropertyRecord> for FirstProperty {
    fn check_reference(
        &self,
        _record: &R,
        property: &PropertyRecord,
        engine: &mut CheckerEngine<'_, R>,
        _records: &dyn RecordAccess,
    ) -> Result<()> {
        if !property.in_use {
            engine.report(R::property_not_in_use(property.clone()));
        } else if property.prev_prop != NONE {
            engine.report(R::property_not_first_in_chain(property.clone()));
        }
        Ok(())
    }
}

/// Deferred checks of the neo store record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NeoStoreCheck {
    FirstProperty(u64),
}

impl ReferenceCheck<NeoStoreRecord> for NeoStoreCheck {
    fn target(&self, _context: ()) -> (RecordKind, u64) {
        match self {
            NeoStoreCheck::FirstProperty(id) => (RecordKind::Property, *id),
        }
    }

    fn resolve(
        &self,
        engine: &mut CheckerEngine<'_, NeoStoreRecord>,
        records: &dyn RecordAccess,
    ) -> Result<()> {
        match self {
            NeoStoreCheck::FirstProperty(id) => {
                let property = records.property(*id)?;
                FirstProperty.check_reference(engine.record(), &property, engine, records)
            }
        }
    }
}

impl ConsistencyRecord for NeoStoreRecord {
    type Context = ();
    type Violation = NeoStoreViolation;
    type Check = NeoStoreCheck;

    fn inconsistency(_context: (), record: Self, violation: NeoStoreViolation) -> Inconsistency {
        Inconsistency::NeoStore { record, violation }
    }

    fn pending(_context: (), record: Self, check: NeoStoreCheck) -> PendingCheck {
        PendingCheck::NeoStore { record, check }
    }
}

impl PrimitiveRecord for NeoStoreRecord {
    fn next_prop(&self) -> u64 {
        self.next_prop
    }

    fn first_property_check(property: u64) -> NeoStoreCheck {
        NeoStoreCheck::FirstProperty(property)
    }

    fn property_not_in_use(property: PropertyRecord) -> NeoStoreViolation {
        NeoStoreViolation::PropertyNotInUse(property)
    }

    fn property_not_first_in_chain(property: PropertyRecord) -> NeoStoreViolation {
        NeoStoreViolation::PropertyNotFirstInChain(property)
    }

    fn property_not_updated() -> NeoStoreViolation {
        NeoStoreViolation::PropertyNotUpdated
    }
}

/// Checker for the store-global record
pub struct NeoStoreRecordCheck {
    fields: Vec<Box<dyn RecordField<NeoStoreRecord>>>,
}

impl NeoStoreRecordCheck {
    pub fn new() -> Self {
        Self {
            fields: vec![Box::new(FirstProperty)],
        }
    }
}

impl Default for NeoStoreRecordCheck {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordCheck<NeoStoreRecord> for NeoStoreRecordCheck {
    fn check(
        &self,
        record: &NeoStoreRecord,
        engine: &mut CheckerEngine<'_, NeoStoreRecord>,
        _records: &dyn RecordAccess,
    ) -> Result<()> {
        check_fields(&self.fields, record, engine);
        Ok(())
    }

    fn check_change(
        &self,
        old: &NeoStoreRecord,
        new: &NeoStoreRecord,
        engine: &mut CheckerEngine<'_, NeoStoreRecord>,
        records: &dyn DiffRecordAccess,
    ) -> Result<()> {
        check_field_changes(&self.fields, old, new, engine, records)
    }
}
