//! Record checkers
//!
//! A composite checker ([`RecordCheck`]) is assembled from field checkers
//! ([`RecordField`]), each responsible for one field or field group of the
//! record. Fields with several roles (the two node ends of a relationship,
//! the four chain pointers, ...) are closed enums whose variants index a
//! table of accessors and violation constructors.

pub mod dynamic;
pub mod group;
pub mod node;
pub mod primitive;
pub mod property;
pub mod relationship;
pub mod schema;
pub mod token;

#[cfg(test)]
pub(crate) mod testing;

use crate::access::{DiffRecordAccess, RecordAccess};
use crate::engine::{CheckerEngine, ConsistencyRecord};
use crate::error::Result;

pub use dynamic::DynamicRecordCheck;
pub use group::RelationshipGroupRecordCheck;
pub use node::NodeRecordCheck;
pub use primitive::NeoStoreRecordCheck;
pub use property::PropertyRecordCheck;
pub use relationship::RelationshipRecordCheck;
pub use schema::{SchemaCheckPhase, SchemaRecordCheck, SchemaRuleAccumulator};
pub use token::TokenRecordCheck;

/// Checks one record kind
pub trait RecordCheck<R: ConsistencyRecord>: Send + Sync {
    /// Check a record on its own
    fn check(
        &self,
        record: &R,
        engine: &mut CheckerEngine<'_, R>,
        records: &dyn RecordAccess,
    ) -> Result<()>;

    /// Check a change from `old` to `new`
    fn check_change(
        &self,
        old: &R,
        new: &R,
        engine: &mut CheckerEngine<'_, R>,
        records: &dyn DiffRecordAccess,
    ) -> Result<()>;
}

impl<R: ConsistencyRecord> RecordCheck<R> for Box<dyn RecordCheck<R>> {
    fn check(
        &self,
        record: &R,
        engine: &mut CheckerEngine<'_, R>,
        records: &dyn RecordAccess,
    ) -> Result<()> {
        self.as_ref().check(record, engine, records)
    }

    fn check_change(
        &self,
        old: &R,
        new: &R,
        engine: &mut CheckerEngine<'_, R>,
        records: &dyn DiffRecordAccess,
    ) -> Result<()> {
        self.as_ref().check_change(old, new, engine, records)
    }
}

/// Checks one field (or role) of a record
pub trait RecordField<R: ConsistencyRecord>: Send + Sync {
    fn check_consistency(&self, record: &R, engine: &mut CheckerEngine<'_, R>);

    fn check_change(
        &self,
        _old: &R,
        _new: &R,
        _engine: &mut CheckerEngine<'_, R>,
        _records: &dyn DiffRecordAccess,
    ) -> Result<()> {
        Ok(())
    }
}

/// Composite checker: every field in order
pub(crate) fn check_fields<R: ConsistencyRecord>(
    fields: &[Box<dyn RecordField<R>>],
    record: &R,
    engine: &mut CheckerEngine<'_, R>,
) {
    if !record.in_use() {
        return;
    }
    for field in fields {
        field.check_consistency(record, engine);
    }
}

/// Composite change check: the new image in full, then every field's change rule
pub(crate) fn check_field_changes<R: ConsistencyRecord>(
    fields: &[Box<dyn RecordField<R>>],
    old: &R,
    new: &R,
    engine: &mut CheckerEngine<'_, R>,
    records: &dyn DiffRecordAccess,
) -> Result<()> {
    check_fields(fields, new, engine);
    for field in fields {
        field.check_change(old, new, engine, records)?;
    }
    Ok(())
}
