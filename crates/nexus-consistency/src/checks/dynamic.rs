//! Dynamic record checks
//!
//! Every dynamic store (strings, arrays, names, node labels, schema) chains
//! fixed-size blocks. All but the last block of a chain must be full.

use super::{RecordCheck, RecordField, check_fields};
use crate::access::{DiffRecordAccess, RecordAccess};
use crate::engine::{CheckerEngine, ConsistencyRecord, PendingCheck, ReferenceCheck};
use crate::error::Result;
use crate::report::{DynamicViolation, Inconsistency, RecordKind};
use nexus_record::record::label_chain_owner;
use nexus_record::{DynamicRecord, DynamicStoreKind, NONE, Record};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DynamicCheck {
    Next(u64),
    /// Node named in the head block of a NODE_LABEL chain
    LabelOwner(u64),
}

impl ReferenceCheck<DynamicRecord> for DynamicCheck {
    fn target(&self, store: DynamicStoreKind) -> (RecordKind, u64) {
        match self {
            DynamicCheck::Next(id) => (RecordKind::Dynamic(store), *id),
            DynamicCheck::LabelOwner(id) => (RecordKind::Node, *id),
        }
    }

    fn resolve(
        &self,
        engine: &mut CheckerEngine<'_, DynamicRecord>,
        records: &dyn RecordAccess,
    ) -> Result<()> {
        match self {
            DynamicCheck::Next(id) => {
                let next = records.dynamic(engine.context(), *id)?;
                if !next.in_use {
                    engine.report(DynamicViolation::NextNotInUse(next));
                } else if next.length == 0 {
                    engine.report(DynamicViolation::EmptyNextBlock(next));
                }
            }
            DynamicCheck::LabelOwner(id) => {
                let node = records.node(*id)?;
                let head = engine.record().id();
                if !node.in_use {
                    engine.report(DynamicViolation::LabelOwnerNotInUse(node));
                } else if node.labels.dynamic_head() != Some(head) {
                    engine.report(DynamicViolation::LabelOwnerDoesNotReferenceBack(node));
                }
            }
        }
        Ok(())
    }
}

/// Length and next-block pointer of a block
struct Block {
    block_size: usize,
}

impl RecordField<DynamicRecord> for Block {
    fn check_consistency(&self, record: &DynamicRecord, engine: &mut CheckerEngine<'_, DynamicRecord>) {
        let length = record.length as usize;
        if length == 0 {
            engine.report(DynamicViolation::EmptyBlock);
        } else if length > self.block_size {
            engine.report(DynamicViolation::InvalidLength {
                length: record.length,
                block_size: self.block_size,
            });
        }

        if record.next_block == NONE {
            return;
        }
        if record.next_block == record.id {
            engine.report(DynamicViolation::SelfReferentialNext);
            return;
        }
        engine.comparative_check(DynamicCheck::Next(record.next_block));
        if length < self.block_size {
            engine.report(DynamicViolation::RecordNotFullReferencesNext);
        }
    }
}

/// Owner recorded in the head of a NODE_LABEL chain
struct LabelChainOwner;

impl RecordField<DynamicRecord> for LabelChainOwner {
    fn check_consistency(&self, record: &DynamicRecord, engine: &mut CheckerEngine<'_, DynamicRecord>) {
        if !record.start_of_chain {
            return;
        }
        let length = (record.length as usize).min(record.data.len());
        // short heads are reported by the owning node as malformed
        let Some(owner) = label_chain_owner(&record.data[..length]) else {
            return;
        };
        if owner != NONE {
            engine.comparative_check(DynamicCheck::LabelOwner(owner));
        }
    }
}

impl ConsistencyRecord for DynamicRecord {
    type Context = DynamicStoreKind;
    type Violation = DynamicViolation;
    type Check = DynamicCheck;

    fn inconsistency(
        store: DynamicStoreKind,
        record: Self,
        violation: DynamicViolation,
    ) -> Inconsistency {
        Inconsistency::Dynamic {
            store,
            record,
            violation,
        }
    }

    fn pending(store: DynamicStoreKind, record: Self, check: DynamicCheck) -> PendingCheck {
        PendingCheck::Dynamic {
            store,
            record,
            check,
        }
    }
}

/// Checker for the records of one dynamic store
pub struct DynamicRecordCheck {
    kind: DynamicStoreKind,
    fields: Vec<Box<dyn RecordField<DynamicRecord>>>,
}

impl DynamicRecordCheck {
    pub fn new(kind: DynamicStoreKind, block_size: usize) -> Self {
        let mut fields: Vec<Box<dyn RecordField<DynamicRecord>>> =
            vec![Box::new(Block { block_size })];
        if kind == DynamicStoreKind::NodeLabel {
            fields.push(Box::new(LabelChainOwner));
        }
        Self { kind, fields }
    }

    pub fn kind(&self) -> DynamicStoreKind {
        self.kind
    }
}

impl RecordCheck<DynamicRecord> for DynamicRecordCheck {
    fn check(
        &self,
        record: &DynamicRecord,
        engine: &mut CheckerEngine<'_, DynamicRecord>,
        _records: &dyn RecordAccess,
    ) -> Result<()> {
        check_fields(&self.fields, record, engine);
        Ok(())
    }

    /// Only the new image is checked; blocks freed by a change are judged
    /// from their referrers
    fn check_change(
        &self,
        _old: &DynamicRecord,
        new: &DynamicRecord,
        engine: &mut CheckerEngine<'_, DynamicRecord>,
        _records: &dyn DiffRecordAccess,
    ) -> Result<()> {
        check_fields(&self.fields, new, engine);
        Ok(())
    }
}
