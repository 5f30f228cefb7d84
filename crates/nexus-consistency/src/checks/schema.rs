//! Schema rule checks
//!
//! Schema rules are checked in two passes over the SCHEMA store. The first
//! pass loads every rule, checks the tokens it names, rejects rules with
//! duplicate content and records the obligations between uniqueness
//! constraints and their constraint indexes. The second pass checks that
//! every obligation is met from both sides.

use crate::access::RecordAccess;
use crate::error::Result;
use crate::report::{Inconsistency, InconsistencyReport, SchemaViolation};
use nexus_record::{
    DynamicRecord, DynamicStoreKind, RecordStore, SchemaEntity, SchemaRule, SchemaRuleError,
    SchemaRuleKind,
};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use tracing::debug;

/// Which pass a [`SchemaRecordCheck`] runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaCheckPhase {
    CheckRules,
    CheckObligations,
}

/// What makes two rules duplicates of each other
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct RuleContent {
    category: SchemaRuleKind,
    entity: SchemaEntity,
    property_key: u32,
}

impl RuleContent {
    fn of(rule: &SchemaRule) -> Self {
        // an index is an index whether or not a constraint owns it
        let category = match rule.kind() {
            SchemaRuleKind::ConstraintIndex => SchemaRuleKind::Index,
            other => other,
        };
        Self {
            category,
            entity: rule.entity(),
            property_key: rule.property_key(),
        }
    }
}

/// State carried from the rules pass to the obligations pass
#[derive(Debug, Default)]
pub struct SchemaRuleAccumulator {
    contents: HashMap<RuleContent, DynamicRecord>,
    /// constraint index id -> uniqueness constraint claiming it
    index_obligations: HashMap<u64, u64>,
    /// uniqueness constraint id -> constraint index claiming it
    constraint_obligations: HashMap<u64, u64>,
}

impl SchemaRuleAccumulator {
    pub fn rules(&self) -> usize {
        self.contents.len()
    }

    fn register_obligation(
        obligations: &mut HashMap<u64, u64>,
        target: u64,
        claimant: u64,
        records: &dyn RecordAccess,
        record: &DynamicRecord,
        report: &dyn InconsistencyReport,
    ) -> Result<()> {
        match obligations.entry(target) {
            Entry::Vacant(entry) => {
                entry.insert(claimant);
            }
            Entry::Occupied(entry) => {
                let other = records.dynamic(DynamicStoreKind::Schema, *entry.get())?;
                report_schema(report, record, SchemaViolation::DuplicateObligation(other));
            }
        }
        Ok(())
    }
}

fn report_schema(report: &dyn InconsistencyReport, record: &DynamicRecord, violation: SchemaViolation) {
    report.report(Inconsistency::Schema {
        record: record.clone(),
        violation,
    });
}

/// Two-pass checker of the SCHEMA store
pub struct SchemaRecordCheck {
    phase: SchemaCheckPhase,
    rules: SchemaRuleAccumulator,
}

impl SchemaRecordCheck {
    pub fn new() -> Self {
        Self {
            phase: SchemaCheckPhase::CheckRules,
            rules: SchemaRuleAccumulator::default(),
        }
    }

    pub fn phase(&self) -> SchemaCheckPhase {
        self.phase
    }

    pub fn accumulator(&self) -> &SchemaRuleAccumulator {
        &self.rules
    }

    /// Switch to the obligations pass, keeping what the rules pass collected
    pub fn for_obligations(self) -> Self {
        Self {
            phase: SchemaCheckPhase::CheckObligations,
            rules: self.rules,
        }
    }

    /// Check one SCHEMA record in the current phase
    pub fn check(
        &mut self,
        record: &DynamicRecord,
        records: &dyn RecordAccess,
        report: &dyn InconsistencyReport,
    ) -> Result<()> {
        if !record.in_use || !record.start_of_chain {
            return Ok(());
        }
        let rule = match records.schema_rule(record.id) {
            Ok(rule) => rule,
            Err(SchemaRuleError::Store(e)) => return Err(e.into()),
            Err(e) => {
                // reported once, in the rules pass
                if self.phase == SchemaCheckPhase::CheckRules {
                    report_schema(report, record, SchemaViolation::MalformedSchemaRule(e.to_string()));
                }
                return Ok(());
            }
        };
        match self.phase {
            SchemaCheckPhase::CheckRules => self.check_rule(record, &rule, records, report),
            SchemaCheckPhase::CheckObligations => {
                self.check_obligations(record, &rule, records, report)
            }
        }
    }

    fn check_rule(
        &mut self,
        record: &DynamicRecord,
        rule: &SchemaRule,
        records: &dyn RecordAccess,
        report: &dyn InconsistencyReport,
    ) -> Result<()> {
        match rule.entity() {
            SchemaEntity::Label(label) => {
                let token = records.label(u64::from(label))?;
                if !token.in_use {
                    report_schema(report, record, SchemaViolation::LabelNotInUse(token));
                }
            }
            SchemaEntity::RelationshipType(rel_type) => {
                let token = records.relationship_type(u64::from(rel_type))?;
                if !token.in_use {
                    report_schema(report, record, SchemaViolation::RelationshipTypeNotInUse(token));
                }
            }
        }
        let key = records.property_key(u64::from(rule.property_key()))?;
        if !key.in_use {
            report_schema(report, record, SchemaViolation::PropertyKeyNotInUse(key));
        }

        match self.rules.contents.entry(RuleContent::of(rule)) {
            Entry::Vacant(entry) => {
                entry.insert(record.clone());
            }
            Entry::Occupied(entry) => {
                report_schema(report, record, SchemaViolation::DuplicateRuleContent(entry.get().clone()));
            }
        }

        match rule {
            SchemaRule::Index {
                id,
                owning_constraint: Some(constraint),
                ..
            } => SchemaRuleAccumulator::register_obligation(
                &mut self.rules.constraint_obligations,
                *constraint,
                *id,
                records,
                record,
                report,
            ),
            SchemaRule::UniquenessConstraint {
                id, owned_index, ..
            } => SchemaRuleAccumulator::register_obligation(
                &mut self.rules.index_obligations,
                *owned_index,
                *id,
                records,
                record,
                report,
            ),
            _ => Ok(()),
        }
    }

    fn check_obligations(
        &mut self,
        record: &DynamicRecord,
        rule: &SchemaRule,
        records: &dyn RecordAccess,
        report: &dyn InconsistencyReport,
    ) -> Result<()> {
        match rule {
            SchemaRule::Index {
                id,
                owning_constraint: Some(constraint),
                ..
            } => match self.rules.index_obligations.get(id) {
                None => report_schema(
                    report,
                    record,
                    SchemaViolation::MissingObligation(SchemaRuleKind::UniquenessConstraint),
                ),
                Some(claimant) if claimant != constraint => {
                    let owner = records.dynamic(DynamicStoreKind::Schema, *constraint)?;
                    report_schema(
                        report,
                        record,
                        SchemaViolation::ConstraintIndexRuleNotReferencingBack(owner),
                    );
                }
                Some(_) => {}
            },
            SchemaRule::UniquenessConstraint {
                id, owned_index, ..
            } => match self.rules.constraint_obligations.get(id) {
                None => report_schema(
                    report,
                    record,
                    SchemaViolation::MissingObligation(SchemaRuleKind::ConstraintIndex),
                ),
                Some(claimant) if claimant != owned_index => {
                    let index = records.dynamic(DynamicStoreKind::Schema, *owned_index)?;
                    report_schema(
                        report,
                        record,
                        SchemaViolation::UniquenessConstraintNotReferencingBack(index),
                    );
                }
                Some(_) => {}
            },
            _ => {}
        }
        Ok(())
    }

    /// Run the current phase over every record of `store`
    pub fn check_store(
        &mut self,
        store: &dyn RecordStore<DynamicRecord>,
        records: &dyn RecordAccess,
        report: &dyn InconsistencyReport,
    ) -> Result<usize> {
        let mut checked = 0;
        for id in store.scan_range() {
            let record = store.get_record(id)?;
            if record.in_use && record.start_of_chain {
                self.check(&record, records, report)?;
                checked += 1;
            }
        }
        debug!(phase = ?self.phase, rules = checked, "schema pass complete");
        Ok(checked)
    }

    /// Both passes over `store`
    pub fn check_all(
        store: &dyn RecordStore<DynamicRecord>,
        records: &dyn RecordAccess,
        report: &dyn InconsistencyReport,
    ) -> Result<usize> {
        let mut rules = Self::new();
        let checked = rules.check_store(store, records, report)?;
        let mut obligations = rules.for_obligations();
        obligations.check_store(store, records, report)?;
        Ok(checked)
    }
}

impl Default for SchemaRecordCheck {
    fn default() -> Self {
        Self::new()
    }
}
