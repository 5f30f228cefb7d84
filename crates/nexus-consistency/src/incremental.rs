//! Incremental check of a change set
//!
//! Checks only the records a write touched. Every changed record is checked
//! against its previous image, and comparative checks read the new images of
//! other changed records through a [`DiffStoreAccess`].

use crate::access::{Change, ChangeSet, DiffStoreAccess, RecordAccess};
use crate::checks::RecordCheck;
use crate::decorator::Adapter;
use crate::engine::{CheckerEngine, ConsistencyRecord, PendingChecks};
use crate::error::Result;
use crate::processor::Checkers;
use crate::report::{CountingReport, InconsistencyReport};
use nexus_record::StoreAccess;
use tracing::debug;

/// Checks change sets against the stores they will be applied to
pub struct IncrementalCheck {
    checkers: Checkers,
}

impl IncrementalCheck {
    /// `stores` provides the store geometry (dynamic block sizes)
    pub fn new(stores: &StoreAccess) -> Self {
        Self {
            checkers: Checkers::new(stores, &Adapter),
        }
    }

    /// Check every record in `changes`; returns the number of findings
    pub fn check_diff(
        &self,
        base: &dyn RecordAccess,
        changes: &ChangeSet,
        report: &dyn InconsistencyReport,
    ) -> Result<usize> {
        let records = DiffStoreAccess::new(base, changes);
        let report = CountingReport::new(report);
        let mut pending = PendingChecks::new();
        let diff = Diff {
            records: &records,
            report: &report,
        };

        for change in changes.nodes.values() {
            diff.check(self.checkers.node.as_ref(), (), change, &mut pending)?;
        }
        for change in changes.relationships.values() {
            diff.check(self.checkers.relationship.as_ref(), (), change, &mut pending)?;
        }
        for change in changes.relationship_groups.values() {
            diff.check(
                self.checkers.relationship_group.as_ref(),
                (),
                change,
                &mut pending,
            )?;
        }
        for change in changes.properties.values() {
            diff.check(self.checkers.property.as_ref(), (), change, &mut pending)?;
        }
        if let Some(change) = &changes.neo_store {
            diff.check(self.checkers.neo_store.as_ref(), (), change, &mut pending)?;
        }
        for (&(kind, _), change) in &changes.tokens {
            diff.check(self.checkers.token(kind), kind, change, &mut pending)?;
        }
        for (&(kind, _), change) in &changes.dynamic {
            diff.check(self.checkers.dynamic(kind), kind, change, &mut pending)?;
        }

        debug!(
            changes = changes.len(),
            inconsistencies = report.count(),
            "change set checked"
        );
        Ok(report.count())
    }
}

struct Diff<'a> {
    records: &'a DiffStoreAccess<'a>,
    report: &'a dyn InconsistencyReport,
}

impl Diff<'_> {
    fn check<R: ConsistencyRecord>(
        &self,
        check: &dyn RecordCheck<R>,
        context: R::Context,
        change: &Change<R>,
        pending: &mut PendingChecks,
    ) -> Result<()> {
        let mut engine = CheckerEngine::new(context, &change.after, self.report, pending);
        check.check_change(&change.before, &change.after, &mut engine, self.records)?;
        pending.drain(self.records, self.report)?;
        Ok(())
    }
}
