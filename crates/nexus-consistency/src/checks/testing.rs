//! Harness for the checker unit tests

use super::RecordCheck;
use crate::access::{ChangeSet, DiffStoreAccess, DirectRecordAccess};
use crate::engine::{CheckerEngine, ConsistencyRecord, PendingChecks};
use crate::report::CollectingReport;
use nexus_record::StoreSchemaRuleLoader;
use nexus_record::testing::StoreBuilder;
use std::sync::Arc;

pub(crate) fn direct(builder: &StoreBuilder) -> DirectRecordAccess {
    let stores = builder.access();
    let loader = Arc::new(StoreSchemaRuleLoader::new(stores.schema.clone()));
    DirectRecordAccess::new(stores, loader)
}

/// Check one record and resolve everything it queued
pub(crate) fn check_record<R, C>(
    builder: &StoreBuilder,
    checker: &C,
    context: R::Context,
    record: &R,
) -> CollectingReport
where
    R: ConsistencyRecord,
    C: RecordCheck<R>,
{
    let records = direct(builder);
    let report = CollectingReport::new();
    let mut pending = PendingChecks::new();
    let mut engine = CheckerEngine::new(context, record, &report, &mut pending);
    checker.check(record, &mut engine, &records).unwrap();
    pending.drain(&records, &report).unwrap();
    report
}

/// Check a change with `changes` overlaid on the builder's stores
pub(crate) fn check_change_with<R, C>(
    builder: &StoreBuilder,
    checker: &C,
    context: R::Context,
    old: &R,
    new: &R,
    changes: &ChangeSet,
) -> CollectingReport
where
    R: ConsistencyRecord,
    C: RecordCheck<R>,
{
    let base = direct(builder);
    let records = DiffStoreAccess::new(&base, changes);
    let report = CollectingReport::new();
    let mut pending = PendingChecks::new();
    let mut engine = CheckerEngine::new(context, new, &report, &mut pending);
    checker.check_change(old, new, &mut engine, &records).unwrap();
    pending.drain(&records, &report).unwrap();
    report
}
