//! Store scanning
//!
//! The processor visits every record of every store in a fixed order:
//! nodes, relationships, the neo store, properties, the token stores, the
//! dynamic stores and finally relationship groups.
//!
//! In sequential mode the comparative checks a record queues are resolved
//! before the next record is read. In multi-pass mode each store is split
//! into batches that are checked in parallel; the queued checks are then
//! sorted by the record they read and resolved in parallel reference
//! passes until no follow-ups remain.

use crate::access::RecordAccess;
use crate::checks::{
    DynamicRecordCheck, NeoStoreRecordCheck, NodeRecordCheck, PropertyRecordCheck, RecordCheck,
    RelationshipGroupRecordCheck, RelationshipRecordCheck, TokenRecordCheck,
};
use crate::config::{CheckConfig, CheckMode};
use crate::decorator::{BoxedCheck, CheckDecorator};
use crate::engine::{CheckerEngine, ConsistencyRecord, PendingCheck, PendingChecks};
use crate::error::{ConsistencyError, Result};
use crate::ownership::ScanCompleted;
use crate::report::InconsistencyReport;
use nexus_record::{
    DynamicRecord, DynamicStoreKind, NeoStoreRecord, NodeRecord, PropertyRecord, RecordStore,
    RelationshipGroupRecord, RelationshipRecord, StoreAccess, TokenKind, TokenRecord,
};
use rayon::ThreadPoolBuilder;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::ops::Range;
use std::time::Instant;
use tracing::{debug, info};

/// The (decorated) checker of every record kind
pub struct Checkers {
    pub node: BoxedCheck<NodeRecord>,
    pub relationship: BoxedCheck<RelationshipRecord>,
    pub relationship_group: BoxedCheck<RelationshipGroupRecord>,
    pub property: BoxedCheck<PropertyRecord>,
    pub neo_store: BoxedCheck<NeoStoreRecord>,
    pub tokens: BTreeMap<TokenKind, BoxedCheck<TokenRecord>>,
    pub dynamic: BTreeMap<DynamicStoreKind, BoxedCheck<DynamicRecord>>,
}

impl Checkers {
    pub fn new(stores: &StoreAccess, decorator: &dyn CheckDecorator) -> Self {
        let tokens = TokenKind::ALL
            .into_iter()
            .map(|kind| {
                let check = decorator.decorate_token(kind, Box::new(TokenRecordCheck::new(kind)));
                (kind, check)
            })
            .collect();
        let dynamic = DynamicStoreKind::ALL
            .into_iter()
            .map(|kind| {
                let block_size = stores.dynamic(kind).block_size();
                let check = decorator
                    .decorate_dynamic(kind, Box::new(DynamicRecordCheck::new(kind, block_size)));
                (kind, check)
            })
            .collect();

        Self {
            node: decorator.decorate_node(Box::new(NodeRecordCheck::new())),
            relationship: decorator.decorate_relationship(Box::new(RelationshipRecordCheck::new())),
            relationship_group: decorator
                .decorate_relationship_group(Box::new(RelationshipGroupRecordCheck::new())),
            property: decorator.decorate_property(Box::new(PropertyRecordCheck::new())),
            neo_store: decorator.decorate_neo_store(Box::new(NeoStoreRecordCheck::new())),
            tokens,
            dynamic,
        }
    }

    pub fn token(&self, kind: TokenKind) -> &dyn RecordCheck<TokenRecord> {
        self.tokens[&kind].as_ref()
    }

    pub fn dynamic(&self, kind: DynamicStoreKind) -> &dyn RecordCheck<DynamicRecord> {
        self.dynamic[&kind].as_ref()
    }
}

/// One store scan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Nodes,
    Relationships,
    NeoStore,
    Properties,
    Tokens(TokenKind),
    Dynamic(DynamicStoreKind),
    RelationshipGroups,
}

impl Stage {
    /// Stages to run for `config`, in scan order
    pub fn plan(config: &CheckConfig) -> Vec<Stage> {
        let mut stages = Vec::new();
        if config.check_graph {
            stages.extend([Stage::Nodes, Stage::Relationships, Stage::NeoStore, Stage::Properties]);
        }
        if config.check_dynamic {
            stages.extend(TokenKind::ALL.into_iter().map(Stage::Tokens));
            stages.extend(DynamicStoreKind::ALL.into_iter().map(Stage::Dynamic));
        }
        if config.check_graph {
            stages.push(Stage::RelationshipGroups);
        }
        stages
    }
}

/// Result of a full scan
#[derive(Debug)]
pub struct ScanOutcome {
    pub records: usize,
    pub reference_passes: usize,
    pub completed: ScanCompleted,
}

/// Runs the record and reference passes
pub struct StoreProcessor<'a> {
    config: &'a CheckConfig,
    stores: &'a StoreAccess,
    records: &'a dyn RecordAccess,
    checkers: &'a Checkers,
    report: &'a dyn InconsistencyReport,
}

impl<'a> StoreProcessor<'a> {
    pub fn new(
        config: &'a CheckConfig,
        stores: &'a StoreAccess,
        records: &'a dyn RecordAccess,
        checkers: &'a Checkers,
        report: &'a dyn InconsistencyReport,
    ) -> Self {
        Self {
            config,
            stores,
            records,
            checkers,
            report,
        }
    }

    pub fn run(&self) -> Result<ScanOutcome> {
        let start = Instant::now();
        let stages = Stage::plan(self.config);
        let (records, reference_passes) = match self.config.mode {
            CheckMode::Sequential => (self.run_sequential(&stages)?, 0),
            CheckMode::MultiPass => self.run_multi_pass(&stages)?,
        };
        info!(
            mode = ?self.config.mode,
            records,
            reference_passes,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Record scan complete"
        );
        Ok(ScanOutcome {
            records,
            reference_passes,
            completed: ScanCompleted::new(),
        })
    }

    fn run_sequential(&self, stages: &[Stage]) -> Result<usize> {
        let mut pending = PendingChecks::new();
        let mut checked = 0;
        for &stage in stages {
            let range = self.stage_range(stage);
            let count = self.run_stage(stage, range, &mut pending, true)?;
            debug!(?stage, records = count, "store checked");
            checked += count;
        }
        Ok(checked)
    }

    fn run_multi_pass(&self, stages: &[Stage]) -> Result<(usize, usize)> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(self.config.worker_threads)
            .thread_name(|index| format!("consistency-{index}"))
            .build()
            .map_err(|e| ConsistencyError::thread_pool(e.to_string()))?;
        info!(threads = pool.current_num_threads(), "Starting multi-pass check");

        pool.install(|| {
            let mut checked = 0;
            let mut unresolved: Vec<PendingCheck> = Vec::new();
            for &stage in stages {
                let batches = split(self.stage_range(stage), self.config.batch_size);
                let queued = batches
                    .into_par_iter()
                    .map(|batch| -> Result<(usize, Vec<PendingCheck>)> {
                        let mut pending = PendingChecks::new();
                        let count = self.run_stage(stage, batch, &mut pending, false)?;
                        Ok((count, pending.into_unresolved()))
                    })
                    .collect::<Result<Vec<_>>>()?;
                for (count, checks) in queued {
                    checked += count;
                    unresolved.extend(checks);
                }
                debug!(?stage, queued = unresolved.len(), "store checked");
            }

            let passes = self.resolve_references(unresolved)?;
            Ok((checked, passes))
        })
    }

    /// Resolve queued checks in parallel until no follow-ups remain
    fn resolve_references(&self, mut unresolved: Vec<PendingCheck>) -> Result<usize> {
        let mut passes = 0;
        while !unresolved.is_empty() {
            passes += 1;
            unresolved.par_sort_by_key(PendingCheck::target);
            let resolved = unresolved.len();
            let follow_ups = unresolved
                .par_chunks(self.config.batch_size)
                .map(|chunk| -> Result<Vec<PendingCheck>> {
                    let mut follow_ups = PendingChecks::new();
                    for check in chunk {
                        check.resolve(self.records, self.report, &mut follow_ups)?;
                    }
                    Ok(follow_ups.into_unresolved())
                })
                .collect::<Result<Vec<_>>>()?;
            unresolved = follow_ups.into_iter().flatten().collect();
            info!(pass = passes, resolved, follow_ups = unresolved.len(), "Reference pass complete");
        }
        Ok(passes)
    }

    fn stage_range(&self, stage: Stage) -> Range<u64> {
        match stage {
            Stage::Nodes => self.stores.nodes.scan_range(),
            Stage::Relationships => self.stores.relationships.scan_range(),
            Stage::NeoStore => self.stores.neo_store.scan_range(),
            Stage::Properties => self.stores.properties.scan_range(),
            Stage::Tokens(kind) => self.stores.token(kind).scan_range(),
            Stage::Dynamic(kind) => self.stores.dynamic(kind).scan_range(),
            Stage::RelationshipGroups => self.stores.relationship_groups.scan_range(),
        }
    }

    fn run_stage(
        &self,
        stage: Stage,
        ids: Range<u64>,
        pending: &mut PendingChecks,
        drain_each: bool,
    ) -> Result<usize> {
        let scan = Scan {
            ids,
            records: self.records,
            report: self.report,
            drain_each,
        };
        let checkers = self.checkers;
        match stage {
            Stage::Nodes => scan.run(self.stores.nodes.as_ref(), checkers.node.as_ref(), (), pending),
            Stage::Relationships => scan.run(
                self.stores.relationships.as_ref(),
                checkers.relationship.as_ref(),
                (),
                pending,
            ),
            Stage::NeoStore => scan.run(
                self.stores.neo_store.as_ref(),
                checkers.neo_store.as_ref(),
                (),
                pending,
            ),
            Stage::Properties => scan.run(
                self.stores.properties.as_ref(),
                checkers.property.as_ref(),
                (),
                pending,
            ),
            Stage::Tokens(kind) => scan.run(
                self.stores.token(kind).as_ref(),
                checkers.token(kind),
                kind,
                pending,
            ),
            Stage::Dynamic(kind) => scan.run(
                self.stores.dynamic(kind).as_ref(),
                checkers.dynamic(kind),
                kind,
                pending,
            ),
            Stage::RelationshipGroups => scan.run(
                self.stores.relationship_groups.as_ref(),
                checkers.relationship_group.as_ref(),
                (),
                pending,
            ),
        }
    }
}

/// A range of ids of one store
struct Scan<'a> {
    ids: Range<u64>,
    records: &'a dyn RecordAccess,
    report: &'a dyn InconsistencyReport,
    drain_each: bool,
}

impl Scan<'_> {
    fn run<R: ConsistencyRecord>(
        self,
        store: &dyn RecordStore<R>,
        check: &dyn RecordCheck<R>,
        context: R::Context,
        pending: &mut PendingChecks,
    ) -> Result<usize> {
        let mut checked = 0;
        for id in self.ids {
            let record = store.get_record(id)?;
            let mut engine = CheckerEngine::new(context, &record, self.report, pending);
            check.check(&record, &mut engine, self.records)?;
            if self.drain_each {
                pending.drain(self.records, self.report)?;
            }
            checked += 1;
        }
        Ok(checked)
    }
}

/// Cut `range` into consecutive batches of at most `size` ids
fn split(range: Range<u64>, size: usize) -> Vec<Range<u64>> {
    let size = size.max(1) as u64;
    let mut batches = Vec::new();
    let mut start = range.start;
    while start < range.end {
        let end = range.end.min(start.saturating_add(size));
        batches.push(start..end);
        start = end;
    }
    batches
}
