//! Full store check
//!
//! Runs the record scan, the orphan sweep and the schema passes over a set of
//! stores and reports every finding to one sink.

use crate::access::DirectRecordAccess;
use crate::checks::SchemaRecordCheck;
use crate::config::CheckConfig;
use crate::decorator::{DecoratorChain, TracingDecorator};
use crate::error::Result;
use crate::ownership::OwnerCheck;
use crate::processor::{Checkers, StoreProcessor};
use crate::report::{CountingReport, InconsistencyReport};
use nexus_record::{SchemaRuleLoader, StoreAccess};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// Totals of one full check
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CheckSummary {
    /// Records handed to a checker
    pub records: usize,
    /// Parallel reference passes (0 in sequential mode)
    pub reference_passes: usize,
    /// Schema rules checked
    pub schema_rules: usize,
    /// Orphan chains found by the sweep
    pub orphans: usize,
    /// Findings reported, orphans and schema findings included
    pub inconsistencies: usize,
    pub elapsed_ms: u64,
}

impl CheckSummary {
    pub fn is_consistent(&self) -> bool {
        self.inconsistencies == 0
    }
}

/// Checks every store against every other
pub struct FullCheck {
    config: CheckConfig,
}

impl FullCheck {
    pub fn new(config: CheckConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CheckConfig {
        &self.config
    }

    pub fn execute(
        &self,
        stores: &StoreAccess,
        schema: Arc<dyn SchemaRuleLoader>,
        report: &dyn InconsistencyReport,
    ) -> Result<CheckSummary> {
        self.config.validate()?;
        let start = Instant::now();
        let records = DirectRecordAccess::new(stores.clone(), schema);
        let report = CountingReport::new(report);

        let owners = self
            .config
            .ownership
            .is_enabled()
            .then(|| OwnerCheck::new(&self.config.ownership));
        let mut decorators = DecoratorChain::new();
        if let Some(owners) = &owners {
            decorators = decorators.with(Arc::new(owners.clone()));
        }
        if self.config.trace_execution {
            decorators = decorators.with(Arc::new(TracingDecorator));
        }
        let checkers = Checkers::new(stores, &decorators);

        info!(
            mode = ?self.config.mode,
            decorators = decorators.len(),
            "Starting full consistency check"
        );
        let outcome =
            StoreProcessor::new(&self.config, stores, &records, &checkers, &report).run()?;

        let mut orphans = 0;
        if let Some(owners) = &owners {
            owners.mark_scan_complete(&outcome.completed);
            orphans = owners.sweep_orphans(&records, &report)?;
        }

        let mut schema_rules = 0;
        if self.config.check_schema {
            schema_rules = SchemaRecordCheck::check_all(stores.schema.as_ref(), &records, &report)?;
        }

        let summary = CheckSummary {
            records: outcome.records,
            reference_passes: outcome.reference_passes,
            schema_rules,
            orphans,
            inconsistencies: report.count(),
            elapsed_ms: start.elapsed().as_millis() as u64,
        };
        info!(
            records = summary.records,
            schema_rules = summary.schema_rules,
            orphans = summary.orphans,
            inconsistencies = summary.inconsistencies,
            elapsed_ms = summary.elapsed_ms,
            "Consistency check complete"
        );
        Ok(summary)
    }
}
