//! Nexus Consistency - consistency checker for the Nexus record stores
//!
//! This crate provides:
//! - Field and composite checkers for every record kind
//! - A comparative check engine with deferred, arena-held pending checks
//! - Sequential and multi-pass (rayon) store processors
//! - Ownership tracking with an orphan sweep behind a scan-completed barrier
//! - The two-pass schema rule check
//! - An incremental check of change sets
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │      FullCheck / IncrementalCheck           │
//! └──────────────┬──────────────────────────────┘
//!                │
//! ┌──────────────┴──────────────────────────────┐
//! │   StoreProcessor (sequential, multi-pass)   │
//! └──────────────┬──────────────────────────────┘
//!                │
//! ┌──────────────┴──────────────────────────────┐
//! │  Decorators (ownership, tracing) + checkers │
//! └──────────────┬──────────────────────────────┘
//!                │
//! ┌──────────────┴──────────────────────────────┐
//! │   CheckerEngine + PendingChecks → report    │
//! └──────────────┬──────────────────────────────┘
//!                │
//! ┌──────────────┴──────────────────────────────┐
//! │        RecordAccess (direct, diff)          │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use nexus_consistency::{CheckConfig, CollectingReport, FullCheck};
//! use nexus_record::{MemoryStores, StoreSchemaRuleLoader};
//! use std::sync::Arc;
//!
//! let stores = MemoryStores::new().access();
//! let loader = Arc::new(StoreSchemaRuleLoader::new(stores.schema.clone()));
//! let report = CollectingReport::new();
//! let summary = FullCheck::new(CheckConfig::multi_pass()).execute(&stores, loader, &report)?;
//! assert!(summary.is_consistent());
//! # Ok::<(), nexus_consistency::ConsistencyError>(())
//! ```

#![warn(clippy::all)]

pub mod access;
pub mod checks;
pub mod config;
pub mod decorator;
pub mod engine;
pub mod error;
pub mod full_check;
pub mod incremental;
pub mod ownership;
pub mod processor;
pub mod report;

pub use access::{
    Change, ChangeSet, DiffRecordAccess, DiffStoreAccess, DirectRecordAccess, RecordAccess,
};
pub use checks::{RecordCheck, RecordField, SchemaCheckPhase, SchemaRecordCheck};
pub use config::{CheckConfig, CheckMode, OwnershipConfig};
pub use decorator::{Adapter, BoxedCheck, CheckDecorator, DecoratorChain, TracingDecorator};
pub use engine::{CheckerEngine, ConsistencyRecord, PendingCheck, PendingChecks};
pub use error::{ConsistencyError, Result};
pub use full_check::{CheckSummary, FullCheck};
pub use incremental::IncrementalCheck;
pub use ownership::{OwnerCheck, ScanCompleted};
pub use processor::{Checkers, ScanOutcome, Stage, StoreProcessor};
pub use report::{
    CollectingReport, DynamicViolation, Inconsistency, InconsistencyKey, InconsistencyReport,
    NeoStoreViolation, NodeViolation, OwnerRecord, PropertyViolation, RecordKind,
    RelationshipGroupViolation, RelationshipViolation, SchemaViolation, TokenViolation,
    TracingReport,
};
