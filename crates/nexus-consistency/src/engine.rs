//! Deferred and comparative check engine
//!
//! A checker inspects one record at a time. Whenever it needs another record
//! to judge a field (the relationship a node points at, the token a block
//! uses, ...) it does not read it inline: it queues a comparative check
//! through [`CheckerEngine::comparative_check`]. The queued entry is a
//! [`PendingCheck`]: a snapshot of the referring record plus a check value
//! that names the target id.
//!
//! Queued checks live in a [`PendingChecks`] arena. Resolving a slot takes
//! it, so a slot resolves at most once. Resolution may queue follow-up
//! checks into the same arena (dynamic label chains are walked that way).

use crate::access::RecordAccess;
use crate::checks::dynamic::DynamicCheck;
use crate::checks::group::GroupCheck;
use crate::checks::node::NodeCheck;
use crate::checks::primitive::NeoStoreCheck;
use crate::checks::property::PropertyCheck;
use crate::checks::relationship::RelationshipCheck;
use crate::checks::token::TokenCheck;
use crate::error::Result;
use crate::ownership::OwnerConflict;
use crate::report::{Inconsistency, InconsistencyReport, RecordKind};
use nexus_record::{
    DynamicRecord, DynamicStoreKind, NeoStoreRecord, NodeRecord, PropertyRecord, Record,
    RelationshipGroupRecord, RelationshipRecord, TokenKind, TokenRecord,
};
use std::fmt;

/// A record kind the checkers know how to report on and defer for
pub trait ConsistencyRecord: Record {
    /// Which store the record came from, when the kind alone does not say
    type Context: Copy + fmt::Debug + Send + Sync + 'static;
    type Violation: fmt::Debug + Clone + Send + 'static;
    type Check: ReferenceCheck<Self> + fmt::Debug + Clone + Send + Sync + 'static;

    fn inconsistency(
        context: Self::Context,
        record: Self,
        violation: Self::Violation,
    ) -> Inconsistency;

    fn pending(context: Self::Context, record: Self, check: Self::Check) -> PendingCheck;
}

/// A deferred check of a record against the record it references
pub trait ReferenceCheck<R: ConsistencyRecord> {
    /// Store and id of the referenced record
    fn target(&self, context: R::Context) -> (RecordKind, u64);

    /// Load the referenced record and judge the reference
    fn resolve(&self, engine: &mut CheckerEngine<'_, R>, records: &dyn RecordAccess)
    -> Result<()>;
}

/// Judges a reference from `R` to `T` once `T` has been loaded
pub trait ComparativeRecordChecker<R: ConsistencyRecord, T> {
    fn check_reference(
        &self,
        record: &R,
        referred: &T,
        engine: &mut CheckerEngine<'_, R>,
        records: &dyn RecordAccess,
    ) -> Result<()>;
}

/// Per-record handle given to checkers
pub struct CheckerEngine<'a, R: ConsistencyRecord> {
    context: R::Context,
    record: &'a R,
    report: &'a dyn InconsistencyReport,
    pending: &'a mut PendingChecks,
}

impl<'a, R: ConsistencyRecord> CheckerEngine<'a, R> {
    pub fn new(
        context: R::Context,
        record: &'a R,
        report: &'a dyn InconsistencyReport,
        pending: &'a mut PendingChecks,
    ) -> Self {
        Self {
            context,
            record,
            report,
            pending,
        }
    }

    /// The record findings are reported against
    pub fn record(&self) -> &'a R {
        self.record
    }

    pub fn context(&self) -> R::Context {
        self.context
    }

    /// Report a violation of the current record
    pub fn report(&mut self, violation: R::Violation) {
        self.report
            .report(R::inconsistency(self.context, self.record.clone(), violation));
    }

    /// Queue a check of the current record against a referenced record
    pub fn comparative_check(&mut self, check: R::Check) {
        self.pending
            .push(R::pending(self.context, self.record.clone(), check));
    }

    /// Queue an arbitrary pending check
    pub fn defer(&mut self, check: PendingCheck) {
        self.pending.push(check);
    }
}

/// A queued comparative check: referrer snapshot plus the check to run
#[derive(Debug, Clone)]
pub enum PendingCheck {
    Node {
        record: NodeRecord,
        check: NodeCheck,
    },
    Relationship {
        record: RelationshipRecord,
        check: RelationshipCheck,
    },
    RelationshipGroup {
        record: RelationshipGroupRecord,
        check: GroupCheck,
    },
    Property {
        record: PropertyRecord,
        check: PropertyCheck,
    },
    NeoStore {
        record: NeoStoreRecord,
        check: NeoStoreCheck,
    },
    Dynamic {
        store: DynamicStoreKind,
        record: DynamicRecord,
        check: DynamicCheck,
    },
    Token {
        token: TokenKind,
        record: TokenRecord,
        check: TokenCheck,
    },
    OwnerConflict(OwnerConflict),
}

impl PendingCheck {
    /// Store and id of the record this check reads, used to order passes
    pub fn target(&self) -> (RecordKind, u64) {
        match self {
            PendingCheck::Node { check, .. } => check.target(()),
            PendingCheck::Relationship { check, .. } => check.target(()),
            PendingCheck::RelationshipGroup { check, .. } => check.target(()),
            PendingCheck::Property { check, .. } => check.target(()),
            PendingCheck::NeoStore { check, .. } => check.target(()),
            PendingCheck::Dynamic { store, check, .. } => check.target(*store),
            PendingCheck::Token { token, check, .. } => check.target(*token),
            PendingCheck::OwnerConflict(conflict) => conflict.target(),
        }
    }

    /// Run the check, queueing any follow-ups into `follow_ups`
    pub fn resolve(
        &self,
        records: &dyn RecordAccess,
        report: &dyn InconsistencyReport,
        follow_ups: &mut PendingChecks,
    ) -> Result<()> {
        match self {
            PendingCheck::Node { record, check } => {
                resolve_with((), record, check, records, report, follow_ups)
            }
            PendingCheck::Relationship { record, check } => {
                resolve_with((), record, check, records, report, follow_ups)
            }
            PendingCheck::RelationshipGroup { record, check } => {
                resolve_with((), record, check, records, report, follow_ups)
            }
            PendingCheck::Property { record, check } => {
                resolve_with((), record, check, records, report, follow_ups)
            }
            PendingCheck::NeoStore { record, check } => {
                resolve_with((), record, check, records, report, follow_ups)
            }
            PendingCheck::Dynamic {
                store,
                record,
                check,
            } => resolve_with(*store, record, check, records, report, follow_ups),
            PendingCheck::Token {
                token,
                record,
                check,
            } => resolve_with(*token, record, check, records, report, follow_ups),
            PendingCheck::OwnerConflict(conflict) => conflict.resolve(records, report),
        }
    }
}

fn resolve_with<R: ConsistencyRecord>(
    context: R::Context,
    record: &R,
    check: &R::Check,
    records: &dyn RecordAccess,
    report: &dyn InconsistencyReport,
    follow_ups: &mut PendingChecks,
) -> Result<()> {
    let mut engine = CheckerEngine::new(context, record, report, follow_ups);
    check.resolve(&mut engine, records)
}

/// Index-addressed arena of queued checks
#[derive(Debug, Default)]
pub struct PendingChecks {
    slots: Vec<Option<PendingCheck>>,
    cursor: usize,
}

impl PendingChecks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a check, returning its slot
    pub fn push(&mut self, check: PendingCheck) -> usize {
        self.slots.push(Some(check));
        self.slots.len() - 1
    }

    /// Checks queued and not yet resolved
    pub fn outstanding(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.outstanding() == 0
    }

    /// Resolve one slot. Returns false if the slot was already resolved.
    pub fn resolve_slot(
        &mut self,
        index: usize,
        records: &dyn RecordAccess,
        report: &dyn InconsistencyReport,
    ) -> Result<bool> {
        let Some(check) = self.slots.get_mut(index).and_then(Option::take) else {
            return Ok(false);
        };
        check.resolve(records, report, self)?;
        Ok(true)
    }

    /// Resolve every queued check, follow-ups included
    pub fn drain(
        &mut self,
        records: &dyn RecordAccess,
        report: &dyn InconsistencyReport,
    ) -> Result<usize> {
        let mut resolved = 0;
        while self.cursor < self.slots.len() {
            let index = self.cursor;
            self.cursor += 1;
            if self.resolve_slot(index, records, report)? {
                resolved += 1;
            }
        }
        self.slots.clear();
        self.cursor = 0;
        Ok(resolved)
    }

    /// Hand the unresolved checks over, in queue order
    pub fn into_unresolved(self) -> Vec<PendingCheck> {
        self.slots.into_iter().flatten().collect()
    }
}
