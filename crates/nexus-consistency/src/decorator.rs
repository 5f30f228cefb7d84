//! Check decorators
//!
//! A decorator wraps the checker of each record kind before the scan
//! starts. Ownership tracking and execution tracing are both decorators, so
//! the plain checkers stay unaware of either.

use crate::access::{DiffRecordAccess, RecordAccess};
use crate::checks::RecordCheck;
use crate::engine::{CheckerEngine, ConsistencyRecord};
use crate::error::Result;
use nexus_record::{
    DynamicRecord, DynamicStoreKind, NeoStoreRecord, NodeRecord, PropertyRecord,
    RelationshipGroupRecord, RelationshipRecord, TokenKind, TokenRecord,
};
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::trace;

pub type BoxedCheck<R> = Box<dyn RecordCheck<R>>;

/// Wraps record checkers; every hook defaults to the identity
pub trait CheckDecorator: Send + Sync {
    fn decorate_node(&self, check: BoxedCheck<NodeRecord>) -> BoxedCheck<NodeRecord> {
        check
    }

    fn decorate_relationship(
        &self,
        check: BoxedCheck<RelationshipRecord>,
    ) -> BoxedCheck<RelationshipRecord> {
        check
    }

    fn decorate_relationship_group(
        &self,
        check: BoxedCheck<RelationshipGroupRecord>,
    ) -> BoxedCheck<RelationshipGroupRecord> {
        check
    }

    fn decorate_property(&self, check: BoxedCheck<PropertyRecord>) -> BoxedCheck<PropertyRecord> {
        check
    }

    fn decorate_neo_store(&self, check: BoxedCheck<NeoStoreRecord>) -> BoxedCheck<NeoStoreRecord> {
        check
    }

    fn decorate_dynamic(
        &self,
        _kind: DynamicStoreKind,
        check: BoxedCheck<DynamicRecord>,
    ) -> BoxedCheck<DynamicRecord> {
        check
    }

    fn decorate_token(
        &self,
        _kind: TokenKind,
        check: BoxedCheck<TokenRecord>,
    ) -> BoxedCheck<TokenRecord> {
        check
    }
}

/// Leaves every checker as it is
#[derive(Debug, Default, Clone, Copy)]
pub struct Adapter;

impl CheckDecorator for Adapter {}

/// Applies several decorators, first one innermost
#[derive(Default, Clone)]
pub struct DecoratorChain {
    decorators: Vec<Arc<dyn CheckDecorator>>,
}

impl DecoratorChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, decorator: Arc<dyn CheckDecorator>) -> Self {
        self.decorators.push(decorator);
        self
    }

    pub fn len(&self) -> usize {
        self.decorators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decorators.is_empty()
    }
}

impl CheckDecorator for DecoratorChain {
    fn decorate_node(&self, check: BoxedCheck<NodeRecord>) -> BoxedCheck<NodeRecord> {
        self.decorators
            .iter()
            .fold(check, |check, d| d.decorate_node(check))
    }

    fn decorate_relationship(
        &self,
        check: BoxedCheck<RelationshipRecord>,
    ) -> BoxedCheck<RelationshipRecord> {
        self.decorators
            .iter()
            .fold(check, |check, d| d.decorate_relationship(check))
    }

    fn decorate_relationship_group(
        &self,
        check: BoxedCheck<RelationshipGroupRecord>,
    ) -> BoxedCheck<RelationshipGroupRecord> {
        self.decorators
            .iter()
            .fold(check, |check, d| d.decorate_relationship_group(check))
    }

    fn decorate_property(&self, check: BoxedCheck<PropertyRecord>) -> BoxedCheck<PropertyRecord> {
        self.decorators
            .iter()
            .fold(check, |check, d| d.decorate_property(check))
    }

    fn decorate_neo_store(&self, check: BoxedCheck<NeoStoreRecord>) -> BoxedCheck<NeoStoreRecord> {
        self.decorators
            .iter()
            .fold(check, |check, d| d.decorate_neo_store(check))
    }

    fn decorate_dynamic(
        &self,
        kind: DynamicStoreKind,
        check: BoxedCheck<DynamicRecord>,
    ) -> BoxedCheck<DynamicRecord> {
        self.decorators
            .iter()
            .fold(check, |check, d| d.decorate_dynamic(kind, check))
    }

    fn decorate_token(
        &self,
        kind: TokenKind,
        check: BoxedCheck<TokenRecord>,
    ) -> BoxedCheck<TokenRecord> {
        self.decorators
            .iter()
            .fold(check, |check, d| d.decorate_token(kind, check))
    }
}

/// Logs every record handed to a checker at trace level
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingDecorator;

struct Traced<R> {
    inner: BoxedCheck<R>,
    store: &'static str,
    _record: PhantomData<fn(R)>,
}

impl<R: ConsistencyRecord> Traced<R> {
    fn boxed(inner: BoxedCheck<R>, store: &'static str) -> BoxedCheck<R> {
        Box::new(Self {
            inner,
            store,
            _record: PhantomData,
        })
    }
}

impl<R: ConsistencyRecord> RecordCheck<R> for Traced<R> {
    fn check(
        &self,
        record: &R,
        engine: &mut CheckerEngine<'_, R>,
        records: &dyn RecordAccess,
    ) -> Result<()> {
        trace!(store = self.store, id = record.id(), in_use = record.in_use(), "check record");
        self.inner.check(record, engine, records)
    }

    fn check_change(
        &self,
        old: &R,
        new: &R,
        engine: &mut CheckerEngine<'_, R>,
        records: &dyn DiffRecordAccess,
    ) -> Result<()> {
        trace!(store = self.store, id = new.id(), "check record change");
        self.inner.check_change(old, new, engine, records)
    }
}

impl CheckDecorator for TracingDecorator {
    fn decorate_node(&self, check: BoxedCheck<NodeRecord>) -> BoxedCheck<NodeRecord> {
        Traced::boxed(check, "node")
    }

    fn decorate_relationship(
        &self,
        check: BoxedCheck<RelationshipRecord>,
    ) -> BoxedCheck<RelationshipRecord> {
        Traced::boxed(check, "relationship")
    }

    fn decorate_relationship_group(
        &self,
        check: BoxedCheck<RelationshipGroupRecord>,
    ) -> BoxedCheck<RelationshipGroupRecord> {
        Traced::boxed(check, "relationship_group")
    }

    fn decorate_property(&self, check: BoxedCheck<PropertyRecord>) -> BoxedCheck<PropertyRecord> {
        Traced::boxed(check, "property")
    }

    fn decorate_neo_store(&self, check: BoxedCheck<NeoStoreRecord>) -> BoxedCheck<NeoStoreRecord> {
        Traced::boxed(check, "neo_store")
    }

    fn decorate_dynamic(
        &self,
        kind: DynamicStoreKind,
        check: BoxedCheck<DynamicRecord>,
    ) -> BoxedCheck<DynamicRecord> {
        Traced::boxed(check, kind.name())
    }

    fn decorate_token(
        &self,
        kind: TokenKind,
        check: BoxedCheck<TokenRecord>,
    ) -> BoxedCheck<TokenRecord> {
        Traced::boxed(check, kind.name())
    }
}
