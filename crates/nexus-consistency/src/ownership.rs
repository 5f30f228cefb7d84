//! Chain ownership tracking
//!
//! Every property chain and every dynamic block must have exactly one owner:
//! a node, relationship or the neo store owns a property chain, a property
//! record owns its string and array values, a token owns its name, a node
//! owns its NODE_LABEL chain and a dynamic block owns the block after it.
//!
//! While the scan runs, [`OwnerCheck`] wraps the checkers and records
//! claims in concurrent maps. A second claim on the same chain is queued as
//! an [`OwnerConflict`] and resolved like any other comparative check.
//! Chain heads nobody claimed are swept as orphans once the scan is known
//! to be complete.

use crate::access::{DiffRecordAccess, RecordAccess};
use crate::checks::RecordCheck;
use crate::config::OwnershipConfig;
use crate::decorator::{BoxedCheck, CheckDecorator};
use crate::engine::{CheckerEngine, ConsistencyRecord, PendingCheck};
use crate::error::{ConsistencyError, Result};
use crate::report::{
    DynamicViolation, Inconsistency, InconsistencyReport, NeoStoreViolation, NodeViolation,
    OwnerRecord, PropertyViolation, RecordKind, RelationshipViolation, TokenViolation,
};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use nexus_record::{
    DynamicRecord, DynamicStoreKind, NONE, NeoStoreRecord, NodeRecord, PropertyRecord,
    RelationshipRecord, TokenKind, TokenRecord,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

/// A record that can own a chain. The derived order decides which of two
/// claimants keeps the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OwnerKey {
    Node(u64),
    Relationship(u64),
    NeoStore,
    Property(u64),
    Token(TokenKind, u64),
    Dynamic(DynamicStoreKind, u64),
}

impl OwnerKey {
    fn record_kind(self) -> (RecordKind, u64) {
        match self {
            OwnerKey::Node(id) => (RecordKind::Node, id),
            OwnerKey::Relationship(id) => (RecordKind::Relationship, id),
            OwnerKey::NeoStore => (RecordKind::NeoStore, 0),
            OwnerKey::Property(id) => (RecordKind::Property, id),
            OwnerKey::Token(kind, id) => (RecordKind::Token(kind), id),
            OwnerKey::Dynamic(kind, id) => (RecordKind::Dynamic(kind), id),
        }
    }

    fn load(self, records: &dyn RecordAccess) -> Result<OwnerRecord> {
        Ok(match self {
            OwnerKey::Node(id) => OwnerRecord::Node(records.node(id)?),
            OwnerKey::Relationship(id) => OwnerRecord::Relationship(records.relationship(id)?),
            OwnerKey::NeoStore => OwnerRecord::NeoStore(records.neo_store()?),
            OwnerKey::Property(id) => OwnerRecord::Property(records.property(id)?),
            OwnerKey::Token(kind, id) => OwnerRecord::Token(kind, records.token(kind, id)?),
            OwnerKey::Dynamic(kind, id) => OwnerRecord::Dynamic(kind, records.dynamic(kind, id)?),
        })
    }
}

/// A chain that can be owned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Claimed {
    /// Head of a property chain
    PropertyChain(u64),
    /// A dynamic record: a chain head or a block after another
    Dynamic(DynamicStoreKind, u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Claim {
    /// The record exists; nobody has claimed it yet
    Unclaimed,
    Owned(OwnerKey),
}

/// Two owners claim the same chain. Reported against `claimant`, naming
/// `first`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerConflict {
    pub claimed: Claimed,
    pub first: OwnerKey,
    pub claimant: OwnerKey,
}

impl OwnerConflict {
    pub fn target(&self) -> (RecordKind, u64) {
        self.first.record_kind()
    }

    pub fn resolve(&self, records: &dyn RecordAccess, report: &dyn InconsistencyReport) -> Result<()> {
        let first = self.first.load(records)?;
        let inconsistency = match self.claimant {
            OwnerKey::Node(id) => Inconsistency::Node {
                record: records.node(id)?,
                violation: match self.claimed {
                    Claimed::PropertyChain(_) => NodeViolation::PropertyChainMultipleOwners(first),
                    Claimed::Dynamic(..) => NodeViolation::DynamicLabelMultipleOwners(first),
                },
            },
            OwnerKey::Relationship(id) => Inconsistency::Relationship {
                record: records.relationship(id)?,
                violation: RelationshipViolation::PropertyChainMultipleOwners(first),
            },
            OwnerKey::NeoStore => Inconsistency::NeoStore {
                record: records.neo_store()?,
                violation: NeoStoreViolation::PropertyChainMultipleOwners(first),
            },
            OwnerKey::Property(id) => Inconsistency::Property {
                record: records.property(id)?,
                violation: PropertyViolation::ValueMultipleOwners(first),
            },
            OwnerKey::Token(token, id) => Inconsistency::Token {
                token,
                record: records.token(token, id)?,
                violation: TokenViolation::NameMultipleOwners(first),
            },
            OwnerKey::Dynamic(store, id) => Inconsistency::Dynamic {
                store,
                record: records.dynamic(store, id)?,
                violation: DynamicViolation::NextMultipleOwners(first),
            },
        };
        report.report(inconsistency);
        Ok(())
    }
}

/// Proof that every store has been scanned. Only the check driver makes one.
#[derive(Debug)]
pub struct ScanCompleted(());

impl ScanCompleted {
    pub(crate) fn new() -> Self {
        Self(())
    }
}

/// Claims recorded so far
struct OwnershipState {
    property_chains: Option<DashMap<u64, Claim>>,
    dynamic: HashMap<DynamicStoreKind, DashMap<u64, Claim>>,
    scan_complete: AtomicBool,
}

impl OwnershipState {
    fn map(&self, claimed: Claimed) -> Option<(&DashMap<u64, Claim>, u64)> {
        match claimed {
            Claimed::PropertyChain(id) => self.property_chains.as_ref().map(|map| (map, id)),
            Claimed::Dynamic(kind, id) => self.dynamic.get(&kind).map(|map| (map, id)),
        }
    }

    /// Note that `claimed` exists, without claiming it
    fn register(&self, claimed: Claimed) {
        if let Some((map, id)) = self.map(claimed) {
            map.entry(id).or_insert(Claim::Unclaimed);
        }
    }

    /// Claim `claimed` for `owner`. The smaller of two owners keeps the
    /// chain; the larger one is returned as the conflicting claimant.
    fn claim(&self, claimed: Claimed, owner: OwnerKey) -> Option<OwnerConflict> {
        let (map, id) = self.map(claimed)?;
        match map.entry(id) {
            Entry::Vacant(entry) => {
                entry.insert(Claim::Owned(owner));
                None
            }
            Entry::Occupied(mut entry) => {
                let current = *entry.get();
                match current {
                    Claim::Unclaimed => {
                        entry.insert(Claim::Owned(owner));
                        None
                    }
                    Claim::Owned(existing) if existing == owner => None,
                    Claim::Owned(existing) => {
                        let (first, claimant) = if owner < existing {
                            entry.insert(Claim::Owned(owner));
                            (owner, existing)
                        } else {
                            (existing, owner)
                        };
                        Some(OwnerConflict {
                            claimed,
                            first,
                            claimant,
                        })
                    }
                }
            }
        }
    }
}

/// Ownership tracking decorator
#[derive(Clone)]
pub struct OwnerCheck {
    state: Arc<OwnershipState>,
}

impl OwnerCheck {
    pub fn new(config: &OwnershipConfig) -> Self {
        let dynamic = config
            .dynamic_chains
            .iter()
            .map(|kind| (*kind, DashMap::new()))
            .collect();
        Self {
            state: Arc::new(OwnershipState {
                property_chains: config.property_chains.then(DashMap::new),
                dynamic,
                scan_complete: AtomicBool::new(false),
            }),
        }
    }

    pub fn mark_scan_complete(&self, _token: &ScanCompleted) {
        self.state.scan_complete.store(true, Ordering::Release);
    }

    /// Report every chain head nobody claimed. Fails unless the scan was
    /// marked complete, since an unfinished scan leaves owners unseen.
    pub fn sweep_orphans(
        &self,
        records: &dyn RecordAccess,
        report: &dyn InconsistencyReport,
    ) -> Result<usize> {
        if !self.state.scan_complete.load(Ordering::Acquire) {
            return Err(ConsistencyError::ScanIncomplete);
        }

        let mut orphans = 0;
        if let Some(map) = &self.state.property_chains {
            for id in unclaimed(map) {
                map.remove(&id);
                report.report(Inconsistency::Property {
                    record: records.property(id)?,
                    violation: PropertyViolation::OrphanPropertyChain,
                });
                orphans += 1;
            }
        }

        let mut kinds: Vec<_> = self.state.dynamic.keys().copied().collect();
        kinds.sort();
        for kind in kinds {
            let Some(map) = self.state.dynamic.get(&kind) else {
                continue;
            };
            for id in unclaimed(map) {
                map.remove(&id);
                report.report(Inconsistency::Dynamic {
                    store: kind,
                    record: records.dynamic(kind, id)?,
                    violation: DynamicViolation::OrphanDynamicRecord,
                });
                orphans += 1;
            }
        }
        info!(orphans, "Orphan sweep complete");
        Ok(orphans)
    }

    fn wrap<R: ClaimingRecord>(&self, inner: BoxedCheck<R>) -> BoxedCheck<R> {
        Box::new(Owned {
            inner,
            state: self.state.clone(),
        })
    }
}

fn unclaimed(map: &DashMap<u64, Claim>) -> Vec<u64> {
    let mut ids: Vec<u64> = map
        .iter()
        .filter(|entry| *entry.value() == Claim::Unclaimed)
        .map(|entry| *entry.key())
        .collect();
    ids.sort_unstable();
    ids
}

/// Record kinds that own or are owned
trait ClaimingRecord: ConsistencyRecord {
    fn claim(&self, context: Self::Context, state: &OwnershipState, engine: &mut CheckerEngine<'_, Self>);
}

fn claim_into<R: ConsistencyRecord>(
    state: &OwnershipState,
    claimed: Claimed,
    owner: OwnerKey,
    engine: &mut CheckerEngine<'_, R>,
) {
    if let Some(conflict) = state.claim(claimed, owner) {
        debug!(?conflict, "chain claimed twice");
        engine.defer(PendingCheck::OwnerConflict(conflict));
    }
}

fn claim_property_chain<R: ConsistencyRecord>(
    state: &OwnershipState,
    head: u64,
    owner: OwnerKey,
    engine: &mut CheckerEngine<'_, R>,
) {
    if head != NONE {
        claim_into(state, Claimed::PropertyChain(head), owner, engine);
    }
}

impl ClaimingRecord for NodeRecord {
    fn claim(&self, _context: (), state: &OwnershipState, engine: &mut CheckerEngine<'_, Self>) {
        let owner = OwnerKey::Node(self.id);
        claim_property_chain(state, self.next_prop, owner, engine);
        if let Some(head) = self.labels.dynamic_head() {
            claim_into(state, Claimed::Dynamic(DynamicStoreKind::NodeLabel, head), owner, engine);
        }
    }
}

impl ClaimingRecord for RelationshipRecord {
    fn claim(&self, _context: (), state: &OwnershipState, engine: &mut CheckerEngine<'_, Self>) {
        claim_property_chain(state, self.next_prop, OwnerKey::Relationship(self.id), engine);
    }
}

impl ClaimingRecord for NeoStoreRecord {
    fn claim(&self, _context: (), state: &OwnershipState, engine: &mut CheckerEngine<'_, Self>) {
        claim_property_chain(state, self.next_prop, OwnerKey::NeoStore, engine);
    }
}

impl ClaimingRecord for PropertyRecord {
    fn claim(&self, _context: (), state: &OwnershipState, engine: &mut CheckerEngine<'_, Self>) {
        if self.prev_prop == NONE {
            state.register(Claimed::PropertyChain(self.id));
        }
        for (kind, head) in self.value_chains() {
            claim_into(state, Claimed::Dynamic(kind, head), OwnerKey::Property(self.id), engine);
        }
    }
}

impl ClaimingRecord for TokenRecord {
    fn claim(&self, kind: TokenKind, state: &OwnershipState, engine: &mut CheckerEngine<'_, Self>) {
        if self.name_id != NONE {
            let claimed = Claimed::Dynamic(kind.name_store(), self.name_id);
            claim_into(state, claimed, OwnerKey::Token(kind, self.id), engine);
        }
    }
}

impl ClaimingRecord for DynamicRecord {
    fn claim(
        &self,
        kind: DynamicStoreKind,
        state: &OwnershipState,
        engine: &mut CheckerEngine<'_, Self>,
    ) {
        // schema rules are owned by the schema itself
        if !(kind == DynamicStoreKind::Schema && self.start_of_chain) {
            state.register(Claimed::Dynamic(kind, self.id));
        }
        if self.next_block != NONE && self.next_block != self.id {
            claim_into(
                state,
                Claimed::Dynamic(kind, self.next_block),
                OwnerKey::Dynamic(kind, self.id),
                engine,
            );
        }
    }
}

/// A checker that also records the claims of each in-use record
struct Owned<R> {
    inner: BoxedCheck<R>,
    state: Arc<OwnershipState>,
}

impl<R: ClaimingRecord> RecordCheck<R> for Owned<R> {
    fn check(
        &self,
        record: &R,
        engine: &mut CheckerEngine<'_, R>,
        records: &dyn RecordAccess,
    ) -> Result<()> {
        self.inner.check(record, engine, records)?;
        if record.in_use() {
            record.claim(engine.context(), &self.state, engine);
        }
        Ok(())
    }

    fn check_change(
        &self,
        old: &R,
        new: &R,
        engine: &mut CheckerEngine<'_, R>,
        records: &dyn DiffRecordAccess,
    ) -> Result<()> {
        self.inner.check_change(old, new, engine, records)
    }
}

impl CheckDecorator for OwnerCheck {
    fn decorate_node(&self, check: BoxedCheck<NodeRecord>) -> BoxedCheck<NodeRecord> {
        self.wrap(check)
    }

    fn decorate_relationship(
        &self,
        check: BoxedCheck<RelationshipRecord>,
    ) -> BoxedCheck<RelationshipRecord> {
        self.wrap(check)
    }

    fn decorate_property(&self, check: BoxedCheck<PropertyRecord>) -> BoxedCheck<PropertyRecord> {
        self.wrap(check)
    }

    fn decorate_neo_store(&self, check: BoxedCheck<NeoStoreRecord>) -> BoxedCheck<NeoStoreRecord> {
        self.wrap(check)
    }

    fn decorate_dynamic(
        &self,
        kind: DynamicStoreKind,
        check: BoxedCheck<DynamicRecord>,
    ) -> BoxedCheck<DynamicRecord> {
        if self.state.dynamic.contains_key(&kind) {
            self.wrap(check)
        } else {
            check
        }
    }

    fn decorate_token(
        &self,
        _kind: TokenKind,
        check: BoxedCheck<TokenRecord>,
    ) -> BoxedCheck<TokenRecord> {
        self.wrap(check)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::testing::direct;
    use crate::report::CollectingReport;
    use nexus_record::testing::{Owner, StoreBuilder, Value};

    fn tracker() -> OwnerCheck {
        OwnerCheck::new(&OwnershipConfig::default())
    }

    #[test]
    fn test_first_claim_wins_smaller_key() {
        let check = tracker();
        let claimed = Claimed::PropertyChain(3);
        assert!(check.state.claim(claimed, OwnerKey::Relationship(1)).is_none());
        assert!(check.state.claim(claimed, OwnerKey::Relationship(1)).is_none());

        let conflict = check.state.claim(claimed, OwnerKey::Node(9)).unwrap();
        assert_eq!(conflict.first, OwnerKey::Node(9));
        assert_eq!(conflict.claimant, OwnerKey::Relationship(1));

        let conflict = check.state.claim(claimed, OwnerKey::NeoStore).unwrap();
        assert_eq!(conflict.first, OwnerKey::Node(9));
        assert_eq!(conflict.claimant, OwnerKey::NeoStore);
    }

    #[test]
    fn test_untracked_chains_are_ignored() {
        let check = OwnerCheck::new(&OwnershipConfig::disabled());
        assert!(check.state.claim(Claimed::PropertyChain(1), OwnerKey::Node(1)).is_none());
        assert!(check.state.claim(Claimed::PropertyChain(1), OwnerKey::Node(2)).is_none());
    }

    #[test]
    fn test_sweep_requires_complete_scan() {
        let builder = StoreBuilder::new();
        let check = tracker();
        let err = check
            .sweep_orphans(&direct(&builder), &CollectingReport::new())
            .unwrap_err();
        assert!(matches!(err, ConsistencyError::ScanIncomplete));
    }

    #[test]
    fn test_sweep_reports_unclaimed_heads_once() {
        let mut builder = StoreBuilder::new();
        let key = builder.property_key("k");
        let node = builder.create_node();
        let head = builder.set_properties(Owner::Node(node), &[(key, Value::Long(1))]);
        builder.stores().nodes.update(node, |n| n.next_prop = NONE);

        let check = tracker();
        check.state.register(Claimed::PropertyChain(head));
        check.mark_scan_complete(&ScanCompleted::new());

        let report = CollectingReport::new();
        let records = direct(&builder);
        assert_eq!(check.sweep_orphans(&records, &report).unwrap(), 1);
        assert_eq!(report.count("orphan_property_chain"), 1);
        assert_eq!(check.sweep_orphans(&records, &report).unwrap(), 0);
    }

    #[test]
    fn test_conflict_resolves_against_claimant() {
        let mut builder = StoreBuilder::new();
        let key = builder.property_key("k");
        let a = builder.create_node();
        let b = builder.create_node();
        let head = builder.set_properties(Owner::Node(a), &[(key, Value::Long(1))]);
        builder.stores().nodes.update(b, |n| n.next_prop = head);

        let conflict = OwnerConflict {
            claimed: Claimed::PropertyChain(head),
            first: OwnerKey::Node(a),
            claimant: OwnerKey::Node(b),
        };
        assert_eq!(conflict.target(), (RecordKind::Node, a));
        let report = CollectingReport::new();
        conflict.resolve(&direct(&builder), &report).unwrap();
        let findings = report.inconsistencies();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].record_id(), b);
        assert_eq!(findings[0].violation_name(), "property_chain_multiple_owners");
    }
}
