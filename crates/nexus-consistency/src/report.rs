//! Inconsistency report model
//!
//! Every finding is an [`Inconsistency`]: the offending record, the store it
//! lives in and a violation from the per-kind violation enum. Violations carry
//! the other records involved so a report can be acted on without re-reading
//! the stores.

use nexus_record::{
    DynamicRecord, DynamicStoreKind, NeoStoreRecord, NodeRecord, PropertyBlock, PropertyRecord,
    Record, RelationshipGroupRecord, RelationshipRecord, SchemaRuleKind, TokenKind, TokenRecord,
};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::warn;

/// The store a record was read from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Node,
    Relationship,
    RelationshipGroup,
    Property,
    NeoStore,
    Token(TokenKind),
    Dynamic(DynamicStoreKind),
    Schema,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKind::Node => f.write_str("node"),
            RecordKind::Relationship => f.write_str("relationship"),
            RecordKind::RelationshipGroup => f.write_str("relationship_group"),
            RecordKind::Property => f.write_str("property"),
            RecordKind::NeoStore => f.write_str("neo_store"),
            RecordKind::Token(kind) => write!(f, "{kind}_token"),
            RecordKind::Dynamic(kind) => write!(f, "{kind}_dynamic"),
            RecordKind::Schema => f.write_str("schema"),
        }
    }
}

/// A record that owns a chain, as carried by multiple-owner findings
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnerRecord {
    Node(NodeRecord),
    Relationship(RelationshipRecord),
    NeoStore(NeoStoreRecord),
    Property(PropertyRecord),
    Token(TokenKind, TokenRecord),
    Dynamic(DynamicStoreKind, DynamicRecord),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeViolation {
    RelationshipNotInUse(RelationshipRecord),
    RelationshipForOtherNode(RelationshipRecord),
    RelationshipNotFirstInSourceChain(RelationshipRecord),
    RelationshipNotFirstInTargetChain(RelationshipRecord),
    RelationshipNotUpdated,
    RelationshipGroupNotInUse(RelationshipGroupRecord),
    RelationshipGroupHasOtherOwner(RelationshipGroupRecord),
    PropertyNotInUse(PropertyRecord),
    PropertyNotFirstInChain(PropertyRecord),
    PropertyNotUpdated,
    PropertyChainMultipleOwners(OwnerRecord),
    LabelNotInUse(TokenRecord),
    LabelsOutOfOrder { largest: u32, smallest: u32 },
    LabelDuplicate(u32),
    InvalidLabelField(u8),
    DynamicLabelRecordNotInUse(DynamicRecord),
    DynamicRecordChainCycle(DynamicRecord),
    DynamicLabelChainMalformed,
    DynamicLabelMultipleOwners(OwnerRecord),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipViolation {
    IllegalSourceNode,
    IllegalTargetNode,
    SourceNodeNotInUse(NodeRecord),
    TargetNodeNotInUse(NodeRecord),
    SourceNodeDoesNotReferenceBack(NodeRecord),
    TargetNodeDoesNotReferenceBack(NodeRecord),
    SourceNodeNotUpdated,
    TargetNodeNotUpdated,
    RelationshipTypeNotInUse(TokenRecord),
    SourcePrevNotInUse(RelationshipRecord),
    SourceNextNotInUse(RelationshipRecord),
    TargetPrevNotInUse(RelationshipRecord),
    TargetNextNotInUse(RelationshipRecord),
    SourcePrevReferencesOtherNodes(RelationshipRecord),
    SourceNextReferencesOtherNodes(RelationshipRecord),
    TargetPrevReferencesOtherNodes(RelationshipRecord),
    TargetNextReferencesOtherNodes(RelationshipRecord),
    SourcePrevDoesNotReferenceBack(RelationshipRecord),
    SourceNextDoesNotReferenceBack(RelationshipRecord),
    TargetPrevDoesNotReferenceBack(RelationshipRecord),
    TargetNextDoesNotReferenceBack(RelationshipRecord),
    SourcePrevNotUpdated,
    SourceNextNotUpdated,
    TargetPrevNotUpdated,
    TargetNextNotUpdated,
    PropertyNotInUse(PropertyRecord),
    PropertyNotFirstInChain(PropertyRecord),
    PropertyNotUpdated,
    PropertyChainMultipleOwners(OwnerRecord),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipGroupViolation {
    OwnerNotInUse(NodeRecord),
    NextGroupNotInUse(RelationshipGroupRecord),
    NextGroupHasOtherOwner(RelationshipGroupRecord),
    NextGroupTypeNotAscending(RelationshipGroupRecord),
    FirstOutgoingNotInUse(RelationshipRecord),
    FirstIncomingNotInUse(RelationshipRecord),
    FirstLoopNotInUse(RelationshipRecord),
    FirstOutgoingOfOtherNode(RelationshipRecord),
    FirstIncomingOfOtherNode(RelationshipRecord),
    FirstLoopOfOtherNode(RelationshipRecord),
    FirstOutgoingNotFirstInChain(RelationshipRecord),
    FirstIncomingNotFirstInChain(RelationshipRecord),
    FirstLoopNotFirstInChain(RelationshipRecord),
    FirstOutgoingOfOtherType(RelationshipRecord),
    FirstIncomingOfOtherType(RelationshipRecord),
    FirstLoopOfOtherType(RelationshipRecord),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyViolation {
    PrevNotInUse(PropertyRecord),
    NextNotInUse(PropertyRecord),
    PrevDoesNotReferenceBack(PropertyRecord),
    NextDoesNotReferenceBack(PropertyRecord),
    PrevNotUpdated,
    NextNotUpdated,
    KeyNotInUse {
        block: PropertyBlock,
        key: TokenRecord,
    },
    InvalidPropertyType(PropertyBlock),
    InvalidPropertyValue(PropertyBlock),
    ValueNotInUse {
        block: PropertyBlock,
        value: DynamicRecord,
    },
    ValueEmpty {
        block: PropertyBlock,
        value: DynamicRecord,
    },
    ValueUnreferencedButNotDeleted(PropertyBlock),
    ValueMultipleOwners(OwnerRecord),
    OrphanPropertyChain,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NeoStoreViolation {
    PropertyNotInUse(PropertyRecord),
    PropertyNotFirstInChain(PropertyRecord),
    PropertyNotUpdated,
    PropertyChainMultipleOwners(OwnerRecord),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DynamicViolation {
    EmptyBlock,
    InvalidLength { length: u32, block_size: usize },
    SelfReferentialNext,
    NextNotInUse(DynamicRecord),
    EmptyNextBlock(DynamicRecord),
    RecordNotFullReferencesNext,
    LabelOwnerNotInUse(NodeRecord),
    LabelOwnerDoesNotReferenceBack(NodeRecord),
    NextMultipleOwners(OwnerRecord),
    OrphanDynamicRecord,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenViolation {
    NameBlockNotInUse(DynamicRecord),
    EmptyName(DynamicRecord),
    NameMultipleOwners(OwnerRecord),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaViolation {
    MalformedSchemaRule(String),
    LabelNotInUse(TokenRecord),
    RelationshipTypeNotInUse(TokenRecord),
    PropertyKeyNotInUse(TokenRecord),
    DuplicateRuleContent(DynamicRecord),
    DuplicateObligation(DynamicRecord),
    MissingObligation(SchemaRuleKind),
    ConstraintIndexRuleNotReferencingBack(DynamicRecord),
    UniquenessConstraintNotReferencingBack(DynamicRecord),
}

/// One finding
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Inconsistency {
    Node {
        record: NodeRecord,
        violation: NodeViolation,
    },
    Relationship {
        record: RelationshipRecord,
        violation: RelationshipViolation,
    },
    RelationshipGroup {
        record: RelationshipGroupRecord,
        violation: RelationshipGroupViolation,
    },
    Property {
        record: PropertyRecord,
        violation: PropertyViolation,
    },
    NeoStore {
        record: NeoStoreRecord,
        violation: NeoStoreViolation,
    },
    Dynamic {
        store: DynamicStoreKind,
        record: DynamicRecord,
        violation: DynamicViolation,
    },
    Token {
        token: TokenKind,
        record: TokenRecord,
        violation: TokenViolation,
    },
    Schema {
        record: DynamicRecord,
        violation: SchemaViolation,
    },
}

/// Identity of a finding: where it is and what kind it is
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct InconsistencyKey {
    pub record_kind: RecordKind,
    pub record_id: u64,
    pub violation: String,
}

impl Inconsistency {
    pub fn record_kind(&self) -> RecordKind {
        match self {
            Inconsistency::Node { .. } => RecordKind::Node,
            Inconsistency::Relationship { .. } => RecordKind::Relationship,
            Inconsistency::RelationshipGroup { .. } => RecordKind::RelationshipGroup,
            Inconsistency::Property { .. } => RecordKind::Property,
            Inconsistency::NeoStore { .. } => RecordKind::NeoStore,
            Inconsistency::Dynamic { store, .. } => RecordKind::Dynamic(*store),
            Inconsistency::Token { token, .. } => RecordKind::Token(*token),
            Inconsistency::Schema { .. } => RecordKind::Schema,
        }
    }

    pub fn record_id(&self) -> u64 {
        match self {
            Inconsistency::Node { record, .. } => record.id(),
            Inconsistency::Relationship { record, .. } => record.id(),
            Inconsistency::RelationshipGroup { record, .. } => record.id(),
            Inconsistency::Property { record, .. } => record.id(),
            Inconsistency::NeoStore { record, .. } => record.id(),
            Inconsistency::Dynamic { record, .. } => record.id(),
            Inconsistency::Token { record, .. } => record.id(),
            Inconsistency::Schema { record, .. } => record.id(),
        }
    }

    /// Snake-case name of the violation variant
    pub fn violation_name(&self) -> String {
        let value = match self {
            Inconsistency::Node { violation, .. } => serde_json::to_value(violation),
            Inconsistency::Relationship { violation, .. } => serde_json::to_value(violation),
            Inconsistency::RelationshipGroup { violation, .. } => serde_json::to_value(violation),
            Inconsistency::Property { violation, .. } => serde_json::to_value(violation),
            Inconsistency::NeoStore { violation, .. } => serde_json::to_value(violation),
            Inconsistency::Dynamic { violation, .. } => serde_json::to_value(violation),
            Inconsistency::Token { violation, .. } => serde_json::to_value(violation),
            Inconsistency::Schema { violation, .. } => serde_json::to_value(violation),
        };
        match value {
            Ok(serde_json::Value::String(name)) => name,
            Ok(serde_json::Value::Object(map)) => map.keys().next().cloned().unwrap_or_default(),
            _ => String::from("unknown"),
        }
    }

    pub fn key(&self) -> InconsistencyKey {
        InconsistencyKey {
            record_kind: self.record_kind(),
            record_id: self.record_id(),
            violation: self.violation_name(),
        }
    }
}

impl fmt::Display for Inconsistency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}[{}]: {}",
            self.record_kind(),
            self.record_id(),
            self.violation_name()
        )
    }
}

/// Sink for findings
pub trait InconsistencyReport: Send + Sync {
    fn report(&self, inconsistency: Inconsistency);
}

/// Thread-safe collector of findings
#[derive(Debug, Default)]
pub struct CollectingReport {
    findings: Mutex<Vec<Inconsistency>>,
}

impl CollectingReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inconsistencies(&self) -> Vec<Inconsistency> {
        self.findings.lock().clone()
    }

    pub fn into_inner(self) -> Vec<Inconsistency> {
        self.findings.into_inner()
    }

    pub fn len(&self) -> usize {
        self.findings.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Distinct finding identities
    pub fn keys(&self) -> BTreeSet<InconsistencyKey> {
        self.findings.lock().iter().map(Inconsistency::key).collect()
    }

    /// Every finding identity, repeats included, in sorted order
    pub fn sorted_keys(&self) -> Vec<InconsistencyKey> {
        let mut keys: Vec<InconsistencyKey> =
            self.findings.lock().iter().map(Inconsistency::key).collect();
        keys.sort();
        keys
    }

    /// Number of findings with the given violation name
    pub fn count(&self, violation: &str) -> usize {
        self.findings
            .lock()
            .iter()
            .filter(|finding| finding.violation_name() == violation)
            .count()
    }
}

impl InconsistencyReport for CollectingReport {
    fn report(&self, inconsistency: Inconsistency) {
        self.findings.lock().push(inconsistency);
    }
}

/// Logs every finding as a `warn!` event
#[derive(Debug, Default)]
pub struct TracingReport {
    reported: AtomicUsize,
}

impl TracingReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reported(&self) -> usize {
        self.reported.load(Ordering::Relaxed)
    }
}

impl InconsistencyReport for TracingReport {
    fn report(&self, inconsistency: Inconsistency) {
        self.reported.fetch_add(1, Ordering::Relaxed);
        warn!(
            record_kind = %inconsistency.record_kind(),
            record_id = inconsistency.record_id(),
            violation = %inconsistency.violation_name(),
            "Inconsistency found"
        );
    }
}

/// Forwards to another sink, counting what passes through
pub(crate) struct CountingReport<'a> {
    inner: &'a dyn InconsistencyReport,
    count: AtomicUsize,
}

impl<'a> CountingReport<'a> {
    pub(crate) fn new(inner: &'a dyn InconsistencyReport) -> Self {
        Self {
            inner,
            count: AtomicUsize::new(0),
        }
    }

    pub(crate) fn count(&self) -> usize {
        self.count.load(Ordering::Relaxed)
    }
}

impl InconsistencyReport for CountingReport<'_> {
    fn report(&self, inconsistency: Inconsistency) {
        self.count.fetch_add(1, Ordering::Relaxed);
        self.inner.report(inconsistency);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node_finding(violation: NodeViolation) -> Inconsistency {
        Inconsistency::Node {
            record: NodeRecord::new(7),
            violation,
        }
    }

    #[test]
    fn test_violation_names() {
        assert_eq!(
            node_finding(NodeViolation::RelationshipNotUpdated).violation_name(),
            "relationship_not_updated"
        );
        assert_eq!(
            node_finding(NodeViolation::LabelDuplicate(3)).violation_name(),
            "label_duplicate"
        );
        assert_eq!(
            node_finding(NodeViolation::LabelsOutOfOrder {
                largest: 5,
                smallest: 3
            })
            .violation_name(),
            "labels_out_of_order"
        );
    }

    #[test]
    fn test_key_and_display() {
        let finding = Inconsistency::Dynamic {
            store: DynamicStoreKind::String,
            record: DynamicRecord::not_in_use(4),
            violation: DynamicViolation::EmptyBlock,
        };
        let key = finding.key();
        assert_eq!(key.record_kind, RecordKind::Dynamic(DynamicStoreKind::String));
        assert_eq!(key.record_id, 4);
        assert_eq!(finding.to_string(), "string_dynamic[4]: empty_block");
    }

    #[test]
    fn test_collecting_report() {
        let report = CollectingReport::new();
        report.report(node_finding(NodeViolation::LabelDuplicate(1)));
        report.report(node_finding(NodeViolation::LabelDuplicate(2)));
        report.report(node_finding(NodeViolation::DynamicLabelChainMalformed));
        assert_eq!(report.len(), 3);
        assert_eq!(report.count("label_duplicate"), 2);
        assert_eq!(report.keys().len(), 2);

        let keys = report.sorted_keys();
        assert_eq!(keys.len(), 3);
        assert_eq!(keys[1], keys[2]);
        assert!(keys.windows(2).all(|pair| pair[0] <= pair[1]));
    }

    #[test]
    fn test_counting_report_forwards() {
        let inner = CollectingReport::new();
        let counting = CountingReport::new(&inner);
        counting.report(node_finding(NodeViolation::PropertyNotUpdated));
        assert_eq!(counting.count(), 1);
        assert_eq!(inner.len(), 1);
    }

    #[test]
    fn test_tracing_report_counts() {
        let report = TracingReport::new();
        report.report(node_finding(NodeViolation::PropertyNotUpdated));
        assert_eq!(report.reported(), 1);
    }
}
