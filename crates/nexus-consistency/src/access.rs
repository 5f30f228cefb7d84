//! Record access for the checkers
//!
//! Checkers never touch the stores directly. [`RecordAccess`] serves one
//! lookup per record kind; [`DiffRecordAccess`] adds change-set lookups for
//! the incremental check. Lookups of `NONE` are caller bugs.

use crate::error::Result;
use nexus_record::{
    DynamicRecord, DynamicStoreKind, NONE, NeoStoreRecord, NodeRecord, PropertyRecord,
    RelationshipGroupRecord, RelationshipRecord, SchemaRule, SchemaRuleError, SchemaRuleLoader,
    StoreAccess, TokenKind, TokenRecord,
};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Lookup of every record kind
pub trait RecordAccess: Send + Sync {
    fn node(&self, id: u64) -> Result<NodeRecord>;

    fn relationship(&self, id: u64) -> Result<RelationshipRecord>;

    fn relationship_group(&self, id: u64) -> Result<RelationshipGroupRecord>;

    fn property(&self, id: u64) -> Result<PropertyRecord>;

    fn token(&self, kind: TokenKind, id: u64) -> Result<TokenRecord>;

    fn dynamic(&self, kind: DynamicStoreKind, id: u64) -> Result<DynamicRecord>;

    fn neo_store(&self) -> Result<NeoStoreRecord>;

    fn schema_rule(&self, id: u64) -> std::result::Result<SchemaRule, SchemaRuleError>;

    fn label(&self, id: u64) -> Result<TokenRecord> {
        self.token(TokenKind::Label, id)
    }

    fn property_key(&self, id: u64) -> Result<TokenRecord> {
        self.token(TokenKind::PropertyKey, id)
    }

    fn relationship_type(&self, id: u64) -> Result<TokenRecord> {
        self.token(TokenKind::RelationshipType, id)
    }

    fn string(&self, id: u64) -> Result<DynamicRecord> {
        self.dynamic(DynamicStoreKind::String, id)
    }

    fn array(&self, id: u64) -> Result<DynamicRecord> {
        self.dynamic(DynamicStoreKind::Array, id)
    }

    fn node_labels(&self, id: u64) -> Result<DynamicRecord> {
        self.dynamic(DynamicStoreKind::NodeLabel, id)
    }
}

/// Record access that also knows which records a change touched
///
/// The `changed_*` lookups return the new version when the id is part of
/// the change set and `None` otherwise.
pub trait DiffRecordAccess: RecordAccess {
    fn changed_node(&self, id: u64) -> Option<NodeRecord>;

    fn changed_relationship(&self, id: u64) -> Option<RelationshipRecord>;

    fn changed_relationship_group(&self, id: u64) -> Option<RelationshipGroupRecord>;

    fn changed_property(&self, id: u64) -> Option<PropertyRecord>;

    fn changed_dynamic(&self, kind: DynamicStoreKind, id: u64) -> Option<DynamicRecord>;

    fn changed_string(&self, id: u64) -> Option<DynamicRecord> {
        self.changed_dynamic(DynamicStoreKind::String, id)
    }

    fn changed_array(&self, id: u64) -> Option<DynamicRecord> {
        self.changed_dynamic(DynamicStoreKind::Array, id)
    }
}

/// Reads straight from the stores
pub struct DirectRecordAccess {
    stores: StoreAccess,
    schema: Arc<dyn SchemaRuleLoader>,
}

impl DirectRecordAccess {
    pub fn new(stores: StoreAccess, schema: Arc<dyn SchemaRuleLoader>) -> Self {
        Self { stores, schema }
    }

    pub fn stores(&self) -> &StoreAccess {
        &self.stores
    }
}

impl RecordAccess for DirectRecordAccess {
    fn node(&self, id: u64) -> Result<NodeRecord> {
        debug_assert_ne!(id, NONE, "node lookup of NONE");
        Ok(self.stores.nodes.get_record(id)?)
    }

    fn relationship(&self, id: u64) -> Result<RelationshipRecord> {
        debug_assert_ne!(id, NONE, "relationship lookup of NONE");
        Ok(self.stores.relationships.get_record(id)?)
    }

    fn relationship_group(&self, id: u64) -> Result<RelationshipGroupRecord> {
        debug_assert_ne!(id, NONE, "relationship group lookup of NONE");
        Ok(self.stores.relationship_groups.get_record(id)?)
    }

    fn property(&self, id: u64) -> Result<PropertyRecord> {
        debug_assert_ne!(id, NONE, "property lookup of NONE");
        Ok(self.stores.properties.get_record(id)?)
    }

    fn token(&self, kind: TokenKind, id: u64) -> Result<TokenRecord> {
        debug_assert_ne!(id, NONE, "{kind} token lookup of NONE");
        Ok(self.stores.token(kind).get_record(id)?)
    }

    fn dynamic(&self, kind: DynamicStoreKind, id: u64) -> Result<DynamicRecord> {
        debug_assert_ne!(id, NONE, "{kind} record lookup of NONE");
        Ok(self.stores.dynamic(kind).get_record(id)?)
    }

    fn neo_store(&self) -> Result<NeoStoreRecord> {
        Ok(self.stores.neo_store.get_record(0)?)
    }

    fn schema_rule(&self, id: u64) -> std::result::Result<SchemaRule, SchemaRuleError> {
        self.schema.load_single_schema_rule(id)
    }
}

/// Before and after images of one record
#[derive(Debug, Clone, PartialEq)]
pub struct Change<R> {
    pub before: R,
    pub after: R,
}

/// Records touched by a write, with their before and after images
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    pub nodes: BTreeMap<u64, Change<NodeRecord>>,
    pub relationships: BTreeMap<u64, Change<RelationshipRecord>>,
    pub relationship_groups: BTreeMap<u64, Change<RelationshipGroupRecord>>,
    pub properties: BTreeMap<u64, Change<PropertyRecord>>,
    pub neo_store: Option<Change<NeoStoreRecord>>,
    pub tokens: BTreeMap<(TokenKind, u64), Change<TokenRecord>>,
    pub dynamic: BTreeMap<(DynamicStoreKind, u64), Change<DynamicRecord>>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn change_node(&mut self, before: NodeRecord, after: NodeRecord) {
        self.nodes.insert(after.id, Change { before, after });
    }

    pub fn change_relationship(&mut self, before: RelationshipRecord, after: RelationshipRecord) {
        self.relationships.insert(after.id, Change { before, after });
    }

    pub fn change_relationship_group(
        &mut self,
        before: RelationshipGroupRecord,
        after: RelationshipGroupRecord,
    ) {
        self.relationship_groups
            .insert(after.id, Change { before, after });
    }

    pub fn change_property(&mut self, before: PropertyRecord, after: PropertyRecord) {
        self.properties.insert(after.id, Change { before, after });
    }

    pub fn change_neo_store(&mut self, before: NeoStoreRecord, after: NeoStoreRecord) {
        self.neo_store = Some(Change { before, after });
    }

    pub fn change_token(&mut self, kind: TokenKind, before: TokenRecord, after: TokenRecord) {
        self.tokens.insert((kind, after.id), Change { before, after });
    }

    pub fn change_dynamic(
        &mut self,
        kind: DynamicStoreKind,
        before: DynamicRecord,
        after: DynamicRecord,
    ) {
        self.dynamic.insert((kind, after.id), Change { before, after });
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
            + self.relationships.len()
            + self.relationship_groups.len()
            + self.properties.len()
            + usize::from(self.neo_store.is_some())
            + self.tokens.len()
            + self.dynamic.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Overlays a change set on a base access: changed ids read as their new image
pub struct DiffStoreAccess<'a> {
    base: &'a dyn RecordAccess,
    changes: &'a ChangeSet,
}

impl<'a> DiffStoreAccess<'a> {
    pub fn new(base: &'a dyn RecordAccess, changes: &'a ChangeSet) -> Self {
        Self { base, changes }
    }
}

impl RecordAccess for DiffStoreAccess<'_> {
    fn node(&self, id: u64) -> Result<NodeRecord> {
        match self.changed_node(id) {
            Some(record) => Ok(record),
            None => self.base.node(id),
        }
    }

    fn relationship(&self, id: u64) -> Result<RelationshipRecord> {
        match self.changed_relationship(id) {
            Some(record) => Ok(record),
            None => self.base.relationship(id),
        }
    }

    fn relationship_group(&self, id: u64) -> Result<RelationshipGroupRecord> {
        match self.changed_relationship_group(id) {
            Some(record) => Ok(record),
            None => self.base.relationship_group(id),
        }
    }

    fn property(&self, id: u64) -> Result<PropertyRecord> {
        match self.changed_property(id) {
            Some(record) => Ok(record),
            None => self.base.property(id),
        }
    }

    fn token(&self, kind: TokenKind, id: u64) -> Result<TokenRecord> {
        match self.changes.tokens.get(&(kind, id)) {
            Some(change) => Ok(change.after.clone()),
            None => self.base.token(kind, id),
        }
    }

    fn dynamic(&self, kind: DynamicStoreKind, id: u64) -> Result<DynamicRecord> {
        match self.changed_dynamic(kind, id) {
            Some(record) => Ok(record),
            None => self.base.dynamic(kind, id),
        }
    }

    fn neo_store(&self) -> Result<NeoStoreRecord> {
        match &self.changes.neo_store {
            Some(change) => Ok(change.after.clone()),
            None => self.base.neo_store(),
        }
    }

    fn schema_rule(&self, id: u64) -> std::result::Result<SchemaRule, SchemaRuleError> {
        self.base.schema_rule(id)
    }
}

impl DiffRecordAccess for DiffStoreAccess<'_> {
    fn changed_node(&self, id: u64) -> Option<NodeRecord> {
        self.changes.nodes.get(&id).map(|c| c.after.clone())
    }

    fn changed_relationship(&self, id: u64) -> Option<RelationshipRecord> {
        self.changes.relationships.get(&id).map(|c| c.after.clone())
    }

    fn changed_relationship_group(&self, id: u64) -> Option<RelationshipGroupRecord> {
        self.changes
            .relationship_groups
            .get(&id)
            .map(|c| c.after.clone())
    }

    fn changed_property(&self, id: u64) -> Option<PropertyRecord> {
        self.changes.properties.get(&id).map(|c| c.after.clone())
    }

    fn changed_dynamic(&self, kind: DynamicStoreKind, id: u64) -> Option<DynamicRecord> {
        self.changes
            .dynamic
            .get(&(kind, id))
            .map(|c| c.after.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexus_record::testing::StoreBuilder;
    use nexus_record::StoreSchemaRuleLoader;

    fn direct(builder: &StoreBuilder) -> DirectRecordAccess {
        let stores = builder.access();
        let loader = Arc::new(StoreSchemaRuleLoader::new(stores.schema.clone()));
        DirectRecordAccess::new(stores, loader)
    }

    #[test]
    fn test_direct_access_reads_stores() {
        let mut builder = StoreBuilder::new();
        let label = builder.label("Person");
        let node = builder.create_node();
        let access = direct(&builder);

        assert!(access.node(node).unwrap().in_use);
        assert!(access.label(label as u64).unwrap().in_use);
        assert!(!access.node(node + 10).unwrap().in_use);
        assert!(access.neo_store().unwrap().in_use);
    }

    #[test]
    fn test_diff_access_overlays_changes() {
        let mut builder = StoreBuilder::new();
        let node = builder.create_node();
        let access = direct(&builder);

        let before = builder.node(node);
        let mut after = before.clone();
        after.dense = true;
        let mut changes = ChangeSet::new();
        changes.change_node(before, after);

        let diff = DiffStoreAccess::new(&access, &changes);
        assert!(diff.node(node).unwrap().dense);
        assert!(diff.changed_node(node).is_some());
        assert!(diff.changed_relationship(0).is_none());
        assert!(!access.node(node).unwrap().dense);
        assert_eq!(changes.len(), 1);
    }
}
