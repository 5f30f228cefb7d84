//! Test harness building internally consistent stores
//!
//! `StoreBuilder` writes records the way a correct store writer would:
//! relationship chains are prepended with degrees on the chain heads, dense
//! nodes get type-ordered groups, property and dynamic chains are linked and
//! labels are inlined when they fit. Tests corrupt the result through
//! [`StoreBuilder::stores`].
//!
//! # Example
//!
//! ```rust,ignore
//! use nexus_record::testing::{Owner, StoreBuilder, Value};
//!
//! let mut builder = StoreBuilder::new();
//! let person = builder.label("Person");
//! let name = builder.property_key("name");
//! let knows = builder.relationship_type("KNOWS");
//! let a = builder.create_node();
//! let b = builder.create_node();
//! builder.set_labels(a, &[person]);
//! builder.set_properties(Owner::Node(a), &[(name, Value::from("Ada"))]);
//! builder.create_relationship(a, b, knows);
//! let access = builder.access();
//! ```

use crate::record::{
    DynamicRecord, DynamicStoreKind, LabelField, NONE, NeoStoreRecord, NodeRecord,
    PropertyBlock, PropertyRecord, PropertyValue, Record, RelationshipGroupRecord, RelationshipRecord,
    TokenKind, TokenRecord, encode_label_chain,
};
use crate::schema::SchemaRule;
use crate::store::{MemoryStores, RecordStore, StoreAccess};

/// Blocks written per property record
const BLOCKS_PER_RECORD: usize = 2;

/// Property chain owner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Owner {
    Node(u64),
    Relationship(u64),
    NeoStore,
}

/// Property value as written by the builder
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i32),
    Long(i64),
    Double(f64),
    Char(char),
    String(String),
    LongArray(Vec<i64>),
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Long(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

/// Builder for consistent in-memory stores
#[derive(Debug, Clone)]
pub struct StoreBuilder {
    stores: MemoryStores,
}

impl StoreBuilder {
    pub fn new() -> Self {
        let stores = MemoryStores::new();
        stores.neo_store.put(NeoStoreRecord::new());
        Self { stores }
    }

    /// The underlying stores, for direct corruption
    pub fn stores(&self) -> &MemoryStores {
        &self.stores
    }

    pub fn access(&self) -> StoreAccess {
        self.stores.access()
    }

    pub fn node(&self, id: u64) -> NodeRecord {
        self.stores.nodes.get(id)
    }

    pub fn relationship(&self, id: u64) -> RelationshipRecord {
        self.stores.relationships.get(id)
    }

    pub fn group(&self, id: u64) -> RelationshipGroupRecord {
        self.stores.relationship_groups.get(id)
    }

    pub fn property(&self, id: u64) -> PropertyRecord {
        self.stores.properties.get(id)
    }

    pub fn dynamic(&self, kind: DynamicStoreKind, id: u64) -> DynamicRecord {
        self.stores.dynamic(kind).get(id)
    }

    pub fn token(&self, kind: TokenKind, id: u64) -> TokenRecord {
        self.stores.token(kind).get(id)
    }

    // ---- tokens ------------------------------------------------------------

    pub fn create_token(&mut self, kind: TokenKind, name: &str) -> u32 {
        let store = self.stores.token(kind);
        let id = store.next_id();
        store.put(TokenRecord::not_in_use(id));
        let name_id = self.write_chain(kind.name_store(), name.as_bytes());
        self.stores.token(kind).put(TokenRecord::new(id, name_id));
        id as u32
    }

    pub fn label(&mut self, name: &str) -> u32 {
        self.create_token(TokenKind::Label, name)
    }

    pub fn property_key(&mut self, name: &str) -> u32 {
        self.create_token(TokenKind::PropertyKey, name)
    }

    pub fn relationship_type(&mut self, name: &str) -> u32 {
        self.create_token(TokenKind::RelationshipType, name)
    }

    // ---- nodes -------------------------------------------------------------

    pub fn create_node(&mut self) -> u64 {
        let id = self.stores.nodes.next_id();
        self.stores.nodes.put(NodeRecord::new(id));
        id
    }

    pub fn create_dense_node(&mut self) -> u64 {
        let id = self.stores.nodes.next_id();
        let mut node = NodeRecord::new(id);
        node.dense = true;
        self.stores.nodes.put(node);
        id
    }

    /// Set the labels of a node, inline when they fit
    pub fn set_labels(&mut self, node: u64, labels: &[u32]) {
        let mut sorted = labels.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        match LabelField::inline(&sorted) {
            Some(field) => self.stores.nodes.update(node, |n| n.labels = field),
            None => self.set_dynamic_labels(node, &sorted),
        }
    }

    /// Store labels in a NODE_LABEL chain, exactly as given
    pub fn set_dynamic_labels(&mut self, node: u64, labels: &[u32]) {
        let head = self.write_chain(DynamicStoreKind::NodeLabel, &encode_label_chain(node, labels));
        let field = LabelField::dynamic(head).expect("label chain id fits the label field");
        self.stores.nodes.update(node, |n| n.labels = field);
    }

    // ---- relationships -----------------------------------------------------

    pub fn create_relationship(&mut self, from: u64, to: u64, rel_type: u32) -> u64 {
        let id = self.stores.relationships.next_id();
        self.stores
            .relationships
            .put(RelationshipRecord::new(id, from, to, rel_type));
        self.attach(from, id, rel_type);
        if from != to {
            self.attach(to, id, rel_type);
        }
        id
    }

    /// Prepend `rel` to the chain `node` keeps for it
    fn attach(&mut self, node: u64, rel: u64, rel_type: u32) {
        let node_record = self.stores.nodes.get(node);
        let old_head = if node_record.dense {
            let group = self.group_for(node, rel_type);
            let record = self.stores.relationship_groups.get(group);
            let relationship = self.stores.relationships.get(rel);
            let head = if relationship.is_self_loop() {
                record.first_loop
            } else if relationship.first_node == node {
                record.first_out
            } else {
                record.first_in
            };
            self.stores.relationship_groups.update(group, |g| {
                if relationship.is_self_loop() {
                    g.first_loop = rel;
                } else if relationship.first_node == node {
                    g.first_out = rel;
                } else {
                    g.first_in = rel;
                }
            });
            head
        } else {
            self.stores.nodes.update(node, |n| n.next_rel = rel);
            node_record.next_rel
        };

        let degree = if old_head == NONE {
            1
        } else {
            self.chain_degree(old_head, node) + 1
        };
        self.stores.relationships.update(rel, |r| {
            if r.first_node == node {
                r.first_next_rel = old_head;
                r.first_prev_rel = degree;
                r.first_in_first_chain = true;
            }
            if r.second_node == node {
                r.second_next_rel = old_head;
                r.second_prev_rel = degree;
                r.first_in_second_chain = true;
            }
        });
        if old_head != NONE {
            self.stores.relationships.update(old_head, |o| {
                if o.first_node == node {
                    o.first_prev_rel = rel;
                    o.first_in_first_chain = false;
                }
                if o.second_node == node {
                    o.second_prev_rel = rel;
                    o.first_in_second_chain = false;
                }
            });
        }
    }

    fn chain_degree(&self, head: u64, node: u64) -> u64 {
        let record = self.stores.relationships.get(head);
        if record.first_node == node {
            record.first_prev_rel
        } else {
            record.second_prev_rel
        }
    }

    /// Find or insert the group of `node` for `rel_type`, keeping type order
    fn group_for(&mut self, node: u64, rel_type: u32) -> u64 {
        let groups = &self.stores.relationship_groups;
        let mut previous = NONE;
        let mut current = self.stores.nodes.get(node).next_rel;
        while current != NONE {
            let group = groups.get(current);
            if group.rel_type == rel_type {
                return current;
            }
            if group.rel_type > rel_type {
                break;
            }
            previous = current;
            current = group.next;
        }

        let id = groups.next_id();
        let mut group = RelationshipGroupRecord::new(id, rel_type, node);
        group.next = current;
        groups.put(group);
        if previous == NONE {
            self.stores.nodes.update(node, |n| n.next_rel = id);
        } else {
            groups.update(previous, |g| g.next = id);
        }
        id
    }

    // ---- properties --------------------------------------------------------

    /// Replace the property chain of `owner` with `properties`
    pub fn set_properties(&mut self, owner: Owner, properties: &[(u32, Value)]) -> u64 {
        let blocks: Vec<PropertyBlock> = properties
            .iter()
            .map(|(key, value)| {
                let value = self.property_value(value);
                PropertyBlock::new(*key, value)
            })
            .collect();

        let store = &self.stores.properties;
        let mut ids = Vec::new();
        for _ in blocks.chunks(BLOCKS_PER_RECORD) {
            let id = store.next_id();
            store.put(PropertyRecord::not_in_use(id));
            ids.push(id);
        }
        for (index, chunk) in blocks.chunks(BLOCKS_PER_RECORD).enumerate() {
            let mut record = PropertyRecord::new(ids[index]);
            record.prev_prop = if index == 0 { NONE } else { ids[index - 1] };
            record.next_prop = ids.get(index + 1).copied().unwrap_or(NONE);
            record.blocks = chunk.to_vec();
            store.put(record);
        }

        let head = ids.first().copied().unwrap_or(NONE);
        match owner {
            Owner::Node(id) => self.stores.nodes.update(id, |n| n.next_prop = head),
            Owner::Relationship(id) => {
                self.stores.relationships.update(id, |r| r.next_prop = head)
            }
            Owner::NeoStore => self.stores.neo_store.update(0, |n| n.next_prop = head),
        }
        head
    }

    fn property_value(&mut self, value: &Value) -> PropertyValue {
        match value {
            Value::Bool(v) => PropertyValue::Bool(*v),
            Value::Int(v) => PropertyValue::Int(*v),
            Value::Long(v) => PropertyValue::Long(*v),
            Value::Double(v) => PropertyValue::Double(*v),
            Value::Char(v) => PropertyValue::Char(*v),
            Value::String(s) => {
                PropertyValue::String(self.write_chain(DynamicStoreKind::String, s.as_bytes()))
            }
            Value::LongArray(values) => {
                let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
                PropertyValue::Array(self.write_chain(DynamicStoreKind::Array, &bytes))
            }
        }
    }

    // ---- schema ------------------------------------------------------------

    pub fn create_index(&mut self, label: u32, property_key: u32) -> u64 {
        let id = self.reserve_dynamic_id(DynamicStoreKind::Schema);
        self.write_schema_rule(&SchemaRule::Index {
            id,
            label,
            property_key,
            owning_constraint: None,
        });
        id
    }

    /// Create a uniqueness constraint and its backing index: `(index, constraint)`
    pub fn create_uniqueness_constraint(&mut self, label: u32, property_key: u32) -> (u64, u64) {
        let index = self.reserve_dynamic_id(DynamicStoreKind::Schema);
        let constraint = self.reserve_dynamic_id(DynamicStoreKind::Schema);
        self.write_schema_rule(&SchemaRule::Index {
            id: index,
            label,
            property_key,
            owning_constraint: Some(constraint),
        });
        self.write_schema_rule(&SchemaRule::UniquenessConstraint {
            id: constraint,
            label,
            property_key,
            owned_index: index,
        });
        (index, constraint)
    }

    pub fn create_node_property_existence(&mut self, label: u32, property_key: u32) -> u64 {
        let id = self.reserve_dynamic_id(DynamicStoreKind::Schema);
        self.write_schema_rule(&SchemaRule::NodePropertyExistence {
            id,
            label,
            property_key,
        });
        id
    }

    pub fn create_relationship_property_existence(
        &mut self,
        rel_type: u32,
        property_key: u32,
    ) -> u64 {
        let id = self.reserve_dynamic_id(DynamicStoreKind::Schema);
        self.write_schema_rule(&SchemaRule::RelationshipPropertyExistence {
            id,
            rel_type,
            property_key,
        });
        id
    }

    /// Write `rule` at its own id, overwriting whatever chain is there
    pub fn write_schema_rule(&mut self, rule: &SchemaRule) {
        let bytes = rule.encode().expect("schema rule encodes");
        self.write_chain_at(DynamicStoreKind::Schema, rule.id(), &bytes);
    }

    /// Write raw bytes as a schema chain, returning the rule id
    pub fn write_raw_schema_record(&mut self, bytes: &[u8]) -> u64 {
        self.write_chain(DynamicStoreKind::Schema, bytes)
    }

    /// Reserve a Schema id for a rule written later
    pub fn reserve_schema_id(&mut self) -> u64 {
        self.reserve_dynamic_id(DynamicStoreKind::Schema)
    }

    // ---- dynamic chains ----------------------------------------------------

    /// Write `payload` as a new chain, returning its head id
    pub fn write_chain(&mut self, kind: DynamicStoreKind, payload: &[u8]) -> u64 {
        let head = self.reserve_dynamic_id(kind);
        self.write_chain_at(kind, head, payload);
        head
    }

    fn reserve_dynamic_id(&mut self, kind: DynamicStoreKind) -> u64 {
        let store = self.stores.dynamic(kind);
        let id = store.next_id();
        store.put(DynamicRecord::not_in_use(id));
        id
    }

    fn write_chain_at(&mut self, kind: DynamicStoreKind, head: u64, payload: &[u8]) {
        assert!(!payload.is_empty(), "dynamic chains cannot be empty");
        let block_size = self.stores.dynamic(kind).block_size();
        let chunks: Vec<&[u8]> = payload.chunks(block_size).collect();
        let mut ids = vec![head];
        for _ in 1..chunks.len() {
            ids.push(self.reserve_dynamic_id(kind));
        }
        let store = self.stores.dynamic(kind);
        for (index, chunk) in chunks.iter().enumerate() {
            store.put(DynamicRecord {
                id: ids[index],
                in_use: true,
                start_of_chain: index == 0,
                length: chunk.len() as u32,
                next_block: ids.get(index + 1).copied().unwrap_or(NONE),
                data: chunk.to_vec(),
            });
        }
    }
}

impl Default for StoreBuilder {
    fn default() -> Self {
        Self::new()
    }
}
