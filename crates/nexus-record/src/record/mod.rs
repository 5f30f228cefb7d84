//! Record model for the fixed-layout stores
//!
//! Every store is an array of fixed-size records addressed by id:
//! - node store: label field, first relationship (or group) and first property
//! - relationship store: doubly-linked per-node chains, one per endpoint
//! - relationship group store: per-type chain heads of dense nodes
//! - property store: doubly-linked chains of property blocks
//! - dynamic stores: singly-linked chains of variable-length payload blocks
//! - token stores: label / property key / relationship type names
//!
//! All pointer fields use [`NONE`] as the null pointer.

mod labels;
mod property;

pub use labels::{
    LabelField, LabelFieldKind, decode_label_chain, encode_label_chain, label_chain_owner,
};
pub use property::{
    MAX_PROPERTY_BLOCKS, PropertyBlock, PropertyDecodeError, PropertyRecord, PropertyType,
    PropertyValue,
};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Null pointer shared by every record pointer field
pub const NONE: u64 = u64::MAX;

/// Returns true when `id` is the null pointer
#[inline]
pub fn is_none(id: u64) -> bool {
    id == NONE
}

/// Common surface of every record kind
pub trait Record: Clone + fmt::Debug + Send + Sync + 'static {
    /// Record id within its store
    fn id(&self) -> u64;

    /// Whether the record is live
    fn in_use(&self) -> bool;

    /// The image a store returns for an id that holds no live record
    fn not_in_use(id: u64) -> Self;
}

/// Node record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: u64,
    pub in_use: bool,
    /// Dense nodes keep their relationships in per-type groups
    pub dense: bool,
    /// First relationship, or first relationship group when dense
    pub next_rel: u64,
    pub next_prop: u64,
    pub labels: LabelField,
}

impl NodeRecord {
    /// A live, sparse node with no relationships, properties or labels
    pub fn new(id: u64) -> Self {
        Self {
            id,
            in_use: true,
            dense: false,
            next_rel: NONE,
            next_prop: NONE,
            labels: LabelField::EMPTY,
        }
    }
}

impl Record for NodeRecord {
    fn id(&self) -> u64 {
        self.id
    }

    fn in_use(&self) -> bool {
        self.in_use
    }

    fn not_in_use(id: u64) -> Self {
        Self {
            in_use: false,
            ..Self::new(id)
        }
    }
}

/// Relationship record
///
/// A relationship sits in two chains, one per endpoint. When the record is
/// first in a chain, the prev field of that chain holds the chain degree
/// instead of a pointer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipRecord {
    pub id: u64,
    pub in_use: bool,
    pub first_node: u64,
    pub second_node: u64,
    pub rel_type: u32,
    pub first_prev_rel: u64,
    pub first_next_rel: u64,
    pub second_prev_rel: u64,
    pub second_next_rel: u64,
    pub first_in_first_chain: bool,
    pub first_in_second_chain: bool,
    pub next_prop: u64,
}

impl RelationshipRecord {
    /// A live relationship that is the only member of both its chains
    pub fn new(id: u64, first_node: u64, second_node: u64, rel_type: u32) -> Self {
        Self {
            id,
            in_use: true,
            first_node,
            second_node,
            rel_type,
            first_prev_rel: 1,
            first_next_rel: NONE,
            second_prev_rel: 1,
            second_next_rel: NONE,
            first_in_first_chain: true,
            first_in_second_chain: true,
            next_prop: NONE,
        }
    }

    pub fn is_self_loop(&self) -> bool {
        self.first_node == self.second_node
    }
}

impl Record for RelationshipRecord {
    fn id(&self) -> u64 {
        self.id
    }

    fn in_use(&self) -> bool {
        self.in_use
    }

    fn not_in_use(id: u64) -> Self {
        Self {
            in_use: false,
            ..Self::new(id, NONE, NONE, 0)
        }
    }
}

/// Per-type relationship chain heads of a dense node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipGroupRecord {
    pub id: u64,
    pub in_use: bool,
    pub rel_type: u32,
    pub owning_node: u64,
    /// Next group of the same node, in ascending type order
    pub next: u64,
    pub first_out: u64,
    pub first_in: u64,
    pub first_loop: u64,
}

impl RelationshipGroupRecord {
    pub fn new(id: u64, rel_type: u32, owning_node: u64) -> Self {
        Self {
            id,
            in_use: true,
            rel_type,
            owning_node,
            next: NONE,
            first_out: NONE,
            first_in: NONE,
            first_loop: NONE,
        }
    }
}

impl Record for RelationshipGroupRecord {
    fn id(&self) -> u64 {
        self.id
    }

    fn in_use(&self) -> bool {
        self.in_use
    }

    fn not_in_use(id: u64) -> Self {
        Self {
            in_use: false,
            ..Self::new(id, 0, NONE)
        }
    }
}

/// The dynamic stores, each holding chains of variable-length blocks
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum DynamicStoreKind {
    Schema,
    String,
    Array,
    PropertyKeyName,
    RelationshipTypeName,
    LabelName,
    NodeLabel,
}

impl DynamicStoreKind {
    /// All dynamic stores in processing order
    pub const ALL: [DynamicStoreKind; 7] = [
        DynamicStoreKind::Schema,
        DynamicStoreKind::String,
        DynamicStoreKind::Array,
        DynamicStoreKind::PropertyKeyName,
        DynamicStoreKind::RelationshipTypeName,
        DynamicStoreKind::LabelName,
        DynamicStoreKind::NodeLabel,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            DynamicStoreKind::Schema => "schema",
            DynamicStoreKind::String => "string",
            DynamicStoreKind::Array => "array",
            DynamicStoreKind::PropertyKeyName => "property_key_name",
            DynamicStoreKind::RelationshipTypeName => "relationship_type_name",
            DynamicStoreKind::LabelName => "label_name",
            DynamicStoreKind::NodeLabel => "node_label",
        }
    }
}

impl fmt::Display for DynamicStoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One block of a dynamic chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DynamicRecord {
    pub id: u64,
    pub in_use: bool,
    pub start_of_chain: bool,
    /// Number of payload bytes in this block
    pub length: u32,
    pub next_block: u64,
    pub data: Vec<u8>,
}

impl DynamicRecord {
    /// A live chain head carrying `data` with no successor
    pub fn new(id: u64, data: Vec<u8>) -> Self {
        Self {
            id,
            in_use: true,
            start_of_chain: true,
            length: data.len() as u32,
            next_block: NONE,
            data,
        }
    }
}

impl Record for DynamicRecord {
    fn id(&self) -> u64 {
        self.id
    }

    fn in_use(&self) -> bool {
        self.in_use
    }

    fn not_in_use(id: u64) -> Self {
        Self {
            id,
            in_use: false,
            start_of_chain: false,
            length: 0,
            next_block: NONE,
            data: Vec::new(),
        }
    }
}

/// The token stores
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Label,
    PropertyKey,
    RelationshipType,
}

impl TokenKind {
    /// All token stores in processing order
    pub const ALL: [TokenKind; 3] = [
        TokenKind::Label,
        TokenKind::PropertyKey,
        TokenKind::RelationshipType,
    ];

    /// The dynamic store holding the token names
    pub fn name_store(&self) -> DynamicStoreKind {
        match self {
            TokenKind::Label => DynamicStoreKind::LabelName,
            TokenKind::PropertyKey => DynamicStoreKind::PropertyKeyName,
            TokenKind::RelationshipType => DynamicStoreKind::RelationshipTypeName,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            TokenKind::Label => "label",
            TokenKind::PropertyKey => "property_key",
            TokenKind::RelationshipType => "relationship_type",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Token record (label, property key or relationship type)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub id: u64,
    pub in_use: bool,
    /// Head of the name chain in the token's name store
    pub name_id: u64,
}

impl TokenRecord {
    pub fn new(id: u64, name_id: u64) -> Self {
        Self {
            id,
            in_use: true,
            name_id,
        }
    }
}

impl Record for TokenRecord {
    fn id(&self) -> u64 {
        self.id
    }

    fn in_use(&self) -> bool {
        self.in_use
    }

    fn not_in_use(id: u64) -> Self {
        Self {
            id,
            in_use: false,
            name_id: NONE,
        }
    }
}

/// Store-global record carrying graph-level properties
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NeoStoreRecord {
    pub id: u64,
    pub in_use: bool,
    pub next_prop: u64,
}

impl NeoStoreRecord {
    pub fn new() -> Self {
        Self {
            id: 0,
            in_use: true,
            next_prop: NONE,
        }
    }
}

impl Default for NeoStoreRecord {
    fn default() -> Self {
        Self::new()
    }
}

impl Record for NeoStoreRecord {
    fn id(&self) -> u64 {
        self.id
    }

    fn in_use(&self) -> bool {
        self.in_use
    }

    fn not_in_use(id: u64) -> Self {
        Self {
            id,
            in_use: false,
            next_prop: NONE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_node_is_empty() {
        let node = NodeRecord::new(3);
        assert!(node.in_use);
        assert!(!node.dense);
        assert!(is_none(node.next_rel));
        assert!(is_none(node.next_prop));
        assert_eq!(node.labels, LabelField::EMPTY);
    }

    #[test]
    fn test_not_in_use_images() {
        assert!(!NodeRecord::not_in_use(1).in_use());
        assert!(!RelationshipRecord::not_in_use(2).in_use());
        assert!(!RelationshipGroupRecord::not_in_use(3).in_use());
        assert!(!DynamicRecord::not_in_use(4).in_use());
        assert!(!TokenRecord::not_in_use(5).in_use());
        assert!(!NeoStoreRecord::not_in_use(0).in_use());
        assert_eq!(DynamicRecord::not_in_use(4).id(), 4);
    }

    #[test]
    fn test_new_relationship_is_alone_in_both_chains() {
        let rel = RelationshipRecord::new(0, 1, 2, 9);
        assert!(rel.first_in_first_chain);
        assert!(rel.first_in_second_chain);
        assert_eq!(rel.first_prev_rel, 1);
        assert_eq!(rel.second_prev_rel, 1);
        assert!(!rel.is_self_loop());
        assert!(RelationshipRecord::new(1, 4, 4, 0).is_self_loop());
    }

    #[test]
    fn test_token_name_stores() {
        assert_eq!(TokenKind::Label.name_store(), DynamicStoreKind::LabelName);
        assert_eq!(
            TokenKind::PropertyKey.name_store(),
            DynamicStoreKind::PropertyKeyName
        );
        assert_eq!(
            TokenKind::RelationshipType.name_store(),
            DynamicStoreKind::RelationshipTypeName
        );
    }

    #[test]
    fn test_store_kind_order() {
        let mut sorted = DynamicStoreKind::ALL;
        sorted.sort();
        assert_eq!(sorted, DynamicStoreKind::ALL);
        assert_eq!(DynamicStoreKind::NodeLabel.to_string(), "node_label");
    }

    #[test]
    fn test_store_kind_serde_names() {
        let json = serde_json::to_string(&DynamicStoreKind::PropertyKeyName).unwrap();
        assert_eq!(json, "\"property_key_name\"");
        let kind: DynamicStoreKind = serde_json::from_str("\"node_label\"").unwrap();
        assert_eq!(kind, DynamicStoreKind::NodeLabel);
    }
}
