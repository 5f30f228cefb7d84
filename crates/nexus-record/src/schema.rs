//! Schema rules
//!
//! Each rule is stored as a chain in the SCHEMA dynamic store whose head id
//! is the rule id. The chain payload is the `bincode` encoding of
//! [`SchemaRule`].
//!
//! Uniqueness constraints are backed by a constraint index; the two rules
//! reference each other (`owned_index` / `owning_constraint`).

use crate::chain::read_chain;
use crate::error::{ChainError, SchemaRuleError};
use crate::record::DynamicRecord;
use crate::store::RecordStore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// The entity a rule applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SchemaEntity {
    Label(u32),
    RelationshipType(u32),
}

/// Rule kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaRuleKind {
    Index,
    ConstraintIndex,
    UniquenessConstraint,
    NodePropertyExistenceConstraint,
    RelationshipPropertyExistenceConstraint,
}

impl fmt::Display for SchemaRuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SchemaRuleKind::Index => "index",
            SchemaRuleKind::ConstraintIndex => "constraint_index",
            SchemaRuleKind::UniquenessConstraint => "uniqueness_constraint",
            SchemaRuleKind::NodePropertyExistenceConstraint => {
                "node_property_existence_constraint"
            }
            SchemaRuleKind::RelationshipPropertyExistenceConstraint => {
                "relationship_property_existence_constraint"
            }
        };
        f.write_str(name)
    }
}

/// A schema rule as stored in the SCHEMA store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchemaRule {
    /// Label/property index, optionally backing a uniqueness constraint
    Index {
        id: u64,
        label: u32,
        property_key: u32,
        owning_constraint: Option<u64>,
    },
    UniquenessConstraint {
        id: u64,
        label: u32,
        property_key: u32,
        owned_index: u64,
    },
    NodePropertyExistence {
        id: u64,
        label: u32,
        property_key: u32,
    },
    RelationshipPropertyExistence {
        id: u64,
        rel_type: u32,
        property_key: u32,
    },
}

impl SchemaRule {
    pub fn id(&self) -> u64 {
        match *self {
            SchemaRule::Index { id, .. }
            | SchemaRule::UniquenessConstraint { id, .. }
            | SchemaRule::NodePropertyExistence { id, .. }
            | SchemaRule::RelationshipPropertyExistence { id, .. } => id,
        }
    }

    pub fn kind(&self) -> SchemaRuleKind {
        match self {
            SchemaRule::Index {
                owning_constraint: None,
                ..
            } => SchemaRuleKind::Index,
            SchemaRule::Index { .. } => SchemaRuleKind::ConstraintIndex,
            SchemaRule::UniquenessConstraint { .. } => SchemaRuleKind::UniquenessConstraint,
            SchemaRule::NodePropertyExistence { .. } => {
                SchemaRuleKind::NodePropertyExistenceConstraint
            }
            SchemaRule::RelationshipPropertyExistence { .. } => {
                SchemaRuleKind::RelationshipPropertyExistenceConstraint
            }
        }
    }

    pub fn entity(&self) -> SchemaEntity {
        match *self {
            SchemaRule::Index { label, .. }
            | SchemaRule::UniquenessConstraint { label, .. }
            | SchemaRule::NodePropertyExistence { label, .. } => SchemaEntity::Label(label),
            SchemaRule::RelationshipPropertyExistence { rel_type, .. } => {
                SchemaEntity::RelationshipType(rel_type)
            }
        }
    }

    pub fn property_key(&self) -> u32 {
        match *self {
            SchemaRule::Index { property_key, .. }
            | SchemaRule::UniquenessConstraint { property_key, .. }
            | SchemaRule::NodePropertyExistence { property_key, .. }
            | SchemaRule::RelationshipPropertyExistence { property_key, .. } => property_key,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, SchemaRuleError> {
        bincode::serialize(self).map_err(|e| SchemaRuleError::Encode(e.to_string()))
    }

    /// Decode the payload of the chain headed by `id`
    pub fn decode(id: u64, bytes: &[u8]) -> Result<Self, SchemaRuleError> {
        let rule: SchemaRule = bincode::deserialize(bytes)
            .map_err(|e| SchemaRuleError::malformed(id, e.to_string()))?;
        if rule.id() != id {
            return Err(SchemaRuleError::malformed(
                id,
                format!("rule claims id {}", rule.id()),
            ));
        }
        Ok(rule)
    }
}

/// Materialises schema rules from their record chains
pub trait SchemaRuleLoader: Send + Sync {
    fn load_single_schema_rule(&self, id: u64) -> Result<SchemaRule, SchemaRuleError>;
}

/// Loader reading rules straight from the SCHEMA store
pub struct StoreSchemaRuleLoader {
    store: Arc<dyn RecordStore<DynamicRecord>>,
}

impl StoreSchemaRuleLoader {
    pub fn new(store: Arc<dyn RecordStore<DynamicRecord>>) -> Self {
        Self { store }
    }
}

impl SchemaRuleLoader for StoreSchemaRuleLoader {
    fn load_single_schema_rule(&self, id: u64) -> Result<SchemaRule, SchemaRuleError> {
        let bytes = match read_chain(self.store.as_ref(), id) {
            Ok(bytes) => bytes,
            Err(ChainError::Store(e)) => return Err(e.into()),
            Err(e) => return Err(SchemaRuleError::malformed(id, e.to_string())),
        };
        debug!(rule_id = id, bytes = bytes.len(), "loaded schema rule chain");
        SchemaRule::decode(id, &bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{DYNAMIC_RECORD_HEADER_SIZE, MemoryRecordStore, SCHEMA_RECORD_SIZE};

    fn write_rule(store: &MemoryRecordStore<DynamicRecord>, id: u64, bytes: Vec<u8>) {
        store.put(DynamicRecord::new(id, bytes));
    }

    #[test]
    fn test_rule_kinds() {
        let index = SchemaRule::Index {
            id: 0,
            label: 1,
            property_key: 2,
            owning_constraint: None,
        };
        assert_eq!(index.kind(), SchemaRuleKind::Index);

        let constraint_index = SchemaRule::Index {
            id: 0,
            label: 1,
            property_key: 2,
            owning_constraint: Some(1),
        };
        assert_eq!(constraint_index.kind(), SchemaRuleKind::ConstraintIndex);

        let existence = SchemaRule::RelationshipPropertyExistence {
            id: 3,
            rel_type: 4,
            property_key: 5,
        };
        assert_eq!(existence.entity(), SchemaEntity::RelationshipType(4));
        assert_eq!(existence.property_key(), 5);
        assert_eq!(
            existence.kind().to_string(),
            "relationship_property_existence_constraint"
        );
    }

    #[test]
    fn test_loader_reads_rule() {
        let store = Arc::new(MemoryRecordStore::new(
            SCHEMA_RECORD_SIZE,
            DYNAMIC_RECORD_HEADER_SIZE,
        ));
        let rule = SchemaRule::UniquenessConstraint {
            id: 0,
            label: 3,
            property_key: 1,
            owned_index: 1,
        };
        write_rule(&store, 0, rule.encode().unwrap());

        let loader = StoreSchemaRuleLoader::new(store);
        assert_eq!(loader.load_single_schema_rule(0).unwrap(), rule);
    }

    #[test]
    fn test_loader_rejects_garbage() {
        let store = Arc::new(MemoryRecordStore::new(
            SCHEMA_RECORD_SIZE,
            DYNAMIC_RECORD_HEADER_SIZE,
        ));
        write_rule(&store, 0, vec![0xFF; 3]);
        let loader = StoreSchemaRuleLoader::new(store);
        assert!(loader.load_single_schema_rule(0).unwrap_err().is_malformed());
    }

    #[test]
    fn test_loader_rejects_foreign_id() {
        let store = Arc::new(MemoryRecordStore::new(
            SCHEMA_RECORD_SIZE,
            DYNAMIC_RECORD_HEADER_SIZE,
        ));
        let rule = SchemaRule::NodePropertyExistence {
            id: 9,
            label: 0,
            property_key: 0,
        };
        write_rule(&store, 0, rule.encode().unwrap());
        let loader = StoreSchemaRuleLoader::new(store);
        let err = loader.load_single_schema_rule(0).unwrap_err();
        assert!(err.to_string().contains("rule claims id 9"));
    }

    #[test]
    fn test_loader_rejects_broken_chain() {
        let store = Arc::new(MemoryRecordStore::new(
            SCHEMA_RECORD_SIZE,
            DYNAMIC_RECORD_HEADER_SIZE,
        ));
        let mut head = DynamicRecord::new(0, vec![1, 2]);
        head.next_block = 4;
        store.put(head);

        let loader = StoreSchemaRuleLoader::new(store);
        assert!(loader.load_single_schema_rule(0).unwrap_err().is_malformed());
    }
}
