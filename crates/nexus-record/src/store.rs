//! Record store read interface
//!
//! `RecordStore<R>` is the boundary to the on-disk stores: the checker only
//! ever reads records by id and asks for the store geometry. Reads of ids that
//! hold no live record return the kind's not-in-use image rather than an
//! error, so a dangling pointer is a finding and not a failure.
//!
//! `MemoryRecordStore` is a vector-backed implementation used by tests and
//! tooling, and `StoreAccess` bundles one store per record kind.

use crate::error::Result;
use crate::record::{
    DynamicRecord, DynamicStoreKind, NeoStoreRecord, NodeRecord, PropertyRecord, Record,
    RelationshipGroupRecord, RelationshipRecord, TokenKind, TokenRecord,
};
use parking_lot::RwLock;
use std::ops::Range;
use std::sync::Arc;

pub const NODE_RECORD_SIZE: usize = 15;
pub const RELATIONSHIP_RECORD_SIZE: usize = 34;
pub const RELATIONSHIP_GROUP_RECORD_SIZE: usize = 25;
pub const PROPERTY_RECORD_SIZE: usize = 41;
pub const TOKEN_RECORD_SIZE: usize = 9;
pub const NEO_STORE_RECORD_SIZE: usize = 9;
/// Header of every dynamic record (in-use/start flags, length, next block)
pub const DYNAMIC_RECORD_HEADER_SIZE: usize = 8;

/// Default dynamic record sizes, header included
pub const SCHEMA_RECORD_SIZE: usize = 64;
pub const STRING_RECORD_SIZE: usize = 128;
pub const ARRAY_RECORD_SIZE: usize = 128;
pub const TOKEN_NAME_RECORD_SIZE: usize = 38;
pub const NODE_LABEL_RECORD_SIZE: usize = 68;

/// Read access to one record store
pub trait RecordStore<R: Record>: Send + Sync {
    /// Read a record. Ids without a live record yield `R::not_in_use(id)`.
    fn get_record(&self, id: u64) -> Result<R>;

    /// One past the highest id ever allocated
    fn high_id(&self) -> u64;

    fn record_size(&self) -> usize;

    fn record_header_size(&self) -> usize;

    /// Ids below this are reserved and never hold user records
    fn number_of_reserved_low_ids(&self) -> u64 {
        0
    }

    /// Payload capacity of one record
    fn block_size(&self) -> usize {
        self.record_size().saturating_sub(self.record_header_size())
    }

    /// Every id a scan should visit
    fn scan_range(&self) -> Range<u64> {
        self.number_of_reserved_low_ids()..self.high_id()
    }
}

/// Vector-backed record store
#[derive(Debug)]
pub struct MemoryRecordStore<R> {
    records: RwLock<Vec<R>>,
    record_size: usize,
    record_header_size: usize,
    reserved_low_ids: u64,
}

impl<R: Record> MemoryRecordStore<R> {
    pub fn new(record_size: usize, record_header_size: usize) -> Self {
        Self {
            records: RwLock::new(Vec::new()),
            record_size,
            record_header_size,
            reserved_low_ids: 0,
        }
    }

    pub fn with_reserved_low_ids(mut self, reserved: u64) -> Self {
        self.reserved_low_ids = reserved;
        self
    }

    /// Next id that has never been written
    pub fn next_id(&self) -> u64 {
        (self.records.read().len() as u64).max(self.reserved_low_ids)
    }

    /// Read a record, infallibly
    pub fn get(&self, id: u64) -> R {
        self.records
            .read()
            .get(id as usize)
            .cloned()
            .unwrap_or_else(|| R::not_in_use(id))
    }

    /// Write `record` at its id, growing the store with not-in-use records
    pub fn put(&self, record: R) {
        let mut records = self.records.write();
        let id = record.id() as usize;
        Self::grow(&mut records, id);
        records[id] = record;
    }

    /// Modify the record at `id` in place
    pub fn update(&self, id: u64, f: impl FnOnce(&mut R)) {
        let mut records = self.records.write();
        Self::grow(&mut records, id as usize);
        f(&mut records[id as usize]);
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn grow(records: &mut Vec<R>, id: usize) {
        while records.len() <= id {
            let next = records.len() as u64;
            records.push(R::not_in_use(next));
        }
    }
}

impl<R: Record> RecordStore<R> for MemoryRecordStore<R> {
    fn get_record(&self, id: u64) -> Result<R> {
        Ok(self.get(id))
    }

    fn high_id(&self) -> u64 {
        self.next_id()
    }

    fn record_size(&self) -> usize {
        self.record_size
    }

    fn record_header_size(&self) -> usize {
        self.record_header_size
    }

    fn number_of_reserved_low_ids(&self) -> u64 {
        self.reserved_low_ids
    }
}

/// One store per record kind
#[derive(Clone)]
pub struct StoreAccess {
    pub nodes: Arc<dyn RecordStore<NodeRecord>>,
    pub relationships: Arc<dyn RecordStore<RelationshipRecord>>,
    pub relationship_groups: Arc<dyn RecordStore<RelationshipGroupRecord>>,
    pub properties: Arc<dyn RecordStore<PropertyRecord>>,
    pub neo_store: Arc<dyn RecordStore<NeoStoreRecord>>,
    pub label_tokens: Arc<dyn RecordStore<TokenRecord>>,
    pub property_key_tokens: Arc<dyn RecordStore<TokenRecord>>,
    pub relationship_type_tokens: Arc<dyn RecordStore<TokenRecord>>,
    pub schema: Arc<dyn RecordStore<DynamicRecord>>,
    pub strings: Arc<dyn RecordStore<DynamicRecord>>,
    pub arrays: Arc<dyn RecordStore<DynamicRecord>>,
    pub property_key_names: Arc<dyn RecordStore<DynamicRecord>>,
    pub relationship_type_names: Arc<dyn RecordStore<DynamicRecord>>,
    pub label_names: Arc<dyn RecordStore<DynamicRecord>>,
    pub node_labels: Arc<dyn RecordStore<DynamicRecord>>,
}

impl StoreAccess {
    pub fn token(&self, kind: TokenKind) -> &Arc<dyn RecordStore<TokenRecord>> {
        match kind {
            TokenKind::Label => &self.label_tokens,
            TokenKind::PropertyKey => &self.property_key_tokens,
            TokenKind::RelationshipType => &self.relationship_type_tokens,
        }
    }

    pub fn dynamic(&self, kind: DynamicStoreKind) -> &Arc<dyn RecordStore<DynamicRecord>> {
        match kind {
            DynamicStoreKind::Schema => &self.schema,
            DynamicStoreKind::String => &self.strings,
            DynamicStoreKind::Array => &self.arrays,
            DynamicStoreKind::PropertyKeyName => &self.property_key_names,
            DynamicStoreKind::RelationshipTypeName => &self.relationship_type_names,
            DynamicStoreKind::LabelName => &self.label_names,
            DynamicStoreKind::NodeLabel => &self.node_labels,
        }
    }
}

/// Concrete in-memory stores, one per record kind
#[derive(Debug, Clone)]
pub struct MemoryStores {
    pub nodes: Arc<MemoryRecordStore<NodeRecord>>,
    pub relationships: Arc<MemoryRecordStore<RelationshipRecord>>,
    pub relationship_groups: Arc<MemoryRecordStore<RelationshipGroupRecord>>,
    pub properties: Arc<MemoryRecordStore<PropertyRecord>>,
    pub neo_store: Arc<MemoryRecordStore<NeoStoreRecord>>,
    pub label_tokens: Arc<MemoryRecordStore<TokenRecord>>,
    pub property_key_tokens: Arc<MemoryRecordStore<TokenRecord>>,
    pub relationship_type_tokens: Arc<MemoryRecordStore<TokenRecord>>,
    pub schema: Arc<MemoryRecordStore<DynamicRecord>>,
    pub strings: Arc<MemoryRecordStore<DynamicRecord>>,
    pub arrays: Arc<MemoryRecordStore<DynamicRecord>>,
    pub property_key_names: Arc<MemoryRecordStore<DynamicRecord>>,
    pub relationship_type_names: Arc<MemoryRecordStore<DynamicRecord>>,
    pub label_names: Arc<MemoryRecordStore<DynamicRecord>>,
    pub node_labels: Arc<MemoryRecordStore<DynamicRecord>>,
}

impl MemoryStores {
    /// Empty stores with the default record sizes
    pub fn new() -> Self {
        let dynamic = |size: usize| -> Arc<MemoryRecordStore<DynamicRecord>> {
            Arc::new(MemoryRecordStore::new(size, DYNAMIC_RECORD_HEADER_SIZE))
        };
        let token = || -> Arc<MemoryRecordStore<TokenRecord>> {
            Arc::new(MemoryRecordStore::new(TOKEN_RECORD_SIZE, 0))
        };
        Self {
            nodes: Arc::new(MemoryRecordStore::new(NODE_RECORD_SIZE, 0)),
            relationships: Arc::new(MemoryRecordStore::new(RELATIONSHIP_RECORD_SIZE, 0)),
            relationship_groups: Arc::new(MemoryRecordStore::new(
                RELATIONSHIP_GROUP_RECORD_SIZE,
                0,
            )),
            properties: Arc::new(MemoryRecordStore::new(PROPERTY_RECORD_SIZE, 0)),
            neo_store: Arc::new(MemoryRecordStore::new(NEO_STORE_RECORD_SIZE, 0)),
            label_tokens: token(),
            property_key_tokens: token(),
            relationship_type_tokens: token(),
            schema: dynamic(SCHEMA_RECORD_SIZE),
            strings: dynamic(STRING_RECORD_SIZE),
            arrays: dynamic(ARRAY_RECORD_SIZE),
            property_key_names: dynamic(TOKEN_NAME_RECORD_SIZE),
            relationship_type_names: dynamic(TOKEN_NAME_RECORD_SIZE),
            label_names: dynamic(TOKEN_NAME_RECORD_SIZE),
            node_labels: dynamic(NODE_LABEL_RECORD_SIZE),
        }
    }

    pub fn token(&self, kind: TokenKind) -> &Arc<MemoryRecordStore<TokenRecord>> {
        match kind {
            TokenKind::Label => &self.label_tokens,
            TokenKind::PropertyKey => &self.property_key_tokens,
            TokenKind::RelationshipType => &self.relationship_type_tokens,
        }
    }

    pub fn dynamic(&self, kind: DynamicStoreKind) -> &Arc<MemoryRecordStore<DynamicRecord>> {
        match kind {
            DynamicStoreKind::Schema => &self.schema,
            DynamicStoreKind::String => &self.strings,
            DynamicStoreKind::Array => &self.arrays,
            DynamicStoreKind::PropertyKeyName => &self.property_key_names,
            DynamicStoreKind::RelationshipTypeName => &self.relationship_type_names,
            DynamicStoreKind::LabelName => &self.label_names,
            DynamicStoreKind::NodeLabel => &self.node_labels,
        }
    }

    /// Read-only view over these stores
    pub fn access(&self) -> StoreAccess {
        StoreAccess {
            nodes: self.nodes.clone(),
            relationships: self.relationships.clone(),
            relationship_groups: self.relationship_groups.clone(),
            properties: self.properties.clone(),
            neo_store: self.neo_store.clone(),
            label_tokens: self.label_tokens.clone(),
            property_key_tokens: self.property_key_tokens.clone(),
            relationship_type_tokens: self.relationship_type_tokens.clone(),
            schema: self.schema.clone(),
            strings: self.strings.clone(),
            arrays: self.arrays.clone(),
            property_key_names: self.property_key_names.clone(),
            relationship_type_names: self.relationship_type_names.clone(),
            label_names: self.label_names.clone(),
            node_labels: self.node_labels.clone(),
        }
    }
}

impl Default for MemoryStores {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_ids_read_as_not_in_use() {
        let store: MemoryRecordStore<NodeRecord> = MemoryRecordStore::new(NODE_RECORD_SIZE, 0);
        let node = store.get_record(10).unwrap();
        assert_eq!(node.id, 10);
        assert!(!node.in_use);
        assert_eq!(store.high_id(), 0);
    }

    #[test]
    fn test_put_grows_store() {
        let store = MemoryRecordStore::new(NODE_RECORD_SIZE, 0);
        store.put(NodeRecord::new(3));
        assert_eq!(store.high_id(), 4);
        assert!(!store.get(1).in_use);
        assert!(store.get(3).in_use);

        store.update(3, |node| node.dense = true);
        assert!(store.get(3).dense);
    }

    #[test]
    fn test_reserved_low_ids() {
        let store: MemoryRecordStore<TokenRecord> =
            MemoryRecordStore::new(TOKEN_RECORD_SIZE, 0).with_reserved_low_ids(2);
        assert_eq!(store.next_id(), 2);
        assert_eq!(store.scan_range(), 2..2);
        store.put(TokenRecord::new(2, 0));
        assert_eq!(store.scan_range(), 2..3);
    }

    #[test]
    fn test_block_size() {
        let stores = MemoryStores::new();
        let access = stores.access();
        assert_eq!(
            access.dynamic(DynamicStoreKind::String).block_size(),
            STRING_RECORD_SIZE - DYNAMIC_RECORD_HEADER_SIZE
        );
        assert_eq!(
            access.dynamic(DynamicStoreKind::LabelName).block_size(),
            TOKEN_NAME_RECORD_SIZE - DYNAMIC_RECORD_HEADER_SIZE
        );
    }

    #[test]
    fn test_access_shares_stores() {
        let stores = MemoryStores::new();
        let access = stores.access();
        stores.token(TokenKind::Label).put(TokenRecord::new(0, 7));
        let token = access.token(TokenKind::Label).get_record(0).unwrap();
        assert_eq!(token.name_id, 7);
    }
}
