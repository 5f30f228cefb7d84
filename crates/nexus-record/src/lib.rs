//! Nexus Record - record model and read interface of the Nexus record stores
//!
//! This crate provides:
//! - The record kinds of the fixed-layout stores (node, relationship,
//!   relationship group, property, dynamic, token, neo store)
//! - The node label field and property block encodings
//! - The `RecordStore<R>` read interface and an in-memory implementation
//! - The dynamic chain reader and the schema rule loader
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │        Schema rules (SchemaRuleLoader)      │
//! └──────────────┬──────────────────────────────┘
//!                │
//! ┌──────────────┴──────────────────────────────┐
//! │        Dynamic chains (read_chain)          │
//! └──────────────┬──────────────────────────────┘
//!                │
//! ┌──────────────┴──────────────────────────────┐
//! │   Record stores (RecordStore, StoreAccess)  │
//! └─────────────────────────────────────────────┘
//! ```

#![warn(clippy::all)]

pub mod chain;
pub mod error;
pub mod record;
pub mod schema;
pub mod store;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::{ChainError, Result, SchemaRuleError, StoreError};
pub use record::{
    DynamicRecord, DynamicStoreKind, LabelField, LabelFieldKind, NONE, NeoStoreRecord,
    NodeRecord, PropertyBlock, PropertyRecord, PropertyType, PropertyValue, Record,
    RelationshipGroupRecord, RelationshipRecord, TokenKind, TokenRecord, is_none,
};
pub use schema::{
    SchemaEntity, SchemaRule, SchemaRuleKind, SchemaRuleLoader, StoreSchemaRuleLoader,
};
pub use store::{MemoryRecordStore, MemoryStores, RecordStore, StoreAccess};
