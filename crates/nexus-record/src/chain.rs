//! Dynamic chain reader
//!
//! Follows `next_block` pointers from a chain head and concatenates the
//! payload bytes of every block. Cycles and not-in-use blocks stop the read.

use crate::error::ChainError;
use crate::record::{DynamicRecord, NONE};
use crate::store::RecordStore;
use std::collections::HashSet;

/// Records of a chain, head first
pub fn read_chain_records(
    store: &dyn RecordStore<DynamicRecord>,
    head: u64,
) -> Result<Vec<DynamicRecord>, ChainError> {
    let mut visited = HashSet::new();
    let mut records = Vec::new();
    let mut current = head;
    while current != NONE {
        if !visited.insert(current) {
            return Err(ChainError::Cycle(current));
        }
        let record = store.get_record(current)?;
        if !record.in_use {
            return Err(ChainError::BlockNotInUse(current));
        }
        current = record.next_block;
        records.push(record);
    }
    Ok(records)
}

/// Concatenated payload of a chain
pub fn read_chain(
    store: &dyn RecordStore<DynamicRecord>,
    head: u64,
) -> Result<Vec<u8>, ChainError> {
    let records = read_chain_records(store, head)?;
    let mut bytes = Vec::with_capacity(records.iter().map(|r| r.length as usize).sum());
    for record in &records {
        let length = (record.length as usize).min(record.data.len());
        bytes.extend_from_slice(&record.data[..length]);
    }
    Ok(bytes)
}
