//! Error types for the record stores

use thiserror::Error;

/// Result type alias using [`StoreError`]
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors raised by a record store while serving reads
#[derive(Error, Debug)]
pub enum StoreError {
    /// I/O errors from the backing storage
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Storage-related errors
    #[error("Storage error: {0}")]
    Storage(String),
}

impl StoreError {
    /// Create a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }
}

/// Errors raised while following a dynamic record chain
#[derive(Error, Debug)]
pub enum ChainError {
    /// A block in the chain is not in use
    #[error("Dynamic block {0} is not in use")]
    BlockNotInUse(u64),

    /// The chain loops back onto a block it already visited
    #[error("Dynamic chain revisits block {0}")]
    Cycle(u64),

    /// Underlying store failure
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors raised while materialising a schema rule
#[derive(Error, Debug)]
pub enum SchemaRuleError {
    /// The rule's chain could not be read or decoded
    #[error("Malformed schema rule {id}: {reason}")]
    Malformed {
        /// Id of the head record of the rule's chain
        id: u64,
        /// Human readable cause
        reason: String,
    },

    /// The rule could not be encoded
    #[error("Schema rule encoding error: {0}")]
    Encode(String),

    /// Underlying store failure
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl SchemaRuleError {
    /// Create a malformed-rule error
    pub fn malformed(id: u64, reason: impl Into<String>) -> Self {
        Self::Malformed {
            id,
            reason: reason.into(),
        }
    }

    /// Whether the error describes a rule that exists but cannot be decoded
    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::Malformed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_display() {
        let err = StoreError::storage("page fault");
        assert_eq!(err.to_string(), "Storage error: page fault");
    }

    #[test]
    fn test_io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "short read");
        let err: StoreError = io.into();
        assert!(matches!(err, StoreError::Io(_)));
    }

    #[test]
    fn test_malformed_rule_error() {
        let err = SchemaRuleError::malformed(7, "truncated");
        assert!(err.is_malformed());
        assert_eq!(err.to_string(), "Malformed schema rule 7: truncated");

        let store: SchemaRuleError = StoreError::storage("x").into();
        assert!(!store.is_malformed());
    }
}
