//! Error types for the consistency checker
//!
//! Inconsistencies are findings, not errors: they go to the report sink.
//! These errors abort a check.

use nexus_record::StoreError;
use thiserror::Error;

/// Result type alias using [`ConsistencyError`]
pub type Result<T> = std::result::Result<T, ConsistencyError>;

/// Errors that abort a consistency check
#[derive(Error, Debug)]
pub enum ConsistencyError {
    /// A record store failed to serve a read
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// The orphan sweep was requested before the full scan completed
    #[error("Orphan sweep requested before the record scan completed")]
    ScanIncomplete,

    /// Invalid checker configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors (configuration files)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The worker pool could not be built
    #[error("Thread pool error: {0}")]
    ThreadPool(String),
}

impl ConsistencyError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a thread pool error
    pub fn thread_pool(msg: impl Into<String>) -> Self {
        Self::ThreadPool(msg.into())
    }
}
