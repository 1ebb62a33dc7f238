// async-btree/src/error.rs

use thiserror::Error;

/// Error type shared by the tree engines and the storage backends.
#[derive(Error, Debug)]
pub enum TreeError {
    /// `insert` found the key already present and `overwrite` was not set.
    #[error("Duplicate key")]
    DuplicateKey,

    /// The tree does not look like a B-Tree anymore (missing sibling,
    /// unexpectedly empty node, node without a handle...). Fatal.
    #[error("Structural invariant violated: {0}")]
    Structure(String),

    #[error("Record not found in store: {0}")]
    RecordNotFound(String),

    #[error("Storage operation failed: {0}")]
    StorageError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid file format: {0}")]
    InvalidFileFormat(String),

    #[error("Checksum mismatch: {context}")]
    ChecksumMismatch { context: String },

    #[error("Record too large: {size} bytes (page capacity: {capacity} bytes)")]
    RecordTooLarge { size: usize, capacity: usize },

    #[error("Bincode serialization/deserialization error: {source}")]
    BincodeError {
        #[from]
        source: bincode::Error,
    },

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl TreeError {
    pub(crate) fn structure(msg: impl Into<String>) -> Self {
        TreeError::Structure(msg.into())
    }
}

/// Result type alias for tree and store operations.
pub type Result<T> = std::result::Result<T, TreeError>;
