//! Error types for the table statistics engine

use crate::storage::keyspan::FileNum;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, StorageError>;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Data corruption: {0}")]
    Corruption(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Table not found: {0:06}")]
    TableNotFound(FileNum),

    #[error("Table stats collector is closed")]
    Closed,
}

impl StorageError {
    /// Whether retrying the same table later can succeed.
    ///
    /// Estimation failures are never fatal; this only drives log levels.
    pub fn is_transient(&self) -> bool {
        matches!(self, StorageError::Io(_) | StorageError::TableNotFound(_))
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}
