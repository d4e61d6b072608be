//! Error types for LoamDB.

use crate::page::PageId;
use thiserror::Error;

/// Result type alias using LoamError.
pub type Result<T> = std::result::Result<T, LoamError>;

/// Errors that can occur in LoamDB operations.
#[derive(Debug, Error)]
pub enum LoamError {
    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Storage errors
    #[error("page not found: {0}")]
    PageNotFound(PageId),

    #[error("buffer pool full, unable to allocate frame")]
    BufferPoolFull,

    // B+ tree errors
    #[error("duplicate key")]
    DuplicateKey,

    #[error("key too large: {size} bytes (max {max})")]
    KeyTooLarge { size: usize, max: usize },

    #[error("node full, unable to insert entry")]
    NodeFull,

    #[error("header page full, unable to insert record")]
    HeaderFull,

    #[error("b+ tree corrupted: {0}")]
    TreeCorrupted(String),

    // Configuration errors
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    // Input errors
    #[error("parse error: {0}")]
    ParseError(String),
}
