//! Error types for the EPUB pipeline
//!
//! `EpubError` aborts a whole conversion. `DocumentError` only affects the
//! content document it was raised for; the pipeline records it and moves on.

use thiserror::Error;

/// Pipeline-wide result type
pub type Result<T> = std::result::Result<T, EpubError>;

/// Fatal conversion error
#[derive(Error, Debug)]
pub enum EpubError {
    #[error("Invalid EPUB: {0}")]
    InvalidArchive(String),

    #[error("Package document not found: {0}")]
    MissingPackageDocument(String),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Per-document error, recovered from by skipping the document
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DocumentError {
    /// Markup is not well-formed (or not UTF-8)
    #[error("Parse error: {0}")]
    Parse(String),

    /// Document has no body element to walk
    #[error("Document has no body element")]
    MissingBody,

    /// Entry could not be read out of the archive
    #[error("Read error: {0}")]
    Read(String),

    /// Tree could not be written back to markup
    #[error("Serialize error: {0}")]
    Serialize(String),

    /// Rewrite task failed to complete
    #[error("Task error: {0}")]
    Task(String),
}

impl From<quick_xml::Error> for DocumentError {
    fn from(err: quick_xml::Error) -> Self {
        DocumentError::Parse(err.to_string())
    }
}

impl From<std::str::Utf8Error> for DocumentError {
    fn from(err: std::str::Utf8Error) -> Self {
        DocumentError::Parse(format!("invalid UTF-8: {}", err))
    }
}
