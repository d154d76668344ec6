//! Error types for passage-retrieve.

use std::fmt;
use std::path::PathBuf;

/// Errors that can occur during index build, merge, query, or rerank.
#[derive(Debug)]
pub enum RetrieveError {
    /// Empty query provided where at least one term was required.
    EmptyQuery,
    /// Empty index (no documents indexed).
    EmptyIndex,
    /// Invalid parameter value (e.g. `topk == 0`, `b` out of `[0,1]`).
    InvalidParameter(String),
    /// Dimension mismatch between query and passage embeddings.
    DimensionMismatch { query_dim: usize, doc_dim: usize },
    /// A row in a build-time input file was malformed (missing tab, non-integer id).
    MalformedRow { path: PathBuf, line: usize, detail: String },
    /// A required file or dataset was missing.
    MissingFile { path: PathBuf, detail: String },
    /// Lexicon/postings decoding produced a result violating an on-disk invariant.
    CorruptIndex(String),
    /// Wrapped I/O error.
    Io(std::io::Error),
}

impl fmt::Display for RetrieveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetrieveError::EmptyQuery => write!(f, "query is empty"),
            RetrieveError::EmptyIndex => write!(f, "index is empty"),
            RetrieveError::InvalidParameter(msg) => write!(f, "invalid parameter: {msg}"),
            RetrieveError::DimensionMismatch { query_dim, doc_dim } => write!(
                f,
                "dimension mismatch: query has {query_dim} dims, passage store has {doc_dim}"
            ),
            RetrieveError::MalformedRow { path, line, detail } => {
                write!(f, "malformed row at {}:{line}: {detail}", path.display())
            }
            RetrieveError::MissingFile { path, detail } => {
                write!(f, "missing file {}: {detail}", path.display())
            }
            RetrieveError::CorruptIndex(msg) => write!(f, "corrupt index: {msg}"),
            RetrieveError::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for RetrieveError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RetrieveError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for RetrieveError {
    fn from(e: std::io::Error) -> Self {
        RetrieveError::Io(e)
    }
}

impl From<crate::persistence::PersistenceError> for RetrieveError {
    fn from(e: crate::persistence::PersistenceError) -> Self {
        match e {
            crate::persistence::PersistenceError::Io(io) => RetrieveError::Io(io),
            other => RetrieveError::CorruptIndex(other.to_string()),
        }
    }
}

/// Result type for retrieval operations.
pub type RetrieveResult<T> = Result<T, RetrieveError>;
