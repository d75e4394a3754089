//! Error taxonomy for the search and recommendation engine.
//!
//! Every public operation returns `Result<T, CoreError>`. Parser and
//! geocoder failures are recovered locally (see `parser`, `geocoder`) and
//! never surface as `CoreError` to a caller; store and embedder failures
//! are surfaced as-is.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("corrupt embedding for photo {id}: expected {expected} floats, got {actual}")]
    CorruptEmbedding {
        id: i32,
        expected: usize,
        actual: usize,
    },

    #[error("embedding model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("upstream call timed out: {0}")]
    UpstreamTimeout(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

impl From<diesel::result::Error> for CoreError {
    fn from(e: diesel::result::Error) -> Self {
        CoreError::StoreUnavailable(e.to_string())
    }
}

impl From<diesel::ConnectionError> for CoreError {
    fn from(e: diesel::ConnectionError) -> Self {
        CoreError::StoreUnavailable(e.to_string())
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
