//! Engine error types.

use thiserror::Error;

use edr_protocol::{ExceptionResponse, QueryParameterError};
use remote_cache::CacheError;

/// Errors raised while building, filtering or rendering a collection.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed query parameter.
    #[error(transparent)]
    Query(#[from] QueryParameterError),

    /// A property filter or sort key names a field the source does not have.
    #[error("Unknown property '{0}'")]
    UnknownProperty(String),

    /// Cache or upstream failure.
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// Upstream data violates an invariant (duplicate ids, several
    /// matches for a single-feature request).
    #[error("Data integrity error: {0}")]
    DataIntegrity(String),

    /// A single-item request matched nothing.
    #[error("No data found: {0}")]
    NoData(String),

    /// An upstream record could not be interpreted.
    #[error("Invalid upstream record: {0}")]
    InvalidRecord(String),
}

impl EngineError {
    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            EngineError::Query(_) => 400,
            EngineError::UnknownProperty(_) => 400,
            EngineError::NoData(_) => 404,
            EngineError::Cache(CacheError::UpstreamFetch { .. }) => 502,
            EngineError::Cache(_) => 500,
            EngineError::DataIntegrity(_) => 500,
            EngineError::InvalidRecord(_) => 502,
        }
    }

    /// Convert to an ExceptionResponse.
    pub fn to_exception(&self) -> ExceptionResponse {
        let detail = self.to_string();
        match self.status_code() {
            400 => ExceptionResponse::bad_request(detail),
            404 => ExceptionResponse::not_found(detail),
            502 => ExceptionResponse::bad_gateway(detail),
            _ => ExceptionResponse::internal_error(detail),
        }
    }
}

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
