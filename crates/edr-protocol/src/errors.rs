//! Query parameter error types.

use thiserror::Error;

use crate::responses::ExceptionResponse;

/// A malformed or unsupported query parameter.
///
/// Every variant names the offending parameter so the message can be
/// returned to the client unchanged.
#[derive(Debug, Error, PartialEq)]
pub enum QueryParameterError {
    /// The value could not be parsed.
    #[error("Invalid value for '{param}': {message}")]
    InvalidValue { param: String, message: String },

    /// The WKT geometry could not be parsed.
    #[error("Invalid WKT for '{param}': {message}")]
    InvalidWkt { param: String, message: String },

    /// A numeric value is outside its valid range.
    #[error("Value out of range for '{param}': {message}")]
    OutOfRange { param: String, message: String },
}

impl QueryParameterError {
    /// Build an `InvalidValue` error.
    pub fn invalid(param: &str, message: impl Into<String>) -> Self {
        QueryParameterError::InvalidValue {
            param: param.to_string(),
            message: message.into(),
        }
    }

    /// Build an `OutOfRange` error.
    pub fn out_of_range(param: &str, message: impl Into<String>) -> Self {
        QueryParameterError::OutOfRange {
            param: param.to_string(),
            message: message.into(),
        }
    }

    /// The name of the offending parameter.
    pub fn param(&self) -> &str {
        match self {
            QueryParameterError::InvalidValue { param, .. }
            | QueryParameterError::InvalidWkt { param, .. }
            | QueryParameterError::OutOfRange { param, .. } => param,
        }
    }

    /// Convert to an ExceptionResponse.
    pub fn to_exception(&self) -> ExceptionResponse {
        ExceptionResponse::bad_request(self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_names_parameter() {
        let err = QueryParameterError::invalid("bbox", "Expected 4 or 6 values, got 3");
        assert_eq!(err.param(), "bbox");

        let display = err.to_string();
        assert!(display.contains("'bbox'"));
        assert!(display.contains("got 3"));
    }

    #[test]
    fn test_error_to_exception() {
        let err = QueryParameterError::out_of_range("z", "Recurring count must be positive");
        let exc = err.to_exception();

        assert_eq!(exc.status, Some(400));
        assert!(exc.detail.unwrap().contains("'z'"));
    }
}
