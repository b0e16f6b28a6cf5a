//! Exception documents returned to clients.

use serde::{Deserialize, Serialize};

/// Exception response for errors.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExceptionResponse {
    /// Exception type identifier.
    #[serde(rename = "type")]
    pub type_: String,

    /// Human-readable title.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// HTTP status code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,

    /// Detailed error message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ExceptionResponse {
    /// Create a new exception response.
    pub fn new(type_: impl Into<String>, status: u16, detail: impl Into<String>) -> Self {
        Self {
            type_: type_.into(),
            title: None,
            status: Some(status),
            detail: Some(detail.into()),
        }
    }

    /// Set the title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Create a 404 Not Found exception.
    pub fn not_found(detail: impl Into<String>) -> Self {
        Self::new(
            "http://www.opengis.net/def/exceptions/ogcapi-edr-1/1.0/not-found",
            404,
            detail,
        )
        .with_title("Not Found")
    }

    /// Create a 400 Bad Request exception.
    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self::new(
            "http://www.opengis.net/def/exceptions/ogcapi-edr-1/1.0/invalid-parameter-value",
            400,
            detail,
        )
        .with_title("Bad Request")
    }

    /// Create a 502 Bad Gateway exception for upstream failures.
    pub fn bad_gateway(detail: impl Into<String>) -> Self {
        Self::new(
            "http://www.opengis.net/def/exceptions/ogcapi-edr-1/1.0/server-error",
            502,
            detail,
        )
        .with_title("Bad Gateway")
    }

    /// Create a 500 Internal Server Error exception.
    pub fn internal_error(detail: impl Into<String>) -> Self {
        Self::new(
            "http://www.opengis.net/def/exceptions/ogcapi-edr-1/1.0/server-error",
            500,
            detail,
        )
        .with_title("Internal Server Error")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exception_not_found() {
        let exc = ExceptionResponse::not_found("Location not found: 281");

        assert_eq!(exc.status, Some(404));
        assert_eq!(exc.title, Some("Not Found".to_string()));
        assert!(exc.detail.unwrap().contains("281"));
    }

    #[test]
    fn test_exception_bad_request() {
        let exc = ExceptionResponse::bad_request("Invalid bbox");

        assert_eq!(exc.status, Some(400));
        assert!(exc.type_.contains("invalid-parameter-value"));
    }

    #[test]
    fn test_exception_bad_gateway() {
        let exc = ExceptionResponse::bad_gateway("Upstream returned 503");
        assert_eq!(exc.status, Some(502));
    }

    #[test]
    fn test_exception_serialization() {
        let exc = ExceptionResponse::internal_error("Duplicate location id 12");

        let json = serde_json::to_string(&exc).unwrap();
        assert!(json.contains(r#""status":500"#));
        assert!(json.contains(r#""title":"Internal Server Error""#));
    }
}
