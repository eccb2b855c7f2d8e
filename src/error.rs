//! Error types and JSON error responses for the plugin library

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::{Response, StatusCode};
use serde::Serialize;
use thiserror::Error;

/// Errors from the startup handshake with the host
#[derive(Debug, Error)]
pub enum HandshakeError {
    /// No `-configure` directive, or the flag was the last argument
    #[error("missing configuration: {0}")]
    MissingConfiguration(&'static str),
    /// A configuration value was present but could not be used
    #[error("malformed configuration: {0}")]
    MalformedConfiguration(String),
}

/// Errors from an asset source
#[derive(Debug, Error)]
pub enum AssetError {
    #[error("asset not found: {0}")]
    NotFound(String),
    #[error("invalid asset path: {0}")]
    InvalidPath(String),
    /// The scoped view could not be built from the configured prefix
    #[error("invalid asset prefix: {0}")]
    InvalidPrefix(String),
    #[error("asset I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AssetError {
    pub fn is_not_found(&self) -> bool {
        match self {
            AssetError::NotFound(_) => true,
            AssetError::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

/// Error codes for UI responses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UiErrorCode {
    /// Requested file is absent from the asset tree
    AssetNotFound,
    /// Requested byte range lies outside the asset
    RangeNotSatisfiable,
    /// No handler is mounted for the request path
    NoRoute,
    /// The router's asset subtree could not be constructed
    RouterConfigError,
}

impl UiErrorCode {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            UiErrorCode::AssetNotFound => StatusCode::NOT_FOUND,
            UiErrorCode::RangeNotSatisfiable => StatusCode::RANGE_NOT_SATISFIABLE,
            UiErrorCode::NoRoute => StatusCode::NOT_FOUND,
            UiErrorCode::RouterConfigError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code as a string for the X-Plugin-Error header
    pub fn as_header_value(&self) -> &'static str {
        match self {
            UiErrorCode::AssetNotFound => "ASSET_NOT_FOUND",
            UiErrorCode::RangeNotSatisfiable => "RANGE_NOT_SATISFIABLE",
            UiErrorCode::NoRoute => "NO_ROUTE",
            UiErrorCode::RouterConfigError => "ROUTER_CONFIG_ERROR",
        }
    }
}

/// JSON error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: UiErrorCode,
    pub message: String,
    /// HTTP status code (for reference)
    pub status: u16,
}

impl ErrorResponse {
    pub fn new(code: UiErrorCode, message: impl Into<String>) -> Self {
        Self {
            status: code.status_code().as_u16(),
            code,
            message: message.into(),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(
                r#"{{"code":"{}","message":"{}","status":{}}}"#,
                self.code.as_header_value(),
                self.message.replace('\"', "\\\""),
                self.status
            )
        })
    }
}

/// Create a JSON error response with X-Plugin-Error header
pub fn json_error_response(code: UiErrorCode, message: impl Into<String>) -> Response<Full<Bytes>> {
    let error = ErrorResponse::new(code, message);
    let body = error.to_json();

    Response::builder()
        .status(code.status_code())
        .header("Content-Type", "application/json")
        .header("X-Plugin-Error", code.as_header_value())
        .body(Full::new(Bytes::from(body)))
        .expect("valid response with StatusCode enum and static headers")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_status_codes() {
        assert_eq!(UiErrorCode::AssetNotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(UiErrorCode::NoRoute.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            UiErrorCode::RangeNotSatisfiable.status_code(),
            StatusCode::RANGE_NOT_SATISFIABLE
        );
        assert_eq!(
            UiErrorCode::RouterConfigError.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_error_response_json() {
        let error = ErrorResponse::new(UiErrorCode::AssetNotFound, "File not found");
        let json = error.to_json();

        assert!(json.contains("\"code\":\"ASSET_NOT_FOUND\""));
        assert!(json.contains("\"message\":\"File not found\""));
        assert!(json.contains("\"status\":404"));
    }

    #[test]
    fn test_json_error_response() {
        let response = json_error_response(UiErrorCode::RouterConfigError, "Internal Server Error");

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            response.headers().get("Content-Type").unwrap(),
            "application/json"
        );
        assert_eq!(
            response.headers().get("X-Plugin-Error").unwrap(),
            "ROUTER_CONFIG_ERROR"
        );
    }

    #[test]
    fn test_asset_error_not_found() {
        assert!(AssetError::NotFound("web/x.html".into()).is_not_found());
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert!(AssetError::Io(io).is_not_found());
        assert!(!AssetError::InvalidPrefix("/../x".into()).is_not_found());
    }

    #[test]
    fn test_handshake_error_messages() {
        let err = HandshakeError::MissingConfiguration("no -configure flag found");
        assert_eq!(err.to_string(), "missing configuration: no -configure flag found");
    }
}
