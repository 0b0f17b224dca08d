//! Normalised failure type for every call made through the API adapter.

use reqwest::StatusCode;
use std::time::Duration;
use thiserror::Error;

/// Every way a request to the dashboard API can fail.
///
/// The adapter folds transport, status and construction failures into one of
/// these three variants so that the query cache and the views only ever deal
/// with a single error type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
  /// No response reached the client (connection refused, DNS, timeout).
  #[error("Network error - please check your connection ({0})")]
  Network(String),
  /// The server answered with a non-2xx status.
  #[error("Server error {status}: {message}")]
  Server { status: u16, message: String },
  /// The request could not be built or the response could not be used.
  #[error("Request failed: {0}")]
  Request(String),
}

impl ApiError {
  /// A request that exceeded its time budget counts as a transport failure.
  pub fn timeout(after: Duration) -> Self {
    ApiError::Network(format!("timed out after {}ms", after.as_millis()))
  }

  /// Build a server error from a status and an optional error body.
  ///
  /// The message comes from the body's `message` field, then its `error`
  /// field, and finally falls back to the status reason phrase.
  pub fn from_status(status: StatusCode, body: Option<&serde_json::Value>) -> Self {
    let message = body
      .and_then(|b| {
        b.get("message")
          .and_then(|m| m.as_str())
          .or_else(|| b.get("error").and_then(|m| m.as_str()))
      })
      .filter(|m| !m.trim().is_empty())
      .map(String::from)
      .unwrap_or_else(|| generic_message(status));

    ApiError::Server {
      status: status.as_u16(),
      message,
    }
  }

  /// Whether another attempt could plausibly succeed.
  ///
  /// Construction failures are deterministic, so retrying them is pointless.
  pub fn is_retryable(&self) -> bool {
    !matches!(self, ApiError::Request(_))
  }

  /// HTTP status, when the server answered.
  pub fn status(&self) -> Option<u16> {
    match self {
      ApiError::Server { status, .. } => Some(*status),
      _ => None,
    }
  }
}

impl From<reqwest::Error> for ApiError {
  fn from(e: reqwest::Error) -> Self {
    if e.is_builder() {
      ApiError::Request(e.to_string())
    } else if e.is_timeout() || e.is_connect() || e.is_request() {
      ApiError::Network(e.to_string())
    } else if e.is_decode() || e.is_body() {
      ApiError::Request(format!("invalid response body: {}", e))
    } else if let Some(status) = e.status() {
      ApiError::from_status(status, None)
    } else {
      ApiError::Network(e.to_string())
    }
  }
}

fn generic_message(status: StatusCode) -> String {
  match status.canonical_reason() {
    Some(reason) => reason.to_string(),
    None => format!("Server error (status {})", status.as_u16()),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_server_error_prefers_message_field() {
    let body = json!({ "message": "Station feed offline", "error": "ignored" });
    let err = ApiError::from_status(StatusCode::SERVICE_UNAVAILABLE, Some(&body));
    assert_eq!(
      err,
      ApiError::Server {
        status: 503,
        message: "Station feed offline".to_string()
      }
    );
  }

  #[test]
  fn test_server_error_falls_back_to_error_field() {
    let body = json!({ "error": "Failed to fetch transit data" });
    let err = ApiError::from_status(StatusCode::INTERNAL_SERVER_ERROR, Some(&body));
    assert_eq!(
      err.to_string(),
      "Server error 500: Failed to fetch transit data"
    );
  }

  #[test]
  fn test_server_error_generic_message() {
    let err = ApiError::from_status(StatusCode::NOT_FOUND, None);
    assert_eq!(
      err,
      ApiError::Server {
        status: 404,
        message: "Not Found".to_string()
      }
    );

    let blank = json!({ "message": "  " });
    let err = ApiError::from_status(StatusCode::BAD_GATEWAY, Some(&blank));
    assert_eq!(err.status(), Some(502));
    assert!(err.to_string().contains("Bad Gateway"));
  }

  #[test]
  fn test_retryable() {
    assert!(ApiError::Network("refused".into()).is_retryable());
    assert!(ApiError::timeout(Duration::from_secs(10)).is_retryable());
    assert!(ApiError::Server {
      status: 500,
      message: "boom".into()
    }
    .is_retryable());
    assert!(!ApiError::Request("bad url".into()).is_retryable());
  }
}
