//! Error taxonomy shared by the HTTP adapter, resource clients and the cache.

use reqwest::StatusCode;

/// Failure of a call against the admin backend.
///
/// The adapter classifies raw failures once; every layer above passes the
/// value through unchanged. `Clone` because a single deduplicated fetch
/// hands the same result to every subscriber of a query.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
  /// No response reached us (connect failure, timeout, aborted request).
  #[error("connectivity error: {0}")]
  Connectivity(String),

  /// The server rejected our credentials (HTTP 401).
  #[error("authorization failed: {0}")]
  Auth(String),

  /// The server rejected the request payload (4xx).
  #[error("{message}")]
  Validation { status: u16, message: String },

  /// The request conflicts with server state, e.g. a delete that needs a
  /// migration target (HTTP 409).
  #[error("{0}")]
  Conflict(String),

  #[error("not found: {0}")]
  NotFound(String),

  /// The server failed (5xx).
  #[error("server error ({status}): {message}")]
  Server { status: u16, message: String },

  /// The response body did not match the expected shape.
  #[error("unexpected response shape: {0}")]
  Schema(String),

  #[error("{0}")]
  Unknown(String),
}

impl ApiError {
  /// Classify a non-success HTTP status carrying a server message.
  pub fn from_status(status: StatusCode, message: impl Into<String>) -> Self {
    let message = message.into();
    match status.as_u16() {
      401 => ApiError::Auth(message),
      404 => ApiError::NotFound(message),
      409 => ApiError::Conflict(message),
      code @ 400..=499 => ApiError::Validation {
        status: code,
        message,
      },
      code @ 500..=599 => ApiError::Server {
        status: code,
        message,
      },
      _ => ApiError::Unknown(message),
    }
  }

  /// HTTP status associated with the error, when one was received.
  pub fn status(&self) -> Option<u16> {
    match self {
      ApiError::Auth(_) => Some(401),
      ApiError::NotFound(_) => Some(404),
      ApiError::Conflict(_) => Some(409),
      ApiError::Validation { status, .. } | ApiError::Server { status, .. } => Some(*status),
      _ => None,
    }
  }

  /// The human-readable message, without the category prefix.
  pub fn message(&self) -> &str {
    match self {
      ApiError::Connectivity(m)
      | ApiError::Auth(m)
      | ApiError::Conflict(m)
      | ApiError::NotFound(m)
      | ApiError::Schema(m)
      | ApiError::Unknown(m) => m,
      ApiError::Validation { message, .. } | ApiError::Server { message, .. } => message,
    }
  }

  /// Same classification, different message.
  pub fn with_message(self, message: impl Into<String>) -> Self {
    let message = message.into();
    match self {
      ApiError::Connectivity(_) => ApiError::Connectivity(message),
      ApiError::Auth(_) => ApiError::Auth(message),
      ApiError::Conflict(_) => ApiError::Conflict(message),
      ApiError::NotFound(_) => ApiError::NotFound(message),
      ApiError::Schema(_) => ApiError::Schema(message),
      ApiError::Unknown(_) => ApiError::Unknown(message),
      ApiError::Validation { status, .. } => ApiError::Validation { status, message },
      ApiError::Server { status, .. } => ApiError::Server { status, message },
    }
  }

  pub fn is_auth(&self) -> bool {
    matches!(self, ApiError::Auth(_))
  }

  pub fn is_conflict(&self) -> bool {
    matches!(self, ApiError::Conflict(_))
  }

  pub fn is_connectivity(&self) -> bool {
    matches!(self, ApiError::Connectivity(_))
  }
}

impl From<reqwest::Error> for ApiError {
  fn from(err: reqwest::Error) -> Self {
    if err.is_decode() {
      ApiError::Schema(err.to_string())
    } else if err.is_timeout() || err.is_connect() || err.is_request() {
      ApiError::Connectivity(err.to_string())
    } else if let Some(status) = err.status() {
      ApiError::from_status(status, err.to_string())
    } else {
      ApiError::Unknown(err.to_string())
    }
  }
}

impl From<serde_json::Error> for ApiError {
  fn from(err: serde_json::Error) -> Self {
    ApiError::Schema(err.to_string())
  }
}
