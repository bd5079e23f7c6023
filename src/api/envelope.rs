//! The backend's uniform response wrapper.

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::error::ApiError;

/// `{success, message, data, status}` as sent by every endpoint.
#[derive(Debug, Clone)]
pub struct Envelope<T> {
  pub success: bool,
  pub message: String,
  pub data: Option<T>,
  pub status: Option<u16>,
}

impl<T> Envelope<T> {
  /// The payload, failing when the server sent none.
  pub fn into_data(self) -> Result<T, ApiError> {
    self
      .data
      .ok_or_else(|| ApiError::Schema("response carried no data".to_string()))
  }
}

/// Lenient first pass: the payload stays untyped until `success` is known,
/// so a failure envelope never trips over the payload schema.
#[derive(Debug, Deserialize)]
struct RawEnvelope {
  success: Option<bool>,
  #[serde(default)]
  message: Option<String>,
  #[serde(default)]
  data: Option<Value>,
  #[serde(default)]
  status: Option<u16>,
}

/// Messages used when a failure response does not say what went wrong.
pub(crate) const REQUEST_FAILED: &str = "request failed";
pub(crate) const NOT_SUCCESSFUL: &str = "request was not successful";

/// Whether `error` carries one of the stand-in messages above, or the bare
/// reason phrase of its status, instead of text the server wrote.
pub(crate) fn lacks_server_message(error: &ApiError) -> bool {
  let message = error.message();
  let reason = error
    .status()
    .and_then(|code| StatusCode::from_u16(code).ok())
    .and_then(|code| code.canonical_reason());
  message.is_empty() || message == REQUEST_FAILED || message == NOT_SUCCESSFUL || reason == Some(message)
}

/// Decode a response body, classifying failures.
pub(crate) fn decode<T: DeserializeOwned>(status: StatusCode, body: &[u8]) -> Result<Envelope<T>, ApiError> {
  if !status.is_success() {
    let message = error_message(body)
      .unwrap_or_else(|| status.canonical_reason().unwrap_or(REQUEST_FAILED).to_string());
    return Err(ApiError::from_status(status, message));
  }

  if body.iter().all(u8::is_ascii_whitespace) {
    return Ok(Envelope {
      success: true,
      message: String::new(),
      data: None,
      status: Some(status.as_u16()),
    });
  }

  let raw: RawEnvelope = serde_json::from_slice(body)?;
  let message = raw.message.unwrap_or_default();

  if raw.success == Some(false) {
    let reported = raw
      .status
      .and_then(|code| StatusCode::from_u16(code).ok())
      .filter(|code| !code.is_success());
    return Err(match reported {
      Some(code) => ApiError::from_status(code, message),
      None => ApiError::Unknown(if message.is_empty() {
        NOT_SUCCESSFUL.to_string()
      } else {
        message
      }),
    });
  }

  let data = match raw.data {
    None | Some(Value::Null) => None,
    Some(value) => Some(serde_json::from_value(value)?),
  };

  Ok(Envelope {
    success: true,
    message,
    data,
    status: raw.status,
  })
}

/// Best-effort extraction of the server's message from an error body.
fn error_message(body: &[u8]) -> Option<String> {
  serde_json::from_slice::<RawEnvelope>(body)
    .ok()
    .and_then(|raw| raw.message)
    .filter(|m| !m.is_empty())
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde::de::IgnoredAny;
  use serde_json::json;

  fn body(value: Value) -> Vec<u8> {
    serde_json::to_vec(&value).unwrap()
  }

  #[test]
  fn test_success_unwraps_data() {
    let envelope: Envelope<Vec<u32>> = decode(
      StatusCode::OK,
      &body(json!({"success": true, "message": "ok", "data": [1, 2], "status": 200})),
    )
    .unwrap();
    assert_eq!(envelope.into_data().unwrap(), vec![1, 2]);
  }

  #[test]
  fn test_conflict_carries_server_message() {
    let err = decode::<IgnoredAny>(
      StatusCode::CONFLICT,
      &body(json!({"success": false, "message": "has associated accounts", "status": 409})),
    )
    .unwrap_err();
    assert_eq!(err, ApiError::Conflict("has associated accounts".to_string()));
  }

  #[test]
  fn test_error_without_body_uses_reason_phrase() {
    let err = decode::<IgnoredAny>(StatusCode::SERVICE_UNAVAILABLE, b"").unwrap_err();
    assert_eq!(
      err,
      ApiError::Server {
        status: 503,
        message: "Service Unavailable".to_string()
      }
    );
  }

  #[test]
  fn test_unsuccessful_envelope_on_2xx() {
    let err = decode::<Value>(
      StatusCode::OK,
      &body(json!({"success": false, "message": "name is required", "status": 400, "data": 7})),
    )
    .unwrap_err();
    assert_eq!(
      err,
      ApiError::Validation {
        status: 400,
        message: "name is required".to_string()
      }
    );
  }

  #[test]
  fn test_malformed_payload_is_schema_error() {
    let err = decode::<Vec<u32>>(
      StatusCode::OK,
      &body(json!({"success": true, "data": {"unexpected": true}})),
    )
    .unwrap_err();
    assert!(matches!(err, ApiError::Schema(_)));
  }

  #[test]
  fn test_null_data_is_absent() {
    let envelope: Envelope<Vec<u32>> =
      decode(StatusCode::OK, &body(json!({"success": true, "data": null}))).unwrap();
    assert!(envelope.data.is_none());
    assert!(matches!(envelope.into_data(), Err(ApiError::Schema(_))));
  }
}
