//! HTTP adapter: base URL, timeout, credentials and auth-failure handling.

use color_eyre::{eyre::eyre, Result};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use super::envelope::{decode, Envelope};
use super::form::FormData;
use crate::config::ApiConfig;
use crate::error::ApiError;
use crate::session::{AuthSession, Navigator};

/// Request payload.
#[derive(Debug, Clone, Default)]
pub enum RequestBody {
  #[default]
  Empty,
  Json(Value),
  Multipart(FormData),
}

/// Which credentials accompany a request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AuthMode {
  /// Attach the session token; a 401 ends the session.
  #[default]
  Session,
  /// No authorization header and no 401 handling (login).
  Anonymous,
  /// Attach this token without touching the session (best-effort logout).
  Bearer(String),
}

#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
  pub query: Vec<(String, String)>,
  pub auth: AuthMode,
}

impl RequestOptions {
  pub fn query(query: Vec<(String, String)>) -> Self {
    Self {
      query,
      ..Self::default()
    }
  }

  pub fn anonymous() -> Self {
    Self {
      auth: AuthMode::Anonymous,
      ..Self::default()
    }
  }

  pub fn bearer(token: impl Into<String>) -> Self {
    Self {
      auth: AuthMode::Bearer(token.into()),
      ..Self::default()
    }
  }
}

struct HttpInner {
  client: reqwest::Client,
  base_url: Url,
  session: AuthSession,
  navigator: Arc<dyn Navigator>,
}

/// Outbound client shared by every resource client.
///
/// Side effects of authentication failures (clearing the session, sending
/// the user to the login route) live here and nowhere else.
#[derive(Clone)]
pub struct HttpClient {
  inner: Arc<HttpInner>,
}

impl HttpClient {
  pub fn new(config: &ApiConfig, session: AuthSession, navigator: Arc<dyn Navigator>) -> Result<Self> {
    let base_url = Url::parse(&config.base_url)
      .map_err(|e| eyre!("Invalid API base URL {}: {}", config.base_url, e))?;
    if base_url.cannot_be_a_base() {
      return Err(eyre!("API base URL {} cannot carry a path", config.base_url));
    }

    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(config.timeout_secs))
      .cookie_store(true)
      .gzip(true)
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      inner: Arc::new(HttpInner {
        client,
        base_url,
        session,
        navigator,
      }),
    })
  }

  pub fn base_url(&self) -> &Url {
    &self.inner.base_url
  }

  pub fn session(&self) -> &AuthSession {
    &self.inner.session
  }

  /// `prefix` followed by `id` as a single escaped path segment, so an id
  /// containing `/`, `?` or `#` stays inside its segment.
  pub fn path_with_id(&self, prefix: &str, id: impl std::fmt::Display) -> String {
    let id = id.to_string();
    let mut url = self.inner.base_url.clone();
    url.set_path(prefix);
    match url.path_segments_mut() {
      Ok(mut segments) => {
        segments.pop_if_empty().push(&id);
      }
      Err(()) => return format!("{}/{}", prefix.trim_end_matches('/'), id),
    }
    url.path().to_string()
  }

  /// Send a request and decode the response envelope.
  pub async fn request<T: DeserializeOwned>(
    &self,
    method: Method,
    path: &str,
    body: RequestBody,
    options: RequestOptions,
  ) -> Result<Envelope<T>, ApiError> {
    let url = self
      .inner
      .base_url
      .join(path)
      .map_err(|e| ApiError::Unknown(format!("invalid request path {}: {}", path, e)))?;

    let mut request = self.inner.client.request(method.clone(), url);
    if !options.query.is_empty() {
      request = request.query(&options.query);
    }

    let token = match &options.auth {
      AuthMode::Session => self.inner.session.token(),
      AuthMode::Bearer(token) => Some(token.clone()),
      AuthMode::Anonymous => None,
    };
    if let Some(token) = token {
      request = request.bearer_auth(token);
    }

    request = match body {
      RequestBody::Empty => request,
      RequestBody::Json(value) => request.json(&value),
      RequestBody::Multipart(form) => request.multipart(form.into_multipart()?),
    };

    debug!(%method, path, "sending request");
    let response = request.send().await.map_err(|e| {
      warn!(%method, path, error = %e, "request failed without a response");
      ApiError::from(e)
    })?;

    let status = response.status();
    let body = response.bytes().await.map_err(ApiError::from)?;
    debug!(%method, path, status = status.as_u16(), "received response");

    if status == StatusCode::UNAUTHORIZED && options.auth == AuthMode::Session {
      self.handle_unauthorized();
    }

    decode(status, &body)
  }

  /// Request without the session: no token, no 401 handling.
  pub async fn send_public<T: DeserializeOwned>(
    &self,
    method: Method,
    path: &str,
    body: RequestBody,
  ) -> Result<Envelope<T>, ApiError> {
    self
      .request(method, path, body, RequestOptions::anonymous())
      .await
  }

  pub async fn get<T: DeserializeOwned>(
    &self,
    path: &str,
    options: RequestOptions,
  ) -> Result<Envelope<T>, ApiError> {
    self.request(Method::GET, path, RequestBody::Empty, options).await
  }

  pub async fn post<T: DeserializeOwned>(
    &self,
    path: &str,
    body: RequestBody,
    options: RequestOptions,
  ) -> Result<Envelope<T>, ApiError> {
    self.request(Method::POST, path, body, options).await
  }

  pub async fn put<T: DeserializeOwned>(
    &self,
    path: &str,
    body: RequestBody,
    options: RequestOptions,
  ) -> Result<Envelope<T>, ApiError> {
    self.request(Method::PUT, path, body, options).await
  }

  pub async fn delete<T: DeserializeOwned>(
    &self,
    path: &str,
    options: RequestOptions,
  ) -> Result<Envelope<T>, ApiError> {
    self.request(Method::DELETE, path, RequestBody::Empty, options).await
  }

  fn handle_unauthorized(&self) {
    if self.inner.session.expire() {
      warn!("server rejected the session, redirecting to login");
      self.inner.navigator.redirect_to_login();
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::session::{RecordingNavigator, Route};
  use httpmock::prelude::*;
  use serde::de::IgnoredAny;
  use serde_json::json;

  fn client_for(
    server: &MockServer,
    timeout_secs: u64,
  ) -> (HttpClient, AuthSession, Arc<RecordingNavigator>) {
    let session = AuthSession::in_memory();
    let navigator = Arc::new(RecordingNavigator::new());
    let config = ApiConfig {
      base_url: server.base_url(),
      timeout_secs,
    };
    let client = HttpClient::new(&config, session.clone(), navigator.clone()).unwrap();
    (client, session, navigator)
  }

  #[test]
  fn test_path_with_id_escapes_the_segment() {
    let config = ApiConfig {
      base_url: "http://localhost:8080/".to_string(),
      timeout_secs: 5,
    };
    let client = HttpClient::new(
      &config,
      AuthSession::in_memory(),
      Arc::new(RecordingNavigator::new()),
    )
    .unwrap();

    assert_eq!(client.path_with_id("/api/bank-master", 5), "/api/bank-master/5");
    assert_eq!(
      client.path_with_id("/api/groups/update", "a/b?x#y"),
      "/api/groups/update/a%2Fb%3Fx%23y"
    );

    let url = client.base_url().join(&client.path_with_id("/api/icons", "../users")).unwrap();
    assert_eq!(url.path(), "/api/icons/..%2Fusers");
  }

  #[test]
  fn test_rejects_base_url_without_path() {
    let config = ApiConfig {
      base_url: "mailto:admin@kedil.com".to_string(),
      timeout_secs: 5,
    };
    let result = HttpClient::new(
      &config,
      AuthSession::in_memory(),
      Arc::new(RecordingNavigator::new()),
    );
    assert!(result.is_err());
  }

  #[tokio::test]
  async fn test_attaches_bearer_token() {
    let server = MockServer::start_async().await;
    let mock = server
      .mock_async(|when, then| {
        when
          .method(GET)
          .path("/api/users")
          .header("authorization", "Bearer abc");
        then.status(200).json_body(json!({"success": true, "data": []}));
      })
      .await;

    let (client, session, _) = client_for(&server, 5);
    session.establish("abc".to_string(), None);

    let envelope: Envelope<Vec<Value>> = client.get("/api/users", RequestOptions::default()).await.unwrap();
    assert_eq!(envelope.into_data().unwrap().len(), 0);
    mock.assert_async().await;
  }

  #[tokio::test]
  async fn test_missing_token_omits_header() {
    let server = MockServer::start_async().await;
    let with_header = server
      .mock_async(|when, then| {
        when.method(GET).path("/api/groups").header_exists("authorization");
        then.status(500);
      })
      .await;
    let without_header = server
      .mock_async(|when, then| {
        when.method(GET).path("/api/groups");
        then.status(200).json_body(json!({"success": true, "data": []}));
      })
      .await;

    let (client, _, _) = client_for(&server, 5);
    let result: Result<Envelope<Vec<Value>>, _> = client.get("/api/groups", RequestOptions::default()).await;

    assert!(result.is_ok());
    assert_eq!(with_header.hits_async().await, 0);
    without_header.assert_async().await;
  }

  #[tokio::test]
  async fn test_unauthorized_expires_session_and_redirects_once() {
    let server = MockServer::start_async().await;
    server
      .mock_async(|when, then| {
        when.path("/api/bank-master/admin/all");
        then
          .status(401)
          .json_body(json!({"success": false, "message": "token expired"}));
      })
      .await;

    let (client, session, navigator) = client_for(&server, 5);
    session.establish("stale".to_string(), None);

    let first = client
      .get::<IgnoredAny>("/api/bank-master/admin/all", RequestOptions::default())
      .await
      .unwrap_err();
    let second = client
      .get::<IgnoredAny>("/api/bank-master/admin/all", RequestOptions::default())
      .await
      .unwrap_err();

    assert_eq!(first, ApiError::Auth("token expired".to_string()));
    assert!(second.is_auth());
    assert!(!session.is_authenticated());
    assert_eq!(navigator.count(Route::Login), 1);
  }

  #[tokio::test]
  async fn test_anonymous_request_ignores_unauthorized_hook() {
    let server = MockServer::start_async().await;
    server
      .mock_async(|when, then| {
        when.method(POST).path("/api/users/login");
        then
          .status(401)
          .json_body(json!({"success": false, "message": "Invalid credentials"}));
      })
      .await;

    let (client, session, navigator) = client_for(&server, 5);
    session.establish("kept".to_string(), None);

    let err = client
      .post::<IgnoredAny>("/api/users/login", RequestBody::Empty, RequestOptions::anonymous())
      .await
      .unwrap_err();

    assert_eq!(err.message(), "Invalid credentials");
    assert!(session.is_authenticated());
    assert!(navigator.visits().is_empty());
  }

  #[tokio::test]
  async fn test_classifies_status_codes() {
    let server = MockServer::start_async().await;
    server
      .mock_async(|when, then| {
        when.path("/missing");
        then.status(404).json_body(json!({"success": false, "message": "no such bank"}));
      })
      .await;
    server
      .mock_async(|when, then| {
        when.path("/invalid");
        then.status(422).json_body(json!({"success": false, "message": "name is required"}));
      })
      .await;
    server
      .mock_async(|when, then| {
        when.path("/broken");
        then.status(500).body("oops");
      })
      .await;

    let (client, _, _) = client_for(&server, 5);
    let missing = client.get::<IgnoredAny>("/missing", RequestOptions::default()).await;
    let invalid = client.get::<IgnoredAny>("/invalid", RequestOptions::default()).await;
    let broken = client.get::<IgnoredAny>("/broken", RequestOptions::default()).await;

    assert_eq!(missing.unwrap_err(), ApiError::NotFound("no such bank".to_string()));
    assert_eq!(
      invalid.unwrap_err(),
      ApiError::Validation {
        status: 422,
        message: "name is required".to_string()
      }
    );
    assert!(matches!(broken.unwrap_err(), ApiError::Server { status: 500, .. }));
  }

  #[tokio::test]
  async fn test_timeout_is_connectivity_error() {
    let server = MockServer::start_async().await;
    server
      .mock_async(|when, then| {
        when.path("/slow");
        then
          .status(200)
          .delay(Duration::from_secs(3))
          .json_body(json!({"success": true, "data": null}));
      })
      .await;

    let (client, _, _) = client_for(&server, 1);
    let err = client
      .get::<IgnoredAny>("/slow", RequestOptions::default())
      .await
      .unwrap_err();
    assert!(err.is_connectivity());
  }

  #[tokio::test]
  async fn test_unreachable_server_is_connectivity_error() {
    let session = AuthSession::in_memory();
    let config = ApiConfig {
      base_url: "http://127.0.0.1:9".to_string(),
      timeout_secs: 2,
    };
    let client = HttpClient::new(&config, session, Arc::new(RecordingNavigator::new())).unwrap();

    let err = client
      .get::<IgnoredAny>("/api/users", RequestOptions::default())
      .await
      .unwrap_err();
    assert!(err.is_connectivity());
  }

  #[tokio::test]
  async fn test_sends_query_parameters() {
    let server = MockServer::start_async().await;
    let mock = server
      .mock_async(|when, then| {
        when
          .method(GET)
          .path("/api/icons")
          .query_param("search", "wallet");
        then
          .status(200)
          .json_body(json!({"success": true, "data": {"icons": []}}));
      })
      .await;

    let (client, _, _) = client_for(&server, 5);
    client
      .get::<IgnoredAny>(
        "/api/icons",
        RequestOptions::query(vec![("search".to_string(), "wallet".to_string())]),
      )
      .await
      .unwrap();
    mock.assert_async().await;
  }
}
