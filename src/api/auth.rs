//! Login and logout against the users endpoint.

use reqwest::Method;
use serde::de::IgnoredAny;
use serde_json::json;
use tracing::{debug, info, warn};

use super::envelope::lacks_server_message;
use super::http::{HttpClient, RequestBody, RequestOptions};
use super::types::{LoginData, User};
use crate::error::ApiError;
use crate::session::AuthSession;

pub const CONNECTIVITY_MESSAGE: &str =
  "Unable to connect to server. Please check if the backend is running.";
pub const UNEXPECTED_MESSAGE: &str = "An unexpected error occurred";
pub const MISSING_TOKEN_MESSAGE: &str = "No access token received from server";
pub const LOGIN_FAILED_MESSAGE: &str = "Login failed";

/// Credentials issued by a successful login.
#[derive(Debug, Clone)]
pub struct SignedIn {
  pub token: String,
  pub user: Option<User>,
}

#[derive(Clone)]
pub struct AuthApi {
  http: HttpClient,
  session: AuthSession,
}

impl AuthApi {
  pub fn new(http: HttpClient, session: AuthSession) -> Self {
    Self { http, session }
  }

  /// Exchange email and password for a token and store the session.
  ///
  /// Goes out without the session so a stale token is neither sent nor
  /// treated as expired when the credentials are rejected. On failure the
  /// session returns to the state it was in and the error carries a
  /// message fit for display.
  pub async fn login(&self, email: &str, password: &str) -> Result<SignedIn, ApiError> {
    self.session.begin_login();
    debug!(email, "logging in");

    match self.authenticate(email, password).await {
      Ok(signed_in) => {
        self
          .session
          .establish(signed_in.token.clone(), signed_in.user.clone());
        info!(email, "logged in");
        Ok(signed_in)
      }
      Err(e) => {
        self.session.abort_login();
        warn!(email, error = %e, "login failed");
        Err(e)
      }
    }
  }

  async fn authenticate(&self, email: &str, password: &str) -> Result<SignedIn, ApiError> {
    let envelope = self
      .http
      .send_public::<LoginData>(
        Method::POST,
        "/api/users/login",
        RequestBody::Json(json!({ "email": email, "password": password })),
      )
      .await
      .map_err(login_error)?;

    let data = envelope.data.unwrap_or(LoginData {
      access_token: None,
      refresh_token: None,
      user: None,
    });
    let token = data
      .access_token
      .filter(|t| !t.is_empty())
      .ok_or_else(|| ApiError::Schema(MISSING_TOKEN_MESSAGE.to_string()))?;

    Ok(SignedIn {
      token,
      user: data.user,
    })
  }

  /// End the session. The server is told on a best-effort basis; local
  /// credentials are always cleared.
  pub async fn logout(&self) {
    if let Some(token) = self.session.token() {
      let result = self
        .http
        .post::<IgnoredAny>("/api/users/logout", RequestBody::Empty, RequestOptions::bearer(token))
        .await;
      if let Err(e) = result {
        debug!(error = %e, "ignoring logout failure");
      }
    }
    self.session.reset();
    info!("logged out");
  }
}

/// Replace transport-level messages with ones an operator can act on.
/// Errors the server explained keep its message; the rest read "Login failed".
fn login_error(error: ApiError) -> ApiError {
  match error {
    ApiError::Connectivity(_) => ApiError::Connectivity(CONNECTIVITY_MESSAGE.to_string()),
    ApiError::Schema(_) => ApiError::Unknown(UNEXPECTED_MESSAGE.to_string()),
    ApiError::Unknown(message) if message.is_empty() => {
      ApiError::Unknown(UNEXPECTED_MESSAGE.to_string())
    }
    other if lacks_server_message(&other) => other.with_message(LOGIN_FAILED_MESSAGE),
    other => other,
  }
}
