use serde_json::json;

use super::http::{HttpClient, RequestBody, RequestOptions};
use super::types::User;
use crate::error::ApiError;

/// Read-only access to registered users.
#[derive(Clone)]
pub struct UsersApi {
  http: HttpClient,
}

impl UsersApi {
  pub fn new(http: HttpClient) -> Self {
    Self { http }
  }

  pub async fn list(&self) -> Result<Vec<User>, ApiError> {
    self
      .http
      .get("/api/users", RequestOptions::default())
      .await?
      .into_data()
  }

  pub async fn get_by_id(&self, id: &str) -> Result<User, ApiError> {
    self
      .http
      .get::<User>(&self.http.path_with_id("/api/users", id), RequestOptions::default())
      .await?
      .data
      .ok_or_else(|| ApiError::NotFound(format!("user {} not found", id)))
  }

  pub async fn get_by_email(&self, email: &str) -> Result<User, ApiError> {
    self
      .http
      .post::<User>(
        "/api/users/email",
        RequestBody::Json(json!({ "email": email })),
        RequestOptions::default(),
      )
      .await?
      .data
      .ok_or_else(|| ApiError::NotFound(format!("no user with email {}", email)))
  }
}
