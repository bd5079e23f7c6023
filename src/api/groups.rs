use serde::de::IgnoredAny;
use serde::Deserialize;

use super::categories::migration_body;
use super::form::{FormData, GroupForm};
use super::http::{HttpClient, RequestBody, RequestOptions};
use super::types::Group;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
struct GroupPayload {
  group: Option<Group>,
}

/// Category groups.
#[derive(Clone)]
pub struct GroupsApi {
  http: HttpClient,
}

impl GroupsApi {
  pub fn new(http: HttpClient) -> Self {
    Self { http }
  }

  /// The listing payload is the array itself.
  pub async fn list(&self) -> Result<Vec<Group>, ApiError> {
    self
      .http
      .get("/api/groups", RequestOptions::default())
      .await?
      .into_data()
  }

  pub async fn get_by_id(&self, id: &str) -> Result<Group, ApiError> {
    let envelope = self
      .http
      .get::<GroupPayload>(&self.http.path_with_id("/api/groups", id), RequestOptions::default())
      .await?;
    single(envelope.data, id)
  }

  pub async fn create(&self, form: GroupForm) -> Result<Group, ApiError> {
    let payload: GroupPayload = self
      .http
      .post(
        "/api/groups/create",
        RequestBody::Multipart(FormData::from(form)),
        RequestOptions::default(),
      )
      .await?
      .into_data()?;
    payload
      .group
      .ok_or_else(|| ApiError::Schema("created group missing from response".to_string()))
  }

  pub async fn update(&self, id: &str, form: GroupForm) -> Result<Group, ApiError> {
    let envelope = self
      .http
      .put::<GroupPayload>(
        &self.http.path_with_id("/api/groups/update", id),
        RequestBody::Multipart(FormData::from(form)),
        RequestOptions::default(),
      )
      .await?;
    single(envelope.data, id)
  }

  /// Delete a group; its categories' transactions move to `to_category`.
  pub async fn delete(&self, id: &str, to_category: Option<&str>) -> Result<(), ApiError> {
    self
      .http
      .post::<IgnoredAny>(
        &self.http.path_with_id("/api/groups/delete", id),
        RequestBody::Json(migration_body(to_category)),
        RequestOptions::default(),
      )
      .await?;
    Ok(())
  }
}

fn single(payload: Option<GroupPayload>, id: &str) -> Result<Group, ApiError> {
  payload
    .and_then(|p| p.group)
    .ok_or_else(|| ApiError::NotFound(format!("group {} not found", id)))
}
