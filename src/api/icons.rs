use serde::de::IgnoredAny;
use serde::Deserialize;

use super::form::{FormData, IconForm};
use super::http::{HttpClient, RequestBody, RequestOptions};
use super::types::Icon;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
struct IconsPayload {
  #[serde(default)]
  icons: Option<Vec<Icon>>,
}

#[derive(Debug, Deserialize)]
struct IconPayload {
  icon: Option<Icon>,
}

/// Icon library used by categories and groups.
#[derive(Clone)]
pub struct IconsApi {
  http: HttpClient,
}

impl IconsApi {
  pub fn new(http: HttpClient) -> Self {
    Self { http }
  }

  /// List icons, optionally narrowed by a search term. A payload without
  /// icons is an empty library.
  pub async fn list(&self, search: Option<&str>) -> Result<Vec<Icon>, ApiError> {
    let query = search
      .map(str::trim)
      .filter(|s| !s.is_empty())
      .map(|s| vec![("search".to_string(), s.to_string())])
      .unwrap_or_default();
    let envelope = self
      .http
      .get::<IconsPayload>("/api/icons", RequestOptions::query(query))
      .await?;
    Ok(envelope.data.and_then(|p| p.icons).unwrap_or_default())
  }

  pub async fn get_by_id(&self, id: &str) -> Result<Icon, ApiError> {
    let envelope = self
      .http
      .get::<IconPayload>(&self.http.path_with_id("/api/icons", id), RequestOptions::default())
      .await?;
    single(envelope.data, id)
  }

  pub async fn create(&self, form: IconForm) -> Result<Icon, ApiError> {
    let payload: IconPayload = self
      .http
      .post(
        "/api/icons/create",
        RequestBody::Multipart(FormData::from(form)),
        RequestOptions::default(),
      )
      .await?
      .into_data()?;
    payload
      .icon
      .ok_or_else(|| ApiError::Schema("created icon missing from response".to_string()))
  }

  pub async fn update(&self, id: &str, form: IconForm) -> Result<Icon, ApiError> {
    let envelope = self
      .http
      .put::<IconPayload>(
        &self.http.path_with_id("/api/icons/update", id),
        RequestBody::Multipart(FormData::from(form)),
        RequestOptions::default(),
      )
      .await?;
    single(envelope.data, id)
  }

  pub async fn delete(&self, id: &str) -> Result<(), ApiError> {
    self
      .http
      .delete::<IgnoredAny>(&self.http.path_with_id("/api/icons/delete", id), RequestOptions::default())
      .await?;
    Ok(())
  }
}

fn single(payload: Option<IconPayload>, id: &str) -> Result<Icon, ApiError> {
  payload
    .and_then(|p| p.icon)
    .ok_or_else(|| ApiError::NotFound(format!("icon {} not found", id)))
}
