use serde::de::IgnoredAny;
use serde::Deserialize;
use serde_json::json;

use super::form::{CategoryForm, FormData};
use super::http::{HttpClient, RequestBody, RequestOptions};
use super::types::{
  Category, CategoryListing, CategoryParams, CategorySearch, CreatedCategory, DashboardData,
  DashboardFilter, RecordRef,
};
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
struct CategoryPayload {
  category: Option<Category>,
}

#[derive(Debug, Deserialize)]
struct UpdatedPayload {
  category: RecordRef,
}

/// Budget categories, their listing and the dashboard aggregate.
#[derive(Clone)]
pub struct CategoriesApi {
  http: HttpClient,
}

impl CategoriesApi {
  pub fn new(http: HttpClient) -> Self {
    Self { http }
  }

  pub async fn list(&self, params: &CategoryParams) -> Result<CategoryListing, ApiError> {
    self
      .http
      .get("/api/categories", RequestOptions::query(params.to_query()))
      .await?
      .into_data()
  }

  pub async fn get_by_id(&self, id: &str, epoch: Option<i64>) -> Result<Category, ApiError> {
    let params = CategoryParams {
      epoch,
      ..CategoryParams::default()
    };
    let envelope = self
      .http
      .get::<CategoryPayload>(
        &self.http.path_with_id("/api/categories", id),
        RequestOptions::query(params.to_query()),
      )
      .await?;
    envelope
      .data
      .and_then(|p| p.category)
      .ok_or_else(|| ApiError::NotFound(format!("category {} not found", id)))
  }

  pub async fn create(&self, form: CategoryForm) -> Result<CreatedCategory, ApiError> {
    self
      .http
      .post(
        "/api/categories/create",
        RequestBody::Multipart(FormData::from(form)),
        RequestOptions::default(),
      )
      .await?
      .into_data()
  }

  pub async fn update(&self, id: &str, form: CategoryForm) -> Result<RecordRef, ApiError> {
    let payload: UpdatedPayload = self
      .http
      .put(
        &self.http.path_with_id("/api/categories/update", id),
        RequestBody::Multipart(FormData::from(form)),
        RequestOptions::default(),
      )
      .await?
      .into_data()?;
    Ok(payload.category)
  }

  /// Delete a category, moving its transactions to `to_category` when given.
  pub async fn delete(&self, id: &str, to_category: Option<&str>) -> Result<(), ApiError> {
    self
      .http
      .post::<IgnoredAny>(
        &self.http.path_with_id("/api/categories/delete", id),
        RequestBody::Json(migration_body(to_category)),
        RequestOptions::default(),
      )
      .await?;
    Ok(())
  }

  /// Backend-computed aggregate for a date range.
  pub async fn dashboard(&self, filter: &DashboardFilter) -> Result<DashboardData, ApiError> {
    let body = serde_json::to_value(filter)?;
    self
      .http
      .post("/api/categories/dashboard", RequestBody::Json(body), RequestOptions::default())
      .await?
      .into_data()
  }

  pub async fn search(&self, request: &CategorySearch) -> Result<CategoryListing, ApiError> {
    let body = serde_json::to_value(request)?;
    self
      .http
      .post("/api/categories/search", RequestBody::Json(body), RequestOptions::default())
      .await?
      .into_data()
  }
}

/// `{toCategoryId}` body shared by category and group deletion; the
/// member is left out when no target is chosen.
pub(crate) fn migration_body(to_category: Option<&str>) -> serde_json::Value {
  match to_category {
    Some(target) => json!({ "toCategoryId": target }),
    None => json!({}),
  }
}
