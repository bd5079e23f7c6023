use serde::Deserialize;

use super::form::{BankForm, FormData};
use super::http::{HttpClient, RequestBody, RequestOptions};
use super::types::BankMaster;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
struct BanksPayload {
  banks: Option<Vec<BankMaster>>,
}

#[derive(Debug, Deserialize)]
struct BankPayload {
  bank: Option<BankMaster>,
}

/// Bank master records (administrator view, no per-user filtering).
#[derive(Clone)]
pub struct BanksApi {
  http: HttpClient,
}

impl BanksApi {
  pub fn new(http: HttpClient) -> Self {
    Self { http }
  }

  pub async fn list(&self) -> Result<Vec<BankMaster>, ApiError> {
    let payload: BanksPayload = self
      .http
      .get("/api/bank-master/admin/all", RequestOptions::default())
      .await?
      .into_data()?;
    payload
      .banks
      .ok_or_else(|| ApiError::Schema("bank listing carried no banks".to_string()))
  }

  pub async fn get_by_id(&self, id: i64) -> Result<BankMaster, ApiError> {
    let envelope = self
      .http
      .get::<BankPayload>(&self.http.path_with_id("/api/bank-master", id), RequestOptions::default())
      .await?;
    single(envelope.data, id)
  }

  pub async fn create(&self, form: BankForm) -> Result<BankMaster, ApiError> {
    let payload: BankPayload = self
      .http
      .post(
        "/api/bank-master/create",
        RequestBody::Multipart(FormData::from(form)),
        RequestOptions::default(),
      )
      .await?
      .into_data()?;
    payload
      .bank
      .ok_or_else(|| ApiError::Schema("created bank missing from response".to_string()))
  }

  pub async fn update(&self, id: i64, form: BankForm) -> Result<BankMaster, ApiError> {
    let envelope = self
      .http
      .put::<BankPayload>(
        &self.http.path_with_id("/api/bank-master/update", id),
        RequestBody::Multipart(FormData::from(form)),
        RequestOptions::default(),
      )
      .await?;
    single(envelope.data, id)
  }

  /// Delete a bank. When accounts still reference it the backend answers
  /// `Conflict`; retry with `migrate_to` naming the bank that takes them over.
  pub async fn delete(&self, id: i64, migrate_to: Option<i64>) -> Result<Option<BankMaster>, ApiError> {
    let query = migrate_to
      .map(|target| vec![("migrateToBankId".to_string(), target.to_string())])
      .unwrap_or_default();
    let envelope = self
      .http
      .delete::<BankPayload>(
        &self.http.path_with_id("/api/bank-master/delete", id),
        RequestOptions::query(query),
      )
      .await?;
    Ok(envelope.data.and_then(|payload| payload.bank))
  }
}

fn single(payload: Option<BankPayload>, id: i64) -> Result<BankMaster, ApiError> {
  payload
    .and_then(|p| p.bank)
    .ok_or_else(|| ApiError::NotFound(format!("bank {} not found", id)))
}
