//! Typed payloads of the admin backend.
//!
//! Field names follow the backend's JSON (mostly camelCase, with a few
//! snake_case audit columns). Parsing failures surface as `ApiError::Schema`
//! at the resource-client boundary.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
  pub id: Option<String>,
  pub username: String,
  pub first_name: Option<String>,
  pub last_name: Option<String>,
  pub email: String,
  pub phone: Option<String>,
  pub details: Option<Value>,
  pub created_at: Option<String>,
  pub updated_at: Option<String>,
  pub last_login_at: Option<String>,
}

impl User {
  pub fn display_name(&self) -> String {
    match (&self.first_name, &self.last_name) {
      (Some(first), Some(last)) => format!("{} {}", first, last),
      (Some(first), None) => first.clone(),
      _ => self.username.clone(),
    }
  }
}

/// Bank master record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BankMaster {
  pub id: i64,
  pub name: String,
  #[serde(default)]
  pub slug: String,
  #[serde(default)]
  pub short_name: String,
  pub url: Option<String>,
  #[serde(rename = "blob_image")]
  pub blob_image: Option<String>,
  pub image_url: Option<String>,
  #[serde(default)]
  pub is_global: bool,
  #[serde(rename = "created_by")]
  pub created_by: Option<String>,
  #[serde(rename = "updated_by")]
  pub updated_by: Option<String>,
  #[serde(rename = "created_at")]
  pub created_at: Option<String>,
  #[serde(rename = "updated_at")]
  pub updated_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
  pub id: String,
  pub name: String,
  pub is_auto_created: Option<bool>,
  pub is_global: Option<bool>,
  pub created_at: Option<String>,
  pub updated_at: Option<String>,
  pub allocated: Option<f64>,
  pub available: Option<f64>,
  pub activity: Option<Vec<Value>>,
  pub assigned_history: Option<Vec<Value>>,
  pub group_id: Option<String>,
  pub group_name: Option<String>,
  pub recurrence_type: Option<String>,
  pub recurrence_interval: Option<i64>,
  pub allocated_amount: Option<f64>,
  pub carry_forward: Option<bool>,
  pub description: Option<String>,
  pub image_url: Option<String>,
  pub details: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
  pub id: String,
  pub name: String,
  pub is_auto_created: Option<bool>,
  pub is_global: Option<bool>,
  pub image_url: Option<String>,
  pub created_at: Option<String>,
  pub updated_at: Option<String>,
  pub details: Option<Value>,
}

/// A group with its categories and budget totals, as reported by the
/// listing and dashboard endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryGroup {
  pub id: String,
  pub name: String,
  pub is_auto_created: Option<bool>,
  pub allocated: Option<f64>,
  pub available: Option<f64>,
  pub activity: Option<f64>,
  #[serde(default)]
  pub categories: Vec<Category>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Uncategorized {
  #[serde(default)]
  pub amount: f64,
  #[serde(default)]
  pub activity: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateRange {
  pub from_date: String,
  pub to_date: String,
}

/// Backend-computed totals for the selected range.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Summary {
  pub assigned: f64,
  pub activity: f64,
  pub available: f64,
  pub credit: f64,
  pub debit: f64,
  pub overspent: f64,
  pub date_range: Option<DateRange>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardData {
  #[serde(default)]
  pub groups: Vec<CategoryGroup>,
  #[serde(default)]
  pub uncategorized: Uncategorized,
  #[serde(default)]
  pub summary: Summary,
}

/// Category listing, optionally paginated (search endpoint).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryListing {
  #[serde(default)]
  pub groups: Vec<CategoryGroup>,
  #[serde(default)]
  pub uncategorized: Uncategorized,
  #[serde(default)]
  pub summary: Value,
  pub pagination: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Icon {
  pub id: String,
  pub slug: String,
  pub image_url: Option<String>,
  #[serde(rename = "blob_image")]
  pub blob_image: Option<String>,
  pub search_tags: Option<Vec<String>>,
  /// Comma-separated tags for display
  pub tags: Option<String>,
  pub is_global: Option<bool>,
  pub created_at: Option<String>,
  pub updated_at: Option<String>,
  #[serde(rename = "created_by")]
  pub created_by: Option<String>,
  #[serde(rename = "updated_by")]
  pub updated_by: Option<String>,
}

/// Identifier (and sometimes name) echoed back by category writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordRef {
  pub id: String,
  pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatedCategory {
  pub category: RecordRef,
  pub group: Option<RecordRef>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginData {
  pub access_token: Option<String>,
  pub refresh_token: Option<String>,
  pub user: Option<User>,
}

// ============================================================================
// Request parameters (also used as query key segments)
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryParams {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub start_date: Option<NaiveDate>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub end_date: Option<NaiveDate>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub epoch: Option<i64>,
}

impl CategoryParams {
  pub(crate) fn to_query(&self) -> Vec<(String, String)> {
    let mut query = Vec::new();
    if let Some(start) = self.start_date {
      query.push(("startDate".to_string(), start.to_string()));
    }
    if let Some(end) = self.end_date {
      query.push(("endDate".to_string(), end.to_string()));
    }
    if let Some(epoch) = self.epoch.filter(|e| *e != 0) {
      query.push(("epoch".to_string(), epoch.to_string()));
    }
    query
  }
}

/// Date range and filters of the dashboard aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardFilter {
  pub from_date: NaiveDate,
  pub to_date: NaiveDate,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub search: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub group_id: Option<String>,
}

impl DashboardFilter {
  /// From the first day of `today`'s month through `today`.
  pub fn month_to_date(today: NaiveDate) -> Self {
    Self {
      from_date: today.with_day(1).unwrap_or(today),
      to_date: today,
      search: None,
      group_id: None,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategorySearch {
  pub page: u32,
  pub size: u32,
  #[serde(flatten)]
  pub filter: DashboardFilter,
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_bank_mixed_case_fields() {
    let bank: BankMaster = serde_json::from_value(json!({
      "id": 5,
      "name": "Kedil Bank",
      "slug": "kedil",
      "shortName": "KDL",
      "imageUrl": "/uploads/kedil.png",
      "isGlobal": true,
      "created_at": "2026-01-01T00:00:00Z"
    }))
    .unwrap();
    assert_eq!(bank.short_name, "KDL");
    assert!(bank.is_global);
    assert_eq!(bank.created_at.as_deref(), Some("2026-01-01T00:00:00Z"));
  }

  #[test]
  fn test_dashboard_tolerates_missing_sections() {
    let data: DashboardData = serde_json::from_value(json!({
      "groups": [{"id": "g1", "name": "Bills", "allocated": 120.5}]
    }))
    .unwrap();
    assert_eq!(data.groups[0].categories.len(), 0);
    assert_eq!(data.summary.overspent, 0.0);
  }

  #[test]
  fn test_month_to_date() {
    let today = NaiveDate::from_ymd_opt(2026, 10, 15).unwrap();
    let filter = DashboardFilter::month_to_date(today);
    assert_eq!(filter.from_date, NaiveDate::from_ymd_opt(2026, 10, 1).unwrap());
    assert_eq!(
      serde_json::to_value(&filter).unwrap(),
      json!({"fromDate": "2026-10-01", "toDate": "2026-10-15"})
    );
  }

  #[test]
  fn test_category_params_skip_zero_epoch() {
    let params = CategoryParams {
      start_date: NaiveDate::from_ymd_opt(2026, 10, 1),
      epoch: Some(0),
      ..CategoryParams::default()
    };
    assert_eq!(
      params.to_query(),
      vec![("startDate".to_string(), "2026-10-01".to_string())]
    );
  }
}
