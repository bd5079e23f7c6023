//! Cache keys of the admin queries.

use crate::cache::{QueryFilter, QueryKey};

use super::types::{CategoryParams, CategorySearch, DashboardFilter};

/// Every query the console issues, one variant per resource view.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AdminQueryKey {
  Banks,
  Bank { id: i64 },
  Categories { params: CategoryParams },
  Category { id: String, params: CategoryParams },
  Dashboard { filter: DashboardFilter },
  CategorySearch { request: CategorySearch },
  Groups,
  Group { id: String },
  Icons { search: Option<String> },
  Icon { id: String },
  Users,
  User { email: String },
}

impl AdminQueryKey {
  /// Leading segment shared by every key of the variant's resource.
  pub fn resource(&self) -> &'static str {
    match self {
      Self::Banks => "banks",
      Self::Bank { .. } => "bank",
      Self::Categories { .. } => "categories",
      Self::Category { .. } => "category",
      Self::Dashboard { .. } => "dashboard",
      Self::CategorySearch { .. } => "categorySearch",
      Self::Groups => "groups",
      Self::Group { .. } => "group",
      Self::Icons { .. } => "icons",
      Self::Icon { .. } => "icon",
      Self::Users => "users",
      Self::User { .. } => "user",
    }
  }

  pub fn query_key(&self) -> QueryKey {
    let root = QueryKey::root(self.resource());
    match self {
      Self::Banks | Self::Groups | Self::Users => root,
      Self::Bank { id } => root.with(id),
      Self::Categories { params } => root.with(params),
      Self::Category { id, params } => root.with(id).with(params),
      Self::Dashboard { filter } => root.with(filter),
      Self::CategorySearch { request } => root.with(request),
      Self::Group { id } | Self::Icon { id } => root.with(id),
      Self::Icons { search } => root.with(search),
      Self::User { email } => root.with(email),
    }
  }
}

impl From<AdminQueryKey> for QueryKey {
  fn from(key: AdminQueryKey) -> Self {
    key.query_key()
  }
}

/// Every key under a resource, e.g. all `["categories", ..]` entries.
pub fn all(resource: &str) -> QueryFilter {
  QueryFilter::prefix(resource)
}

/// Every key for one record, e.g. `["category", id, ..]` whatever its params.
pub fn record(resource: &str, id: impl serde::Serialize) -> QueryFilter {
  QueryFilter::prefix(QueryKey::root(resource).with(id))
}
