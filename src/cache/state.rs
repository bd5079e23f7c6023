use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::error::ApiError;

/// Lifecycle of a cached query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStatus {
  /// Nothing fetched yet and nothing in flight
  Idle,
  /// A fetch is in flight (previous data, if any, is still served)
  Loading,
  /// Last settled fetch succeeded
  Success,
  /// Last settled fetch failed
  Error,
}

/// Snapshot of a query as seen by one subscriber.
#[derive(Debug, Clone)]
pub struct QueryState<T> {
  pub status: QueryStatus,
  pub data: Option<Arc<T>>,
  pub error: Option<ApiError>,
  /// Wall-clock time of the last successful fetch
  pub updated_at: Option<DateTime<Utc>>,
  pub is_stale: bool,
}

impl<T> QueryState<T> {
  pub(crate) fn idle() -> Self {
    Self {
      status: QueryStatus::Idle,
      data: None,
      error: None,
      updated_at: None,
      is_stale: true,
    }
  }

  pub fn is_loading(&self) -> bool {
    self.status == QueryStatus::Loading
  }

  pub fn is_success(&self) -> bool {
    self.status == QueryStatus::Success
  }

  pub fn is_error(&self) -> bool {
    self.status == QueryStatus::Error
  }

  pub fn data(&self) -> Option<&T> {
    self.data.as_deref()
  }

  pub fn error(&self) -> Option<&ApiError> {
    self.error.as_ref()
  }
}

/// Lifecycle of a single mutation call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationStatus {
  Idle,
  Pending,
  Success,
  Error,
}
