use futures::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

use super::client::QueryClient;
use super::key::QueryFilter;
use super::state::MutationStatus;
use crate::error::ApiError;

type MutateFn<I, O> = Arc<dyn Fn(I) -> BoxFuture<'static, Result<O, ApiError>> + Send + Sync>;
type FilterFn<I> = Arc<dyn Fn(&I) -> QueryFilter + Send + Sync>;

/// Which cache entries a successful mutation invalidates.
pub struct MutationOptions<I> {
  invalidates: Vec<QueryFilter>,
  invalidates_for: Vec<FilterFn<I>>,
}

impl<I> Default for MutationOptions<I> {
  fn default() -> Self {
    Self {
      invalidates: Vec::new(),
      invalidates_for: Vec::new(),
    }
  }
}

impl<I> Clone for MutationOptions<I> {
  fn clone(&self) -> Self {
    Self {
      invalidates: self.invalidates.clone(),
      invalidates_for: self.invalidates_for.clone(),
    }
  }
}

impl<I> MutationOptions<I> {
  pub fn new() -> Self {
    Self::default()
  }

  /// Invalidate `filter` after every successful call.
  pub fn invalidates(mut self, filter: impl Into<QueryFilter>) -> Self {
    self.invalidates.push(filter.into());
    self
  }

  /// Invalidate a filter derived from the call's input, e.g. the detail
  /// key of the record being updated.
  pub fn invalidates_for<F>(mut self, filter: F) -> Self
  where
    F: Fn(&I) -> QueryFilter + Send + Sync + 'static,
  {
    self.invalidates_for.push(Arc::new(filter));
    self
  }

  fn filters_for(&self, input: &I) -> Vec<QueryFilter> {
    self
      .invalidates
      .iter()
      .cloned()
      .chain(self.invalidates_for.iter().map(|filter| filter(input)))
      .collect()
  }
}

/// A write against the backend that keeps the query cache consistent.
///
/// Each `mutate` call runs the operation exactly once. Errors are returned
/// to the caller untouched; only success invalidates.
pub struct Mutation<I, O> {
  client: QueryClient,
  mutate_fn: MutateFn<I, O>,
  options: MutationOptions<I>,
  status: Arc<Mutex<MutationStatus>>,
}

impl<I, O> Clone for Mutation<I, O> {
  fn clone(&self) -> Self {
    Self {
      client: self.client.clone(),
      mutate_fn: self.mutate_fn.clone(),
      options: self.options.clone(),
      status: self.status.clone(),
    }
  }
}

impl<I: Send + 'static, O: Send + 'static> Mutation<I, O> {
  pub(crate) fn new<F, Fut>(client: QueryClient, mutate_fn: F, options: MutationOptions<I>) -> Self
  where
    F: Fn(I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<O, ApiError>> + Send + 'static,
  {
    Self {
      client,
      mutate_fn: Arc::new(move |input| mutate_fn(input).boxed()),
      options,
      status: Arc::new(Mutex::new(MutationStatus::Idle)),
    }
  }

  pub async fn mutate(&self, input: I) -> Result<O, ApiError> {
    let filters = self.options.filters_for(&input);
    *self.status.lock() = MutationStatus::Pending;

    match (self.mutate_fn)(input).await {
      Ok(output) => {
        let refetched: usize = filters
          .iter()
          .map(|filter| self.client.invalidate_queries(filter))
          .sum();
        debug!(filters = filters.len(), refetched, "mutation succeeded");
        *self.status.lock() = MutationStatus::Success;
        Ok(output)
      }
      Err(e) => {
        debug!(error = %e, "mutation failed");
        *self.status.lock() = MutationStatus::Error;
        Err(e)
      }
    }
  }

  pub fn status(&self) -> MutationStatus {
    *self.status.lock()
  }

  pub fn reset(&self) {
    *self.status.lock() = MutationStatus::Idle;
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::{QueryKey, QueryOptions};
  use std::sync::atomic::{AtomicUsize, Ordering};

  #[tokio::test]
  async fn test_success_invalidates_static_and_derived_filters() {
    let client = QueryClient::default();
    let list_calls = Arc::new(AtomicUsize::new(0));
    let detail_calls = Arc::new(AtomicUsize::new(0));

    let counter = list_calls.clone();
    let mut list = client.use_query(
      QueryKey::root("groups"),
      move || {
        let counter = counter.clone();
        async move { Ok::<_, ApiError>(counter.fetch_add(1, Ordering::SeqCst)) }
      },
      QueryOptions::default(),
    );
    let counter = detail_calls.clone();
    let mut detail = client.use_query(
      QueryKey::root("group").with("g1"),
      move || {
        let counter = counter.clone();
        async move { Ok::<_, ApiError>(counter.fetch_add(1, Ordering::SeqCst)) }
      },
      QueryOptions::default(),
    );
    list.settled().await;
    detail.settled().await;

    let update = client.use_mutation(
      |id: String| async move { Ok::<_, ApiError>(id) },
      MutationOptions::new()
        .invalidates(QueryKey::root("groups"))
        .invalidates_for(|id: &String| QueryFilter::prefix(QueryKey::root("group").with(id))),
    );
    assert_eq!(update.status(), MutationStatus::Idle);
    assert_eq!(update.mutate("g1".to_string()).await.unwrap(), "g1");
    assert_eq!(update.status(), MutationStatus::Success);

    list.settled().await;
    detail.settled().await;
    assert_eq!(list_calls.load(Ordering::SeqCst), 2);
    assert_eq!(detail_calls.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn test_failure_is_returned_and_does_not_invalidate() {
    let client = QueryClient::default();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let mut list = client.use_query(
      QueryKey::root("banks"),
      move || {
        let counter = counter.clone();
        async move { Ok::<_, ApiError>(counter.fetch_add(1, Ordering::SeqCst)) }
      },
      QueryOptions::default(),
    );
    list.settled().await;

    let delete = client.use_mutation(
      |_id: i64| async move {
        Err::<(), _>(ApiError::Conflict("has associated accounts".to_string()))
      },
      MutationOptions::new().invalidates(QueryKey::root("banks")),
    );

    let err = delete.mutate(5).await.unwrap_err();
    assert_eq!(err, ApiError::Conflict("has associated accounts".to_string()));
    assert_eq!(delete.status(), MutationStatus::Error);
    assert!(list.state().is_success());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_each_call_executes_once() {
    let client = QueryClient::default();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let create = client.use_mutation(
      move |_: ()| {
        let counter = counter.clone();
        async move {
          counter.fetch_add(1, Ordering::SeqCst);
          Ok::<_, ApiError>(())
        }
      },
      MutationOptions::new(),
    );

    create.mutate(()).await.unwrap();
    create.mutate(()).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
  }
}
