use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use tokio::sync::watch;

use super::client::{downcast, QueryClient, Subscription};
use super::key::QueryKey;
use super::state::{QueryState, QueryStatus};
use crate::error::ApiError;

/// A live subscription to one cached query.
///
/// Reading never blocks and never fails: the handle reports the last known
/// state plus whether a fetch is in flight. Dropping the handle ends the
/// subscription without cancelling any request.
pub struct QueryHandle<T> {
  client: QueryClient,
  key: QueryKey,
  hash: String,
  generation: u64,
  subscription: Subscription,
  receiver: watch::Receiver<u64>,
  _marker: PhantomData<fn() -> T>,
}

impl<T: Send + Sync + 'static> QueryHandle<T> {
  pub(crate) fn new(
    client: QueryClient,
    key: QueryKey,
    hash: String,
    generation: u64,
    subscription: Subscription,
    receiver: watch::Receiver<u64>,
  ) -> Self {
    Self {
      client,
      key,
      hash,
      generation,
      subscription,
      receiver,
      _marker: PhantomData,
    }
  }

  pub fn key(&self) -> &QueryKey {
    &self.key
  }

  pub fn state(&self) -> QueryState<T> {
    self.client.snapshot(&self.hash, self.generation)
  }

  pub fn status(&self) -> QueryStatus {
    self.state().status
  }

  pub fn data(&self) -> Option<Arc<T>> {
    self.state().data
  }

  pub fn error(&self) -> Option<ApiError> {
    self.state().error
  }

  /// Start a new fetch right away, superseding one in flight.
  ///
  /// The returned future resolves with this fetch's own result; the cache
  /// applies it only if nothing newer landed first.
  pub fn refetch(&self) -> impl Future<Output = Result<Arc<T>, ApiError>> + Send + 'static {
    let pending = self.client.force_fetch(&self.hash, self.generation);
    let key = self.key.clone();
    async move {
      match pending {
        Some(future) => downcast(future.await?, &key),
        None => Err(ApiError::Unknown(format!(
          "query {} is no longer cached",
          key
        ))),
      }
    }
  }

  /// Wait until the entry changes. Returns false once the entry is gone.
  pub async fn changed(&mut self) -> bool {
    self.receiver.changed().await.is_ok()
  }

  /// Wait until no fetch is in flight and return the resulting state.
  pub async fn settled(&mut self) -> QueryState<T> {
    loop {
      self.receiver.borrow_and_update();
      let state = self.state();
      if !state.is_loading() {
        return state;
      }
      if self.receiver.changed().await.is_err() {
        return self.state();
      }
    }
  }
}

impl<T> Drop for QueryHandle<T> {
  fn drop(&mut self) {
    self.client.release(&self.hash, self.generation, self.subscription);
  }
}

impl<T> std::fmt::Debug for QueryHandle<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("QueryHandle")
      .field("key", &self.key)
      .field("generation", &self.generation)
      .finish_non_exhaustive()
  }
}
