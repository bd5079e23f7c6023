//! Process-wide query cache coordinating fetches, staleness and invalidation.

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::{Mutex, MutexGuard};
use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use super::handle::QueryHandle;
use super::key::{QueryFilter, QueryKey};
use super::mutation::{Mutation, MutationOptions};
use super::options::QueryOptions;
use super::state::{QueryState, QueryStatus};
use crate::error::ApiError;

/// Type-erased cached value. Each key holds exactly one concrete type.
pub(crate) type Erased = Arc<dyn Any + Send + Sync>;
pub(crate) type FetchResult = Result<Erased, ApiError>;
pub(crate) type SharedFetch = Shared<BoxFuture<'static, FetchResult>>;
type ErasedFetcher = Arc<dyn Fn() -> BoxFuture<'static, FetchResult> + Send + Sync>;
type Request = BoxFuture<'static, FetchResult>;

/// The single outstanding request for a key.
struct InFlight {
  seq: u64,
  future: SharedFetch,
}

struct QueryEntry {
  key: QueryKey,
  /// Distinguishes this entry from a later one recreated under the same hash
  generation: u64,
  status: QueryStatus,
  data: Option<Erased>,
  error: Option<ApiError>,
  fetched_at: Option<Instant>,
  updated_at: Option<DateTime<Utc>>,
  invalidated: bool,
  options: QueryOptions,
  subscribers: usize,
  /// Subscribers that allow fetching; only these drive refetches
  enabled_subscribers: usize,
  focus_subscribers: usize,
  /// Sequence number of the newest result written into this entry
  applied_seq: u64,
  in_flight: Option<InFlight>,
  fetcher: Option<ErasedFetcher>,
  gc_task: Option<JoinHandle<()>>,
  notify: watch::Sender<u64>,
}

impl QueryEntry {
  fn new(key: QueryKey, generation: u64, options: QueryOptions) -> Self {
    let (notify, _) = watch::channel(0);
    Self {
      key,
      generation,
      status: QueryStatus::Idle,
      data: None,
      error: None,
      fetched_at: None,
      updated_at: None,
      invalidated: false,
      options,
      subscribers: 0,
      enabled_subscribers: 0,
      focus_subscribers: 0,
      applied_seq: 0,
      in_flight: None,
      fetcher: None,
      gc_task: None,
      notify,
    }
  }

  fn is_stale(&self, stale_time: Duration) -> bool {
    self.invalidated
      || self
        .fetched_at
        .map(|t| t.elapsed() >= stale_time)
        .unwrap_or(true)
  }

  fn needs_fetch_on_mount(&self, options: &QueryOptions) -> bool {
    if self.data.is_none() || self.invalidated {
      return true;
    }
    options.refetch_on_mount && self.is_stale(options.stale_time)
  }

  fn bump(&self) {
    self.notify.send_modify(|version| *version += 1);
  }

  fn abort_gc(&mut self) {
    if let Some(task) = self.gc_task.take() {
      task.abort();
    }
  }

  fn snapshot<T: Send + Sync + 'static>(&self) -> QueryState<T> {
    QueryState {
      status: self.status,
      data: self.data.clone().and_then(|data| data.downcast::<T>().ok()),
      error: self.error.clone(),
      updated_at: self.updated_at,
      is_stale: self.is_stale(self.options.stale_time),
    }
  }
}

/// What one subscriber asked for, handed back when it unsubscribes.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Subscription {
  enabled: bool,
  refetch_on_focus: bool,
}

impl Subscription {
  fn of(options: &QueryOptions) -> Self {
    Self {
      enabled: options.enabled,
      refetch_on_focus: options.enabled && options.refetch_on_focus,
    }
  }
}

/// A fetch already registered as in flight whose request is not issued yet.
///
/// The fetcher is user code and may read the cache, so it only runs once
/// the entries lock is released.
#[must_use]
struct PendingFetch {
  seq: u64,
  fetcher: ErasedFetcher,
  request: oneshot::Sender<Request>,
  future: SharedFetch,
}

impl PendingFetch {
  fn launch(self) -> SharedFetch {
    // The receiving side lives inside `future`, which we still hold
    let _ = self.request.send((self.fetcher)());
    tokio::spawn(self.future.clone());
    self.future
  }
}

/// How an imperative fetch is going to be answered.
enum Lookup {
  Fresh(Erased),
  Joined(u64, SharedFetch),
  Started(PendingFetch),
}

fn launch_all(pending: Vec<PendingFetch>) -> usize {
  let started = pending.len();
  for fetch in pending {
    let _ = fetch.launch();
  }
  started
}

struct Inner {
  entries: Mutex<HashMap<String, QueryEntry>>,
  defaults: QueryOptions,
  next_seq: AtomicU64,
  next_generation: AtomicU64,
}

/// Keyed cache of remote data shared by every view of the console.
///
/// - At most one request is in flight per key; concurrent callers share it.
/// - Results are applied in issue order: a response older than the last
///   applied one for the same key is dropped.
/// - Invalidation marks entries stale and refetches the ones somebody is
///   subscribed to.
/// - Entries without subscribers are dropped after their `gc_time`.
///
/// Must be used from within a Tokio runtime; fetches are driven by spawned
/// tasks so that unsubscribing never cancels a request.
#[derive(Clone)]
pub struct QueryClient {
  inner: Arc<Inner>,
}

impl Default for QueryClient {
  fn default() -> Self {
    Self::new(QueryOptions::default())
  }
}

impl QueryClient {
  pub fn new(defaults: QueryOptions) -> Self {
    Self {
      inner: Arc::new(Inner {
        entries: Mutex::new(HashMap::new()),
        defaults,
        next_seq: AtomicU64::new(0),
        next_generation: AtomicU64::new(0),
      }),
    }
  }

  /// Options new queries start from.
  pub fn default_options(&self) -> QueryOptions {
    self.inner.defaults.clone()
  }

  fn entries(&self) -> MutexGuard<'_, HashMap<String, QueryEntry>> {
    self.inner.entries.lock()
  }

  fn next_seq(&self) -> u64 {
    self.inner.next_seq.fetch_add(1, Ordering::Relaxed) + 1
  }

  fn entry_or_insert<'a>(
    &self,
    entries: &'a mut HashMap<String, QueryEntry>,
    key: &QueryKey,
    hash: &str,
    options: &QueryOptions,
  ) -> &'a mut QueryEntry {
    let generation = &self.inner.next_generation;
    entries.entry(hash.to_string()).or_insert_with(|| {
      let generation = generation.fetch_add(1, Ordering::Relaxed) + 1;
      QueryEntry::new(key.clone(), generation, options.clone())
    })
  }

  /// Subscribe to a query.
  ///
  /// Fetches when the entry is absent or stale (subject to `enabled` and
  /// `refetch_on_mount`), joins a fetch already in flight, and serves fresh
  /// data without touching the network. The subscription ends when the
  /// handle is dropped.
  pub fn use_query<T, F, Fut>(
    &self,
    key: impl Into<QueryKey>,
    fetcher: F,
    options: QueryOptions,
  ) -> QueryHandle<T>
  where
    T: Send + Sync + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
  {
    let key = key.into();
    let hash = key.cache_hash();

    let subscription = Subscription::of(&options);

    let mut entries = self.entries();
    let entry = self.entry_or_insert(&mut entries, &key, &hash, &options);
    entry.abort_gc();
    entry.subscribers += 1;
    // A disabled subscriber must not steer fetching for the enabled ones
    if subscription.enabled || entry.fetcher.is_none() {
      entry.fetcher = Some(erase(fetcher));
    }
    if subscription.enabled {
      entry.enabled_subscribers += 1;
      entry.options = options.clone();
    }
    if subscription.refetch_on_focus {
      entry.focus_subscribers += 1;
    }

    let receiver = entry.notify.subscribe();
    let generation = entry.generation;

    let mut pending = None;
    if !options.enabled {
      trace!(%key, "query disabled, not fetching");
    } else if entry.in_flight.is_some() {
      debug!(%key, "joining in-flight fetch");
    } else if entry.needs_fetch_on_mount(&options) {
      debug!(%key, "query mounted, fetching");
      pending = self.prepare_fetch(&hash, entry);
    } else {
      trace!(%key, "serving cached data");
    }
    drop(entries);

    if let Some(fetch) = pending {
      let _ = fetch.launch();
    }
    QueryHandle::new(self.clone(), key, hash, generation, subscription, receiver)
  }

  /// Fetch a query imperatively, honouring freshness and deduplication.
  ///
  /// A caller that joins a fetch which is then superseded receives the
  /// newer cached value once its own request resolves.
  pub async fn fetch_query<T, F, Fut>(
    &self,
    key: impl Into<QueryKey>,
    fetcher: F,
    options: QueryOptions,
  ) -> Result<Arc<T>, ApiError>
  where
    T: Send + Sync + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
  {
    let key = key.into();
    let hash = key.cache_hash();

    let lookup = {
      let mut entries = self.entries();
      let entry = self.entry_or_insert(&mut entries, &key, &hash, &options);
      entry.fetcher = Some(erase(fetcher));

      let fresh = entry
        .data
        .clone()
        .filter(|_| !entry.is_stale(options.stale_time));
      let lookup = if let Some(in_flight) = &entry.in_flight {
        debug!(%key, "joining in-flight fetch");
        Lookup::Joined(in_flight.seq, in_flight.future.clone())
      } else if let Some(data) = fresh {
        Lookup::Fresh(data)
      } else {
        match self.prepare_fetch(&hash, entry) {
          Some(fetch) => Lookup::Started(fetch),
          None => return Err(ApiError::Unknown(format!("no fetcher registered for {}", key))),
        }
      };

      if entry.subscribers == 0 && entry.gc_task.is_none() {
        self.schedule_gc(&hash, entry);
      }
      lookup
    };

    let (seq, future) = match lookup {
      Lookup::Fresh(data) => return downcast(data, &key),
      Lookup::Joined(seq, future) => (seq, future),
      Lookup::Started(fetch) => (fetch.seq, fetch.launch()),
    };
    let data = future.await?;
    downcast(self.newer_than(&hash, seq).unwrap_or(data), &key)
  }

  /// Build a mutation that invalidates cache entries on success.
  pub fn use_mutation<I, O, F, Fut>(&self, mutate_fn: F, options: MutationOptions<I>) -> Mutation<I, O>
  where
    I: Send + 'static,
    O: Send + 'static,
    F: Fn(I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<O, ApiError>> + Send + 'static,
  {
    Mutation::new(self.clone(), mutate_fn, options)
  }

  /// Mark matching entries stale; refetch the ones with subscribers.
  ///
  /// Returns the number of refetches started. Unsubscribed entries stay
  /// stale until their next subscription.
  pub fn invalidate_queries(&self, filter: &QueryFilter) -> usize {
    let mut entries = self.entries();
    let mut matched = 0;
    let mut pending = Vec::new();

    for (hash, entry) in entries.iter_mut() {
      if !filter.matches(&entry.key) {
        continue;
      }
      matched += 1;
      entry.invalidated = true;
      let fetch = if entry.enabled_subscribers > 0 {
        self.prepare_fetch(hash, entry)
      } else {
        None
      };
      match fetch {
        Some(fetch) => pending.push(fetch),
        None => entry.bump(),
      }
    }
    drop(entries);

    let refetched = launch_all(pending);
    debug!(?filter, matched, refetched, "invalidated queries");
    refetched
  }

  /// Force a fetch for every subscribed entry matching `filter`.
  pub fn refetch_queries(&self, filter: &QueryFilter) -> usize {
    let mut entries = self.entries();
    let pending: Vec<_> = entries
      .iter_mut()
      .filter(|(_, entry)| filter.matches(&entry.key) && entry.enabled_subscribers > 0)
      .filter_map(|(hash, entry)| self.prepare_fetch(hash, entry))
      .collect();
    drop(entries);
    launch_all(pending)
  }

  /// Refetch stale subscribed queries that opted into focus refetching.
  pub fn on_focus(&self) -> usize {
    let mut entries = self.entries();
    let pending: Vec<_> = entries
      .iter_mut()
      .filter(|(_, entry)| {
        entry.focus_subscribers > 0
          && entry.in_flight.is_none()
          && entry.is_stale(entry.options.stale_time)
      })
      .filter_map(|(hash, entry)| self.prepare_fetch(hash, entry))
      .collect();
    drop(entries);

    let refetched = launch_all(pending);
    debug!(refetched, "focus regained");
    refetched
  }

  pub fn get_query_data<T: Send + Sync + 'static>(&self, key: &QueryKey) -> Option<Arc<T>> {
    let entries = self.entries();
    entries
      .get(&key.cache_hash())
      .and_then(|entry| entry.data.clone())
      .and_then(|data| data.downcast::<T>().ok())
  }

  /// Write data directly into the cache, e.g. for an optimistic update.
  ///
  /// Counts as the newest result for the key: a fetch issued before this
  /// write cannot overwrite it when it lands.
  pub fn set_query_data<T: Send + Sync + 'static>(&self, key: impl Into<QueryKey>, data: T) {
    let key = key.into();
    let hash = key.cache_hash();
    let seq = self.next_seq();

    let mut entries = self.entries();
    let options = self.default_options();
    let entry = self.entry_or_insert(&mut entries, &key, &hash, &options);
    entry.data = Some(Arc::new(data));
    entry.error = None;
    entry.applied_seq = seq;
    entry.fetched_at = Some(Instant::now());
    entry.updated_at = Some(Utc::now());
    entry.invalidated = false;
    if entry.in_flight.is_none() {
      entry.status = QueryStatus::Success;
    }
    entry.bump();
    if entry.subscribers == 0 && entry.gc_task.is_none() {
      self.schedule_gc(&hash, entry);
    }
  }

  pub fn query_state<T: Send + Sync + 'static>(&self, key: &QueryKey) -> QueryState<T> {
    self
      .entries()
      .get(&key.cache_hash())
      .map(QueryEntry::snapshot)
      .unwrap_or_else(QueryState::idle)
  }

  /// Drop matching entries immediately. Returns how many were removed.
  pub fn remove_queries(&self, filter: &QueryFilter) -> usize {
    let mut entries = self.entries();
    let before = entries.len();
    entries.retain(|_, entry| {
      let keep = !filter.matches(&entry.key);
      if !keep {
        entry.abort_gc();
      }
      keep
    });
    before - entries.len()
  }

  /// Drop every entry. Results of fetches still in flight are discarded.
  pub fn clear(&self) {
    let mut entries = self.entries();
    for entry in entries.values_mut() {
      entry.abort_gc();
    }
    let removed = entries.len();
    entries.clear();
    debug!(removed, "query cache cleared");
  }

  pub fn len(&self) -> usize {
    self.entries().len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries().is_empty()
  }

  pub fn contains(&self, key: &QueryKey) -> bool {
    self.entries().contains_key(&key.cache_hash())
  }

  pub(crate) fn snapshot<T: Send + Sync + 'static>(
    &self,
    hash: &str,
    generation: u64,
  ) -> QueryState<T> {
    self
      .entries()
      .get(hash)
      .filter(|entry| entry.generation == generation)
      .map(QueryEntry::snapshot)
      .unwrap_or_else(QueryState::idle)
  }

  /// Start a fetch for a subscribed entry, superseding any in flight.
  pub(crate) fn force_fetch(&self, hash: &str, generation: u64) -> Option<SharedFetch> {
    let pending = {
      let mut entries = self.entries();
      let entry = entries
        .get_mut(hash)
        .filter(|entry| entry.generation == generation)?;
      self.prepare_fetch(hash, entry)?
    };
    Some(pending.launch())
  }

  /// Data written by a result newer than `seq`, if any landed.
  fn newer_than(&self, hash: &str, seq: u64) -> Option<Erased> {
    self
      .entries()
      .get(hash)
      .filter(|entry| entry.applied_seq > seq)
      .and_then(|entry| entry.data.clone())
  }

  /// End one subscription; the last one starts the GC timer.
  pub(crate) fn release(&self, hash: &str, generation: u64, subscription: Subscription) {
    let mut entries = self.entries();
    let Some(entry) = entries
      .get_mut(hash)
      .filter(|entry| entry.generation == generation)
    else {
      return;
    };
    entry.subscribers = entry.subscribers.saturating_sub(1);
    if subscription.enabled {
      entry.enabled_subscribers = entry.enabled_subscribers.saturating_sub(1);
    }
    if subscription.refetch_on_focus {
      entry.focus_subscribers = entry.focus_subscribers.saturating_sub(1);
    }
    if entry.subscribers == 0 {
      trace!(key = %entry.key, "last subscriber gone");
      self.schedule_gc(hash, entry);
    }
  }

  /// Register a fetch as in flight, superseding any earlier one.
  ///
  /// The request itself is issued by [`PendingFetch::launch`], which callers
  /// run after dropping the entries lock.
  fn prepare_fetch(&self, hash: &str, entry: &mut QueryEntry) -> Option<PendingFetch> {
    let fetcher = entry.fetcher.clone()?;
    let seq = self.next_seq();
    let generation = entry.generation;
    let client = Arc::downgrade(&self.inner);
    let hash = hash.to_string();

    let (request, issued) = oneshot::channel::<Request>();
    let future = async move {
      let result = match issued.await {
        Ok(request) => request.await,
        Err(_) => Err(ApiError::Unknown("fetch was never issued".to_string())),
      };
      if let Some(inner) = client.upgrade() {
        QueryClient { inner }.settle(&hash, generation, seq, &result);
      }
      result
    }
    .boxed()
    .shared();

    if let Some(previous) = entry.in_flight.replace(InFlight {
      seq,
      future: future.clone(),
    }) {
      debug!(key = %entry.key, superseded = previous.seq, seq, "superseding in-flight fetch");
    }
    entry.status = QueryStatus::Loading;
    entry.bump();

    Some(PendingFetch {
      seq,
      fetcher,
      request,
      future,
    })
  }

  fn settle(&self, hash: &str, generation: u64, seq: u64, result: &FetchResult) {
    let mut entries = self.entries();
    let Some(entry) = entries
      .get_mut(hash)
      .filter(|entry| entry.generation == generation)
    else {
      debug!(seq, "dropping result for a query no longer cached");
      return;
    };

    if entry.in_flight.as_ref().is_some_and(|f| f.seq == seq) {
      entry.in_flight = None;
    }

    if seq <= entry.applied_seq {
      debug!(key = %entry.key, seq, applied = entry.applied_seq, "discarding out-of-order result");
      if entry.in_flight.is_none() && entry.status == QueryStatus::Loading {
        entry.status = if entry.error.is_some() && entry.data.is_none() {
          QueryStatus::Error
        } else {
          QueryStatus::Success
        };
        entry.bump();
      }
      return;
    }
    entry.applied_seq = seq;

    match result {
      Ok(data) => {
        entry.data = Some(data.clone());
        entry.error = None;
        entry.fetched_at = Some(Instant::now());
        entry.updated_at = Some(Utc::now());
        entry.invalidated = false;
      }
      Err(e) => {
        warn!(key = %entry.key, error = %e, "query fetch failed");
        entry.error = Some(e.clone());
      }
    }

    entry.status = match (&entry.in_flight, result) {
      (Some(_), _) => QueryStatus::Loading,
      (None, Ok(_)) => QueryStatus::Success,
      (None, Err(_)) => QueryStatus::Error,
    };
    debug!(key = %entry.key, seq, status = ?entry.status, "query settled");
    entry.bump();
  }

  fn schedule_gc(&self, hash: &str, entry: &mut QueryEntry) {
    entry.abort_gc();
    let Ok(runtime) = tokio::runtime::Handle::try_current() else {
      warn!(key = %entry.key, "no runtime available, query will not be collected");
      return;
    };

    let client = Arc::downgrade(&self.inner);
    let hash = hash.to_string();
    let generation = entry.generation;
    let gc_time = entry.options.gc_time;

    entry.gc_task = Some(runtime.spawn(async move {
      tokio::time::sleep(gc_time).await;
      if let Some(inner) = client.upgrade() {
        QueryClient { inner }.collect(&hash, generation);
      }
    }));
  }

  fn collect(&self, hash: &str, generation: u64) {
    let mut entries = self.entries();
    let expired = entries
      .get(hash)
      .is_some_and(|entry| entry.generation == generation && entry.subscribers == 0);
    if expired {
      if let Some(entry) = entries.remove(hash) {
        debug!(key = %entry.key, "query garbage collected");
      }
    }
  }
}

fn erase<T, F, Fut>(fetcher: F) -> ErasedFetcher
where
  T: Send + Sync + 'static,
  F: Fn() -> Fut + Send + Sync + 'static,
  Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
{
  Arc::new(move || {
    let request = fetcher();
    async move { request.await.map(|data| Arc::new(data) as Erased) }.boxed()
  })
}

pub(crate) fn downcast<T: Send + Sync + 'static>(
  data: Erased,
  key: &QueryKey,
) -> Result<Arc<T>, ApiError> {
  data
    .downcast::<T>()
    .map_err(|_| ApiError::Schema(format!("cached value for {} has a different type", key)))
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::VecDeque;
  use std::sync::atomic::AtomicUsize;
  use tokio::sync::oneshot;

  fn counting_fetcher(
    calls: Arc<AtomicUsize>,
    delay: Duration,
  ) -> impl Fn() -> BoxFuture<'static, Result<Vec<u32>, ApiError>> + Clone + Send + Sync + 'static {
    move || {
      let calls = calls.clone();
      async move {
        let n = calls.fetch_add(1, Ordering::SeqCst) as u32 + 1;
        tokio::time::sleep(delay).await;
        Ok(vec![n])
      }
      .boxed()
    }
  }

  /// Fetcher whose Nth call resolves when the Nth gate is opened.
  fn gated_fetcher(
    gates: Vec<oneshot::Receiver<&'static str>>,
  ) -> impl Fn() -> BoxFuture<'static, Result<String, ApiError>> + Clone + Send + Sync + 'static {
    let gates = Arc::new(Mutex::new(VecDeque::from(gates)));
    move || {
      let gate = gates.lock().pop_front();
      async move {
        match gate {
          Some(gate) => gate
            .await
            .map(String::from)
            .map_err(|_| ApiError::Unknown("gate dropped".to_string())),
          None => Err(ApiError::Unknown("unexpected fetch".to_string())),
        }
      }
      .boxed()
    }
  }

  #[tokio::test]
  async fn test_concurrent_fetches_share_one_request() {
    let client = QueryClient::default();
    let calls = Arc::new(AtomicUsize::new(0));
    let fetcher = counting_fetcher(calls.clone(), Duration::from_millis(20));

    let (a, b) = tokio::join!(
      client.fetch_query(QueryKey::root("banks"), fetcher.clone(), QueryOptions::default()),
      client.fetch_query(QueryKey::root("banks"), fetcher, QueryOptions::default()),
    );

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let (a, b) = (a.unwrap(), b.unwrap());
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(*a, vec![1]);
  }

  #[tokio::test]
  async fn test_concurrent_subscribers_share_one_request() {
    let client = QueryClient::default();
    let calls = Arc::new(AtomicUsize::new(0));
    let fetcher = counting_fetcher(calls.clone(), Duration::from_millis(20));

    let mut first = client.use_query(QueryKey::root("groups"), fetcher.clone(), QueryOptions::default());
    let mut second = client.use_query(QueryKey::root("groups"), fetcher, QueryOptions::default());
    assert!(first.state().is_loading());
    assert!(second.state().is_loading());

    let a = first.settled().await;
    let b = second.settled().await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(Arc::ptr_eq(a.data.as_ref().unwrap(), b.data.as_ref().unwrap()));
  }

  #[tokio::test]
  async fn test_out_of_order_response_is_discarded() {
    let client = QueryClient::default();
    let (tx_a, rx_a) = oneshot::channel();
    let (tx_b, rx_b) = oneshot::channel();

    let handle = client.use_query(
      QueryKey::root("bank").with(5),
      gated_fetcher(vec![rx_a, rx_b]),
      QueryOptions::default(),
    );
    let refetch = handle.refetch();

    tx_b.send("B").unwrap();
    assert_eq!(*refetch.await.unwrap(), "B");

    tx_a.send("A").unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    let state = handle.state();
    assert_eq!(state.data().map(String::as_str), Some("B"));
    assert!(state.is_success());
  }

  #[tokio::test]
  async fn test_in_order_responses_end_with_latest() {
    let client = QueryClient::default();
    let (tx_a, rx_a) = oneshot::channel();
    let (tx_b, rx_b) = oneshot::channel();

    let mut handle = client.use_query(
      QueryKey::root("bank").with(5),
      gated_fetcher(vec![rx_a, rx_b]),
      QueryOptions::default(),
    );
    let refetch = handle.refetch();

    tx_a.send("A").unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    // A landed but B is still outstanding
    assert_eq!(handle.data().as_deref().map(String::as_str), Some("A"));
    assert!(handle.state().is_loading());

    tx_b.send("B").unwrap();
    refetch.await.unwrap();
    let state = handle.settled().await;
    assert_eq!(state.data().map(String::as_str), Some("B"));
  }

  #[tokio::test]
  async fn test_fresh_data_served_without_network() {
    let client = QueryClient::default();
    let calls = Arc::new(AtomicUsize::new(0));
    let fetcher = counting_fetcher(calls.clone(), Duration::ZERO);
    let options = QueryOptions::default().with_stale_time(Duration::from_secs(60));

    let mut first = client.use_query(QueryKey::root("icons"), fetcher.clone(), options.clone());
    first.settled().await;

    let second = client.use_query(QueryKey::root("icons"), fetcher, options);
    assert!(second.state().is_success());
    assert_eq!(second.data().as_deref(), Some(&vec![1]));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_zero_stale_time_revalidates_on_mount() {
    let client = QueryClient::default();
    let calls = Arc::new(AtomicUsize::new(0));
    let fetcher = counting_fetcher(calls.clone(), Duration::ZERO);

    let mut first = client.use_query(QueryKey::root("users"), fetcher.clone(), QueryOptions::default());
    first.settled().await;

    let mut second = client.use_query(QueryKey::root("users"), fetcher, QueryOptions::default());
    // Cached data is served while revalidating
    assert_eq!(second.data().as_deref(), Some(&vec![1]));
    assert!(second.state().is_loading());
    let state = second.settled().await;
    assert_eq!(state.data(), Some(&vec![2]));
  }

  #[tokio::test]
  async fn test_invalidation_refetches_subscribed_entries() {
    let client = QueryClient::default();
    let calls = Arc::new(AtomicUsize::new(0));
    let mut handle = client.use_query(
      QueryKey::root("banks"),
      counting_fetcher(calls.clone(), Duration::ZERO),
      QueryOptions::default(),
    );
    handle.settled().await;

    assert_eq!(client.invalidate_queries(&QueryFilter::prefix("banks")), 1);
    assert!(handle.state().is_loading());

    let state = handle.settled().await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(state.data(), Some(&vec![2]));
    assert!(state.updated_at.is_some());
  }

  #[tokio::test]
  async fn test_invalidation_without_subscribers_defers_fetch() {
    let client = QueryClient::default();
    let calls = Arc::new(AtomicUsize::new(0));
    let fetcher = counting_fetcher(calls.clone(), Duration::ZERO);
    let key = QueryKey::root("categories").with(Option::<u32>::None);
    let options = QueryOptions::default().with_stale_time(Duration::from_secs(60));

    client
      .fetch_query(key.clone(), fetcher.clone(), options.clone())
      .await
      .unwrap();
    assert!(!client.query_state::<Vec<u32>>(&key).is_stale);

    assert_eq!(client.invalidate_queries(&QueryFilter::prefix("categories")), 0);
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(client.query_state::<Vec<u32>>(&key).is_stale);

    let mut handle = client.use_query(key, fetcher, options);
    assert!(handle.state().is_loading());
    handle.settled().await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn test_invalidation_leaves_unmatched_entries_alone() {
    let client = QueryClient::default();
    let calls = Arc::new(AtomicUsize::new(0));
    let mut handle = client.use_query(
      QueryKey::root("icons").with("bank"),
      counting_fetcher(calls.clone(), Duration::ZERO),
      QueryOptions::default(),
    );
    handle.settled().await;

    assert_eq!(client.invalidate_queries(&QueryFilter::prefix("banks")), 0);
    assert!(handle.state().is_success());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_disabled_query_never_fetches() {
    let client = QueryClient::default();
    let calls = Arc::new(AtomicUsize::new(0));
    let mut handle = client.use_query(
      QueryKey::root("user").with(""),
      counting_fetcher(calls.clone(), Duration::ZERO),
      QueryOptions::default().enabled(false),
    );

    let state = handle.settled().await;
    assert_eq!(state.status, QueryStatus::Idle);
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    assert_eq!(client.invalidate_queries(&QueryFilter::prefix("user")), 0);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
  }

  #[tokio::test]
  async fn test_disabled_subscriber_does_not_block_invalidation() {
    let client = QueryClient::default();
    let calls = Arc::new(AtomicUsize::new(0));
    let fetcher = counting_fetcher(calls.clone(), Duration::ZERO);
    let key = QueryKey::root("user").with("sari@kedil.com");

    let mut view = client.use_query(key.clone(), fetcher.clone(), QueryOptions::default());
    view.settled().await;
    let lookup = client.use_query(key.clone(), fetcher, QueryOptions::default().enabled(false));

    assert_eq!(client.invalidate_queries(&QueryFilter::prefix("user")), 1);
    let state = view.settled().await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(state.data(), Some(&vec![2]));

    assert_eq!(client.refetch_queries(&QueryFilter::exact(key.clone())), 1);
    view.settled().await;
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    // Only the disabled subscriber is left
    drop(view);
    assert_eq!(client.invalidate_queries(&QueryFilter::prefix("user")), 0);
    assert_eq!(client.on_focus(), 0);
    assert_eq!(lookup.status(), QueryStatus::Success);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
  }

  #[tokio::test]
  async fn test_fetcher_may_read_the_cache() {
    let client = QueryClient::default();
    client.set_query_data(QueryKey::root("banks"), 7u8);

    let reader = client.clone();
    let mut handle = client.use_query(
      QueryKey::root("bank").with(7),
      move || {
        let banks = reader.get_query_data::<u8>(&QueryKey::root("banks"));
        async move { Ok::<_, ApiError>(banks.map(|count| *count)) }
      },
      QueryOptions::default(),
    );

    let state = tokio::time::timeout(Duration::from_secs(1), handle.settled())
      .await
      .unwrap();
    assert_eq!(state.data(), Some(&Some(7)));
    client.clear();
  }

  #[tokio::test]
  async fn test_joined_fetch_returns_newer_result() {
    let client = QueryClient::default();
    let (tx_a, rx_a) = oneshot::channel();
    let (tx_b, rx_b) = oneshot::channel();
    let key = QueryKey::root("bank").with(5);
    let fetcher = gated_fetcher(vec![rx_a, rx_b]);

    let handle = client.use_query(key.clone(), fetcher.clone(), QueryOptions::default());
    let joined = {
      let client = client.clone();
      let key = key.clone();
      tokio::spawn(async move {
        client
          .fetch_query(key, fetcher, QueryOptions::default())
          .await
      })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;

    let refetch = handle.refetch();
    tx_b.send("B").unwrap();
    assert_eq!(*refetch.await.unwrap(), "B");
    tx_a.send("A").unwrap();

    let data = joined.await.unwrap().unwrap();
    assert_eq!(data.as_str(), "B");
  }

  #[tokio::test]
  async fn test_fetch_errors_are_stored_on_the_entry() {
    let client = QueryClient::default();
    let mut handle = client.use_query(
      QueryKey::root("bank").with(99),
      || async { Err::<u32, _>(ApiError::NotFound("bank 99".to_string())) },
      QueryOptions::default(),
    );

    let state = handle.settled().await;
    assert!(state.is_error());
    assert_eq!(state.error(), Some(&ApiError::NotFound("bank 99".to_string())));
    assert!(state.data().is_none());
  }

  #[tokio::test]
  async fn test_unsubscribed_entry_is_garbage_collected() {
    let client = QueryClient::default();
    let key = QueryKey::root("groups");
    let options = QueryOptions::default().with_gc_time(Duration::from_millis(20));

    let mut handle = client.use_query(key.clone(), || async { Ok::<_, ApiError>(1u8) }, options);
    handle.settled().await;
    drop(handle);
    assert!(client.contains(&key));

    tokio::time::sleep(Duration::from_millis(60)).await;
    assert!(!client.contains(&key));
  }

  #[tokio::test]
  async fn test_resubscribe_cancels_collection() {
    let client = QueryClient::default();
    let key = QueryKey::root("groups");
    let options = QueryOptions::default()
      .with_gc_time(Duration::from_millis(30))
      .with_stale_time(Duration::from_secs(60));

    let mut handle = client.use_query(key.clone(), || async { Ok::<_, ApiError>(1u8) }, options.clone());
    handle.settled().await;
    drop(handle);

    let handle = client.use_query(key.clone(), || async { Ok::<_, ApiError>(2u8) }, options);
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert!(client.contains(&key));
    assert_eq!(handle.data().as_deref(), Some(&1));
  }

  #[tokio::test]
  async fn test_unmount_does_not_cancel_in_flight_fetch() {
    let client = QueryClient::default();
    let key = QueryKey::root("users");
    let calls = Arc::new(AtomicUsize::new(0));

    let handle = client.use_query(
      key.clone(),
      counting_fetcher(calls.clone(), Duration::from_millis(10)),
      QueryOptions::default(),
    );
    drop(handle);

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(client.get_query_data::<Vec<u32>>(&key).as_deref(), Some(&vec![1]));
  }

  #[tokio::test]
  async fn test_set_query_data_wins_over_older_fetch() {
    let client = QueryClient::default();
    let (tx, rx) = oneshot::channel();
    let key = QueryKey::root("icon").with("a");

    let handle = client.use_query(key.clone(), gated_fetcher(vec![rx]), QueryOptions::default());
    client.set_query_data(key.clone(), "optimistic".to_string());

    tx.send("server").unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(handle.data().as_deref().map(String::as_str), Some("optimistic"));
    assert!(handle.state().is_success());
  }

  #[tokio::test]
  async fn test_focus_refetches_only_opted_in_queries() {
    let client = QueryClient::default();
    let calls = Arc::new(AtomicUsize::new(0));
    let icon_calls = Arc::new(AtomicUsize::new(0));

    let mut banks = client.use_query(
      QueryKey::root("banks"),
      counting_fetcher(calls.clone(), Duration::ZERO),
      QueryOptions::default(),
    );
    let mut icons = client.use_query(
      QueryKey::root("icons"),
      counting_fetcher(icon_calls.clone(), Duration::ZERO),
      QueryOptions::default().refetch_on_focus(false),
    );
    banks.settled().await;
    icons.settled().await;

    assert_eq!(client.on_focus(), 1);
    banks.settled().await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(icon_calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_clear_discards_in_flight_results() {
    let client = QueryClient::default();
    let (tx, rx) = oneshot::channel();
    let key = QueryKey::root("users");

    let handle = client.use_query(key.clone(), gated_fetcher(vec![rx]), QueryOptions::default());
    client.clear();
    tx.send("late").unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert!(client.is_empty());
    assert_eq!(handle.status(), QueryStatus::Idle);
  }
}
