use std::time::Duration;

/// Per-query behaviour knobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryOptions {
  /// How long fetched data counts as fresh. Zero means always revalidate on mount.
  pub stale_time: Duration,
  /// How long an entry without subscribers is kept before it is dropped.
  pub gc_time: Duration,
  /// Skip fetching entirely while false.
  pub enabled: bool,
  /// Refetch stale data when the console regains focus.
  pub refetch_on_focus: bool,
  /// Refetch stale data when a new subscriber mounts.
  pub refetch_on_mount: bool,
}

impl Default for QueryOptions {
  fn default() -> Self {
    Self {
      stale_time: Duration::ZERO,
      gc_time: Duration::from_secs(5 * 60),
      enabled: true,
      refetch_on_focus: true,
      refetch_on_mount: true,
    }
  }
}

impl QueryOptions {
  pub fn with_stale_time(mut self, stale_time: Duration) -> Self {
    self.stale_time = stale_time;
    self
  }

  pub fn with_gc_time(mut self, gc_time: Duration) -> Self {
    self.gc_time = gc_time;
    self
  }

  pub fn enabled(mut self, enabled: bool) -> Self {
    self.enabled = enabled;
    self
  }

  pub fn refetch_on_focus(mut self, refetch: bool) -> Self {
    self.refetch_on_focus = refetch;
    self
  }

  pub fn refetch_on_mount(mut self, refetch: bool) -> Self {
    self.refetch_on_mount = refetch;
    self
  }
}
