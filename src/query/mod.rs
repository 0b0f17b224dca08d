//! Declarative data fetching on top of a shared cache.
//!
//! Inspired by TanStack Query. Views declare what they need with a
//! [`RequestDescriptor`]; the [`QueryCache`] decides when to hit the network
//! and every view reading the same key sees the same data.
//!
//! # Example
//!
//! ```ignore
//! let mut stats: Query<DashboardStats> = Query::new();
//!
//! // In view tick, after `cache.tick()`
//! stats.declare(
//!     cache,
//!     RequestDescriptor::new(DASHBOARD_STATS).poll_every(Some(Duration::from_secs(30))),
//! );
//!
//! // In render
//! match stats.state(cache) {
//!     QueryState::Loading => render_spinner(),
//!     QueryState::Success(data) => render_data(data),
//!     QueryState::Error(e) => render_error(&e),
//!     QueryState::Idle => {}
//! }
//! ```

mod cache;
mod descriptor;
mod handle;
mod key;
mod state;

pub use cache::{CacheOptions, CacheStats, Fetcher, QueryCache};
pub use descriptor::RequestDescriptor;
pub use handle::{QueryHandle, SubscriptionId};
pub use key::{normalize_endpoint, query_pairs, ParamValue, Params, QueryKey};
pub use state::{FetchState, QueryResult};

use serde::de::DeserializeOwned;
use tokio::time::Instant;
use tracing::warn;

/// What a view should render for a query
#[derive(Debug, Clone, PartialEq)]
pub enum QueryState<'a, T> {
  /// Nothing requested yet, or the query is disabled without data
  Idle,
  /// First fetch is running and there is nothing to show yet
  Loading,
  /// Data is available (possibly being refreshed in the background)
  Success(&'a T),
  /// The last fetch cycle failed
  Error(String),
}

impl<'a, T> QueryState<'a, T> {
  pub fn is_loading(&self) -> bool {
    matches!(self, QueryState::Loading)
  }

  pub fn is_success(&self) -> bool {
    matches!(self, QueryState::Success(_))
  }

  pub fn is_error(&self) -> bool {
    matches!(self, QueryState::Error(_))
  }

  pub fn data(&self) -> Option<&'a T> {
    match self {
      QueryState::Success(data) => Some(data),
      _ => None,
    }
  }

  pub fn error(&self) -> Option<&str> {
    match self {
      QueryState::Error(e) => Some(e),
      _ => None,
    }
  }
}

/// Typed view of one cache subscription.
///
/// Holds the subscription handle and the decoded payload. The payload is
/// decoded once per response rather than on every render.
pub struct Query<T> {
  descriptor: Option<RequestDescriptor>,
  handle: Option<QueryHandle>,
  decoded: Option<(u64, Result<T, String>)>,
}

impl<T> Default for Query<T> {
  fn default() -> Self {
    Self {
      descriptor: None,
      handle: None,
      decoded: None,
    }
  }
}

impl<T: DeserializeOwned> Query<T> {
  pub fn new() -> Self {
    Self::default()
  }

  /// Declare the request this query should track.
  ///
  /// A different endpoint or params moves the query to a new cache key;
  /// a policy-only change (interval, enablement) updates the subscription in
  /// place. Safe to call on every tick.
  pub fn declare(&mut self, cache: &mut QueryCache, descriptor: RequestDescriptor) {
    match (&self.handle, &self.descriptor) {
      (Some(handle), Some(current)) if current.same_request(&descriptor) => {
        if *current != descriptor {
          cache.configure(handle, &descriptor);
        }
      }
      _ => {
        self.handle = Some(cache.subscribe(descriptor.clone()));
        self.decoded = None;
      }
    }
    self.descriptor = Some(descriptor);
    self.revalidate(cache);
    self.sync(cache);
  }

  /// Pick up a new response from the cache. Returns `true` if it changed.
  pub fn sync(&mut self, cache: &QueryCache) -> bool {
    let Some(handle) = &self.handle else {
      return false;
    };
    let result = cache.peek(handle);
    let Some(data) = result.data else {
      return false;
    };
    if self.decoded.as_ref().map(|(revision, _)| *revision) == Some(result.revision) {
      return false;
    }

    let decoded = serde_json::from_value::<T>(data.clone())
      .map_err(|e| format!("Failed to decode response: {}", e));
    if let Err(e) = &decoded {
      warn!(key = %handle.key(), error = %e, "unexpected response shape");
    }
    self.decoded = Some((result.revision, decoded));
    true
  }

  /// Render state. A terminal error wins unless a retry is running; data
  /// from an earlier response is shown while a refresh is in flight.
  pub fn state<'a>(&'a self, cache: &'a QueryCache) -> QueryState<'a, T> {
    let Some(handle) = &self.handle else {
      return QueryState::Idle;
    };
    let result = cache.peek(handle);

    if let Some(error) = result.error {
      if !result.is_loading {
        return QueryState::Error(error.to_string());
      }
    }

    match self.decoded.as_ref().map(|(_, data)| data) {
      Some(Ok(data)) => QueryState::Success(data),
      Some(Err(e)) if !result.is_loading => QueryState::Error(e.clone()),
      _ if result.is_loading => QueryState::Loading,
      _ => QueryState::Idle,
    }
  }

  /// Whether a request for this query is outstanding, including background
  /// refreshes of data that is already shown.
  pub fn is_fetching(&self, cache: &QueryCache) -> bool {
    self
      .handle
      .as_ref()
      .map(|h| cache.peek(h).is_loading)
      .unwrap_or(false)
  }

  pub fn fetched_at(&self, cache: &QueryCache) -> Option<Instant> {
    self.handle.as_ref().and_then(|h| cache.peek(h).fetched_at)
  }

  /// Force a refetch (no-op while disabled).
  pub fn refetch(&self, cache: &mut QueryCache) {
    if let Some(handle) = &self.handle {
      cache.refetch(handle);
    }
  }

  /// Refresh in the background if the data went stale. Runs on every
  /// `declare`, so a view on screen never shows data past its stale time.
  pub fn revalidate(&self, cache: &mut QueryCache) {
    if let Some(handle) = &self.handle {
      let _ = cache.read(handle);
    }
  }

  /// Drop the subscription. The cache keeps the entry for its cache time.
  pub fn release(&mut self) {
    self.handle = None;
    self.descriptor = None;
    self.decoded = None;
  }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Query<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Query")
      .field("descriptor", &self.descriptor)
      .field("decoded", &self.decoded)
      .finish_non_exhaustive()
  }
}
