//! Shared, keyed query cache.
//!
//! One `QueryCache` is owned by the application and is the only writer of its
//! entries. Requests run as spawned tasks and report back over a channel; the
//! cache applies those reports during `tick()`, which the event loop calls on
//! every UI tick. Because every mutation happens on the owner's side of that
//! channel no locking is needed, and the order in which messages are applied
//! is the order in which they were sent.
//!
//! Per key the cache guarantees:
//! - at most one request in flight (later callers attach to it)
//! - the response of the most recently issued request wins; older responses
//!   that arrive late are dropped
//! - responses for keys nobody is actively subscribed to are dropped
//! - stale data keeps being served while a refresh runs

use super::descriptor::RequestDescriptor;
use super::handle::{QueryHandle, SubscriptionId};
use super::key::{Params, QueryKey};
use super::state::{FetchState, QueryResult};
use crate::api::ApiError;
use futures::future::BoxFuture;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Source of data for the cache. The HTTP adapter is the production one.
pub trait Fetcher: Send + Sync {
  fn fetch(&self, endpoint: &str, params: &Params) -> BoxFuture<'static, Result<Value, ApiError>>;
}

/// Cache-wide policy and defaults.
#[derive(Debug, Clone)]
pub struct CacheOptions {
  /// Default age after which data is refreshed in the background
  pub stale_time: Duration,
  /// Default number of extra attempts after a failure
  pub retry_limit: u32,
  /// How long an entry without subscribers is kept
  pub cache_time: Duration,
  /// First retry delay; doubles on each further attempt
  pub retry_delay: Duration,
  pub max_retry_delay: Duration,
  /// Ceiling for a single request
  pub request_timeout: Duration,
}

impl Default for CacheOptions {
  fn default() -> Self {
    Self {
      stale_time: Duration::from_secs(5 * 60),
      retry_limit: 1,
      cache_time: Duration::from_secs(10 * 60),
      retry_delay: Duration::from_secs(1),
      max_retry_delay: Duration::from_secs(30),
      request_timeout: Duration::from_secs(10),
    }
  }
}

/// Counters for the status line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
  pub entries: usize,
  pub fetching: usize,
  pub subscriptions: usize,
}

pub(crate) enum Message {
  Completed {
    key: QueryKey,
    request: u64,
    result: Result<Value, ApiError>,
  },
  Unsubscribe(SubscriptionId),
}

#[derive(Debug)]
struct Subscription {
  key: QueryKey,
  enabled: bool,
  poll_interval: Option<Duration>,
  stale_time: Duration,
  retry_limit: u32,
}

impl Subscription {
  fn new(key: QueryKey, descriptor: &RequestDescriptor, options: &CacheOptions) -> Self {
    Self {
      key,
      enabled: descriptor.enabled,
      poll_interval: descriptor.poll_interval,
      stale_time: descriptor.stale_time.unwrap_or(options.stale_time),
      retry_limit: descriptor.retry_limit.unwrap_or(options.retry_limit),
    }
  }
}

/// Policy for one key, merged over its enabled subscriptions.
#[derive(Debug, Clone, Copy)]
struct KeyPolicy {
  /// Enabled subscriptions
  active: usize,
  /// All subscriptions, enabled or not
  subscribers: usize,
  /// Shortest requested interval
  poll_interval: Option<Duration>,
  /// Shortest requested stale time
  stale_time: Duration,
  /// Largest requested retry limit
  retry_limit: u32,
}

#[derive(Debug)]
struct CacheEntry {
  endpoint: String,
  params: Params,
  state: FetchState,
  data: Option<Value>,
  error: Option<ApiError>,
  /// Last successful completion
  fetched_at: Option<Instant>,
  /// Last completion of any kind; polling is measured from here
  completed_at: Option<Instant>,
  in_flight: Option<u64>,
  /// Failed attempts in the current fetch cycle
  failures: u32,
  retry_at: Option<Instant>,
  next_poll_at: Option<Instant>,
  /// Set while no subscription references the entry
  idle_since: Option<Instant>,
  /// Request id that produced `data`
  revision: u64,
  /// Data predates an invalidation and must not be treated as fresh
  invalidated: bool,
}

impl CacheEntry {
  fn new(endpoint: String, params: Params, now: Instant) -> Self {
    Self {
      endpoint,
      params,
      state: FetchState::Idle,
      data: None,
      error: None,
      fetched_at: None,
      completed_at: None,
      in_flight: None,
      failures: 0,
      retry_at: None,
      next_poll_at: None,
      idle_since: Some(now),
      revision: 0,
      invalidated: false,
    }
  }

  fn transition(&mut self, next: FetchState) {
    debug_assert!(
      self.state.can_transition_to(next),
      "invalid transition {:?} -> {:?}",
      self.state,
      next
    );
    self.state = next;
  }

  /// State to fall back to when a cycle ends without applying a response.
  fn settled_state(&self) -> FetchState {
    if self.error.is_some() {
      FetchState::Error
    } else if self.data.is_some() {
      FetchState::Success
    } else {
      FetchState::Idle
    }
  }

  fn is_fresh(&self, now: Instant, stale_time: Duration) -> bool {
    if self.invalidated {
      return false;
    }
    self
      .fetched_at
      .map(|t| now.duration_since(t) <= stale_time)
      .unwrap_or(false)
  }

  fn is_fetching(&self) -> bool {
    self.in_flight.is_some() || self.retry_at.is_some()
  }
}

/// The fetch cache. See the module docs for the guarantees it provides.
pub struct QueryCache {
  fetcher: Arc<dyn Fetcher>,
  options: CacheOptions,
  entries: HashMap<QueryKey, CacheEntry>,
  subscriptions: HashMap<SubscriptionId, Subscription>,
  next_subscription: u64,
  next_request: u64,
  tx: mpsc::UnboundedSender<Message>,
  rx: mpsc::UnboundedReceiver<Message>,
}

impl QueryCache {
  pub fn new(fetcher: Arc<dyn Fetcher>, options: CacheOptions) -> Self {
    let (tx, rx) = mpsc::unbounded_channel();
    Self {
      fetcher,
      options,
      entries: HashMap::new(),
      subscriptions: HashMap::new(),
      next_subscription: 1,
      next_request: 1,
      tx,
      rx,
    }
  }

  pub fn options(&self) -> &CacheOptions {
    &self.options
  }

  /// Register interest in a request.
  ///
  /// An enabled subscription on a key without fresh data issues a request
  /// right away, unless one is already in flight.
  pub fn subscribe(&mut self, descriptor: RequestDescriptor) -> QueryHandle {
    let now = Instant::now();
    let key = descriptor.key();
    let id = SubscriptionId(self.next_subscription);
    self.next_subscription += 1;

    self
      .entries
      .entry(key.clone())
      .or_insert_with(|| CacheEntry::new(descriptor.endpoint.clone(), descriptor.params.clone(), now));
    self
      .subscriptions
      .insert(id, Subscription::new(key.clone(), &descriptor, &self.options));

    debug!(key = %key, subscription = id.0, enabled = descriptor.enabled, "subscribed");

    if descriptor.enabled {
      self.ensure_fresh(&key, now);
    }
    self.reschedule(&key, now);

    QueryHandle::new(id, key, self.tx.clone())
  }

  /// Update the policy of an existing subscription (same key only).
  pub fn configure(&mut self, handle: &QueryHandle, descriptor: &RequestDescriptor) {
    if descriptor.key() != handle.key {
      warn!(
        key = %handle.key,
        requested = %descriptor.key(),
        "configure called with a different request; subscribe instead"
      );
      return;
    }
    let Some(sub) = self.subscriptions.get_mut(&handle.id) else {
      return;
    };

    let was_enabled = sub.enabled;
    *sub = Subscription::new(handle.key.clone(), descriptor, &self.options);

    let now = Instant::now();
    if descriptor.enabled && !was_enabled {
      self.ensure_fresh(&handle.key, now);
    }
    self.reschedule(&handle.key, now);
  }

  /// Enable or disable a subscription. Disabled subscriptions cause no
  /// network activity and don't keep polling alive.
  pub fn set_enabled(&mut self, handle: &QueryHandle, enabled: bool) {
    let Some(sub) = self.subscriptions.get_mut(&handle.id) else {
      return;
    };
    if sub.enabled == enabled {
      return;
    }
    sub.enabled = enabled;
    debug!(key = %handle.key, subscription = handle.id.0, enabled, "subscription toggled");

    let now = Instant::now();
    if enabled {
      self.ensure_fresh(&handle.key, now);
    }
    self.reschedule(&handle.key, now);
  }

  /// Current state for a subscription, without side effects.
  pub fn peek(&self, handle: &QueryHandle) -> QueryResult<'_> {
    let enabled = self
      .subscriptions
      .get(&handle.id)
      .map(|s| s.enabled)
      .unwrap_or(false);

    match self.entries.get(&handle.key) {
      Some(entry) => QueryResult {
        data: entry.data.as_ref(),
        error: entry.error.as_ref(),
        is_loading: enabled && entry.is_fetching(),
        state: entry.state,
        fetched_at: entry.fetched_at,
        revision: entry.revision,
      },
      None => QueryResult::empty(),
    }
  }

  /// Current state for a subscription; stale data triggers a background
  /// refresh but is still returned. An entry whose last cycle failed stays
  /// failed until a refetch, a poll or a new subscription.
  pub fn read(&mut self, handle: &QueryHandle) -> QueryResult<'_> {
    let enabled = self
      .subscriptions
      .get(&handle.id)
      .map(|s| s.enabled)
      .unwrap_or(false);
    if enabled {
      self.revalidate(&handle.key, Instant::now());
    }
    self.peek(handle)
  }

  /// Force a request regardless of staleness. Attaches to an in-flight
  /// request instead of issuing a second one.
  pub fn refetch(&mut self, handle: &QueryHandle) {
    let enabled = self
      .subscriptions
      .get(&handle.id)
      .map(|s| s.enabled)
      .unwrap_or(false);
    if !enabled {
      debug!(key = %handle.key, "refetch ignored for disabled subscription");
      return;
    }
    self.trigger(&handle.key);
  }

  /// Refetch every key with at least one enabled subscription.
  pub fn refetch_active(&mut self) -> usize {
    let keys = self.active_keys();
    for key in &keys {
      self.trigger(key);
    }
    info!(queries = keys.len(), "refetching active queries");
    keys.len()
  }

  /// Refresh active keys whose data went stale. Failed entries are left
  /// alone.
  pub fn revalidate_stale(&mut self) {
    let now = Instant::now();
    for key in self.active_keys() {
      self.revalidate(&key, now);
    }
  }

  /// Mark every entry stale after a write to the API.
  ///
  /// Active keys are refetched immediately; a request already in flight is
  /// superseded since it may return data from before the write.
  pub fn invalidate_all(&mut self) {
    let now = Instant::now();
    for entry in self.entries.values_mut() {
      entry.invalidated = true;
    }
    let keys = self.active_keys();
    for key in &keys {
      if let Some(entry) = self.entries.get_mut(key) {
        entry.failures = 0;
      }
      self.start_request(key);
    }
    info!(entries = self.entries.len(), refetched = keys.len(), "cache invalidated");
  }

  /// Apply finished requests and unsubscribes, then run due retries, polls
  /// and evictions.
  pub fn tick(&mut self) {
    while let Ok(message) = self.rx.try_recv() {
      self.handle_message(message, Instant::now());
    }
    self.run_timers(Instant::now());
  }

  pub fn stats(&self) -> CacheStats {
    CacheStats {
      entries: self.entries.len(),
      fetching: self.entries.values().filter(|e| e.is_fetching()).count(),
      subscriptions: self.subscriptions.len(),
    }
  }

  fn handle_message(&mut self, message: Message, now: Instant) {
    match message {
      Message::Unsubscribe(id) => {
        if let Some(sub) = self.subscriptions.remove(&id) {
          debug!(key = %sub.key, subscription = id.0, "unsubscribed");
          self.reschedule(&sub.key, now);
        }
      }
      Message::Completed {
        key,
        request,
        result,
      } => self.apply(key, request, result, now),
    }
  }

  fn apply(&mut self, key: QueryKey, request: u64, result: Result<Value, ApiError>, now: Instant) {
    let policy = self.policy(&key);
    let (retry_delay, max_retry_delay) = (self.options.retry_delay, self.options.max_retry_delay);

    let Some(entry) = self.entries.get_mut(&key) else {
      debug!(key = %key, request, "response for evicted entry discarded");
      return;
    };
    if entry.in_flight != Some(request) {
      debug!(key = %key, request, current = ?entry.in_flight, "superseded response discarded");
      return;
    }
    entry.in_flight = None;

    if policy.active == 0 {
      debug!(key = %key, request, "no active subscribers, response discarded");
      entry.failures = 0;
      let settled = entry.settled_state();
      entry.transition(settled);
      self.reschedule(&key, now);
      return;
    }

    entry.completed_at = Some(now);
    match result {
      Ok(value) => {
        entry.data = Some(value);
        entry.error = None;
        entry.fetched_at = Some(now);
        entry.failures = 0;
        entry.invalidated = false;
        entry.revision = request;
        entry.transition(FetchState::Success);
        debug!(key = %key, request, "response applied");
      }
      Err(error) => {
        entry.failures += 1;
        if error.is_retryable() && entry.failures <= policy.retry_limit {
          let delay = backoff(retry_delay, max_retry_delay, entry.failures - 1);
          entry.retry_at = Some(now + delay);
          debug!(
            key = %key,
            attempt = entry.failures,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "request failed, retrying"
          );
        } else {
          warn!(key = %key, attempts = entry.failures, error = %error, "request failed");
          entry.error = Some(error);
          entry.failures = 0;
          entry.transition(FetchState::Error);
        }
      }
    }

    self.reschedule(&key, now);
  }

  fn run_timers(&mut self, now: Instant) {
    let cache_time = self.options.cache_time;
    let mut retries = Vec::new();
    let mut polls = Vec::new();
    let mut evictions = Vec::new();

    for (key, entry) in &self.entries {
      if entry.retry_at.is_some_and(|at| at <= now) {
        retries.push(key.clone());
      } else if entry.in_flight.is_none() && entry.next_poll_at.is_some_and(|at| at <= now) {
        polls.push(key.clone());
      } else if entry.in_flight.is_none()
        && entry
          .idle_since
          .is_some_and(|since| now.duration_since(since) >= cache_time)
      {
        evictions.push(key.clone());
      }
    }

    for key in retries {
      self.start_request(&key);
    }
    for key in polls {
      debug!(key = %key, "poll interval elapsed");
      self.trigger(&key);
    }
    for key in evictions {
      if self.policy(&key).subscribers == 0 {
        self.entries.remove(&key);
        debug!(key = %key, "evicted");
      }
    }
  }

  /// Start a new fetch cycle unless one is already running.
  fn trigger(&mut self, key: &QueryKey) {
    let Some(entry) = self.entries.get_mut(key) else {
      return;
    };
    if entry.in_flight.is_some() {
      debug!(key = %key, "request already in flight");
      return;
    }
    entry.failures = 0;
    self.start_request(key);
  }

  /// Fetch if the entry isn't fresh and nothing is running for it.
  fn ensure_fresh(&mut self, key: &QueryKey, now: Instant) {
    let policy = self.policy(key);
    let Some(entry) = self.entries.get(key) else {
      return;
    };
    if entry.is_fetching() || entry.is_fresh(now, policy.stale_time) {
      return;
    }
    self.trigger(key);
  }

  /// Background refresh: like `ensure_fresh`, but never restarts a fetch
  /// cycle that ended in an error.
  fn revalidate(&mut self, key: &QueryKey, now: Instant) {
    let failed = self
      .entries
      .get(key)
      .is_some_and(|entry| entry.state == FetchState::Error);
    if failed {
      return;
    }
    self.ensure_fresh(key, now);
  }

  fn start_request(&mut self, key: &QueryKey) {
    let Some(entry) = self.entries.get_mut(key) else {
      return;
    };

    let request = self.next_request;
    self.next_request += 1;

    if let Some(previous) = entry.in_flight.replace(request) {
      debug!(key = %key, previous, request, "in-flight request superseded");
    }
    entry.transition(FetchState::Loading);
    entry.retry_at = None;
    entry.next_poll_at = None;
    entry.idle_since = None;

    debug!(key = %key, request, attempt = entry.failures + 1, "issuing request");

    let future = self.fetcher.fetch(&entry.endpoint, &entry.params);
    let timeout = self.options.request_timeout;
    let tx = self.tx.clone();
    let key = key.clone();

    tokio::spawn(async move {
      let result = match tokio::time::timeout(timeout, future).await {
        Ok(result) => result,
        Err(_) => Err(ApiError::timeout(timeout)),
      };
      // Ignore send errors - the cache may have been dropped
      let _ = tx.send(Message::Completed {
        key,
        request,
        result,
      });
    });
  }

  /// Recompute poll and idle timers after anything about the key changed.
  fn reschedule(&mut self, key: &QueryKey, now: Instant) {
    let policy = self.policy(key);
    let Some(entry) = self.entries.get_mut(key) else {
      return;
    };

    entry.idle_since = if policy.subscribers == 0 && entry.in_flight.is_none() {
      entry.idle_since.or(Some(now))
    } else {
      None
    };

    if policy.active == 0 {
      entry.next_poll_at = None;
      if entry.retry_at.take().is_some() {
        // Nobody is waiting for the retry anymore
        entry.failures = 0;
        let settled = entry.settled_state();
        entry.transition(settled);
      }
      return;
    }

    if entry.is_fetching() {
      entry.next_poll_at = None;
      return;
    }

    let base = entry.completed_at.unwrap_or(now);
    entry.next_poll_at = policy.poll_interval.map(|interval| base + interval);
  }

  fn policy(&self, key: &QueryKey) -> KeyPolicy {
    let mut policy = KeyPolicy {
      active: 0,
      subscribers: 0,
      poll_interval: None,
      stale_time: self.options.stale_time,
      retry_limit: self.options.retry_limit,
    };
    let mut stale_time: Option<Duration> = None;
    let mut retry_limit: Option<u32> = None;

    for sub in self.subscriptions.values().filter(|s| &s.key == key) {
      policy.subscribers += 1;
      if !sub.enabled {
        continue;
      }
      policy.active += 1;
      if let Some(interval) = sub.poll_interval {
        policy.poll_interval = Some(policy.poll_interval.map_or(interval, |p| p.min(interval)));
      }
      stale_time = Some(stale_time.map_or(sub.stale_time, |s| s.min(sub.stale_time)));
      retry_limit = Some(retry_limit.map_or(sub.retry_limit, |r| r.max(sub.retry_limit)));
    }

    if let Some(stale_time) = stale_time {
      policy.stale_time = stale_time;
    }
    if let Some(retry_limit) = retry_limit {
      policy.retry_limit = retry_limit;
    }
    policy
  }

  fn active_keys(&self) -> Vec<QueryKey> {
    let mut keys: Vec<QueryKey> = self
      .subscriptions
      .values()
      .filter(|s| s.enabled)
      .map(|s| s.key.clone())
      .collect();
    keys.sort_by(|a, b| a.cache_hash().cmp(b.cache_hash()));
    keys.dedup();
    keys
  }
}

fn backoff(base: Duration, max: Duration, retry: u32) -> Duration {
  base
    .saturating_mul(2u32.saturating_pow(retry))
    .min(max)
}
