use super::key::{normalize_endpoint, ParamValue, Params, QueryKey};
use std::time::Duration;

/// What a view wants from the cache: which request, and under which policy.
///
/// `retry_limit` and `stale_time` fall back to the cache-wide defaults when
/// left unset.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestDescriptor {
  pub endpoint: String,
  pub params: Params,
  pub poll_interval: Option<Duration>,
  pub enabled: bool,
  pub retry_limit: Option<u32>,
  pub stale_time: Option<Duration>,
}

impl RequestDescriptor {
  pub fn new(endpoint: &str) -> Self {
    Self {
      endpoint: normalize_endpoint(endpoint),
      params: Params::new(),
      poll_interval: None,
      enabled: true,
      retry_limit: None,
      stale_time: None,
    }
  }

  pub fn param(mut self, name: &str, value: impl Into<ParamValue>) -> Self {
    self.params.insert(name.to_string(), value.into());
    self
  }

  pub fn params(mut self, params: Params) -> Self {
    self.params.extend(params);
    self
  }

  /// Re-issue the request this long after each completion. Zero disables.
  pub fn poll_every(mut self, interval: Option<Duration>) -> Self {
    self.poll_interval = interval.filter(|i| !i.is_zero());
    self
  }

  pub fn enabled(mut self, enabled: bool) -> Self {
    self.enabled = enabled;
    self
  }

  pub fn retry(mut self, limit: u32) -> Self {
    self.retry_limit = Some(limit);
    self
  }

  pub fn stale_time(mut self, stale_time: Duration) -> Self {
    self.stale_time = Some(stale_time);
    self
  }

  pub fn key(&self) -> QueryKey {
    QueryKey::new(&self.endpoint, &self.params)
  }

  /// Whether both descriptors name the same cache entry.
  pub fn same_request(&self, other: &RequestDescriptor) -> bool {
    self.endpoint == other.endpoint && self.params == other.params
  }
}
