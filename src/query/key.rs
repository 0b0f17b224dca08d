//! Cache identity of a request.

use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use url::form_urlencoded;

/// Query parameters. A `BTreeMap` keeps them in canonical order.
pub type Params = BTreeMap<String, ParamValue>;

/// A scalar query parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
  Str(String),
  Int(i64),
  Float(f64),
  Bool(bool),
}

impl fmt::Display for ParamValue {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ParamValue::Str(s) => f.write_str(s),
      ParamValue::Int(i) => write!(f, "{}", i),
      ParamValue::Float(x) => write!(f, "{}", x),
      ParamValue::Bool(b) => write!(f, "{}", b),
    }
  }
}

impl From<&str> for ParamValue {
  fn from(s: &str) -> Self {
    ParamValue::Str(s.to_string())
  }
}

impl From<String> for ParamValue {
  fn from(s: String) -> Self {
    ParamValue::Str(s)
  }
}

impl From<i64> for ParamValue {
  fn from(i: i64) -> Self {
    ParamValue::Int(i)
  }
}

impl From<u32> for ParamValue {
  fn from(i: u32) -> Self {
    ParamValue::Int(i64::from(i))
  }
}

impl From<f64> for ParamValue {
  fn from(x: f64) -> Self {
    ParamValue::Float(x)
  }
}

impl From<bool> for ParamValue {
  fn from(b: bool) -> Self {
    ParamValue::Bool(b)
  }
}

/// Render params the way they go on the wire, in key order.
pub fn query_pairs(params: &Params) -> Vec<(String, String)> {
  params
    .iter()
    .map(|(k, v)| (k.clone(), v.to_string()))
    .collect()
}

/// Identity of a cached request: a hash of the endpoint and its parameters.
///
/// Two requests that would put the same bytes on the wire share a key, so
/// `Int(1)` and `Str("1")` are the same parameter value here.
#[derive(Clone)]
pub struct QueryKey {
  hash: String,
  description: String,
}

impl QueryKey {
  pub fn new(endpoint: &str, params: &Params) -> Self {
    let description = canonical(endpoint, params);

    // SHA256 hash for stable, fixed-length keys
    let mut hasher = Sha256::new();
    hasher.update(description.as_bytes());
    let hash = hex::encode(hasher.finalize());

    Self { hash, description }
  }

  pub fn cache_hash(&self) -> &str {
    &self.hash
  }

  /// Human-readable form for logs and the debug overlay.
  pub fn description(&self) -> &str {
    &self.description
  }
}

impl PartialEq for QueryKey {
  fn eq(&self, other: &Self) -> bool {
    self.hash == other.hash
  }
}

impl Eq for QueryKey {}

impl Hash for QueryKey {
  fn hash<H: Hasher>(&self, state: &mut H) {
    self.hash.hash(state);
  }
}

impl fmt::Debug for QueryKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "QueryKey({})", self.description)
  }
}

impl fmt::Display for QueryKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.description)
  }
}

/// Normalize an endpoint so `api/x/` and `/api/x` hash the same.
pub fn normalize_endpoint(endpoint: &str) -> String {
  let trimmed = endpoint.trim().trim_end_matches('/');
  if trimmed.starts_with('/') {
    trimmed.to_string()
  } else {
    format!("/{}", trimmed)
  }
}

fn canonical(endpoint: &str, params: &Params) -> String {
  let endpoint = normalize_endpoint(endpoint);
  if params.is_empty() {
    return endpoint;
  }

  // Encoded like the wire query, so a `&` or `=` inside a value can't pass
  // for a separator
  let query = form_urlencoded::Serializer::new(String::new())
    .extend_pairs(query_pairs(params))
    .finish();
  format!("{}?{}", endpoint, query)
}
