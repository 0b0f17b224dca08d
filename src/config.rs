use crate::query::CacheOptions;
use crate::temporal::TimeRange;
use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding `api.base_url`
pub const BASE_URL_ENV: &str = "KVDASH_API_BASE_URL";
/// Environment variable providing a bearer token for this run only
pub const AUTH_TOKEN_ENV: &str = "KVDASH_AUTH_TOKEN";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
  pub api: ApiConfig,
  pub query: QueryConfig,
  pub dashboard: DashboardConfig,
  /// Custom title for header (defaults to the API host if not set)
  pub title: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
  pub base_url: String,
  /// Ceiling for a single request, after which it counts as a network error
  pub timeout_secs: u64,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      base_url: "http://localhost:5000".to_string(),
      timeout_secs: 10,
    }
  }
}

impl ApiConfig {
  pub fn timeout(&self) -> Duration {
    Duration::from_secs(self.timeout_secs.max(1))
  }
}

/// Defaults applied to every query that doesn't set its own policy.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
  /// Age after which cached data is refreshed in the background
  pub stale_secs: u64,
  /// How long an unused cache entry is kept before eviction
  pub cache_secs: u64,
  /// Extra attempts after a failed request
  pub retry: u32,
  /// Base delay of the exponential retry backoff
  pub retry_delay_ms: u64,
}

impl Default for QueryConfig {
  fn default() -> Self {
    Self {
      stale_secs: 5 * 60,
      cache_secs: 10 * 60,
      retry: 1,
      retry_delay_ms: 1000,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
  pub stats_poll_secs: u64,
  pub alerts_poll_secs: u64,
  /// Playback cadence at 1x speed
  pub playback_base_ms: u64,
  pub default_time_range: TimeRange,
}

impl Default for DashboardConfig {
  fn default() -> Self {
    Self {
      stats_poll_secs: 30,
      alerts_poll_secs: 60,
      playback_base_ms: 1000,
      default_time_range: TimeRange::Realtime,
    }
  }
}

impl DashboardConfig {
  pub fn stats_poll_interval(&self) -> Duration {
    Duration::from_secs(self.stats_poll_secs)
  }

  pub fn alerts_poll_interval(&self) -> Duration {
    Duration::from_secs(self.alerts_poll_secs)
  }

  pub fn playback_base(&self) -> Duration {
    Duration::from_millis(self.playback_base_ms.max(1))
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./kvdash.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/kvdash/config.yaml
  ///
  /// Without any file the built-in defaults are used. `KVDASH_API_BASE_URL`
  /// overrides the base URL either way.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    let config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => Config::default(),
    };

    Ok(config.with_base_url(std::env::var(BASE_URL_ENV).ok()))
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("kvdash.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("kvdash").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self, serde_yaml::Error> {
    // An empty file deserializes to unit, not to a mapping
    if contents.trim().is_empty() {
      return Ok(Config::default());
    }
    serde_yaml::from_str(contents)
  }

  /// Replace the base URL when an override is present.
  pub fn with_base_url(mut self, base_url: Option<String>) -> Self {
    if let Some(url) = base_url.filter(|u| !u.trim().is_empty()) {
      self.api.base_url = url.trim().to_string();
    }
    self
  }

  /// Get a bearer token from the environment, if one is set.
  pub fn get_auth_token() -> Option<String> {
    std::env::var(AUTH_TOKEN_ENV)
      .ok()
      .filter(|t| !t.trim().is_empty())
  }

  /// Header title: the configured one or the API host.
  pub fn display_title(&self) -> String {
    self.title.clone().unwrap_or_else(|| {
      url::Url::parse(&self.api.base_url)
        .ok()
        .and_then(|u| {
          u.host_str().map(|h| match u.port() {
            Some(port) => format!("{}:{}", h, port),
            None => h.to_string(),
          })
        })
        .unwrap_or_else(|| self.api.base_url.clone())
    })
  }
  /// Cache-wide query policy.
  pub fn cache_options(&self) -> CacheOptions {
    CacheOptions {
      stale_time: Duration::from_secs(self.query.stale_secs),
      retry_limit: self.query.retry,
      cache_time: Duration::from_secs(self.query.cache_secs),
      retry_delay: Duration::from_millis(self.query.retry_delay_ms),
      request_timeout: self.api.timeout(),
      ..CacheOptions::default()
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_defaults() {
    let config = Config::default();
    assert_eq!(config.api.base_url, "http://localhost:5000");
    assert_eq!(config.api.timeout(), Duration::from_secs(10));
    assert_eq!(config.query.stale_secs, 300);
    assert_eq!(config.query.cache_secs, 600);
    assert_eq!(config.query.retry, 1);
    assert_eq!(config.dashboard.stats_poll_interval(), Duration::from_secs(30));
    assert_eq!(config.dashboard.default_time_range, TimeRange::Realtime);
  }

  #[test]
  fn test_cache_options_follow_config() {
    let mut config = Config::default();
    config.query.retry = 4;
    config.query.retry_delay_ms = 250;
    config.api.timeout_secs = 3;

    let options = config.cache_options();
    assert_eq!(options.retry_limit, 4);
    assert_eq!(options.retry_delay, Duration::from_millis(250));
    assert_eq!(options.request_timeout, Duration::from_secs(3));
    assert_eq!(options.stale_time, Duration::from_secs(300));
    assert_eq!(options.cache_time, Duration::from_secs(600));
  }

  #[test]
  fn test_parse_partial_yaml() {
    let config = Config::parse(
      r#"
api:
  base_url: https://transit.example.com
query:
  retry: 3
dashboard:
  default_time_range: last_week
"#,
    )
    .unwrap();

    assert_eq!(config.api.base_url, "https://transit.example.com");
    assert_eq!(config.api.timeout_secs, 10);
    assert_eq!(config.query.retry, 3);
    assert_eq!(config.query.stale_secs, 300);
    assert_eq!(config.dashboard.default_time_range, TimeRange::LastWeek);
  }

  #[test]
  fn test_parse_empty_file() {
    let config = Config::parse("  \n").unwrap();
    assert_eq!(config.api.base_url, "http://localhost:5000");
  }

  #[test]
  fn test_base_url_override() {
    let config = Config::default().with_base_url(Some("http://10.0.0.5:8000".into()));
    assert_eq!(config.api.base_url, "http://10.0.0.5:8000");

    let config = Config::default().with_base_url(Some("   ".into()));
    assert_eq!(config.api.base_url, "http://localhost:5000");
  }

  #[test]
  fn test_display_title() {
    assert_eq!(Config::default().display_title(), "localhost:5000");

    let config = Config {
      title: Some("KV Transit Analytics".into()),
      ..Config::default()
    };
    assert_eq!(config.display_title(), "KV Transit Analytics");
  }

  #[test]
  fn test_load_missing_explicit_path() {
    let err = Config::load(Some(Path::new("/nonexistent/kvdash.yaml"))).unwrap_err();
    assert!(err.to_string().contains("Config file not found"));
  }
}
