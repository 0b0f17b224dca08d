//! Services shared by every screen, created once at startup.

use crate::api::{ApiClient, ApiError};
use crate::config::Config;
use crate::query::QueryCache;
use crate::session::{AuthSlot, TokenStore};
use color_eyre::Result;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

pub struct DashboardContext {
  pub client: ApiClient,
  pub cache: QueryCache,
  pub auth: AuthSlot,
  token_store: Option<TokenStore>,
}

impl DashboardContext {
  /// Build the context. A token from `KVDASH_AUTH_TOKEN` wins over the
  /// stored one.
  pub fn new(config: &Config, token_store: Option<TokenStore>) -> Result<Self> {
    let token = match Config::get_auth_token() {
      Some(token) => Some(token),
      None => match &token_store {
        Some(store) => store.load()?,
        None => None,
      },
    };
    Self::with_token(config, token, token_store)
  }

  pub fn with_token(
    config: &Config,
    token: Option<String>,
    token_store: Option<TokenStore>,
  ) -> Result<Self> {
    let auth = AuthSlot::new(token);
    let client = ApiClient::new(&config.api, auth.clone())?;
    let cache = QueryCache::new(Arc::new(client.clone()), config.cache_options());

    info!(
      base_url = %client.base_url(),
      authenticated = auth.token().is_some(),
      "dashboard context ready"
    );

    Ok(Self {
      client,
      cache,
      auth,
      token_store,
    })
  }

  pub fn is_authenticated(&self) -> bool {
    self.auth.token().is_some()
  }

  /// Use `token` from now on and persist it. Cached data fetched under the
  /// previous identity is invalidated.
  pub fn login(&mut self, token: &str) -> Result<()> {
    self.auth.set(token);
    if let Some(store) = &self.token_store {
      store.save(token)?;
    }
    self.cache.invalidate_all();
    info!("logged in");
    Ok(())
  }

  /// Forget the token in memory and on disk.
  pub fn logout(&mut self) -> Result<()> {
    self.auth.clear();
    if let Some(store) = &self.token_store {
      store.clear()?;
    }
    self.cache.invalidate_all();
    info!("logged out");
    Ok(())
  }

  /// POST to the API, then invalidate every cached query so nothing shows
  /// data from before the write.
  pub async fn mutate(&mut self, endpoint: &str, body: &Value) -> Result<Value, ApiError> {
    match self.client.post(endpoint, body).await {
      Ok(value) => {
        self.cache.invalidate_all();
        Ok(value)
      }
      Err(e) => {
        warn!(endpoint, error = %e, "mutation failed");
        Err(e)
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::query::RequestDescriptor;
  use mockito::{Matcher, Server};
  use serde_json::json;
  use std::time::Duration;

  fn config_for(base_url: &str) -> Config {
    Config::default().with_base_url(Some(base_url.to_string()))
  }

  /// Tick the cache until `done` holds or give up after ~2s.
  async fn wait_for(ctx: &mut DashboardContext, done: impl Fn(&DashboardContext) -> bool) -> bool {
    for _ in 0..200 {
      ctx.cache.tick();
      if done(ctx) {
        return true;
      }
      tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
  }

  #[tokio::test]
  async fn test_login_persists_and_logout_clears_token() {
    let dir = tempfile::tempdir().unwrap();
    let store = TokenStore::at(dir.path().join("auth_token"));
    let mut ctx = DashboardContext::with_token(&Config::default(), None, Some(store.clone())).unwrap();

    assert!(!ctx.is_authenticated());
    ctx.login("abc123").unwrap();
    assert!(ctx.is_authenticated());
    assert_eq!(store.load().unwrap().as_deref(), Some("abc123"));

    ctx.logout().unwrap();
    assert!(!ctx.is_authenticated());
    assert_eq!(store.load().unwrap(), None);
    assert!(!store.path().exists());
  }

  #[tokio::test]
  async fn test_stored_token_is_loaded() {
    let dir = tempfile::tempdir().unwrap();
    let store = TokenStore::at(dir.path().join("auth_token"));
    store.save("from-disk").unwrap();

    let token = store.load().unwrap();
    let ctx = DashboardContext::with_token(&Config::default(), token, Some(store)).unwrap();
    assert_eq!(ctx.auth.token().as_deref(), Some("from-disk"));
  }

  #[tokio::test]
  async fn test_mutate_invalidates_active_queries() {
    let mut server = Server::new_async().await;
    let stats = server
      .mock("GET", "/api/dashboard/stats")
      .with_status(200)
      .with_body(r#"{"active_routes":24}"#)
      .expect(2)
      .create_async()
      .await;
    let report = server
      .mock("POST", "/api/reports")
      .match_body(Matcher::Json(json!({ "station": "KL Sentral" })))
      .with_status(201)
      .with_body(r#"{"id":"r-1"}"#)
      .create_async()
      .await;

    let mut ctx = DashboardContext::with_token(&config_for(&server.url()), None, None).unwrap();
    let handle = ctx.cache.subscribe(RequestDescriptor::new("/api/dashboard/stats"));
    assert!(wait_for(&mut ctx, |c| c.cache.peek(&handle).is_success()).await);
    let first = ctx.cache.peek(&handle).revision;

    let created = ctx
      .mutate("/api/reports", &json!({ "station": "KL Sentral" }))
      .await
      .unwrap();
    assert_eq!(created["id"], json!("r-1"));

    assert!(wait_for(&mut ctx, |c| {
      let result = c.cache.peek(&handle);
      result.revision != first && !result.is_loading
    })
    .await);

    report.assert_async().await;
    stats.assert_async().await;
  }

  #[tokio::test]
  async fn test_failed_mutation_leaves_cache_alone() {
    let mut server = Server::new_async().await;
    let _stats = server
      .mock("GET", "/api/dashboard/stats")
      .with_status(200)
      .with_body(r#"{"active_routes":24}"#)
      .create_async()
      .await;
    let _report = server
      .mock("POST", "/api/reports")
      .with_status(422)
      .with_body(r#"{"message":"station is required"}"#)
      .create_async()
      .await;

    let mut ctx = DashboardContext::with_token(&config_for(&server.url()), None, None).unwrap();
    let handle = ctx.cache.subscribe(RequestDescriptor::new("/api/dashboard/stats"));
    assert!(wait_for(&mut ctx, |c| c.cache.peek(&handle).is_success()).await);

    let err = ctx.mutate("/api/reports", &json!({})).await.unwrap_err();
    assert_eq!(err.to_string(), "Server error 422: station is required");
    assert!(!ctx.cache.peek(&handle).is_loading);
  }
}
