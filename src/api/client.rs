use crate::api::ApiError;
use crate::config::ApiConfig;
use crate::query::{normalize_endpoint, query_pairs, Fetcher, Params};
use crate::session::AuthSlot;
use color_eyre::{eyre::eyre, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::Method;
use serde_json::Value;
use tracing::debug;
use url::Url;

/// HTTP client for the dashboard API.
///
/// Attaches the bearer token from the shared [`AuthSlot`] when one is set and
/// folds every failure into an [`ApiError`].
#[derive(Clone)]
pub struct ApiClient {
  http: reqwest::Client,
  base_url: Url,
  auth: AuthSlot,
}

impl ApiClient {
  pub fn new(config: &ApiConfig, auth: AuthSlot) -> Result<Self> {
    let base_url = Url::parse(&config.base_url)
      .map_err(|e| eyre!("Invalid API base URL {}: {}", config.base_url, e))?;
    if base_url.cannot_be_a_base() {
      return Err(eyre!("Invalid API base URL {}: not a base URL", config.base_url));
    }

    let http = reqwest::Client::builder()
      .timeout(config.timeout())
      .user_agent(concat!("kvdash/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      http,
      base_url,
      auth,
    })
  }

  pub fn base_url(&self) -> &Url {
    &self.base_url
  }

  pub fn auth(&self) -> &AuthSlot {
    &self.auth
  }

  /// Full URL for an endpoint, keeping any path prefix of the base URL.
  pub fn url(&self, endpoint: &str, params: &Params) -> Url {
    let mut url = self.base_url.clone();
    let path = format!(
      "{}{}",
      url.path().trim_end_matches('/'),
      normalize_endpoint(endpoint)
    );
    url.set_path(&path);
    url.set_query(None);
    if !params.is_empty() {
      url.query_pairs_mut().extend_pairs(query_pairs(params));
    }
    url
  }

  pub async fn request(
    &self,
    method: Method,
    endpoint: &str,
    params: &Params,
    body: Option<&Value>,
  ) -> Result<Value, ApiError> {
    let url = self.url(endpoint, params);
    debug!(%method, %url, "sending request");

    let mut request = self.http.request(method, url);
    if let Some(token) = self.auth.token() {
      request = request.bearer_auth(token);
    }
    if let Some(body) = body {
      request = request.json(body);
    }

    let response = request.send().await?;
    let status = response.status();
    let bytes = response.bytes().await?;

    if !status.is_success() {
      let body: Option<Value> = serde_json::from_slice(&bytes).ok();
      return Err(ApiError::from_status(status, body.as_ref()));
    }
    if bytes.is_empty() {
      return Ok(Value::Null);
    }

    serde_json::from_slice(&bytes)
      .map_err(|e| ApiError::Request(format!("invalid response body: {}", e)))
  }

  pub async fn get(&self, endpoint: &str, params: &Params) -> Result<Value, ApiError> {
    self.request(Method::GET, endpoint, params, None).await
  }

  pub async fn post(&self, endpoint: &str, body: &Value) -> Result<Value, ApiError> {
    self
      .request(Method::POST, endpoint, &Params::new(), Some(body))
      .await
  }
}

impl Fetcher for ApiClient {
  fn fetch(&self, endpoint: &str, params: &Params) -> BoxFuture<'static, Result<Value, ApiError>> {
    let client = self.clone();
    let endpoint = endpoint.to_string();
    let params = params.clone();
    async move { client.get(&endpoint, &params).await }.boxed()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::query::ParamValue;
  use mockito::{Matcher, Server};
  use serde_json::json;

  fn client_for(base_url: &str, token: Option<&str>) -> ApiClient {
    let config = ApiConfig {
      base_url: base_url.to_string(),
      timeout_secs: 5,
    };
    ApiClient::new(&config, AuthSlot::new(token.map(String::from))).unwrap()
  }

  fn params(pairs: &[(&str, &str)]) -> Params {
    pairs
      .iter()
      .map(|(k, v)| (k.to_string(), ParamValue::from(*v)))
      .collect()
  }

  #[test]
  fn test_rejects_invalid_base_url() {
    let config = ApiConfig {
      base_url: "not a url".to_string(),
      timeout_secs: 5,
    };
    assert!(ApiClient::new(&config, AuthSlot::default()).is_err());
  }

  #[test]
  fn test_url_keeps_base_path_prefix() {
    let client = client_for("http://localhost:5000/proxy/", None);
    let url = client.url(
      "api/analysis/trends",
      &params(&[("timeRange", "last_week"), ("metric", "delay_minutes")]),
    );
    assert_eq!(
      url.as_str(),
      "http://localhost:5000/proxy/api/analysis/trends?metric=delay_minutes&timeRange=last_week"
    );
  }

  #[tokio::test]
  async fn test_get_sends_params_and_bearer_token() {
    let mut server = Server::new_async().await;
    let mock = server
      .mock("GET", "/api/attractions/active")
      .match_query(Matcher::UrlEncoded("timeRange".into(), "today".into()))
      .match_header("authorization", "Bearer secret-token")
      .with_status(200)
      .with_header("content-type", "application/json")
      .with_body(r#"{"malls":[],"restaurants":[],"entertainment":[]}"#)
      .create_async()
      .await;

    let client = client_for(&server.url(), Some("secret-token"));
    let value = client
      .get("/api/attractions/active", &params(&[("timeRange", "today")]))
      .await
      .unwrap();

    assert_eq!(value["malls"], json!([]));
    mock.assert_async().await;
  }

  #[tokio::test]
  async fn test_no_authorization_header_without_token() {
    let mut server = Server::new_async().await;
    let mock = server
      .mock("GET", "/api/dashboard/stats")
      .match_header("authorization", Matcher::Missing)
      .with_status(200)
      .with_body(r#"{"active_routes":24}"#)
      .create_async()
      .await;

    let client = client_for(&server.url(), None);
    let value = client.get("/api/dashboard/stats", &Params::new()).await.unwrap();

    assert_eq!(value["active_routes"], json!(24));
    mock.assert_async().await;
  }

  #[tokio::test]
  async fn test_token_set_after_creation_is_used() {
    let mut server = Server::new_async().await;
    let mock = server
      .mock("GET", "/api/dashboard/stats")
      .match_header("authorization", "Bearer later")
      .with_status(200)
      .with_body("{}")
      .create_async()
      .await;

    let auth = AuthSlot::default();
    let config = ApiConfig {
      base_url: server.url(),
      timeout_secs: 5,
    };
    let client = ApiClient::new(&config, auth.clone()).unwrap();
    auth.set("later");

    client.get("/api/dashboard/stats", &Params::new()).await.unwrap();
    mock.assert_async().await;
  }

  #[tokio::test]
  async fn test_server_error_uses_body_message() {
    let mut server = Server::new_async().await;
    let _mock = server
      .mock("GET", "/api/transit/real-time")
      .with_status(500)
      .with_body(r#"{"error":"Failed to fetch real-time transit data"}"#)
      .create_async()
      .await;

    let client = client_for(&server.url(), None);
    let err = client
      .get("/api/transit/real-time", &Params::new())
      .await
      .unwrap_err();

    assert_eq!(
      err,
      ApiError::Server {
        status: 500,
        message: "Failed to fetch real-time transit data".to_string()
      }
    );
  }

  #[tokio::test]
  async fn test_server_error_without_json_body() {
    let mut server = Server::new_async().await;
    let _mock = server
      .mock("GET", "/api/dashboard/stats")
      .with_status(503)
      .with_body("<html>maintenance</html>")
      .create_async()
      .await;

    let client = client_for(&server.url(), None);
    let err = client.get("/api/dashboard/stats", &Params::new()).await.unwrap_err();

    assert_eq!(err.status(), Some(503));
    assert_eq!(err.to_string(), "Server error 503: Service Unavailable");
  }

  #[tokio::test]
  async fn test_undecodable_success_body_is_request_error() {
    let mut server = Server::new_async().await;
    let _mock = server
      .mock("GET", "/api/dashboard/stats")
      .with_status(200)
      .with_body("not json")
      .create_async()
      .await;

    let client = client_for(&server.url(), None);
    let err = client.get("/api/dashboard/stats", &Params::new()).await.unwrap_err();

    assert!(matches!(err, ApiError::Request(_)));
    assert!(!err.is_retryable());
  }

  #[tokio::test]
  async fn test_connection_refused_is_network_error() {
    // Nothing listens on port 1
    let client = client_for("http://127.0.0.1:1", None);
    let err = client.get("/api/dashboard/stats", &Params::new()).await.unwrap_err();

    assert!(matches!(err, ApiError::Network(_)));
    assert!(err.to_string().starts_with("Network error"));
  }

  #[tokio::test]
  async fn test_post_sends_json_body() {
    let mut server = Server::new_async().await;
    let mock = server
      .mock("POST", "/api/auth/login")
      .match_body(Matcher::Json(json!({ "username": "admin" })))
      .with_status(201)
      .with_body(r#"{"token":"abc"}"#)
      .create_async()
      .await;

    let client = client_for(&server.url(), None);
    let value = client
      .post("/api/auth/login", &json!({ "username": "admin" }))
      .await
      .unwrap();

    assert_eq!(value["token"], json!("abc"));
    mock.assert_async().await;
  }

  #[tokio::test]
  async fn test_fetcher_uses_get() {
    let mut server = Server::new_async().await;
    let mock = server
      .mock("GET", "/api/dashboard/alerts")
      .with_status(200)
      .with_body(r#"{"alerts":[],"count":0}"#)
      .create_async()
      .await;

    let client = client_for(&server.url(), None);
    let value = client
      .fetch("/api/dashboard/alerts", &Params::new())
      .await
      .unwrap();

    assert_eq!(value["count"], json!(0));
    mock.assert_async().await;
  }
}
