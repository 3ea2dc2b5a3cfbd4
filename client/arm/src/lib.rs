//! Thin caller for the Azure management REST plane.
//!
//! The client performs single authenticated requests against
//! management-relative paths (`/subscriptions/...`) and leaves retry
//! and response classification entirely to its callers. Credentials
//! come from a pluggable [TokenProvider], by default the ambient
//! managed identity of the host.

use std::sync::Arc;

use anyhow::Context;
use reqwest::{Method, StatusCode, header::HeaderMap};
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

mod auth;
mod paging;

pub use auth::{ImdsCredential, StaticToken, TokenProvider};

/// The fixed origin of the management plane. Absolute URLs returned
/// by the service (eg. `nextLink`, `Azure-AsyncOperation`) are reduced
/// to management-relative form before being re-issued.
pub const MANAGEMENT_BASE: &str = "https://management.azure.com";

#[derive(Clone)]
pub struct ArmClient {
  http: reqwest::Client,
  base_url: String,
  credential: Arc<dyn TokenProvider>,
}

impl ArmClient {
  pub fn new(credential: Arc<dyn TokenProvider>) -> ArmClient {
    ArmClient::with_base_url(MANAGEMENT_BASE, credential)
  }

  /// Point the client at a different origin.
  /// The path / header contract is unchanged.
  pub fn with_base_url(
    base_url: impl Into<String>,
    credential: Arc<dyn TokenProvider>,
  ) -> ArmClient {
    let mut base_url = base_url.into();
    while base_url.ends_with('/') {
      base_url.pop();
    }
    ArmClient {
      http: reqwest::Client::new(),
      base_url,
      credential,
    }
  }

  /// Reduce an absolute URL to the relative path (plus query) issued
  /// against the configured origin. Already-relative paths pass
  /// through unchanged.
  pub fn management_relative(&self, link: &str) -> String {
    match Url::parse(link) {
      Ok(url) => {
        let mut path = url.path().to_string();
        if let Some(query) = url.query() {
          path.push('?');
          path.push_str(query);
        }
        path
      }
      Err(_) => link.to_string(),
    }
  }

  /// Perform one authenticated management request. Transport errors
  /// are returned as `Err`; any response that arrived, 2xx or not, is
  /// returned as `Ok` for the caller to classify.
  pub async fn request(
    &self,
    method: Method,
    path: &str,
    body: Option<&serde_json::Value>,
  ) -> anyhow::Result<ArmResponse> {
    let token = self
      .credential
      .access_token()
      .await
      .context("failed to acquire management access token")?;

    debug!("{method} {path}");

    let mut req = self
      .http
      .request(method, format!("{}{path}", self.base_url))
      .bearer_auth(token);
    if let Some(body) = body {
      req = req.json(body);
    }

    let res = req.send().await.with_context(|| {
      format!("request to {path} failed at the transport level")
    })?;

    let status = res.status();
    let headers = res.headers().clone();
    let body = res.text().await.with_context(|| {
      format!("failed to read response body from {path}")
    })?;

    Ok(ArmResponse {
      status,
      headers,
      body,
    })
  }

  pub async fn get(&self, path: &str) -> anyhow::Result<ArmResponse> {
    self.request(Method::GET, path, None).await
  }

  pub async fn post(
    &self,
    path: &str,
    body: Option<&serde_json::Value>,
  ) -> anyhow::Result<ArmResponse> {
    self.request(Method::POST, path, body).await
  }
}

pub struct ArmResponse {
  pub status: StatusCode,
  pub headers: HeaderMap,
  pub body: String,
}

impl ArmResponse {
  pub fn is_success(&self) -> bool {
    self.status.is_success()
  }

  pub fn header(&self, name: &str) -> Option<&str> {
    self.headers.get(name).and_then(|value| value.to_str().ok())
  }

  pub fn json<T: DeserializeOwned>(&self) -> anyhow::Result<T> {
    serde_json::from_str(&self.body).with_context(|| {
      format!("failed to parse response body | {}", self.body)
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn client() -> ArmClient {
    ArmClient::new(Arc::new(StaticToken::new("token")))
  }

  #[test]
  fn reduces_absolute_management_url() {
    let relative = client().management_relative(
      "https://management.azure.com/subscriptions/s1/resourcegroups?api-version=2021-04-01&$skiptoken=abc",
    );
    assert_eq!(
      relative,
      "/subscriptions/s1/resourcegroups?api-version=2021-04-01&$skiptoken=abc"
    );
  }

  #[test]
  fn leaves_relative_path_unchanged() {
    let path = "/subscriptions/s1/resourcegroups?api-version=2021-04-01";
    assert_eq!(client().management_relative(path), path);
  }

  #[test]
  fn strips_trailing_slash_from_base_url() {
    let client = ArmClient::with_base_url(
      "http://127.0.0.1:9000/",
      Arc::new(StaticToken::new("token")),
    );
    assert_eq!(client.base_url, "http://127.0.0.1:9000");
  }
}
