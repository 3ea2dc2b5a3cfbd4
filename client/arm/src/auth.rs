use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::debug;

use crate::MANAGEMENT_BASE;

/// The instance metadata service reachable from any Azure-hosted
/// compute with a managed identity attached.
pub const IMDS_TOKEN_ENDPOINT: &str =
  "http://169.254.169.254/metadata/identity/oauth2/token";

const IMDS_API_VERSION: &str = "2019-08-01";

/// Tokens are refreshed once they are within this many seconds
/// of expiry.
const REFRESH_MARGIN_SECS: i64 = 300;

#[async_trait]
pub trait TokenProvider: Send + Sync {
  async fn access_token(&self) -> anyhow::Result<String>;
}

/// Fixed token, for tests and pre-acquired credentials.
pub struct StaticToken(String);

impl StaticToken {
  pub fn new(token: impl Into<String>) -> StaticToken {
    StaticToken(token.into())
  }
}

#[async_trait]
impl TokenProvider for StaticToken {
  async fn access_token(&self) -> anyhow::Result<String> {
    Ok(self.0.clone())
  }
}

/// Managed identity credential backed by the instance metadata
/// service, caching the token until close to expiry.
pub struct ImdsCredential {
  http: reqwest::Client,
  endpoint: String,
  resource: String,
  cached: RwLock<Option<CachedToken>>,
}

struct CachedToken {
  token: String,
  expires_on: i64,
}

impl CachedToken {
  fn usable_at(&self, now: i64) -> bool {
    self.expires_on - REFRESH_MARGIN_SECS > now
  }
}

#[derive(Deserialize)]
struct ImdsTokenResponse {
  access_token: String,
  expires_on: String,
}

impl Default for ImdsCredential {
  fn default() -> Self {
    ImdsCredential::with_endpoint(IMDS_TOKEN_ENDPOINT)
  }
}

impl ImdsCredential {
  pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
    ImdsCredential {
      http: reqwest::Client::new(),
      endpoint: endpoint.into(),
      resource: format!("{MANAGEMENT_BASE}/"),
      cached: RwLock::new(None),
    }
  }

  async fn fetch(&self) -> anyhow::Result<CachedToken> {
    debug!("requesting management token from {}", self.endpoint);
    let res = self
      .http
      .get(&self.endpoint)
      .query(&[
        ("api-version", IMDS_API_VERSION),
        ("resource", &self.resource),
      ])
      .header("Metadata", "true")
      .send()
      .await
      .context("token request to instance metadata endpoint failed")?;

    let status = res.status();
    let body = res
      .text()
      .await
      .context("failed to read token response body")?;

    if !status.is_success() {
      return Err(anyhow!(
        "instance metadata endpoint returned {status} | {body}"
      ));
    }

    let token: ImdsTokenResponse = serde_json::from_str(&body)
      .context("failed to parse token response")?;
    let expires_on = token
      .expires_on
      .parse()
      .context("unexpected expires_on in token response")?;

    Ok(CachedToken {
      token: token.access_token,
      expires_on,
    })
  }
}

#[async_trait]
impl TokenProvider for ImdsCredential {
  async fn access_token(&self) -> anyhow::Result<String> {
    let now = unix_now();

    if let Some(cached) = self.cached.read().await.as_ref()
      && cached.usable_at(now)
    {
      return Ok(cached.token.clone());
    }

    let mut guard = self.cached.write().await;
    // Another task may have refreshed while waiting on the lock.
    if let Some(cached) = guard.as_ref()
      && cached.usable_at(now)
    {
      return Ok(cached.token.clone());
    }

    let fresh = self.fetch().await?;
    let token = fresh.token.clone();
    *guard = Some(fresh);
    Ok(token)
  }
}

fn unix_now() -> i64 {
  SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .map(|elapsed| elapsed.as_secs() as i64)
    .unwrap_or(0)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn cached_token_expiry_margin() {
    let token = CachedToken {
      token: "t".to_string(),
      expires_on: 10_000,
    };
    assert!(token.usable_at(10_000 - REFRESH_MARGIN_SECS - 1));
    assert!(!token.usable_at(10_000 - REFRESH_MARGIN_SECS));
    assert!(!token.usable_at(10_000));
  }
}
