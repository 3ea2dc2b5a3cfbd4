use anyhow::{Context, anyhow};
use serde::Deserialize;

use crate::ArmClient;

/// One page of a management list response.
#[derive(Deserialize)]
struct Page {
  #[serde(default)]
  value: Vec<serde_json::Value>,
  /// Absolute URL of the next page, when there is one.
  #[serde(rename = "nextLink")]
  next_link: Option<String>,
}

impl ArmClient {
  /// Collect every item of a paged management listing, following
  /// `nextLink` until exhausted. A non-2xx response on any page
  /// aborts the listing; no transport retry is performed here.
  pub async fn list_all(
    &self,
    path: &str,
  ) -> anyhow::Result<Vec<serde_json::Value>> {
    let mut items = Vec::new();
    let mut next = path.to_string();

    loop {
      let res = self.get(&next).await?;
      if !res.is_success() {
        return Err(anyhow!(
          "list request to {next} returned {} | {}",
          res.status,
          res.body
        ));
      }
      let page: Page = res.json().with_context(|| {
        format!("failed to parse list page from {next}")
      })?;
      items.extend(page.value);
      match page.next_link {
        Some(link) => next = self.management_relative(&link),
        None => return Ok(items),
      }
    }
  }
}
