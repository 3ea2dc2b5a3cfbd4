use anyhow::{Context, anyhow};
use arm_client::ArmClient;
use serde::Deserialize;
use serde_json::json;

const RESOURCE_GRAPH_PATH: &str =
  "/providers/Microsoft.ResourceGraph/resources?api-version=2021-03-01";

/// Summary token marking a planned maintenance event as part of the
/// self-service maintenance program.
pub const SELF_SERVICE_MAINTENANCE_TOKEN: &str =
  "azsqlcmwselfservicemaint";

#[derive(Deserialize)]
struct QueryResponse {
  #[serde(default)]
  data: Vec<NotificationRow>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NotificationRow {
  tracking_id: String,
}

/// Tracking id of the most recent active self-service planned
/// maintenance notification for the subscription, if there is one.
pub async fn active_maintenance_notification(
  client: &ArmClient,
  subscription: &str,
) -> anyhow::Result<Option<String>> {
  let query = format!(
    "servicehealthresources \
     | where type == 'microsoft.resourcehealth/events' \
     | where properties.EventType == 'PlannedMaintenance' and properties.Status == 'Active' \
     | where properties.Summary contains '{SELF_SERVICE_MAINTENANCE_TOKEN}' \
     | order by todatetime(properties.LastUpdateTime) desc \
     | project trackingId = name"
  );
  let body = json!({
    "subscriptions": [subscription],
    "query": query,
  });

  let res = client.post(RESOURCE_GRAPH_PATH, Some(&body)).await?;
  if !res.is_success() {
    return Err(anyhow!(
      "resource graph query returned {} | {}",
      res.status,
      res.body
    ));
  }

  let response: QueryResponse = res
    .json()
    .context("failed to parse resource graph response")?;
  Ok(response.data.into_iter().next().map(|row| row.tracking_id))
}
