use std::sync::Arc;

use anyhow::{Context, anyhow};
use arm_client::ArmClient;
use serde_json::Value;

use crate::engine::{
  error::RunError,
  target::{
    DatabaseListEntry, ElasticPoolListEntry, FailoverTarget,
    SQL_API_VERSION, SqlServer,
  },
};

const RESOURCE_GROUP_API_VERSION: &str = "2021-04-01";
const SUBSCRIPTION_API_VERSION: &str = "2020-01-01";

/// The subscription / resource group / server narrowing for one run.
/// `*` or empty is the wildcard for all three; `servers` otherwise
/// holds a comma separated list of logical server names.
#[derive(Debug, Clone)]
pub struct TargetQuery {
  pub subscription: String,
  pub resource_group: String,
  pub servers: String,
}

impl TargetQuery {
  fn server_allowed(&self, name: &str) -> bool {
    if wildcard(&self.servers) {
      return true;
    }
    self
      .servers
      .split(',')
      .map(str::trim)
      .any(|candidate| candidate == name)
  }

  pub fn describe_filters(&self) -> String {
    format!(
      "resource group filter: {} | server filter: {}",
      display_filter(&self.resource_group),
      display_filter(&self.servers)
    )
  }
}

fn wildcard(filter: &str) -> bool {
  let filter = filter.trim();
  filter.is_empty() || filter == "*"
}

fn display_filter(filter: &str) -> &str {
  if wildcard(filter) { "*" } else { filter.trim() }
}

/// Resolve `*` to the one subscription visible to the caller's
/// identity. Anything else passes through trimmed.
pub async fn resolve_subscription(
  client: &ArmClient,
  requested: &str,
) -> Result<String, RunError> {
  if !wildcard(requested) {
    return Ok(requested.trim().to_string());
  }

  let subscriptions = client
    .list_all(&format!(
      "/subscriptions?api-version={SUBSCRIPTION_API_VERSION}"
    ))
    .await
    .map_err(RunError::Config)?;

  let mut ids = subscriptions.iter().filter_map(|subscription| {
    subscription.get("subscriptionId").and_then(Value::as_str)
  });

  match (ids.next(), ids.next()) {
    (Some(id), None) => Ok(id.to_string()),
    (None, _) => Err(RunError::Config(anyhow!(
      "no subscription is visible to the ambient identity, pass an explicit subscription id"
    ))),
    (Some(_), Some(_)) => Err(RunError::Config(anyhow!(
      "{} subscriptions are visible to the ambient identity, pass an explicit subscription id",
      subscriptions.len()
    ))),
  }
}

/// Enumerate every failover target under the query: logical servers
/// matching the filters, their elastic pools, and their standalone
/// databases.
pub async fn discover_targets(
  client: &ArmClient,
  query: &TargetQuery,
) -> Result<Vec<FailoverTarget>, RunError> {
  let subscription =
    resolve_subscription(client, &query.subscription).await?;

  let groups =
    resource_groups(client, &subscription, &query.resource_group)
      .await?;

  let mut servers = Vec::new();
  for group in &groups {
    servers.extend(
      servers_in_group(client, &subscription, group, query).await?,
    );
  }

  if servers.is_empty() {
    return Err(RunError::Discovery(anyhow!(
      "no logical servers matched | subscription: {subscription} | {}",
      query.describe_filters()
    )));
  }

  let mut targets = Vec::new();
  for server in servers {
    collect_server_targets(client, server, &mut targets).await?;
  }

  Ok(targets)
}

async fn resource_groups(
  client: &ArmClient,
  subscription: &str,
  filter: &str,
) -> Result<Vec<String>, RunError> {
  if !wildcard(filter) {
    return Ok(vec![filter.trim().to_string()]);
  }
  let entries = client
    .list_all(&format!(
      "/subscriptions/{subscription}/resourcegroups?api-version={RESOURCE_GROUP_API_VERSION}"
    ))
    .await
    .map_err(RunError::Discovery)?;
  Ok(
    entries
      .iter()
      .filter_map(|entry| entry.get("name").and_then(Value::as_str))
      .map(str::to_string)
      .collect(),
  )
}

async fn servers_in_group(
  client: &ArmClient,
  subscription: &str,
  group: &str,
  query: &TargetQuery,
) -> Result<Vec<Arc<SqlServer>>, RunError> {
  let entries = client
    .list_all(&format!(
      "/subscriptions/{subscription}/resourcegroups/{group}/providers/Microsoft.Sql/servers?api-version={SQL_API_VERSION}"
    ))
    .await
    .map_err(RunError::Discovery)?;

  let mut servers = Vec::new();
  for entry in entries {
    let Some(id) = entry.get("id").and_then(Value::as_str) else {
      continue;
    };
    let Some(server) = SqlServer::parse(id) else {
      warn!("skipping server with unparseable resource id | {id}");
      continue;
    };
    if query.server_allowed(&server.name) {
      debug!("retained logical server {}", server.name);
      servers.push(Arc::new(server));
    }
  }
  Ok(servers)
}

/// Pools are listed first: a pool is one failover unit regardless of
/// how many databases it contains, so pooled databases are dropped
/// from the database listing below.
async fn collect_server_targets(
  client: &ArmClient,
  server: Arc<SqlServer>,
  targets: &mut Vec<FailoverTarget>,
) -> Result<(), RunError> {
  let pools = client
    .list_all(&format!(
      "{}/elasticpools?api-version={SQL_API_VERSION}",
      server.resource_id()
    ))
    .await
    .map_err(RunError::Discovery)?;

  for entry in pools {
    let entry: ElasticPoolListEntry = serde_json::from_value(entry)
      .context("failed to parse elastic pool listing entry")
      .map_err(RunError::Discovery)?;
    targets
      .push(FailoverTarget::elastic_pool(server.clone(), entry.name));
  }

  let databases = client
    .list_all(&format!(
      "{}/databases?api-version={SQL_API_VERSION}",
      server.resource_id()
    ))
    .await
    .map_err(RunError::Discovery)?;

  for entry in databases {
    let entry: DatabaseListEntry = serde_json::from_value(entry)
      .context("failed to parse database listing entry")
      .map_err(RunError::Discovery)?;
    if entry.properties.elastic_pool_id.is_some() {
      // Covered by its pool target.
      continue;
    }
    targets.push(FailoverTarget::database(server.clone(), entry));
  }

  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  fn query(servers: &str) -> TargetQuery {
    TargetQuery {
      subscription: "sub-1".to_string(),
      resource_group: "*".to_string(),
      servers: servers.to_string(),
    }
  }

  #[test]
  fn wildcard_matches_empty_and_star() {
    assert!(wildcard(""));
    assert!(wildcard("*"));
    assert!(wildcard("  * "));
    assert!(!wildcard("srv-1"));
  }

  #[test]
  fn server_filter_is_exact_after_trimming() {
    let query = query("srv-1, srv-2");
    assert!(query.server_allowed("srv-1"));
    assert!(query.server_allowed("srv-2"));
    assert!(!query.server_allowed("srv"));
    assert!(!query.server_allowed("srv-10"));
  }

  #[test]
  fn wildcard_server_filter_matches_everything() {
    assert!(query("*").server_allowed("anything"));
    assert!(query("").server_allowed("anything"));
  }

  #[test]
  fn filters_described_with_wildcard_normalized() {
    let query = TargetQuery {
      subscription: "sub-1".to_string(),
      resource_group: String::new(),
      servers: " srv-1 ".to_string(),
    };
    assert_eq!(
      query.describe_filters(),
      "resource group filter: * | server filter: srv-1"
    );
  }
}
