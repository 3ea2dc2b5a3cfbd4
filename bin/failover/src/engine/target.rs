use std::sync::Arc;

use serde::Deserialize;
use strum::Display;

/// Api version accepted by the Microsoft.Sql list and failover
/// endpoints used here.
pub const SQL_API_VERSION: &str = "2021-02-01-preview";

/// Identity of one logical SQL server, parsed positionally out of its
/// management resource id. Shared by reference between the targets
/// discovered under it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlServer {
  pub subscription_id: String,
  pub resource_group: String,
  pub name: String,
}

impl SqlServer {
  /// Parse `/subscriptions/<s>/resourcegroups/<rg>/.../servers/<name>`.
  /// Segment keys are matched case insensitive, the management plane
  /// is not consistent about their casing.
  pub fn parse(resource_id: &str) -> Option<SqlServer> {
    let mut subscription_id = None;
    let mut resource_group = None;
    let mut name = None;

    let segments = resource_id
      .split('/')
      .filter(|segment| !segment.is_empty())
      .collect::<Vec<_>>();

    for pair in segments.chunks(2) {
      let [key, value] = pair else {
        continue;
      };
      match key.to_ascii_lowercase().as_str() {
        "subscriptions" => subscription_id = Some(*value),
        "resourcegroups" => resource_group = Some(*value),
        "servers" => name = Some(*value),
        _ => {}
      }
    }

    Some(SqlServer {
      subscription_id: subscription_id?.to_string(),
      resource_group: resource_group?.to_string(),
      name: name?.to_string(),
    })
  }

  pub fn resource_id(&self) -> String {
    format!(
      "/subscriptions/{}/resourcegroups/{}/providers/Microsoft.Sql/servers/{}",
      self.subscription_id, self.resource_group, self.name
    )
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum TargetKind {
  #[strum(serialize = "database")]
  Database,
  #[strum(serialize = "elastic pool")]
  ElasticPool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display)]
pub enum TargetState {
  #[default]
  Pending,
  InProgress,
  Succeeded,
  Skipped,
  Failed,
}

impl TargetState {
  pub fn terminal(self) -> bool {
    matches!(
      self,
      TargetState::Succeeded | TargetState::Skipped | TargetState::Failed
    )
  }
}

/// One failover unit: a standalone database, or an elastic pool
/// standing in for every database it contains.
#[derive(Debug, Clone)]
pub struct FailoverTarget {
  pub server: Arc<SqlServer>,
  pub kind: TargetKind,
  pub name: String,
  /// Full management path of the failover unit.
  pub resource_id: String,
  /// Evaluated once at construction from the listing payload.
  /// Later state changes of the underlying resource do not
  /// re-classify the target.
  pub should_failover: bool,
  pub state: TargetState,
  /// Management path polled for failover progress.
  /// Empty until a failover has been accepted.
  pub status_path: String,
  /// Last error / explanation, if any.
  pub message: String,
}

impl FailoverTarget {
  pub fn database(
    server: Arc<SqlServer>,
    entry: DatabaseListEntry,
  ) -> FailoverTarget {
    let tier = entry
      .properties
      .current_sku
      .as_ref()
      .map(|sku| sku.tier.as_str())
      .unwrap_or_default();
    let should_failover =
      tier != "Hyperscale" && entry.properties.status == "Online";
    FailoverTarget {
      server,
      kind: TargetKind::Database,
      name: entry.name,
      resource_id: entry.id,
      should_failover,
      state: TargetState::Pending,
      status_path: String::new(),
      message: String::new(),
    }
  }

  pub fn elastic_pool(
    server: Arc<SqlServer>,
    name: impl Into<String>,
  ) -> FailoverTarget {
    let name = name.into();
    let resource_id =
      format!("{}/elasticpools/{name}", server.resource_id());
    FailoverTarget {
      server,
      kind: TargetKind::ElasticPool,
      name,
      resource_id,
      should_failover: true,
      state: TargetState::Pending,
      status_path: String::new(),
      message: String::new(),
    }
  }

  pub fn failover_path(&self) -> String {
    format!(
      "{}/failover?api-version={SQL_API_VERSION}",
      self.resource_id
    )
  }

  pub fn terminal(&self) -> bool {
    self.state.terminal()
  }
}

// =================
//  LISTING PAYLOADS
// =================

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseListEntry {
  pub id: String,
  pub name: String,
  #[serde(default)]
  pub properties: DatabaseProperties,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseProperties {
  #[serde(default)]
  pub status: String,
  #[serde(default)]
  pub current_sku: Option<Sku>,
  /// Resource id of the owning pool, for pooled databases.
  #[serde(default)]
  pub elastic_pool_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Sku {
  #[serde(default)]
  pub tier: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ElasticPoolListEntry {
  pub name: String,
}

#[cfg(test)]
mod tests {
  use super::*;

  fn server() -> Arc<SqlServer> {
    Arc::new(SqlServer {
      subscription_id: "sub-1".to_string(),
      resource_group: "rg-1".to_string(),
      name: "srv-1".to_string(),
    })
  }

  fn database_entry(json: &str) -> DatabaseListEntry {
    serde_json::from_str(json).unwrap()
  }

  #[test]
  fn parses_server_from_resource_id() {
    let parsed = SqlServer::parse(
      "/subscriptions/sub-1/resourceGroups/rg-1/providers/Microsoft.Sql/servers/srv-1",
    )
    .unwrap();
    assert_eq!(parsed, *server());
  }

  #[test]
  fn rejects_resource_id_without_server_segment() {
    assert_eq!(
      SqlServer::parse("/subscriptions/sub-1/resourcegroups/rg-1"),
      None
    );
  }

  #[test]
  fn online_general_purpose_database_is_eligible() {
    let entry = database_entry(
      r#"{
        "id": "/subscriptions/sub-1/resourcegroups/rg-1/providers/Microsoft.Sql/servers/srv-1/databases/db-1",
        "name": "db-1",
        "properties": {
          "status": "Online",
          "currentSku": { "tier": "GeneralPurpose" }
        }
      }"#,
    );
    let target = FailoverTarget::database(server(), entry);
    assert!(target.should_failover);
    assert_eq!(target.state, TargetState::Pending);
    assert_eq!(
      target.failover_path(),
      "/subscriptions/sub-1/resourcegroups/rg-1/providers/Microsoft.Sql/servers/srv-1/databases/db-1/failover?api-version=2021-02-01-preview"
    );
  }

  #[test]
  fn hyperscale_database_is_not_eligible() {
    let entry = database_entry(
      r#"{
        "id": "/x/databases/db-1",
        "name": "db-1",
        "properties": {
          "status": "Online",
          "currentSku": { "tier": "Hyperscale" }
        }
      }"#,
    );
    assert!(!FailoverTarget::database(server(), entry).should_failover);
  }

  #[test]
  fn offline_database_is_not_eligible() {
    let entry = database_entry(
      r#"{
        "id": "/x/databases/db-1",
        "name": "db-1",
        "properties": {
          "status": "Paused",
          "currentSku": { "tier": "GeneralPurpose" }
        }
      }"#,
    );
    assert!(!FailoverTarget::database(server(), entry).should_failover);
  }

  #[test]
  fn pool_target_synthesizes_resource_id() {
    let target = FailoverTarget::elastic_pool(server(), "pool-1");
    assert!(target.should_failover);
    assert_eq!(
      target.resource_id,
      "/subscriptions/sub-1/resourcegroups/rg-1/providers/Microsoft.Sql/servers/srv-1/elasticpools/pool-1"
    );
  }

  #[test]
  fn pooled_database_entry_carries_pool_id() {
    let entry = database_entry(
      r#"{
        "id": "/x/databases/db-1",
        "name": "db-1",
        "properties": {
          "status": "Online",
          "elasticPoolId": "/x/elasticpools/pool-1"
        }
      }"#,
    );
    assert_eq!(
      entry.properties.elastic_pool_id.as_deref(),
      Some("/x/elasticpools/pool-1")
    );
  }
}
