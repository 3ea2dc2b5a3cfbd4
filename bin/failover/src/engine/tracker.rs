use arm_client::ArmClient;
use reqwest::StatusCode;
use serde::Deserialize;

use crate::engine::target::{FailoverTarget, TargetState};

pub const INELIGIBLE_MESSAGE: &str =
  "not eligible (hyperscale) or not active (offline)";
pub const NOT_IN_STATE_MESSAGE: &str =
  "serverless/offline, no failover needed";

const ASYNC_OPERATION_HEADER: &str = "azure-asyncoperation";

/// Reported by the status endpoint when the resource cannot failover
/// at all (paused serverless, offline). Not a failure: there is
/// nothing to upgrade.
const NOT_IN_STATE_CODE: &str = "DatabaseNotInStateToFailover";

/// Status body of the failover long running operation.
#[derive(Deserialize)]
struct OperationStatus {
  #[serde(default)]
  status: String,
  error: Option<OperationError>,
}

#[derive(Default, Deserialize)]
struct OperationError {
  #[serde(default)]
  code: String,
  #[serde(default)]
  message: String,
}

/// Drive a `Pending` target through its single initiation attempt.
/// Every outcome is recorded on the target: ineligible targets skip
/// without touching the management plane, an accepted failover moves
/// to `InProgress` with its status path captured, anything else is a
/// terminal failure. No retry.
pub async fn initiate(client: &ArmClient, target: &mut FailoverTarget) {
  if !target.should_failover {
    target.state = TargetState::Skipped;
    target.message = INELIGIBLE_MESSAGE.to_string();
    info!(
      "skipping {} {} on {} | {}",
      target.kind, target.name, target.server.name, target.message
    );
    return;
  }

  let res = match client.post(&target.failover_path(), None).await {
    Ok(res) => res,
    Err(e) => {
      fail(target, format!("{e:#}"));
      return;
    }
  };

  match res.status {
    StatusCode::OK | StatusCode::ACCEPTED => {
      match res.header(ASYNC_OPERATION_HEADER) {
        Some(location) => {
          target.status_path = client.management_relative(location);
          target.state = TargetState::InProgress;
          info!(
            "failover accepted for {} {} on {}",
            target.kind, target.name, target.server.name
          );
        }
        None => fail(
          target,
          "failover accepted without an Azure-AsyncOperation header, cannot track".to_string(),
        ),
      }
    }
    status => fail(target, format!("{status} | {}", res.body)),
  }
}

/// Poll a target that is `InProgress`. The status body decides the
/// transition; a transport-level problem or non-200 is a terminal
/// failure, an in-flight status leaves the target untouched for the
/// next sweep.
pub async fn poll(client: &ArmClient, target: &mut FailoverTarget) {
  let res = match client.get(&target.status_path).await {
    Ok(res) => res,
    Err(e) => {
      fail(target, format!("{e:#}"));
      return;
    }
  };

  if res.status != StatusCode::OK {
    fail(target, format!("{} | {}", res.status, res.body));
    return;
  }

  let status: OperationStatus = match res.json() {
    Ok(status) => status,
    Err(e) => {
      fail(target, format!("{e:#}"));
      return;
    }
  };

  match status.status.as_str() {
    "Succeeded" => {
      target.state = TargetState::Succeeded;
      info!(
        "failover succeeded for {} {} on {}",
        target.kind, target.name, target.server.name
      );
    }
    "Failed" => {
      let error = status.error.unwrap_or_default();
      if error.code == NOT_IN_STATE_CODE {
        target.state = TargetState::Skipped;
        target.message = NOT_IN_STATE_MESSAGE.to_string();
        info!(
          "skipping {} {} on {} | {}",
          target.kind, target.name, target.server.name, target.message
        );
      } else {
        fail(target, error.message);
      }
    }
    in_flight => {
      debug!(
        "{} {} on {} still {in_flight}",
        target.kind, target.name, target.server.name
      );
    }
  }
}

fn fail(target: &mut FailoverTarget, message: String) {
  target.state = TargetState::Failed;
  target.message = message;
  error!(
    "failover failed for {} {} on {} | {}",
    target.kind, target.name, target.server.name, target.message
  );
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn operation_status_parses_error_body() {
    let status: OperationStatus = serde_json::from_str(
      r#"{
        "status": "Failed",
        "error": {
          "code": "DatabaseNotInStateToFailover",
          "message": "The database is not in a state to failover."
        }
      }"#,
    )
    .unwrap();
    assert_eq!(status.status, "Failed");
    assert_eq!(status.error.unwrap().code, NOT_IN_STATE_CODE);
  }

  #[test]
  fn operation_status_tolerates_missing_error() {
    let status: OperationStatus =
      serde_json::from_str(r#"{"status":"InProgress"}"#).unwrap();
    assert_eq!(status.status, "InProgress");
    assert!(status.error.is_none());
  }
}
