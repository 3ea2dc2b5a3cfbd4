//! The bulk failover engine: discover every failover unit under the
//! query, drive each through its long running failover operation, and
//! tally the terminal states.

use std::time::{Duration, Instant};

use anyhow::anyhow;
use arm_client::ArmClient;
use futures_util::future::join_all;
use tokio_util::sync::CancellationToken;

pub mod discovery;
pub mod error;
pub mod preflight;
pub mod summary;
pub mod target;
pub mod tracker;

use self::{
  discovery::TargetQuery,
  error::RunError,
  summary::RunSummary,
  target::{FailoverTarget, TargetState},
};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(15);

pub struct Engine {
  client: ArmClient,
  poll_interval: Duration,
  check_maintenance_notification: bool,
}

impl Engine {
  pub fn new(client: ArmClient) -> Engine {
    Engine {
      client,
      poll_interval: DEFAULT_POLL_INTERVAL,
      check_maintenance_notification: false,
    }
  }

  pub fn with_poll_interval(
    mut self,
    poll_interval: Duration,
  ) -> Engine {
    self.poll_interval = poll_interval;
    self
  }

  pub fn with_maintenance_notification_check(
    mut self,
    check: bool,
  ) -> Engine {
    self.check_maintenance_notification = check;
    self
  }

  /// Run one bulk failover pass. Completes when every discovered
  /// target has reached a terminal state, or earlier on cancellation,
  /// in which case the targets left behind are recorded as failed and
  /// the summary is marked cancelled.
  pub async fn run(
    &self,
    query: &TargetQuery,
    cancel: CancellationToken,
  ) -> Result<RunSummary, RunError> {
    let started = Instant::now();

    if self.check_maintenance_notification {
      self.preflight(query).await?;
    }

    let mut targets =
      discovery::discover_targets(&self.client, query).await?;
    if targets.is_empty() {
      return Err(RunError::Discovery(anyhow!(
        "no failover targets found | {}",
        query.describe_filters()
      )));
    }
    info!("discovered {} failover target(s)", targets.len());

    let cancelled = self.reconcile(&mut targets, &cancel).await;
    if cancelled {
      for target in
        targets.iter_mut().filter(|target| !target.terminal())
      {
        target.state = TargetState::Failed;
        target.message = "cancelled before completion".to_string();
      }
      warn!("run cancelled | unfinished targets recorded as failed");
    }

    let summary =
      RunSummary::tally(&targets, started.elapsed(), cancelled);
    info!(
      "{} succeeded | {} skipped | {} failed",
      summary.succeeded, summary.skipped, summary.failed
    );
    Ok(summary)
  }

  async fn preflight(
    &self,
    query: &TargetQuery,
  ) -> Result<(), RunError> {
    let subscription = discovery::resolve_subscription(
      &self.client,
      &query.subscription,
    )
    .await?;
    let notification = preflight::active_maintenance_notification(
      &self.client,
      &subscription,
    )
    .await
    .map_err(RunError::Preflight)?;
    match notification {
      Some(tracking_id) => {
        info!(
          "active self-service maintenance notification found | tracking id: {tracking_id}"
        );
        Ok(())
      }
      None => Err(RunError::Preflight(anyhow!(
        "no active self-service planned maintenance notification for subscription {subscription}"
      ))),
    }
  }

  /// The reconcile loop: initiate everything pending, then sweep the
  /// in-progress set on the poll interval until no target is left
  /// non-terminal. Returns true when interrupted by cancellation.
  async fn reconcile(
    &self,
    targets: &mut [FailoverTarget],
    cancel: &CancellationToken,
  ) -> bool {
    loop {
      for target in targets
        .iter_mut()
        .filter(|target| target.state == TargetState::Pending)
      {
        if cancel.is_cancelled() {
          return true;
        }
        tracker::initiate(&self.client, target).await;
      }

      if targets.iter().all(FailoverTarget::terminal) {
        return false;
      }

      // Give the management plane time to observe the initiations
      // before their status endpoints are queried.
      tokio::select! {
        _ = tokio::time::sleep(self.poll_interval) => {}
        _ = cancel.cancelled() => return true,
      }

      let polls = targets
        .iter_mut()
        .filter(|target| target.state == TargetState::InProgress)
        .map(|target| tracker::poll(&self.client, target));
      join_all(polls).await;
    }
  }
}
