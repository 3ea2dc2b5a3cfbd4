#[macro_use]
extern crate tracing;

use std::{sync::Arc, time::Duration};

use anyhow::anyhow;
use arm_client::{ArmClient, ImdsCredential};
use sqlfailover::{
  config::failover_config,
  engine::{Engine, discovery::TargetQuery},
};
use tokio_util::sync::CancellationToken;

async fn app(cancel: CancellationToken) -> anyhow::Result<()> {
  let config = failover_config();
  logger::init(&config.logging)?;

  info!("SQL Bulk Failover version: v{}", env!("CARGO_PKG_VERSION"));
  info!("{config:?}");

  let client = ArmClient::new(Arc::new(ImdsCredential::default()));
  let engine = Engine::new(client)
    .with_poll_interval(Duration::from_secs(config.poll_interval))
    .with_maintenance_notification_check(
      config.check_maintenance_notification,
    );
  let query = TargetQuery {
    subscription: config.subscription.clone(),
    resource_group: config.resource_group.clone(),
    servers: config.servers.clone(),
  };

  let summary = engine.run(&query, cancel).await?;

  println!("{summary}");

  if summary.cancelled {
    return Err(anyhow!(
      "run cancelled before all targets reached a terminal state"
    ));
  }

  Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  dotenvy::dotenv().ok();

  let cancel = CancellationToken::new();
  let mut term_signal = tokio::signal::unix::signal(
    tokio::signal::unix::SignalKind::terminate(),
  )?;

  let mut app = tokio::spawn(app(cancel.clone()));

  let res = tokio::select! {
    res = &mut app => res,
    _ = term_signal.recv() => {
      warn!("SIGTERM received | cancelling run");
      cancel.cancel();
      app.await
    }
    _ = tokio::signal::ctrl_c() => {
      warn!("interrupt received | cancelling run");
      cancel.cancel();
      app.await
    }
  };

  res?
}
