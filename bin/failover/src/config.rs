//! Run configuration, combined from command line args ([CliArgs])
//! and environment variables ([Env]), args taking priority, with
//! defaults below both.

use std::sync::OnceLock;

use clap::Parser;
use logger::{LogConfig, LogLevel, StdioLogMode};
use serde::Deserialize;

/// # SQL Bulk Failover Command Line Arguments.
///
/// Example command:
/// ```sh
/// sqlfailover \
///   --subscription 00000000-0000-0000-0000-000000000000 \
///   --resource-group prod-rg \
///   --servers sql-east,sql-west \
///   --poll-interval 15 \
///   --log-level info
/// ```
#[derive(Parser)]
#[command(name = "sqlfailover", author, about, version)]
pub struct CliArgs {
  /// Subscription id holding the SQL resources.
  /// `*` resolves the single subscription visible to the
  /// ambient identity. Default: `*`
  #[arg(long, short = 's')]
  pub subscription: Option<String>,

  /// Resource group to narrow discovery to,
  /// or `*` for every group in the subscription. Default: `*`
  #[arg(long, short = 'g')]
  pub resource_group: Option<String>,

  /// Comma separated logical server names to narrow discovery to,
  /// or `*` for every server found. Default: `*`
  #[arg(long)]
  pub servers: Option<String>,

  /// Seconds to sleep between failover status poll sweeps.
  /// Default: 15
  #[arg(long)]
  pub poll_interval: Option<u64>,

  /// Abort unless an active self-service planned maintenance
  /// notification exists for the subscription. Default: false
  #[arg(long)]
  pub check_maintenance_notification: Option<bool>,

  /// Configure which engine events are surfaced:
  /// minimal, info, verbose. Default: info
  #[arg(long)]
  pub log_level: Option<LogLevel>,
}

/// # SQL Bulk Failover Environment Variables
///
/// Passed in the traditional `UPPER_SNAKE_CASE` format. An equivalent
/// parameter passed in [CliArgs] wins over the environment.
#[derive(Deserialize)]
pub struct Env {
  /// Override `subscription`
  pub failover_subscription: Option<String>,
  /// Override `resource_group`
  pub failover_resource_group: Option<String>,
  /// Override `servers`
  pub failover_servers: Option<String>,
  /// Override `poll_interval`
  pub failover_poll_interval: Option<u64>,
  /// Override `check_maintenance_notification`
  pub failover_check_maintenance_notification: Option<bool>,

  // LOGGING
  /// Override `logging.level`
  pub failover_log_level: Option<LogLevel>,
  /// Override `logging.stdio`
  pub failover_log_stdio: Option<StdioLogMode>,
  /// Override `logging.pretty`
  pub failover_log_pretty: Option<bool>,
  /// Override `logging.location`
  pub failover_log_location: Option<bool>,
  /// Override `logging.ansi`
  pub failover_log_ansi: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct FailoverConfig {
  pub subscription: String,
  pub resource_group: String,
  pub servers: String,
  pub poll_interval: u64,
  pub check_maintenance_notification: bool,
  pub logging: LogConfig,
}

pub fn failover_args() -> &'static CliArgs {
  static FAILOVER_ARGS: OnceLock<CliArgs> = OnceLock::new();
  FAILOVER_ARGS.get_or_init(CliArgs::parse)
}

pub fn failover_config() -> &'static FailoverConfig {
  static FAILOVER_CONFIG: OnceLock<FailoverConfig> = OnceLock::new();
  FAILOVER_CONFIG.get_or_init(|| {
    let env: Env = envy::from_env()
      .expect("failed to parse failover environment");
    let args = failover_args();

    let default_logging = LogConfig::default();

    FailoverConfig {
      subscription: args
        .subscription
        .clone()
        .or(env.failover_subscription)
        .unwrap_or_else(|| "*".to_string()),
      resource_group: args
        .resource_group
        .clone()
        .or(env.failover_resource_group)
        .unwrap_or_else(|| "*".to_string()),
      servers: args
        .servers
        .clone()
        .or(env.failover_servers)
        .unwrap_or_else(|| "*".to_string()),
      poll_interval: args
        .poll_interval
        .or(env.failover_poll_interval)
        .unwrap_or(15),
      check_maintenance_notification: args
        .check_maintenance_notification
        .or(env.failover_check_maintenance_notification)
        .unwrap_or(false),
      logging: LogConfig {
        level: args
          .log_level
          .or(env.failover_log_level)
          .unwrap_or(default_logging.level),
        stdio: env
          .failover_log_stdio
          .unwrap_or(default_logging.stdio),
        pretty: env
          .failover_log_pretty
          .unwrap_or(default_logging.pretty),
        location: env
          .failover_log_location
          .unwrap_or(default_logging.location),
        ansi: env.failover_log_ansi.unwrap_or(default_logging.ansi),
      },
    }
  })
}
