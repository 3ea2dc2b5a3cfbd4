use anyhow::Context;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{
  Registry, layer::SubscriberExt, util::SubscriberInitExt,
};

/// Controls which engine events are surfaced on the log stream.
///
/// `Minimal` only surfaces warnings and per-target failures,
/// `Info` adds per-target state transitions and the run summary,
/// `Verbose` adds request-level detail from the management caller.
#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  Display,
  EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum LogLevel {
  Minimal,
  #[default]
  Info,
  Verbose,
}

impl From<LogLevel> for tracing::Level {
  fn from(value: LogLevel) -> Self {
    match value {
      LogLevel::Minimal => tracing::Level::WARN,
      LogLevel::Info => tracing::Level::INFO,
      LogLevel::Verbose => tracing::Level::DEBUG,
    }
  }
}

#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  Display,
  EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum StdioLogMode {
  #[default]
  Standard,
  Json,
  None,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LogConfig {
  /// Which engine events are surfaced. Default: `info`
  #[serde(default)]
  pub level: LogLevel,

  /// Whether to log to stdout in standard or json format,
  /// or disable stdout logging. Default: `standard`
  #[serde(default)]
  pub stdio: StdioLogMode,

  /// Use pretty (multi-line) standard logging. Default: false
  #[serde(default)]
  pub pretty: bool,

  /// Whether to include emitting module location in logs.
  /// Default: false
  #[serde(default)]
  pub location: bool,

  /// Color the standard logs. Default: true
  #[serde(default = "default_ansi")]
  pub ansi: bool,
}

fn default_ansi() -> bool {
  true
}

impl Default for LogConfig {
  fn default() -> Self {
    Self {
      level: Default::default(),
      stdio: Default::default(),
      pretty: false,
      location: false,
      ansi: default_ansi(),
    }
  }
}

pub fn init(config: &LogConfig) -> anyhow::Result<()> {
  let log_level: tracing::Level = config.level.into();

  let registry =
    Registry::default().with(LevelFilter::from(log_level));

  match (config.stdio, config.pretty) {
    (StdioLogMode::Standard, true) => registry
      .with(
        tracing_subscriber::fmt::layer()
          .pretty()
          .with_file(false)
          .with_line_number(false)
          .with_target(config.location)
          .with_ansi(config.ansi),
      )
      .try_init(),
    (StdioLogMode::Standard, false) => registry
      .with(
        tracing_subscriber::fmt::layer()
          .with_file(false)
          .with_line_number(false)
          .with_target(config.location)
          .with_ansi(config.ansi),
      )
      .try_init(),
    (StdioLogMode::Json, _) => registry
      .with(tracing_subscriber::fmt::layer().json())
      .try_init(),
    (StdioLogMode::None, _) => Ok(()),
  }
  .context("failed to init logger")
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn log_level_parses_case_insensitive() {
    assert_eq!("minimal".parse::<LogLevel>(), Ok(LogLevel::Minimal));
    assert_eq!("Info".parse::<LogLevel>(), Ok(LogLevel::Info));
    assert_eq!("VERBOSE".parse::<LogLevel>(), Ok(LogLevel::Verbose));
  }

  #[test]
  fn log_level_maps_to_tracing() {
    assert_eq!(
      tracing::Level::from(LogLevel::Minimal),
      tracing::Level::WARN
    );
    assert_eq!(
      tracing::Level::from(LogLevel::Verbose),
      tracing::Level::DEBUG
    );
  }
}
