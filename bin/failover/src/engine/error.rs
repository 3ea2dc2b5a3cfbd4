use thiserror::Error;

/// Fatal error classes that abort a run before or during discovery.
/// Per-target initiation / poll failures are not errors at this
/// level, they are recorded on the target and tallied in the summary.
#[derive(Debug, Error)]
pub enum RunError {
  #[error("invalid configuration | {0:#}")]
  Config(anyhow::Error),

  #[error("maintenance notification check failed | {0:#}")]
  Preflight(anyhow::Error),

  #[error("discovery failed | {0:#}")]
  Discovery(anyhow::Error),
}
