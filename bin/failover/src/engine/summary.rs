use std::{fmt, time::Duration};

use colored::Colorize;

use crate::engine::target::{FailoverTarget, TargetState};

/// Terminal-state tally of one run. `succeeded + skipped + failed`
/// always equals the number of discovered targets.
#[derive(Debug, Clone)]
pub struct RunSummary {
  pub succeeded: usize,
  pub skipped: usize,
  pub failed: usize,
  pub elapsed: Duration,
  pub cancelled: bool,
}

impl RunSummary {
  pub fn tally(
    targets: &[FailoverTarget],
    elapsed: Duration,
    cancelled: bool,
  ) -> RunSummary {
    let count = |state: TargetState| {
      targets.iter().filter(|target| target.state == state).count()
    };
    RunSummary {
      succeeded: count(TargetState::Succeeded),
      skipped: count(TargetState::Skipped),
      failed: count(TargetState::Failed),
      elapsed,
      cancelled,
    }
  }

  pub fn total(&self) -> usize {
    self.succeeded + self.skipped + self.failed
  }
}

impl fmt::Display for RunSummary {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let headline = if self.cancelled {
      "failover run cancelled".red().bold()
    } else {
      "failover run complete".bold()
    };
    write!(
      f,
      "{headline} in {}s | {} | {} | {}",
      self.elapsed.as_secs(),
      format!("{} succeeded", self.succeeded).green(),
      format!("{} skipped", self.skipped).yellow(),
      format!("{} failed", self.failed).red(),
    )?;
    if self.failed > 0 {
      write!(
        f,
        "\n{} target(s) did not failover. Retry the run for the resources reported above, or escalate to support if the failures persist.",
        self.failed
      )?;
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use super::*;
  use crate::engine::target::SqlServer;

  fn target(state: TargetState) -> FailoverTarget {
    let server = Arc::new(SqlServer {
      subscription_id: "s".to_string(),
      resource_group: "rg".to_string(),
      name: "srv".to_string(),
    });
    let mut target = FailoverTarget::elastic_pool(server, "pool");
    target.state = state;
    target
  }

  #[test]
  fn tally_counts_terminal_states() {
    let targets = [
      target(TargetState::Succeeded),
      target(TargetState::Succeeded),
      target(TargetState::Skipped),
      target(TargetState::Failed),
    ];
    let summary =
      RunSummary::tally(&targets, Duration::from_secs(5), false);
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.total(), targets.len());
  }

  #[test]
  fn failures_add_the_advice_line() {
    let summary = RunSummary {
      succeeded: 0,
      skipped: 0,
      failed: 2,
      elapsed: Duration::from_secs(1),
      cancelled: false,
    };
    colored::control::set_override(false);
    let rendered = summary.to_string();
    assert!(rendered.contains("2 target(s) did not failover"));
  }
}
