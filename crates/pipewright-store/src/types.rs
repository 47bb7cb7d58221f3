use chrono::{DateTime, Utc};
use pipewright_runtime::{RunResult, RunStatus};
use serde::{Deserialize, Serialize};

/// Headline fields of a stored run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
  pub run_id: String,
  pub workflow: String,
  pub event: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub environment: Option<String>,
  pub status: RunStatus,
  pub started_at: DateTime<Utc>,
  pub finished_at: DateTime<Utc>,
  pub duration_ms: u64,
  /// Number of failure reports in the run.
  pub error_count: usize,
}

impl From<&RunResult> for RunSummary {
  fn from(run: &RunResult) -> Self {
    Self {
      run_id: run.run_id.clone(),
      workflow: run.workflow.clone(),
      event: run.event.clone(),
      environment: run.environment.clone(),
      status: run.status,
      started_at: run.started_at,
      finished_at: run.finished_at,
      duration_ms: run.duration_ms,
      error_count: run.errors.len(),
    }
  }
}

/// Newest first; ties broken by run id so listings are stable.
pub(crate) fn sort_newest_first(summaries: &mut [RunSummary]) {
  summaries.sort_by(|a, b| {
    b.started_at
      .cmp(&a.started_at)
      .then_with(|| a.run_id.cmp(&b.run_id))
  });
}
