//! Result types for step, job and run execution.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use pipewright_expr::ExpressionError;
use pipewright_secrets::Redactor;
use serde::{Deserialize, Serialize};

/// Terminal status of a step or job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
  Success,
  Failure,
  Skipped,
}

impl Status {
  /// The value exposed as `needs.<job>.result` and `steps.<id>.outcome`.
  pub fn as_str(self) -> &'static str {
    match self {
      Status::Success => "success",
      Status::Failure => "failure",
      Status::Skipped => "skipped",
    }
  }
}

/// Terminal status of a whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
  Success,
  Failure,
  Cancelled,
}

/// Classification of a runtime failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
  UnresolvedReference,
  InvalidExpression,
  StepExecutionFailure,
  SecretNotFound,
  MissingRequiredInput,
  Timeout,
  Cancelled,
  Internal,
}

/// A runtime failure with its location and the context it was evaluated in.
///
/// `context` is a snapshot with secret values masked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureReport {
  pub kind: FailureKind,
  /// Job and step location, e.g. `release/build/2`.
  pub path: String,
  pub message: String,
  #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
  pub context: serde_json::Value,
}

impl FailureReport {
  pub fn new(kind: FailureKind, path: impl Into<String>, message: impl Into<String>) -> Self {
    Self {
      kind,
      path: path.into(),
      message: message.into(),
      context: serde_json::Value::Null,
    }
  }

  pub(crate) fn expression(path: impl Into<String>, error: &ExpressionError) -> Self {
    let kind = match error {
      ExpressionError::UnresolvedReference { .. } => FailureKind::UnresolvedReference,
      _ => FailureKind::InvalidExpression,
    };
    Self::new(kind, path, error.to_string())
  }

  pub fn with_context(mut self, context: serde_json::Value) -> Self {
    self.context = context;
    self
  }

  fn redacted(&self, redactor: &Redactor) -> Self {
    Self {
      kind: self.kind,
      path: self.path.clone(),
      message: redactor.redact(&self.message),
      context: redactor.redact_value(&self.context),
    }
  }
}

/// Result of a single step. Action calls carry their child steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
  pub index: usize,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub id: Option<String>,
  pub name: String,
  pub status: Status,
  /// A failure of a step with this flag does not stop the job.
  pub continue_on_error: bool,
  pub outputs: IndexMap<String, String>,
  /// Captured stdout and stderr tail.
  #[serde(default, skip_serializing_if = "String::is_empty")]
  pub log: String,
  pub attempts: u32,
  pub duration_ms: u64,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error: Option<FailureReport>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub steps: Vec<StepResult>,
}

impl StepResult {
  pub(crate) fn skipped(index: usize, id: Option<String>, name: String) -> Self {
    Self {
      index,
      id,
      name,
      status: Status::Skipped,
      continue_on_error: false,
      outputs: IndexMap::new(),
      log: String::new(),
      attempts: 0,
      duration_ms: 0,
      error: None,
      steps: Vec::new(),
    }
  }

  /// A failure that stops the job.
  pub fn is_blocking_failure(&self) -> bool {
    self.status == Status::Failure && !self.continue_on_error
  }

  /// `steps.<id>.conclusion`: a tolerated failure concludes as success.
  pub fn conclusion(&self) -> Status {
    if self.status == Status::Failure && self.continue_on_error {
      Status::Success
    } else {
      self.status
    }
  }

  fn redacted(&self, redactor: &Redactor) -> Self {
    Self {
      index: self.index,
      id: self.id.clone(),
      name: self.name.clone(),
      status: self.status,
      continue_on_error: self.continue_on_error,
      outputs: redact_map(&self.outputs, redactor),
      log: redactor.redact(&self.log),
      attempts: self.attempts,
      duration_ms: self.duration_ms,
      error: self.error.as_ref().map(|e| e.redacted(redactor)),
      steps: self.steps.iter().map(|s| s.redacted(redactor)).collect(),
    }
  }

  fn collect_errors(&self, out: &mut Vec<FailureReport>) {
    if let Some(error) = &self.error {
      out.push(error.clone());
    }
    for step in &self.steps {
      step.collect_errors(out);
    }
  }
}

/// Result of a job. Call jobs carry the callee's job results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
  pub job_id: String,
  pub name: String,
  pub status: Status,
  /// Whether the job counts toward the run's status.
  pub required: bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub environment: Option<String>,
  pub outputs: IndexMap<String, String>,
  pub duration_ms: u64,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub steps: Vec<StepResult>,
  #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
  pub jobs: IndexMap<String, JobResult>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error: Option<FailureReport>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub skip_reason: Option<String>,
}

impl JobResult {
  pub(crate) fn new(job_id: &str, name: &str, required: bool) -> Self {
    Self {
      job_id: job_id.to_string(),
      name: name.to_string(),
      status: Status::Success,
      required,
      environment: None,
      outputs: IndexMap::new(),
      duration_ms: 0,
      steps: Vec::new(),
      jobs: IndexMap::new(),
      error: None,
      skip_reason: None,
    }
  }

  pub(crate) fn skipped(job_id: &str, name: &str, required: bool, reason: String) -> Self {
    Self {
      status: Status::Skipped,
      skip_reason: Some(reason),
      ..Self::new(job_id, name, required)
    }
  }

  pub(crate) fn failed(job_id: &str, name: &str, required: bool, error: FailureReport) -> Self {
    Self {
      status: Status::Failure,
      error: Some(error),
      ..Self::new(job_id, name, required)
    }
  }

  /// A failure that fails the run.
  pub fn is_required_failure(&self) -> bool {
    self.status == Status::Failure && self.required
  }

  /// Step result by position within the job.
  pub fn step(&self, index: usize) -> Option<&StepResult> {
    self.steps.iter().find(|s| s.index == index)
  }

  fn redacted(&self, redactor: &Redactor) -> Self {
    Self {
      job_id: self.job_id.clone(),
      name: self.name.clone(),
      status: self.status,
      required: self.required,
      environment: self.environment.clone(),
      outputs: redact_map(&self.outputs, redactor),
      duration_ms: self.duration_ms,
      steps: self.steps.iter().map(|s| s.redacted(redactor)).collect(),
      jobs: self
        .jobs
        .iter()
        .map(|(id, job)| (id.clone(), job.redacted(redactor)))
        .collect(),
      error: self.error.as_ref().map(|e| e.redacted(redactor)),
      skip_reason: self.skip_reason.clone(),
    }
  }

  pub(crate) fn collect_errors(&self, out: &mut Vec<FailureReport>) {
    if let Some(error) = &self.error {
      out.push(error.clone());
    }
    for step in &self.steps {
      step.collect_errors(out);
    }
    for job in self.jobs.values() {
      job.collect_errors(out);
    }
  }
}

/// Outcome of executing a workflow's job graph.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowOutcome {
  pub status: RunStatus,
  pub outputs: IndexMap<String, String>,
  pub jobs: IndexMap<String, JobResult>,
  /// Failures raised while evaluating workflow outputs.
  pub output_errors: Vec<FailureReport>,
}

/// The full record of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
  pub run_id: String,
  pub workflow: String,
  pub event: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub environment: Option<String>,
  pub status: RunStatus,
  pub started_at: DateTime<Utc>,
  pub finished_at: DateTime<Utc>,
  pub duration_ms: u64,
  pub outputs: IndexMap<String, String>,
  pub jobs: IndexMap<String, JobResult>,
  /// Every failure report in the result tree, in job order.
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub errors: Vec<FailureReport>,
}

impl RunResult {
  /// A copy with every registered secret value masked.
  pub fn redacted(&self, redactor: &Redactor) -> Self {
    Self {
      run_id: self.run_id.clone(),
      workflow: self.workflow.clone(),
      event: self.event.clone(),
      environment: self.environment.clone(),
      status: self.status,
      started_at: self.started_at,
      finished_at: self.finished_at,
      duration_ms: self.duration_ms,
      outputs: redact_map(&self.outputs, redactor),
      jobs: self
        .jobs
        .iter()
        .map(|(id, job)| (id.clone(), job.redacted(redactor)))
        .collect(),
      errors: self.errors.iter().map(|e| e.redacted(redactor)).collect(),
    }
  }

  pub fn is_success(&self) -> bool {
    self.status == RunStatus::Success
  }
}

/// Every failure report in a job tree, in job order.
pub fn collect_errors<'a>(jobs: impl IntoIterator<Item = &'a JobResult>) -> Vec<FailureReport> {
  let mut out = Vec::new();
  for job in jobs {
    job.collect_errors(&mut out);
  }
  out
}

fn redact_map(map: &IndexMap<String, String>, redactor: &Redactor) -> IndexMap<String, String> {
  map
    .iter()
    .map(|(k, v)| (k.clone(), redactor.redact(v)))
    .collect()
}
