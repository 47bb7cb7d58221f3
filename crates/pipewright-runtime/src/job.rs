//! Job executor.
//!
//! A job is gated on its `needs` and `if:`, then runs either its steps or
//! the reusable workflow it calls. Each job runs in its own task and owns
//! its result until it hands it back to the scheduler.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use indexmap::IndexMap;
use pipewright_expr::{CheckStatus, Context, Path, evaluate_condition, interpolate, scopes};
use pipewright_secrets::SecretScope;
use pipewright_workflow::{CallBinding, Job, JobKind, Step};
use serde_json::{Map, Value, json};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::events::ExecutionEvent;
use crate::frame::{
  WorkflowFrame, bind_inputs, bind_secrets, condition_paths, derives_from_secret, resolve_secrets,
  template_paths,
};
use crate::result::{FailureKind, FailureReport, JobResult, RunStatus, Status};
use crate::runtime::Runtime;
use crate::scheduler::run_workflow;
use crate::step::{StepScope, run_steps};

/// What a job sees of a finished dependency.
#[derive(Debug, Clone)]
pub(crate) struct NeedResult {
  pub status: Status,
  pub outputs: IndexMap<String, String>,
}

impl NeedResult {
  pub fn of(result: &JobResult) -> Self {
    Self {
      status: result.status,
      outputs: result.outputs.clone(),
    }
  }

  /// `needs.<job>`: outputs are only visible once the job succeeded.
  fn scope_entry(&self) -> Value {
    match self.status {
      Status::Success => json!({ "result": self.status.as_str(), "outputs": self.outputs }),
      _ => json!({ "result": self.status.as_str() }),
    }
  }
}

/// Shared state of one executing job.
struct JobRun<'a> {
  rt: &'a Runtime,
  frame: &'a WorkflowFrame,
  job: &'a Job,
  path: &'a str,
  /// `inputs`, `github` and `needs`, with the dependency status.
  base: Context,
  cancel: CancellationToken,
}

impl JobRun<'_> {
  /// `ctx` plus the secrets referenced by `paths`.
  async fn with_secrets(
    &self,
    ctx: Context,
    paths: &[Path],
    scope: &SecretScope,
    path: &str,
  ) -> Result<Context, FailureReport> {
    match resolve_secrets(self.rt, &self.frame.secrets, paths, scope, path).await {
      Ok(secrets) => Ok(ctx.with_scope(scopes::SECRETS, secrets)),
      Err(report) => Err(report.with_context(ctx.redacted_snapshot())),
    }
  }

  async fn interpolate(
    &self,
    template: &str,
    ctx: Context,
    scope: &SecretScope,
    path: &str,
  ) -> Result<String, FailureReport> {
    let ctx = self
      .with_secrets(ctx, &template_paths(template), scope, path)
      .await?;
    interpolate(template, &ctx)
      .map_err(|e| FailureReport::expression(path, &e).with_context(ctx.redacted_snapshot()))
  }
}

/// Run one job of `frame` to completion.
pub(crate) async fn run_job(
  rt: Runtime,
  frame: Arc<WorkflowFrame>,
  job_id: String,
  needs: IndexMap<String, NeedResult>,
  cancel: CancellationToken,
) -> JobResult {
  let path = frame.child_path(&job_id);
  let Some(job) = frame.workflow.jobs.get(&job_id) else {
    return JobResult::failed(
      &job_id,
      &job_id,
      true,
      FailureReport::new(FailureKind::Internal, &path, "job not found in workflow"),
    );
  };

  let started = Instant::now();
  let status = CheckStatus {
    failed: needs.values().any(|n| n.status == Status::Failure),
    incomplete: needs.values().any(|n| n.status == Status::Skipped),
    cancelled: cancel.is_cancelled(),
  };
  let needs_scope: Map<String, Value> = needs
    .iter()
    .map(|(id, need)| (id.clone(), need.scope_entry()))
    .collect();
  let base = Context::new()
    .with_scope(scopes::INPUTS, frame.inputs.clone())
    .with_scope(scopes::GITHUB, frame.github.clone())
    .with_scope(scopes::NEEDS, Value::Object(needs_scope))
    .with_status(status);

  // Job-level timeouts cancel this token only; the guard stops the timer
  // once the job returns.
  let job_cancel = cancel.child_token();
  let _guard = job_cancel.clone().drop_guard();

  let run = JobRun {
    rt: &rt,
    frame: &frame,
    job,
    path: &path,
    base,
    cancel: job_cancel.clone(),
  };

  let default_scope = SecretScope::new(path.clone(), frame.environment.clone());
  let skip_reason = match gate(&run, status, &needs, &default_scope).await {
    Ok(reason) => reason,
    Err(report) => {
      warn!(run_id = %rt.run_id(), job_path = %path, error = %report.message, "job_failed");
      let mut result = JobResult::failed(&job_id, &job.name, job.is_required(), report);
      result.duration_ms = started.elapsed().as_millis() as u64;
      rt.notify(ExecutionEvent::JobCompleted {
        run_id: rt.run_id().to_string(),
        job_path: path,
        status: result.status,
      });
      return result;
    }
  };
  if let Some(reason) = skip_reason {
    info!(run_id = %rt.run_id(), job_path = %path, reason = %reason, "job_skipped");
    rt.notify(ExecutionEvent::JobSkipped {
      run_id: rt.run_id().to_string(),
      job_path: path.clone(),
      reason: reason.clone(),
    });
    return JobResult::skipped(&job_id, &job.name, job.is_required(), reason);
  }

  info!(run_id = %rt.run_id(), job_path = %path, "job_started");
  rt.notify(ExecutionEvent::JobStarted {
    run_id: rt.run_id().to_string(),
    job_path: path.clone(),
  });

  let timed_out = Arc::new(AtomicBool::new(false));
  if let Some(limit) = job.timeout {
    let token = job_cancel.clone();
    let flag = timed_out.clone();
    tokio::spawn(async move {
      tokio::select! {
        _ = tokio::time::sleep(limit) => {
          flag.store(true, Ordering::SeqCst);
          token.cancel();
        }
        _ = token.cancelled() => {}
      }
    });
  }

  let mut result = JobResult::new(&job_id, &job.name, job.is_required());
  if let Err(report) = execute(&run, &default_scope, &mut result).await {
    result.status = Status::Failure;
    result.error = Some(report);
  }
  if timed_out.load(Ordering::SeqCst) {
    let limit = job.timeout.map(|t| t.as_millis()).unwrap_or_default();
    result.status = Status::Failure;
    result.error = Some(FailureReport::new(
      FailureKind::Timeout,
      &path,
      format!("job timed out after {}ms", limit),
    ));
  }

  result.duration_ms = started.elapsed().as_millis() as u64;
  match result.status {
    Status::Failure => warn!(
      run_id = %rt.run_id(),
      job_path = %path,
      duration_ms = result.duration_ms,
      "job_failed"
    ),
    _ => info!(
      run_id = %rt.run_id(),
      job_path = %path,
      duration_ms = result.duration_ms,
      "job_completed"
    ),
  }
  rt.notify(ExecutionEvent::JobCompleted {
    run_id: rt.run_id().to_string(),
    job_path: path,
    status: result.status,
  });
  result
}

/// Decide whether the job runs. Returns the skip reason when it does not.
async fn gate(
  run: &JobRun<'_>,
  status: CheckStatus,
  needs: &IndexMap<String, NeedResult>,
  scope: &SecretScope,
) -> Result<Option<String>, FailureReport> {
  let Some(condition) = &run.job.condition else {
    if status.is_success() {
      return Ok(None);
    }
    if status.cancelled {
      return Ok(Some("run cancelled".to_string()));
    }
    let unmet: Vec<String> = needs
      .iter()
      .filter(|(_, need)| need.status != Status::Success)
      .map(|(id, need)| format!("'{}' {}", id, need.status.as_str()))
      .collect();
    return Ok(Some(format!("dependency {}", unmet.join(", "))));
  };

  let ctx = run
    .with_secrets(run.base.clone(), &condition_paths(condition), scope, run.path)
    .await?;
  match evaluate_condition(condition, &ctx) {
    Ok(true) => Ok(None),
    Ok(false) => Ok(Some(format!("condition '{}' evaluated to false", condition))),
    Err(e) => Err(FailureReport::expression(run.path, &e).with_context(ctx.redacted_snapshot())),
  }
}

async fn execute(
  run: &JobRun<'_>,
  default_scope: &SecretScope,
  result: &mut JobResult,
) -> Result<(), FailureReport> {
  let environment = match &run.job.environment {
    Some(template) => {
      let selected = run
        .interpolate(template, run.base.clone(), default_scope, run.path)
        .await?;
      Some(selected).filter(|s| !s.is_empty())
    }
    None => run.frame.environment.clone(),
  };
  result.environment = environment.clone();
  let scope = SecretScope::new(run.path, environment.clone());

  // Workflow env first, then the job's own; later entries see earlier ones
  let mut env = Map::new();
  let mut secret_env = BTreeSet::new();
  for (key, template) in run.frame.workflow.env.iter().chain(run.job.env.iter()) {
    let ctx = run
      .base
      .clone()
      .with_scope(scopes::ENV, Value::Object(env.clone()));
    let value = run.interpolate(template, ctx, &scope, run.path).await?;
    if derives_from_secret(template, &secret_env) {
      secret_env.insert(key.clone());
    } else {
      secret_env.remove(key);
    }
    env.insert(key.clone(), Value::String(value));
  }

  match &run.job.kind {
    JobKind::Steps(steps) => run_steps_job(run, steps, env, secret_env, &scope, result).await,
    JobKind::Call(binding) => run_call_job(run, binding, env, environment, &scope, result).await,
  }
}

async fn run_steps_job(
  run: &JobRun<'_>,
  steps: &[Step],
  env: Map<String, Value>,
  secret_env: BTreeSet<String>,
  scope: &SecretScope,
  result: &mut JobResult,
) -> Result<(), FailureReport> {
  let step_scope = StepScope {
    rt: run.rt,
    path: run.path,
    base: run.base.clone(),
    env,
    secret_env,
    secrets: &run.frame.secrets,
    secret_scope: scope,
    retry: run.frame.retry,
    depth: run.frame.depth,
    cancel: &run.cancel,
  };
  let outcome = run_steps(&step_scope, steps).await;
  let failed = outcome.any_failure();
  result.steps = outcome.results;

  if failed {
    result.status = Status::Failure;
    return Ok(());
  }

  let ctx = run
    .base
    .clone()
    .with_scope(scopes::ENV, Value::Object(step_scope.env.clone()))
    .with_scope(scopes::STEPS, Value::Object(outcome.steps));
  for (name, template) in &run.job.outputs {
    let output_path = format!("{}/outputs/{}", run.path, name);
    let value = run
      .interpolate(template, ctx.clone(), scope, &output_path)
      .await?;
    result.outputs.insert(name.clone(), value);
  }
  Ok(())
}

async fn run_call_job(
  run: &JobRun<'_>,
  binding: &CallBinding,
  env: Map<String, Value>,
  environment: Option<String>,
  scope: &SecretScope,
  result: &mut JobResult,
) -> Result<(), FailureReport> {
  let rt = run.rt;
  let internal = |message: String| FailureReport::new(FailureKind::Internal, run.path, message);

  let workflow = rt
    .composition()
    .workflow(&binding.uses)
    .cloned()
    .ok_or_else(|| internal(format!("'{}' is not part of the composition", binding.uses)))?;
  if run.frame.depth >= rt.config().max_call_depth {
    return Err(internal(format!(
      "call depth exceeds {}",
      rt.config().max_call_depth
    )));
  }

  let mut paths = Vec::new();
  for template in binding.with.values().chain(binding.secrets.values()) {
    paths.extend(template_paths(template));
  }
  let ctx = run
    .with_secrets(
      run.base.clone().with_scope(scopes::ENV, Value::Object(env)),
      &paths,
      scope,
      run.path,
    )
    .await?;

  let inputs = bind_inputs(&workflow.inputs, &binding.with, &ctx, run.path)?;
  let secrets = bind_secrets(rt, &binding.secrets, &ctx, run.path)?;

  let child = WorkflowFrame {
    path: run.path.to_string(),
    retry: rt.config().default_retry.apply(&workflow.retry),
    workflow,
    inputs: Value::Object(inputs),
    github: run.frame.github.clone(),
    secrets,
    environment,
    depth: run.frame.depth + 1,
  };

  let outcome = run_workflow(rt.clone(), Arc::new(child), run.cancel.clone())
    .await
    .map_err(|e| internal(e.to_string()))?;

  result.jobs = outcome.jobs;
  result.outputs = outcome.outputs;
  if outcome.status != RunStatus::Success {
    result.status = Status::Failure;
  }
  if let Some(report) = outcome.output_errors.into_iter().next() {
    return Err(report);
  }
  Ok(())
}
