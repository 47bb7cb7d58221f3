//! Step executor.
//!
//! Steps of a job (or of a composite action) run sequentially. Each step
//! gets a context built from the owner's scopes plus the `steps` results so
//! far and only the secrets its templates reference.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Instant;

use futures::FutureExt;
use futures::future::BoxFuture;
use pipewright_expr::{
  CheckStatus, Context, ExpressionError, Path, evaluate_condition, interpolate, scopes,
};
use pipewright_secrets::SecretScope;
use pipewright_workflow::{CallBinding, Command, RetryPolicy, Step, StepAction};
use serde_json::{Map, Value, json};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::command::{CommandRequest, parse_directives};
use crate::error::CommandError;
use crate::events::ExecutionEvent;
use crate::frame::{
  SecretBindings, bind_inputs, bind_secrets, condition_paths, derives_from_secret, env_strings,
  join_path, resolve_secrets, template_paths,
};
use crate::result::{FailureKind, FailureReport, Status, StepResult};
use crate::runtime::Runtime;

/// Scopes shared by every step of one job or action invocation.
pub(crate) struct StepScope<'a> {
  pub rt: &'a Runtime,
  /// Location of the owning job or action-calling step.
  pub path: &'a str,
  /// `inputs`, `github` and, for job steps, `needs`.
  pub base: Context,
  pub env: Map<String, Value>,
  /// Keys of `env` whose values derive from secrets. They stay out of
  /// nested actions.
  pub secret_env: BTreeSet<String>,
  pub secrets: &'a SecretBindings,
  pub secret_scope: &'a SecretScope,
  pub retry: RetryPolicy,
  pub depth: usize,
  pub cancel: &'a CancellationToken,
}

#[derive(Debug, Default)]
pub(crate) struct StepsOutcome {
  pub results: Vec<StepResult>,
  /// The `steps` scope: `{id: {outcome, conclusion, outputs}}`.
  pub steps: Map<String, Value>,
  pub blocking_failure: bool,
}

impl StepsOutcome {
  /// Whether any step failed, including tolerated failures.
  pub fn any_failure(&self) -> bool {
    self.results.iter().any(|r| r.status == Status::Failure)
  }
}

/// Run steps in order. After a blocking failure the remaining steps only
/// run when their condition calls a status function such as `always()`.
pub(crate) fn run_steps<'a>(scope: &'a StepScope<'a>, steps: &'a [Step]) -> BoxFuture<'a, StepsOutcome> {
  async move {
    let mut outcome = StepsOutcome::default();
    for step in steps {
      let result = run_step(scope, step, &outcome.steps, outcome.blocking_failure).await;
      if let Some(id) = &step.id {
        outcome.steps.insert(id.clone(), steps_entry(&result));
      }
      if result.is_blocking_failure() {
        outcome.blocking_failure = true;
      }
      outcome.results.push(result);
    }
    outcome
  }
  .boxed()
}

fn steps_entry(result: &StepResult) -> Value {
  json!({
    "outcome": result.status.as_str(),
    "conclusion": result.conclusion().as_str(),
    "outputs": result.outputs,
  })
}

/// Every context path a step's templates reference.
fn step_paths(step: &Step) -> Vec<Path> {
  let mut paths = step
    .condition
    .as_deref()
    .map(condition_paths)
    .unwrap_or_default();
  for template in step.env.values() {
    paths.extend(template_paths(template));
  }
  match &step.action {
    StepAction::Command(command) => {
      paths.extend(template_paths(&command.run));
      if let Some(dir) = &command.working_directory {
        paths.extend(template_paths(dir));
      }
    }
    StepAction::Call(call) => {
      for template in call.with.values().chain(call.secrets.values()) {
        paths.extend(template_paths(template));
      }
    }
  }
  paths
}

fn fail(result: &mut StepResult, report: FailureReport) {
  result.status = Status::Failure;
  result.error = Some(report);
}

async fn run_step(
  scope: &StepScope<'_>,
  step: &Step,
  steps: &Map<String, Value>,
  blocking_failure: bool,
) -> StepResult {
  let path = join_path(scope.path, &step.index.to_string());
  let started = Instant::now();
  let mut result = StepResult {
    continue_on_error: step.continue_on_error,
    ..StepResult::skipped(step.index, step.id.clone(), step.label())
  };

  execute_step(scope, step, steps, blocking_failure, &path, &mut result).await;

  result.duration_ms = started.elapsed().as_millis() as u64;
  match result.status {
    Status::Failure => {
      let error = result
        .error
        .as_ref()
        .map(|e| scope.rt.redactor().redact(&e.message))
        .unwrap_or_default();
      warn!(
        run_id = %scope.rt.run_id(),
        step_path = %path,
        attempts = result.attempts,
        error = %error,
        "step_failed"
      )
    }
    Status::Success => info!(
      run_id = %scope.rt.run_id(),
      step_path = %path,
      duration_ms = result.duration_ms,
      "step_completed"
    ),
    Status::Skipped => debug!(step_path = %path, "step_skipped"),
  }
  scope.rt.notify(ExecutionEvent::StepCompleted {
    run_id: scope.rt.run_id().to_string(),
    step_path: path,
    status: result.status,
    attempts: result.attempts,
  });
  result
}

async fn execute_step(
  scope: &StepScope<'_>,
  step: &Step,
  steps: &Map<String, Value>,
  blocking_failure: bool,
  path: &str,
  result: &mut StepResult,
) {
  let rt = scope.rt;
  if scope.cancel.is_cancelled() {
    return;
  }

  let status = CheckStatus {
    failed: blocking_failure,
    ..CheckStatus::default()
  };
  let mut ctx = scope
    .base
    .clone()
    .with_scope(scopes::ENV, Value::Object(scope.env.clone()))
    .with_scope(scopes::STEPS, Value::Object(steps.clone()))
    .with_status(status);

  let paths = step_paths(step);
  match resolve_secrets(rt, scope.secrets, &paths, scope.secret_scope, path).await {
    Ok(secrets) => ctx = ctx.with_scope(scopes::SECRETS, secrets),
    Err(report) => {
      fail(result, report.with_context(ctx.redacted_snapshot()));
      return;
    }
  }

  let should_run = match &step.condition {
    Some(condition) => match evaluate_condition(condition, &ctx) {
      Ok(should_run) => should_run,
      Err(e) => {
        fail(result, FailureReport::expression(path, &e).with_context(ctx.redacted_snapshot()));
        return;
      }
    },
    None => status.is_success(),
  };
  if !should_run {
    return;
  }

  rt.notify(ExecutionEvent::StepStarted {
    run_id: rt.run_id().to_string(),
    step_path: path.to_string(),
    name: result.name.clone(),
  });
  debug!(run_id = %rt.run_id(), step_path = %path, name = %result.name, "step_started");

  let mut env = scope.env.clone();
  let mut secret_env = scope.secret_env.clone();
  for (key, template) in &step.env {
    match interpolate(template, &ctx) {
      Ok(value) => {
        if derives_from_secret(template, &secret_env) {
          secret_env.insert(key.clone());
        } else {
          secret_env.remove(key);
        }
        env.insert(key.clone(), Value::String(value));
        ctx = ctx.with_scope(scopes::ENV, Value::Object(env.clone()));
      }
      Err(e) => {
        fail(result, FailureReport::expression(path, &e).with_context(ctx.redacted_snapshot()));
        return;
      }
    }
  }

  match &step.action {
    StepAction::Command(command) => run_command(scope, step, command, &ctx, &env, path, result).await,
    StepAction::Call(binding) => {
      env.retain(|key, _| !secret_env.contains(key));
      run_action(scope, binding, &ctx, &env, path, result).await
    }
  }
}

async fn run_command(
  scope: &StepScope<'_>,
  step: &Step,
  command: &Command,
  ctx: &Context,
  env: &Map<String, Value>,
  path: &str,
  result: &mut StepResult,
) {
  let rt = scope.rt;
  let expression_failure = |e: ExpressionError| {
    FailureReport::expression(path, &e).with_context(ctx.redacted_snapshot())
  };

  let script = match interpolate(&command.run, ctx) {
    Ok(script) => script,
    Err(e) => return fail(result, expression_failure(e)),
  };
  let working_dir = match command.working_directory.as_deref().map(|dir| interpolate(dir, ctx)) {
    Some(Ok(dir)) => Some(PathBuf::from(dir)),
    Some(Err(e)) => return fail(result, expression_failure(e)),
    None => None,
  };

  let request = CommandRequest {
    command: script,
    shell: command
      .shell
      .clone()
      .unwrap_or_else(|| rt.config().shell.clone()),
    env: env_strings(env),
    working_dir,
  };
  let policy = scope.retry.apply(&step.retry);
  let cancelled = || FailureReport::new(FailureKind::Cancelled, path, "step cancelled");

  for attempt in 1..=policy.max_attempts {
    result.attempts = attempt;
    let run = rt.runner().run(request.clone(), scope.cancel.clone());
    let outcome = match step.timeout {
      Some(limit) => tokio::time::timeout(limit, run).await,
      None => Ok(run.await),
    };

    let failure = match outcome {
      Ok(Ok(output)) => {
        let directives = parse_directives(&output.stdout_tail);
        for mask in &directives.masks {
          rt.redactor().add(mask);
        }
        result.log = match (directives.log.is_empty(), output.stderr_tail.is_empty()) {
          (_, true) => directives.log,
          (true, false) => output.stderr_tail.clone(),
          (false, false) => format!("{}\n{}", directives.log, output.stderr_tail),
        };
        if output.success() {
          result.status = Status::Success;
          result.outputs = directives.outputs.into_iter().collect();
          result.error = None;
          return;
        }
        FailureReport::new(
          FailureKind::StepExecutionFailure,
          path,
          format!("command exited with code {}", output.exit_code),
        )
      }
      Ok(Err(CommandError::Cancelled)) => return fail(result, cancelled()),
      Ok(Err(e)) => FailureReport::new(FailureKind::StepExecutionFailure, path, e.to_string()),
      Err(_) => FailureReport::new(
        FailureKind::Timeout,
        path,
        format!(
          "step timed out after {}ms",
          step.timeout.map(|t| t.as_millis()).unwrap_or_default()
        ),
      ),
    };

    if attempt == policy.max_attempts {
      return fail(result, failure.with_context(ctx.redacted_snapshot()));
    }

    let delay = policy.delay_for(attempt);
    warn!(
      run_id = %rt.run_id(),
      step_path = %path,
      attempt,
      max_attempts = policy.max_attempts,
      delay_ms = delay.as_millis() as u64,
      error = %failure.message,
      "step_retry"
    );
    tokio::select! {
      _ = tokio::time::sleep(delay) => {}
      _ = scope.cancel.cancelled() => return fail(result, cancelled()),
    }
  }
}

async fn run_action(
  scope: &StepScope<'_>,
  binding: &CallBinding,
  ctx: &Context,
  env: &Map<String, Value>,
  path: &str,
  result: &mut StepResult,
) {
  let rt = scope.rt;
  result.attempts = 1;

  let Some(action) = rt.composition().action(&binding.uses).cloned() else {
    return fail(
      result,
      FailureReport::new(
        FailureKind::Internal,
        path,
        format!("'{}' is not part of the composition", binding.uses),
      ),
    );
  };
  if scope.depth >= rt.config().max_call_depth {
    return fail(
      result,
      FailureReport::new(
        FailureKind::Internal,
        path,
        format!("call depth exceeds {}", rt.config().max_call_depth),
      ),
    );
  }

  let inputs = match bind_inputs(&action.inputs, &binding.with, ctx, path) {
    Ok(inputs) => inputs,
    Err(report) => return fail(result, report),
  };
  let secrets = match bind_secrets(rt, &binding.secrets, ctx, path) {
    Ok(secrets) => secrets,
    Err(report) => return fail(result, report),
  };

  let github = ctx.scope(scopes::GITHUB).cloned().unwrap_or(Value::Null);
  let child = StepScope {
    rt,
    path,
    base: Context::new()
      .with_scope(scopes::INPUTS, Value::Object(inputs))
      .with_scope(scopes::GITHUB, github),
    env: env.clone(),
    secret_env: BTreeSet::new(),
    secrets: &secrets,
    secret_scope: scope.secret_scope,
    retry: scope.retry,
    depth: scope.depth + 1,
    cancel: scope.cancel,
  };

  debug!(step_path = %path, action = %action.name, "action_started");
  let outcome = run_steps(&child, &action.steps).await;

  if outcome.blocking_failure {
    result.status = Status::Failure;
  } else {
    result.status = Status::Success;
    let ctx = child
      .base
      .clone()
      .with_scope(scopes::ENV, Value::Object(child.env.clone()))
      .with_scope(scopes::STEPS, Value::Object(outcome.steps.clone()));

    for (name, decl) in &action.outputs {
      let output_path = format!("{}/outputs/{}", path, name);
      let evaluated = match resolve_secrets(
        rt,
        &secrets,
        &template_paths(&decl.value),
        scope.secret_scope,
        &output_path,
      )
      .await
      {
        Ok(resolved) => {
          let ctx = ctx.clone().with_scope(scopes::SECRETS, resolved);
          interpolate(&decl.value, &ctx)
            .map_err(|e| FailureReport::expression(&output_path, &e).with_context(ctx.redacted_snapshot()))
        }
        Err(report) => Err(report),
      };
      match evaluated {
        Ok(value) => {
          result.outputs.insert(name.clone(), value);
        }
        Err(report) => {
          fail(result, report);
          break;
        }
      }
    }
  }
  result.steps = outcome.results;
}
