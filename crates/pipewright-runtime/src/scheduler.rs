//! Job scheduler.
//!
//! Walks a workflow's `needs` graph: a job starts as soon as every job it
//! needs is terminal, independent jobs run concurrently as tokio tasks up
//! to `max_parallel_jobs`, and the scheduler alone writes the result map.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use indexmap::IndexMap;
use pipewright_expr::{Context, interpolate, scopes};
use serde_json::{Map, Value, json};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::RuntimeError;
use crate::events::ExecutionEvent;
use crate::frame::WorkflowFrame;
use crate::job::{NeedResult, run_job};
use crate::result::{FailureKind, FailureReport, JobResult, RunStatus, WorkflowOutcome};
use crate::runtime::Runtime;

/// Run every job of `frame.workflow` and evaluate the workflow outputs.
///
/// Boxed so call jobs can run nested workflows through the same scheduler.
pub(crate) fn run_workflow(
  rt: Runtime,
  frame: Arc<WorkflowFrame>,
  cancel: CancellationToken,
) -> BoxFuture<'static, Result<WorkflowOutcome, RuntimeError>> {
  async move {
    let workflow = frame.workflow.clone();
    let mut pending = workflow.graph().topological_order()?;
    let max_parallel = rt.config().max_parallel_jobs.max(1);

    let mut results: HashMap<String, JobResult> = HashMap::new();
    let mut running: JoinSet<(String, JobResult)> = JoinSet::new();

    loop {
      if cancel.is_cancelled() {
        for job_id in pending.drain(..) {
          let job = &workflow.jobs[&job_id];
          let path = frame.child_path(&job_id);
          debug!(job_path = %path, "job_skipped (cancelled)");
          rt.notify(ExecutionEvent::JobSkipped {
            run_id: rt.run_id().to_string(),
            job_path: path,
            reason: "run cancelled".to_string(),
          });
          let skipped = JobResult::skipped(&job_id, &job.name, job.is_required(), "run cancelled".to_string());
          results.insert(job_id, skipped);
        }
      } else {
        let mut index = 0;
        while index < pending.len() && running.len() < max_parallel {
          let job = &workflow.jobs[&pending[index]];
          if !job.needs.iter().all(|need| results.contains_key(need)) {
            index += 1;
            continue;
          }

          let job_id = pending.remove(index);
          let needs: IndexMap<String, NeedResult> = job
            .needs
            .iter()
            .filter_map(|need| results.get(need).map(|r| (need.clone(), NeedResult::of(r))))
            .collect();
          let (name, required) = (job.name.clone(), job.is_required());

          let task = run_job(rt.clone(), frame.clone(), job_id.clone(), needs, cancel.clone());
          let path = frame.child_path(&job_id);
          running.spawn(async move {
            let result = AssertUnwindSafe(task).catch_unwind().await.unwrap_or_else(|_| {
              let report = FailureReport::new(FailureKind::Internal, path, "job task panicked");
              JobResult::failed(&job_id, &name, required, report)
            });
            (job_id, result)
          });
        }
      }

      if running.is_empty() {
        if pending.is_empty() {
          break;
        }
        return Err(RuntimeError::Stalled { pending });
      }

      tokio::select! {
        joined = running.join_next() => match joined {
          Some(Ok((job_id, result))) => {
            results.insert(job_id, result);
          }
          Some(Err(e)) => {
            return Err(RuntimeError::JobTask { message: e.to_string() });
          }
          None => {}
        },
        // Wake up to skip unstarted jobs; running jobs observe the token
        _ = cancel.cancelled(), if !cancel.is_cancelled() => {}
      }
    }

    // Declaration order, independent of completion order
    let jobs: IndexMap<String, JobResult> = workflow
      .jobs
      .keys()
      .filter_map(|id| results.remove(id).map(|r| (id.clone(), r)))
      .collect();

    let status = if cancel.is_cancelled() {
      RunStatus::Cancelled
    } else if jobs.values().any(JobResult::is_required_failure) {
      RunStatus::Failure
    } else {
      RunStatus::Success
    };

    // Outputs of a failed or cancelled run are not evaluated
    let (outputs, output_errors) = match status {
      RunStatus::Success => evaluate_outputs(&frame, &jobs),
      _ => (IndexMap::new(), Vec::new()),
    };
    let status = if output_errors.is_empty() {
      status
    } else {
      RunStatus::Failure
    };

    info!(
      run_id = %rt.run_id(),
      workflow = %workflow.name,
      path = %frame.path,
      status = ?status,
      "jobs_finished"
    );

    Ok(WorkflowOutcome {
      status,
      outputs,
      jobs,
      output_errors,
    })
  }
  .boxed()
}

/// Evaluate the workflow's declared outputs over the `jobs` scope.
fn evaluate_outputs(
  frame: &WorkflowFrame,
  jobs: &IndexMap<String, JobResult>,
) -> (IndexMap<String, String>, Vec<FailureReport>) {
  let jobs_scope: Map<String, Value> = jobs
    .iter()
    .map(|(id, result)| {
      let entry = json!({ "result": result.status.as_str(), "outputs": result.outputs });
      (id.clone(), entry)
    })
    .collect();
  let ctx = Context::new()
    .with_scope(scopes::INPUTS, frame.inputs.clone())
    .with_scope(scopes::GITHUB, frame.github.clone())
    .with_scope(scopes::JOBS, Value::Object(jobs_scope));

  let mut outputs = IndexMap::new();
  let mut errors = Vec::new();
  for (name, decl) in &frame.workflow.outputs {
    match interpolate(&decl.value, &ctx) {
      Ok(value) => {
        outputs.insert(name.clone(), value);
      }
      Err(e) => {
        let path = frame.child_path(&format!("outputs/{}", name));
        errors.push(FailureReport::expression(path, &e).with_context(ctx.redacted_snapshot()));
      }
    }
  }
  (outputs, errors)
}
