//! Workflow runtime.
//!
//! The [`Runtime`] owns a [`Composition`] and the external collaborators
//! (command runner, secret vault, notifier) and provides
//! `execute(invocation, cancel)` to run the root workflow's job graph.

use std::sync::Arc;
use std::time::Instant;

use indexmap::IndexMap;
use pipewright_secrets::{Redactor, SecretVault};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::command::CommandRunner;
use crate::composer::Composition;
use crate::config::RuntimeConfig;
use crate::error::RuntimeError;
use crate::events::{ExecutionEvent, ExecutionNotifier, NoopNotifier};
use crate::frame::{SecretSource, WorkflowFrame};
use crate::result::{RunStatus, WorkflowOutcome};
use crate::scheduler::run_workflow;

/// Values bound to the root workflow for one run.
#[derive(Debug, Clone, Default)]
pub struct Invocation {
  /// Bound input values, including defaults.
  pub inputs: Map<String, Value>,
  /// The `github` scope.
  pub github: Value,
  /// Environment selected for the run; jobs may select their own.
  pub environment: Option<String>,
}

/// The workflow runtime.
///
/// Cheap to clone; clones share the composition, collaborators and
/// redactor.
#[derive(Clone)]
pub struct Runtime {
  composition: Arc<Composition>,
  runner: Arc<dyn CommandRunner>,
  vault: Arc<dyn SecretVault>,
  notifier: Arc<dyn ExecutionNotifier>,
  redactor: Redactor,
  config: Arc<RuntimeConfig>,
  run_id: Arc<str>,
}

impl Runtime {
  pub fn new(
    composition: Composition,
    runner: Arc<dyn CommandRunner>,
    vault: Arc<dyn SecretVault>,
    config: RuntimeConfig,
  ) -> Self {
    Self {
      composition: Arc::new(composition),
      runner,
      vault,
      notifier: Arc::new(NoopNotifier),
      redactor: Redactor::new(),
      config: Arc::new(config),
      run_id: uuid::Uuid::new_v4().to_string().into(),
    }
  }

  pub fn with_notifier(mut self, notifier: Arc<dyn ExecutionNotifier>) -> Self {
    self.notifier = notifier;
    self
  }

  /// Share a redactor, e.g. one the caller uses to mask its own output.
  pub fn with_redactor(mut self, redactor: Redactor) -> Self {
    self.redactor = redactor;
    self
  }

  pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
    self.run_id = run_id.into().into();
    self
  }

  pub fn run_id(&self) -> &str {
    &self.run_id
  }

  pub fn composition(&self) -> &Composition {
    &self.composition
  }

  pub fn config(&self) -> &RuntimeConfig {
    &self.config
  }

  /// Every secret value resolved so far is registered here.
  pub fn redactor(&self) -> &Redactor {
    &self.redactor
  }

  pub(crate) fn runner(&self) -> &dyn CommandRunner {
    self.runner.as_ref()
  }

  pub(crate) fn vault(&self) -> &dyn SecretVault {
    self.vault.as_ref()
  }

  pub(crate) fn notify(&self, event: ExecutionEvent) {
    self.notifier.notify(event);
  }

  /// Execute the root workflow.
  ///
  /// Returns an error only for problems that prevent scheduling (a cyclic
  /// job graph). Job and step failures are part of the outcome.
  #[instrument(
    name = "runtime_execute",
    skip(self, invocation, cancel),
    fields(
      run_id = %self.run_id,
      workflow = %self.composition.root().name,
    )
  )]
  pub async fn execute(
    &self,
    invocation: Invocation,
    cancel: CancellationToken,
  ) -> Result<WorkflowOutcome, RuntimeError> {
    let workflow = self.composition.root().clone();
    let started = Instant::now();

    info!(
      run_id = %self.run_id,
      workflow = %workflow.name,
      environment = invocation.environment.as_deref().unwrap_or(""),
      "workflow_started"
    );
    self.notify(ExecutionEvent::RunStarted {
      run_id: self.run_id.to_string(),
      workflow: workflow.name.clone(),
    });

    let secrets: IndexMap<String, SecretSource> = workflow
      .secrets
      .iter()
      .map(|(name, decl)| {
        let source = SecretSource::Vault {
          name: name.clone(),
          required: decl.required,
        };
        (name.clone(), source)
      })
      .collect();

    let frame = WorkflowFrame {
      path: String::new(),
      retry: self.config.default_retry.apply(&workflow.retry),
      workflow,
      inputs: Value::Object(invocation.inputs),
      github: invocation.github,
      secrets: Arc::new(secrets),
      environment: invocation.environment,
      depth: 0,
    };

    let outcome = run_workflow(self.clone(), Arc::new(frame), cancel).await?;
    let duration_ms = started.elapsed().as_millis() as u64;

    match outcome.status {
      RunStatus::Success => info!(run_id = %self.run_id, duration_ms, "workflow_completed"),
      RunStatus::Failure => warn!(run_id = %self.run_id, duration_ms, "workflow_failed"),
      RunStatus::Cancelled => warn!(run_id = %self.run_id, duration_ms, "workflow_cancelled"),
    }
    self.notify(ExecutionEvent::RunCompleted {
      run_id: self.run_id.to_string(),
      status: outcome.status,
    });

    Ok(outcome)
  }
}
