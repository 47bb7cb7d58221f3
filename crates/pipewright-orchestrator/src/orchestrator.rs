use std::sync::Arc;

use chrono::Utc;
use indexmap::IndexMap;
use pipewright_config::{InputDecl, WorkflowDef, scalar_to_string};
use pipewright_registry::Registry;
use pipewright_runtime::{
  CommandRunner, Composer, Composition, ExecutionNotifier, Invocation, NoopNotifier, RunResult,
  Runtime, RuntimeConfig, collect_errors,
};
use pipewright_secrets::{SecretError, SecretScope, SecretVault};
use pipewright_workflow::Workflow;
use serde_json::{Map, Value, json};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::error::RunError;
use crate::trigger::TriggerEvent;

/// Runs workflows against a registry, a vault and a command runner.
pub struct Orchestrator {
  registry: Arc<dyn Registry>,
  vault: Arc<dyn SecretVault>,
  runner: Arc<dyn CommandRunner>,
  notifier: Arc<dyn ExecutionNotifier>,
  config: RuntimeConfig,
}

impl Orchestrator {
  pub fn new(
    registry: Arc<dyn Registry>,
    vault: Arc<dyn SecretVault>,
    runner: Arc<dyn CommandRunner>,
    config: RuntimeConfig,
  ) -> Self {
    Self {
      registry,
      vault,
      runner,
      notifier: Arc::new(NoopNotifier),
      config,
    }
  }

  pub fn with_notifier(mut self, notifier: Arc<dyn ExecutionNotifier>) -> Self {
    self.notifier = notifier;
    self
  }

  pub fn config(&self) -> &RuntimeConfig {
    &self.config
  }

  /// Lock a definition and compose every workflow and action it calls.
  ///
  /// Performs every pre-run check that does not depend on a trigger.
  pub async fn validate(&self, def: WorkflowDef) -> Result<Composition, RunError> {
    let workflow = Workflow::lock(def)?;
    let composition = Composer::new(self.registry.as_ref())
      .with_max_depth(self.config.max_call_depth)
      .compose(workflow)
      .await?;
    Ok(composition)
  }

  /// Run a workflow for one trigger event.
  ///
  /// Pre-run problems (invalid definitions, unresolvable `uses`, an event
  /// the workflow does not handle, missing inputs or secrets) are returned
  /// as errors before any job starts. Everything that happens once jobs run
  /// is part of the returned result, which is already redacted.
  #[instrument(
    name = "orchestrator_run",
    skip(self, def, trigger, cancel),
    fields(workflow = %def.name, event = %trigger.event_type)
  )]
  pub async fn run(
    &self,
    def: WorkflowDef,
    trigger: TriggerEvent,
    environment: Option<String>,
    cancel: CancellationToken,
  ) -> Result<RunResult, RunError> {
    let composition = self.validate(def).await?;
    let workflow = composition.root().clone();
    if !workflow.accepts_event(&trigger.event_type) {
      return Err(RunError::EventNotHandled {
        workflow: workflow.name.clone(),
        event: trigger.event_type.clone(),
      });
    }

    let inputs = bind_root_inputs(&workflow.inputs, &trigger.payload)?;

    let runtime = Runtime::new(
      composition,
      self.runner.clone(),
      self.vault.clone(),
      self.config.clone(),
    )
    .with_notifier(self.notifier.clone());
    self.check_root_secrets(&runtime, &workflow, environment.as_deref()).await?;

    let run_id = runtime.run_id().to_string();
    let github = json!({
      "event_name": trigger.event_type,
      "ref": trigger.git_ref,
      "ref_name": trigger.ref_name(),
      "event": trigger.payload,
      "run_id": run_id,
      "workflow": workflow.name,
      "environment": environment,
    });

    info!(run_id = %run_id, workflow = %workflow.name, "run_accepted");
    let started_at = Utc::now();
    let outcome = runtime
      .execute(
        Invocation {
          inputs,
          github,
          environment: environment.clone(),
        },
        cancel,
      )
      .await?;
    let finished_at = Utc::now();

    let mut errors = collect_errors(outcome.jobs.values());
    errors.extend(outcome.output_errors);

    let result = RunResult {
      run_id,
      workflow: workflow.name.clone(),
      event: trigger.event_type,
      environment,
      status: outcome.status,
      started_at,
      finished_at,
      duration_ms: (finished_at - started_at).num_milliseconds().max(0) as u64,
      outputs: outcome.outputs,
      jobs: outcome.jobs,
      errors,
    };
    Ok(result.redacted(runtime.redactor()))
  }

  /// Every required root secret must exist for the run's environment.
  async fn check_root_secrets(
    &self,
    runtime: &Runtime,
    workflow: &Workflow,
    environment: Option<&str>,
  ) -> Result<(), RunError> {
    let scope = SecretScope::new("", environment.map(str::to_string));
    for name in workflow
      .secrets
      .iter()
      .filter(|(_, decl)| decl.required)
      .map(|(name, _)| name)
    {
      match self.vault.resolve(name, &scope).await {
        Ok(value) => runtime.redactor().add(value.expose()),
        Err(SecretError::NotFound { .. }) => {
          warn!(secret = %name, "required secret missing");
          return Err(RunError::MissingSecret { name: name.clone() });
        }
        Err(e) => return Err(e.into()),
      }
    }
    Ok(())
  }
}

/// Bind root inputs from `payload.inputs`, applying declared defaults.
///
/// Names match case-insensitively. Required inputs without a value or a
/// default are rejected, as are payload inputs the workflow does not
/// declare. Optional inputs without either stay unbound.
pub fn bind_root_inputs(
  declared: &IndexMap<String, InputDecl>,
  payload: &Value,
) -> Result<Map<String, Value>, RunError> {
  let provided = match payload.get("inputs") {
    Some(Value::Object(map)) => map.clone(),
    _ => Map::new(),
  };

  for name in provided.keys() {
    if !declared.keys().any(|d| d.eq_ignore_ascii_case(name)) {
      return Err(RunError::UnknownInput { name: name.clone() });
    }
  }

  let mut bound = Map::new();
  for (name, decl) in declared {
    let value = provided
      .iter()
      .find(|(key, _)| key.eq_ignore_ascii_case(name))
      .map(|(_, value)| value);

    let value = match value {
      Some(value) => {
        scalar_to_string(value).ok_or_else(|| RunError::InvalidInput { name: name.clone() })?
      }
      None => match &decl.default {
        Some(default) => default.clone(),
        None if decl.required => {
          return Err(RunError::MissingRequiredInput { name: name.clone() });
        }
        None => continue,
      },
    };
    bound.insert(name.clone(), Value::String(value));
  }
  Ok(bound)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn declared() -> IndexMap<String, InputDecl> {
    let mut inputs = IndexMap::new();
    inputs.insert(
      "target".to_string(),
      InputDecl {
        required: true,
        ..Default::default()
      },
    );
    inputs.insert(
      "replicas".to_string(),
      InputDecl {
        default: Some("2".to_string()),
        ..Default::default()
      },
    );
    inputs.insert("note".to_string(), InputDecl::default());
    inputs
  }

  #[test]
  fn test_bind_payload_and_defaults() {
    let bound = bind_root_inputs(&declared(), &json!({"inputs": {"TARGET": "prod"}})).unwrap();
    assert_eq!(bound["target"], "prod");
    assert_eq!(bound["replicas"], "2");
    assert!(!bound.contains_key("note"));
  }

  #[test]
  fn test_scalars_become_strings() {
    let payload = json!({"inputs": {"target": "prod", "replicas": 5, "note": true}});
    let bound = bind_root_inputs(&declared(), &payload).unwrap();
    assert_eq!(bound["replicas"], "5");
    assert_eq!(bound["note"], "true");
  }

  #[test]
  fn test_missing_required_input() {
    let result = bind_root_inputs(&declared(), &json!({}));
    assert!(matches!(result, Err(RunError::MissingRequiredInput { name }) if name == "target"));
  }

  #[test]
  fn test_unknown_and_invalid_inputs() {
    let unknown = bind_root_inputs(&declared(), &json!({"inputs": {"target": "x", "extra": 1}}));
    assert!(matches!(unknown, Err(RunError::UnknownInput { name }) if name == "extra"));

    let invalid = bind_root_inputs(&declared(), &json!({"inputs": {"target": ["a"]}}));
    assert!(matches!(invalid, Err(RunError::InvalidInput { name }) if name == "target"));
  }
}
