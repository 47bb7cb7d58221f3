use std::time::Duration;

use indexmap::IndexMap;
use pipewright_config::{InputValue, StepDef, UsesRef};
use serde::{Deserialize, Serialize};

use crate::error::WorkflowError;
use crate::references::{Rules, check_condition, check_template, is_identifier};
use crate::retry::RetrySettings;

/// A locked step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
  /// Position within the owning job or action.
  pub index: usize,
  pub id: Option<String>,
  pub name: Option<String>,
  pub condition: Option<String>,
  pub action: StepAction,
  pub env: IndexMap<String, InputValue>,
  pub continue_on_error: bool,
  /// Overrides layered over the workflow's retry policy.
  pub retry: RetrySettings,
  pub timeout: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StepAction {
  Command(Command),
  Call(CallBinding),
}

/// A shell command. `run` is a template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
  pub run: String,
  pub shell: Option<String>,
  pub working_directory: Option<String>,
}

/// A `uses:` call with its explicit input and secret bindings.
///
/// Used both for step slots (composite actions) and job slots (reusable
/// workflows). Binding values are templates evaluated in the caller's
/// context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallBinding {
  pub uses: UsesRef,
  pub with: IndexMap<String, InputValue>,
  pub secrets: IndexMap<String, InputValue>,
}

impl Step {
  /// Display label: the name, else the id, else the command's first line or
  /// the called reference.
  pub fn label(&self) -> String {
    if let Some(name) = self.name.as_ref().or(self.id.as_ref()) {
      return name.clone();
    }
    match &self.action {
      StepAction::Command(command) => command.run.lines().next().unwrap_or_default().to_string(),
      StepAction::Call(call) => call.uses.to_string(),
    }
  }

  pub fn is_call(&self) -> bool {
    matches!(self.action, StepAction::Call(_))
  }
}

/// Lock an ordered list of step definitions.
///
/// `prefix` is the location of the owner (a job id or action name); step
/// paths are `prefix/index`. A step may only reference `steps.<id>` of steps
/// declared before it.
pub(crate) fn lock_steps(
  prefix: &str,
  defs: Vec<StepDef>,
  rules: Rules<'_>,
) -> Result<Vec<Step>, WorkflowError> {
  let mut seen_ids: Vec<String> = Vec::new();
  let mut steps = Vec::with_capacity(defs.len());

  for (index, def) in defs.into_iter().enumerate() {
    let path = format!("{}/{}", prefix, index);
    let invalid = |message: &str| WorkflowError::InvalidStep {
      path: path.clone(),
      message: message.to_string(),
    };

    if let Some(id) = &def.id {
      if !is_identifier(id) {
        return Err(WorkflowError::InvalidIdentifier {
          kind: "step",
          id: id.clone(),
        });
      }
      if seen_ids.iter().any(|seen| seen.eq_ignore_ascii_case(id)) {
        return Err(WorkflowError::DuplicateStepId {
          path: prefix.to_string(),
          id: id.clone(),
        });
      }
    }

    let step_rules = Rules {
      steps: &seen_ids,
      ..rules
    };

    if let Some(condition) = &def.condition {
      check_condition(&path, condition, &step_rules)?;
    }
    for value in def.env.values() {
      check_template(&path, value, &step_rules)?;
    }

    let action = match (def.run, def.uses) {
      (Some(run), None) => {
        if !def.with.is_empty() || !def.secrets.is_empty() {
          return Err(invalid("'with' and 'secrets' require 'uses'"));
        }
        check_template(&path, &run, &step_rules)?;
        if let Some(dir) = &def.working_directory {
          check_template(&path, dir, &step_rules)?;
        }
        StepAction::Command(Command {
          run,
          shell: def.shell,
          working_directory: def.working_directory,
        })
      }
      (None, Some(uses)) => {
        if def.shell.is_some() || def.working_directory.is_some() {
          return Err(invalid("'shell' and 'working-directory' require 'run'"));
        }
        for value in def.with.values().chain(def.secrets.values()) {
          check_template(&path, value, &step_rules)?;
        }
        StepAction::Call(CallBinding {
          uses,
          with: def.with,
          secrets: def.secrets,
        })
      }
      (Some(_), Some(_)) => return Err(invalid("a step cannot have both 'run' and 'uses'")),
      (None, None) => return Err(invalid("a step needs either 'run' or 'uses'")),
    };

    let retry = RetrySettings {
      max_attempts: def.max_retry_attempts,
      backoff: def.retry_backoff,
      initial_delay_ms: def.retry_initial_delay_ms,
    };
    if matches!(action, StepAction::Call(_)) && retry != RetrySettings::default() {
      return Err(invalid("retry settings only apply to 'run' steps"));
    }

    if let Some(id) = &def.id {
      seen_ids.push(id.clone());
    }

    steps.push(Step {
      index,
      id: def.id,
      name: def.name,
      condition: def.condition,
      action,
      env: def.env,
      continue_on_error: def.continue_on_error,
      retry,
      timeout: def.timeout_ms.map(Duration::from_millis),
    });
  }

  Ok(steps)
}
