use std::time::Duration;

use indexmap::IndexMap;
use pipewright_config::{InputValue, JobDef};
use serde::{Deserialize, Serialize};

use crate::error::WorkflowError;
use crate::references::{Rules, check_condition, check_template};
use crate::step::{CallBinding, Step, lock_steps};

/// A locked job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
  pub id: String,
  pub name: String,
  pub needs: Vec<String>,
  pub condition: Option<String>,
  /// Environment selector template; selects environment-scoped secrets.
  pub environment: Option<String>,
  pub env: IndexMap<String, InputValue>,
  /// Output templates, evaluated against the job's steps once it succeeds.
  pub outputs: IndexMap<String, InputValue>,
  pub kind: JobKind,
  /// A failing job with this flag is not required for the run to succeed.
  pub continue_on_error: bool,
  pub timeout: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JobKind {
  Steps(Vec<Step>),
  /// Calls a reusable workflow; outputs come from the callee.
  Call(CallBinding),
}

impl Job {
  pub fn is_required(&self) -> bool {
    !self.continue_on_error
  }

  pub(crate) fn lock(id: String, def: JobDef, rules: Rules<'_>) -> Result<Self, WorkflowError> {
    let invalid = |message: &str| WorkflowError::InvalidJob {
      job: id.clone(),
      message: message.to_string(),
    };

    let rules = Rules {
      needs: &def.needs,
      ..rules
    };

    if let Some(condition) = &def.condition {
      check_condition(&id, condition, &rules)?;
    }
    if let Some(environment) = &def.environment {
      check_template(&id, environment, &rules)?;
    }

    let kind = match def.uses {
      Some(uses) => {
        if !def.steps.is_empty() {
          return Err(invalid("a job cannot have both 'uses' and 'steps'"));
        }
        if !def.outputs.is_empty() || !def.env.is_empty() {
          return Err(invalid(
            "a job calling a workflow cannot declare 'outputs' or 'env'",
          ));
        }
        for value in def.with.values().chain(def.secrets.values()) {
          check_template(&id, value, &rules)?;
        }
        JobKind::Call(CallBinding {
          uses,
          with: def.with,
          secrets: def.secrets,
        })
      }
      None => {
        if def.steps.is_empty() {
          return Err(invalid("a job needs either 'steps' or 'uses'"));
        }
        if !def.with.is_empty() || !def.secrets.is_empty() {
          return Err(invalid("'with' and 'secrets' require 'uses'"));
        }
        for value in def.env.values() {
          check_template(&id, value, &rules)?;
        }
        let steps = lock_steps(&id, def.steps, rules)?;

        let step_ids: Vec<String> = steps.iter().filter_map(|s| s.id.clone()).collect();
        let output_rules = Rules {
          steps: &step_ids,
          ..rules
        };
        for value in def.outputs.values() {
          check_template(&id, value, &output_rules)?;
        }
        JobKind::Steps(steps)
      }
    };

    Ok(Self {
      name: def.name.unwrap_or_else(|| id.clone()),
      id,
      needs: def.needs,
      condition: def.condition,
      environment: def.environment,
      env: def.env,
      outputs: def.outputs,
      kind,
      continue_on_error: def.continue_on_error,
      timeout: def.timeout_ms.map(Duration::from_millis),
    })
  }
}
