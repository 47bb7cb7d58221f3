use indexmap::IndexMap;
use pipewright_config::{ActionDef, InputDecl, OutputDecl, SecretDecl};
use pipewright_expr::scopes;
use serde::{Deserialize, Serialize};

use crate::error::WorkflowError;
use crate::references::{Rules, check_template};
use crate::step::{Step, lock_steps};

/// Scopes visible inside a composite action. `needs` and `jobs` belong to
/// the caller's workflow and are not.
const ACTION_ROOTS: &[&str] = &[
  scopes::INPUTS,
  scopes::SECRETS,
  scopes::ENV,
  scopes::STEPS,
  scopes::GITHUB,
];

/// A locked composite action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
  pub name: String,
  pub description: Option<String>,
  pub inputs: IndexMap<String, InputDecl>,
  pub secrets: IndexMap<String, SecretDecl>,
  pub outputs: IndexMap<String, OutputDecl>,
  pub steps: Vec<Step>,
}

impl Action {
  /// Validate an action definition. Step paths are prefixed with the action
  /// name.
  pub fn lock(def: ActionDef) -> Result<Self, WorkflowError> {
    if def.steps.is_empty() {
      return Err(WorkflowError::InvalidStep {
        path: def.name,
        message: "a composite action needs at least one step".to_string(),
      });
    }

    let rules = Rules {
      roots: ACTION_ROOTS,
      inputs: &def.inputs,
      secrets: &def.secrets,
      needs: &[],
      steps: &[],
      jobs: &[],
    };
    let steps = lock_steps(&def.name, def.steps, rules)?;

    let step_ids: Vec<String> = steps.iter().filter_map(|s| s.id.clone()).collect();
    let output_rules = Rules {
      steps: &step_ids,
      ..rules
    };
    for (name, output) in &def.outputs {
      check_template(
        &format!("{}/outputs/{}", def.name, name),
        &output.value,
        &output_rules,
      )?;
    }

    Ok(Self {
      name: def.name,
      description: def.description,
      inputs: def.inputs,
      secrets: def.secrets,
      outputs: def.outputs,
      steps,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use pipewright_config::{Document, Format};

  fn lock(yaml: &str) -> Result<Action, WorkflowError> {
    match Document::parse(yaml, Format::Yaml).unwrap() {
      Document::Action(def) => Action::lock(def),
      Document::Workflow(_) => panic!("expected an action"),
    }
  }

  #[test]
  fn test_lock_composite_action() {
    let action = lock(
      r#"
name: setup-node
inputs:
  node-version:
    required: true
secrets:
  token: {}
outputs:
  path:
    value: ${{ steps.install.outputs.path }}
steps:
  - id: install
    run: install-node ${{ inputs.node-version }}
    env:
      NPM_TOKEN: ${{ secrets.token }}
"#,
    )
    .unwrap();
    assert_eq!(action.name, "setup-node");
    assert!(action.inputs["node-version"].required);
    assert_eq!(action.steps.len(), 1);
    assert_eq!(action.steps[0].label(), "install");
  }

  #[test]
  fn test_action_cannot_see_caller_jobs() {
    let result = lock(
      r#"
name: peeky
steps:
  - run: echo ${{ needs.build.outputs.version }}
"#,
    );
    match result {
      Err(WorkflowError::UndeclaredReference { path, reference }) => {
        assert_eq!(path, "peeky/0");
        assert_eq!(reference, "needs.build.outputs.version");
      }
      other => panic!("expected undeclared reference, got {:?}", other),
    }
  }

  #[test]
  fn test_action_output_must_name_a_step() {
    let result = lock(
      r#"
name: outputs
outputs:
  path:
    value: ${{ steps.missing.outputs.path }}
steps:
  - run: "true"
"#,
    );
    assert!(matches!(
      result,
      Err(WorkflowError::UndeclaredReference { path, .. }) if path == "outputs/outputs/path"
    ));
  }
}
