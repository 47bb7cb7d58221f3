use indexmap::IndexMap;
use pipewright_config::{
  InputDecl, InputValue, OutputDecl, SecretDecl, WORKFLOW_CALL_EVENT, WorkflowDef,
};
use pipewright_expr::scopes;
use serde::{Deserialize, Serialize};

use crate::error::WorkflowError;
use crate::graph::Graph;
use crate::job::Job;
use crate::references::{Rules, check_template, is_identifier};
use crate::retry::RetrySettings;

const JOB_ROOTS: &[&str] = &[
  scopes::INPUTS,
  scopes::SECRETS,
  scopes::ENV,
  scopes::NEEDS,
  scopes::STEPS,
  scopes::GITHUB,
];

const WORKFLOW_ENV_ROOTS: &[&str] = &[scopes::INPUTS, scopes::SECRETS, scopes::GITHUB];

const OUTPUT_ROOTS: &[&str] = &[scopes::INPUTS, scopes::JOBS, scopes::GITHUB];

/// A locked workflow ready for execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
  pub name: String,
  /// Accepted event types. Empty accepts every event.
  pub triggers: Vec<String>,
  pub inputs: IndexMap<String, InputDecl>,
  pub secrets: IndexMap<String, SecretDecl>,
  pub outputs: IndexMap<String, OutputDecl>,
  pub env: IndexMap<String, InputValue>,
  /// Jobs in declaration order.
  pub jobs: IndexMap<String, Job>,
  pub retry: RetrySettings,
}

impl Workflow {
  /// Validate a definition and lock it.
  ///
  /// Checks job and step shapes, parses every expression, checks that
  /// `inputs`, `secrets`, `needs`, `steps` and `jobs` references name
  /// declared entries, and rejects unknown or cyclic `needs`.
  pub fn lock(def: WorkflowDef) -> Result<Self, WorkflowError> {
    if def.jobs.is_empty() {
      return Err(WorkflowError::NoJobs);
    }

    let job_ids: Vec<String> = def.jobs.keys().cloned().collect();
    for (job_id, job) in &def.jobs {
      if !is_identifier(job_id) {
        return Err(WorkflowError::InvalidIdentifier {
          kind: "job",
          id: job_id.clone(),
        });
      }
      for needs in &job.needs {
        if !def.jobs.contains_key(needs) {
          return Err(WorkflowError::UnknownDependency {
            job: job_id.clone(),
            needs: needs.clone(),
          });
        }
      }
    }

    // Cycles are reported before anything else about the jobs
    Graph::new(
      def
        .jobs
        .iter()
        .map(|(id, job)| (id.as_str(), job.needs.as_slice())),
    )
    .topological_order()?;

    let base = Rules {
      roots: WORKFLOW_ENV_ROOTS,
      inputs: &def.inputs,
      secrets: &def.secrets,
      needs: &[],
      steps: &[],
      jobs: &[],
    };

    for (key, value) in &def.env {
      check_template(&format!("env/{}", key), value, &base)?;
    }

    let output_rules = Rules {
      roots: OUTPUT_ROOTS,
      jobs: &job_ids,
      ..base
    };
    for (name, output) in &def.outputs {
      check_template(&format!("outputs/{}", name), &output.value, &output_rules)?;
    }

    let job_rules = Rules {
      roots: JOB_ROOTS,
      ..base
    };
    let mut jobs = IndexMap::with_capacity(def.jobs.len());
    for (job_id, job_def) in def.jobs {
      let job = Job::lock(job_id.clone(), job_def, job_rules)?;
      jobs.insert(job_id, job);
    }

    Ok(Self {
      name: def.name,
      triggers: def.on,
      inputs: def.inputs,
      secrets: def.secrets,
      outputs: def.outputs,
      env: def.env,
      jobs,
      retry: RetrySettings {
        max_attempts: def.max_retry_attempts,
        backoff: def.retry_backoff,
        initial_delay_ms: def.retry_initial_delay_ms,
      },
    })
  }

  /// Build the graph structure for traversal.
  pub fn graph(&self) -> Graph {
    Graph::new(
      self
        .jobs
        .iter()
        .map(|(id, job)| (id.as_str(), job.needs.as_slice())),
    )
  }

  /// Get a job by ID.
  pub fn get_job(&self, job_id: &str) -> Option<&Job> {
    self.jobs.get(job_id)
  }

  /// Whether the workflow handles the given event type.
  pub fn accepts_event(&self, event_type: &str) -> bool {
    self.triggers.is_empty()
      || self
        .triggers
        .iter()
        .any(|trigger| trigger.eq_ignore_ascii_case(event_type))
  }

  /// Whether another workflow's job may call this one.
  pub fn is_callable(&self) -> bool {
    self
      .triggers
      .iter()
      .any(|trigger| trigger == WORKFLOW_CALL_EVENT)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::job::JobKind;
  use crate::step::StepAction;
  use pipewright_config::Document;

  fn lock(yaml: &str) -> Result<Workflow, WorkflowError> {
    Workflow::lock(Document::parse_workflow(yaml, pipewright_config::Format::Yaml).unwrap())
  }

  #[test]
  fn test_lock_ci_workflow() {
    let workflow = lock(
      r#"
name: ci
on: [push]
inputs:
  node-version:
    default: "20"
secrets:
  NPM_TOKEN:
    required: true
outputs:
  version:
    value: ${{ jobs.build.outputs.version }}
jobs:
  build:
    outputs:
      version: ${{ steps.meta.outputs.version }}
    steps:
      - id: meta
        run: echo "::set-output name=version::1.0.0"
      - uses: ./actions/setup-node
        with:
          node-version: ${{ inputs.node-version }}
        secrets:
          token: ${{ secrets.NPM_TOKEN }}
  deploy:
    needs: build
    if: github.ref == 'refs/heads/main'
    environment: production
    steps:
      - run: ./deploy.sh ${{ needs.build.outputs.version }}
        max-retry-attempts: 3
"#,
    )
    .unwrap();

    assert_eq!(workflow.name, "ci");
    assert!(workflow.accepts_event("push"));
    assert!(!workflow.accepts_event("pull_request"));
    assert!(!workflow.is_callable());

    let build = workflow.get_job("build").unwrap();
    let JobKind::Steps(steps) = &build.kind else {
      panic!("build should be a steps job");
    };
    assert_eq!(steps.len(), 2);
    assert!(matches!(steps[0].action, StepAction::Command(_)));
    assert!(steps[1].is_call());
    assert_eq!(steps[1].label(), "./actions/setup-node");

    let deploy = workflow.get_job("deploy").unwrap();
    assert_eq!(deploy.needs, vec!["build"]);
    assert_eq!(deploy.environment.as_deref(), Some("production"));
    let JobKind::Steps(steps) = &deploy.kind else {
      panic!("deploy should be a steps job");
    };
    assert_eq!(steps[0].retry.max_attempts, Some(3));

    assert_eq!(workflow.graph().topological_order().unwrap(), vec!["build", "deploy"]);
  }

  #[test]
  fn test_lock_rejects_cycle() {
    let result = lock(
      r#"
name: cyclic
jobs:
  a:
    needs: [b]
    steps: [{ run: "true" }]
  b:
    needs: [a]
    steps: [{ run: "true" }]
"#,
    );
    assert!(matches!(
      result,
      Err(WorkflowError::CyclicDependency { cycle }) if cycle == vec!["a", "b", "a"]
    ));
  }

  #[test]
  fn test_lock_rejects_unknown_needs() {
    let result = lock(
      r#"
name: broken
jobs:
  deploy:
    needs: build
    steps: [{ run: "true" }]
"#,
    );
    assert!(matches!(
      result,
      Err(WorkflowError::UnknownDependency { job, needs }) if job == "deploy" && needs == "build"
    ));
  }

  #[test]
  fn test_lock_rejects_undeclared_secret() {
    let result = lock(
      r#"
name: leaky
jobs:
  build:
    steps:
      - run: echo ${{ secrets.AWS_KEY }}
"#,
    );
    match result {
      Err(WorkflowError::UndeclaredReference { path, reference }) => {
        assert_eq!(path, "build/0");
        assert_eq!(reference, "secrets.AWS_KEY");
      }
      other => panic!("expected undeclared reference, got {:?}", other),
    }
  }

  #[test]
  fn test_lock_rejects_needs_reference_outside_needs() {
    let result = lock(
      r#"
name: wrong-needs
jobs:
  build:
    steps: [{ run: "true" }]
  test:
    steps:
      - run: echo ${{ needs.build.outputs.version }}
"#,
    );
    assert!(matches!(result, Err(WorkflowError::UndeclaredReference { .. })));
  }

  #[test]
  fn test_lock_rejects_forward_step_reference() {
    let result = lock(
      r#"
name: forward
jobs:
  build:
    steps:
      - run: echo ${{ steps.later.outputs.x }}
      - id: later
        run: "true"
"#,
    );
    assert!(matches!(result, Err(WorkflowError::UndeclaredReference { .. })));
  }

  #[test]
  fn test_lock_rejects_invalid_expression() {
    let result = lock(
      r#"
name: bad-expr
jobs:
  build:
    if: github.ref = 'main'
    steps: [{ run: "true" }]
"#,
    );
    assert!(matches!(
      result,
      Err(WorkflowError::InvalidExpression { path, .. }) if path == "build"
    ));
  }

  #[test]
  fn test_lock_rejects_step_shapes() {
    let both = lock(
      r#"
name: both
jobs:
  build:
    steps:
      - run: "true"
        uses: ./actions/x
"#,
    );
    assert!(matches!(both, Err(WorkflowError::InvalidStep { path, .. }) if path == "build/0"));

    let duplicate = lock(
      r#"
name: dup
jobs:
  build:
    steps:
      - { id: a, run: "true" }
      - { id: a, run: "true" }
"#,
    );
    assert!(matches!(duplicate, Err(WorkflowError::DuplicateStepId { .. })));
  }

  #[test]
  fn test_lock_call_job() {
    let workflow = lock(
      r#"
name: release
secrets:
  DEPLOY_KEY: {}
jobs:
  deploy:
    uses: acme/deploy@v2
    with:
      region: eu-west-1
    secrets:
      key: ${{ secrets.DEPLOY_KEY }}
"#,
    )
    .unwrap();
    let JobKind::Call(call) = &workflow.get_job("deploy").unwrap().kind else {
      panic!("deploy should be a call job");
    };
    assert_eq!(call.uses.to_string(), "acme/deploy@v2");
    assert_eq!(call.with["region"], "eu-west-1");

    let with_steps = lock(
      r#"
name: mixed
jobs:
  deploy:
    uses: acme/deploy@v2
    steps: [{ run: "true" }]
"#,
    );
    assert!(matches!(with_steps, Err(WorkflowError::InvalidJob { .. })));
  }

  #[test]
  fn test_empty_triggers_accept_every_event() {
    let workflow = lock(
      r#"
name: any
jobs:
  a:
    steps: [{ run: "true" }]
"#,
    )
    .unwrap();
    assert!(workflow.accepts_event("push"));
    assert!(workflow.accepts_event("workflow_dispatch"));
  }

  #[test]
  fn test_no_jobs() {
    let def = WorkflowDef {
      name: "empty".to_string(),
      on: Vec::new(),
      inputs: IndexMap::new(),
      secrets: IndexMap::new(),
      outputs: IndexMap::new(),
      env: IndexMap::new(),
      jobs: IndexMap::new(),
      max_retry_attempts: None,
      retry_backoff: None,
      retry_initial_delay_ms: None,
    };
    assert!(matches!(Workflow::lock(def), Err(WorkflowError::NoJobs)));
  }
}
