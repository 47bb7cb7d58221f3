//! Pre-run resolution of `uses:` references.
//!
//! The [`Composer`] walks a workflow's call jobs and action steps, fetches
//! every referenced definition from the [`Registry`], locks it and checks
//! each call binding against the callee's declarations. The resulting
//! [`Composition`] is everything the runtime needs; no registry access
//! happens once jobs start.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use indexmap::IndexMap;
use pipewright_config::{InputDecl, SecretDecl, UsesRef};
use pipewright_registry::{Callable, Registry};
use pipewright_workflow::{Action, CallBinding, JobKind, Step, StepAction, Workflow};
use tracing::{debug, info, instrument};

use crate::error::{BindingKind, ComposeError};

/// A locked root workflow together with every definition it calls,
/// directly or transitively.
#[derive(Debug, Clone)]
pub struct Composition {
  root: Arc<Workflow>,
  workflows: HashMap<UsesRef, Arc<Workflow>>,
  actions: HashMap<UsesRef, Arc<Action>>,
}

impl Composition {
  /// A composition for a workflow that calls nothing.
  pub fn standalone(root: Workflow) -> Self {
    Self {
      root: Arc::new(root),
      workflows: HashMap::new(),
      actions: HashMap::new(),
    }
  }

  pub fn root(&self) -> &Arc<Workflow> {
    &self.root
  }

  pub fn workflow(&self, reference: &UsesRef) -> Option<&Arc<Workflow>> {
    self.workflows.get(reference)
  }

  pub fn action(&self, reference: &UsesRef) -> Option<&Arc<Action>> {
    self.actions.get(reference)
  }

  /// All resolved references, sorted.
  pub fn references(&self) -> Vec<&UsesRef> {
    let mut references: Vec<&UsesRef> = self.workflows.keys().chain(self.actions.keys()).collect();
    references.sort();
    references
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
  Job,
  Step,
}

/// A call site waiting to be resolved.
struct PendingCall {
  path: String,
  binding: CallBinding,
  slot: Slot,
  /// References entered to reach this call site.
  chain: Vec<UsesRef>,
}

/// Resolves and validates `uses:` references.
pub struct Composer<'a> {
  registry: &'a dyn Registry,
  max_depth: usize,
}

impl<'a> Composer<'a> {
  pub fn new(registry: &'a dyn Registry) -> Self {
    Self {
      registry,
      max_depth: 10,
    }
  }

  pub fn with_max_depth(mut self, max_depth: usize) -> Self {
    self.max_depth = max_depth;
    self
  }

  /// Resolve every reference reachable from `root`.
  ///
  /// Each call site is checked with the chain of references that leads to
  /// it, so a definition reached along two paths is walked twice. Fetched
  /// definitions are cached.
  #[instrument(name = "compose", skip(self, root), fields(workflow = %root.name))]
  pub async fn compose(&self, root: Workflow) -> Result<Composition, ComposeError> {
    let mut workflows: HashMap<UsesRef, Arc<Workflow>> = HashMap::new();
    let mut actions: HashMap<UsesRef, Arc<Action>> = HashMap::new();
    let mut queue = VecDeque::new();
    queue_workflow_calls(&root, "", &[], &mut queue);

    while let Some(call) = queue.pop_front() {
      let reference = &call.binding.uses;

      if let Some(start) = call.chain.iter().position(|r| r == reference) {
        let chain = call.chain[start..]
          .iter()
          .chain(std::iter::once(reference))
          .map(UsesRef::to_string)
          .collect();
        return Err(ComposeError::CallCycle { chain });
      }
      if call.chain.len() >= self.max_depth {
        return Err(ComposeError::DepthExceeded {
          path: call.path,
          max: self.max_depth,
        });
      }

      let mut chain = call.chain.clone();
      chain.push(reference.clone());

      match call.slot {
        Slot::Job => {
          let workflow = match workflows.get(reference) {
            Some(workflow) => workflow.clone(),
            None => {
              let workflow = Arc::new(self.fetch_workflow(&call.path, reference).await?);
              workflows.insert(reference.clone(), workflow.clone());
              workflow
            }
          };
          check_bindings(&call.path, &call.binding, &workflow.inputs, &workflow.secrets)?;
          queue_workflow_calls(&workflow, &call.path, &chain, &mut queue);
        }
        Slot::Step => {
          let action = match actions.get(reference) {
            Some(action) => action.clone(),
            None => {
              let action = Arc::new(self.fetch_action(&call.path, reference).await?);
              actions.insert(reference.clone(), action.clone());
              action
            }
          };
          check_bindings(&call.path, &call.binding, &action.inputs, &action.secrets)?;
          queue_step_calls(&action.steps, &call.path, &chain, &mut queue);
        }
      }
    }

    info!(
      workflow = %root.name,
      workflows = workflows.len(),
      actions = actions.len(),
      "composition_resolved"
    );

    Ok(Composition {
      root: Arc::new(root),
      workflows,
      actions,
    })
  }

  async fn fetch(&self, path: &str, reference: &UsesRef) -> Result<Callable, ComposeError> {
    debug!(reference = %reference, path = %path, "resolving reference");
    self
      .registry
      .get(reference)
      .await
      .map_err(|source| ComposeError::Registry {
        reference: reference.to_string(),
        source,
      })?
      .ok_or_else(|| ComposeError::NotFound {
        path: path.to_string(),
        reference: reference.to_string(),
      })
  }

  async fn fetch_workflow(&self, path: &str, reference: &UsesRef) -> Result<Workflow, ComposeError> {
    let def = match self.fetch(path, reference).await? {
      Callable::Workflow(def) => def,
      other => return Err(kind_mismatch(path, reference, "workflow", &other)),
    };
    let workflow = Workflow::lock(def).map_err(|source| ComposeError::Workflow {
      reference: reference.to_string(),
      source,
    })?;
    if !workflow.is_callable() {
      return Err(ComposeError::NotCallable {
        path: path.to_string(),
        reference: reference.to_string(),
      });
    }
    Ok(workflow)
  }

  async fn fetch_action(&self, path: &str, reference: &UsesRef) -> Result<Action, ComposeError> {
    match self.fetch(path, reference).await? {
      Callable::Action(def) => Action::lock(def).map_err(|source| ComposeError::Workflow {
        reference: reference.to_string(),
        source,
      }),
      other => Err(kind_mismatch(path, reference, "action", &other)),
    }
  }
}

fn kind_mismatch(
  path: &str,
  reference: &UsesRef,
  expected: &'static str,
  found: &Callable,
) -> ComposeError {
  ComposeError::KindMismatch {
    path: path.to_string(),
    reference: reference.to_string(),
    expected,
    found: found.kind(),
  }
}

fn join_path(prefix: &str, segment: &str) -> String {
  if prefix.is_empty() {
    segment.to_string()
  } else {
    format!("{}/{}", prefix, segment)
  }
}

fn queue_workflow_calls(
  workflow: &Workflow,
  prefix: &str,
  chain: &[UsesRef],
  queue: &mut VecDeque<PendingCall>,
) {
  for (job_id, job) in &workflow.jobs {
    let path = join_path(prefix, job_id);
    match &job.kind {
      JobKind::Call(binding) => queue.push_back(PendingCall {
        path,
        binding: binding.clone(),
        slot: Slot::Job,
        chain: chain.to_vec(),
      }),
      JobKind::Steps(steps) => queue_step_calls(steps, &path, chain, queue),
    }
  }
}

fn queue_step_calls(
  steps: &[Step],
  prefix: &str,
  chain: &[UsesRef],
  queue: &mut VecDeque<PendingCall>,
) {
  for step in steps {
    if let StepAction::Call(binding) = &step.action {
      queue.push_back(PendingCall {
        path: join_path(prefix, &step.index.to_string()),
        binding: binding.clone(),
        slot: Slot::Step,
        chain: chain.to_vec(),
      });
    }
  }
}

fn declares<V>(declared: &IndexMap<String, V>, name: &str) -> bool {
  declared.keys().any(|key| key.eq_ignore_ascii_case(name))
}

fn binds(binding: &IndexMap<String, String>, name: &str) -> bool {
  binding.keys().any(|key| key.eq_ignore_ascii_case(name))
}

/// Check a call binding against the callee's inputs and secrets.
fn check_bindings(
  path: &str,
  binding: &CallBinding,
  inputs: &IndexMap<String, InputDecl>,
  secrets: &IndexMap<String, SecretDecl>,
) -> Result<(), ComposeError> {
  let callee = binding.uses.to_string();
  let error = |kind, name: &str, missing: bool| {
    let (path, callee, name) = (path.to_string(), callee.clone(), name.to_string());
    if missing {
      ComposeError::MissingRequiredInput {
        path,
        callee,
        kind,
        name,
      }
    } else {
      ComposeError::UnknownBinding {
        path,
        callee,
        kind,
        name,
      }
    }
  };

  for name in binding.with.keys() {
    if !declares(inputs, name) {
      return Err(error(BindingKind::Input, name, false));
    }
  }
  for name in binding.secrets.keys() {
    if !declares(secrets, name) {
      return Err(error(BindingKind::Secret, name, false));
    }
  }

  for (name, decl) in inputs {
    if decl.required && decl.default.is_none() && !binds(&binding.with, name) {
      return Err(error(BindingKind::Input, name, true));
    }
  }
  for (name, decl) in secrets {
    if decl.required && !binds(&binding.secrets, name) {
      return Err(error(BindingKind::Secret, name, true));
    }
  }
  Ok(())
}
