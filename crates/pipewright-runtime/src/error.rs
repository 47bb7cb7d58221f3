//! Runtime error types.
//!
//! These are pre-run and internal errors. Failures of individual steps and
//! jobs are recorded as [`FailureReport`](crate::FailureReport)s inside the
//! result tree instead.

use pipewright_registry::RegistryError;
use pipewright_workflow::WorkflowError;

/// Errors raised while composing a workflow with its `uses:` references.
#[derive(Debug, thiserror::Error)]
pub enum ComposeError {
  #[error("registry lookup for '{reference}' failed: {source}")]
  Registry {
    reference: String,
    #[source]
    source: RegistryError,
  },

  /// No registry entry for the reference.
  #[error("'{path}': '{reference}' not found in registry")]
  NotFound { path: String, reference: String },

  /// A workflow used in a step slot, or an action in a job slot.
  #[error("'{path}': '{reference}' is a {found}, expected a {expected}")]
  KindMismatch {
    path: String,
    reference: String,
    expected: &'static str,
    found: &'static str,
  },

  /// A called workflow does not declare `on: workflow_call`.
  #[error("'{path}': workflow '{reference}' is not callable (missing 'workflow_call' trigger)")]
  NotCallable { path: String, reference: String },

  /// A required input or secret of the callee has no binding and no default.
  #[error("'{path}': '{callee}' requires {kind} '{name}'")]
  MissingRequiredInput {
    path: String,
    callee: String,
    kind: BindingKind,
    name: String,
  },

  /// A binding names an input or secret the callee does not declare.
  #[error("'{path}': '{callee}' does not declare {kind} '{name}'")]
  UnknownBinding {
    path: String,
    callee: String,
    kind: BindingKind,
    name: String,
  },

  #[error("call cycle: {}", chain.join(" -> "))]
  CallCycle { chain: Vec<String> },

  #[error("'{path}': call depth exceeds {max}")]
  DepthExceeded { path: String, max: usize },

  /// A referenced definition failed validation.
  #[error("invalid definition '{reference}': {source}")]
  Workflow {
    reference: String,
    #[source]
    source: WorkflowError,
  },
}

/// Which side of a call binding an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingKind {
  Input,
  Secret,
}

impl std::fmt::Display for BindingKind {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      BindingKind::Input => write!(f, "input"),
      BindingKind::Secret => write!(f, "secret"),
    }
  }
}

/// Errors raised by a [`CommandRunner`](crate::CommandRunner).
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
  #[error("failed to spawn '{program}': {source}")]
  Spawn {
    program: String,
    #[source]
    source: std::io::Error,
  },

  #[error("command i/o failed: {0}")]
  Io(#[from] std::io::Error),

  #[error("invalid shell '{shell}'")]
  InvalidShell { shell: String },

  #[error("command cancelled")]
  Cancelled,
}

/// Errors that abort workflow execution.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
  /// The job graph is invalid (for example cyclic).
  #[error(transparent)]
  Workflow(#[from] WorkflowError),

  /// A `uses:` reference was not part of the composition.
  #[error("'{reference}' is not part of the composition")]
  UnknownCallable { reference: String },

  /// A job task ended without producing a result.
  #[error("job task failed: {message}")]
  JobTask { message: String },

  /// Jobs remain that can never become ready.
  #[error("jobs cannot be scheduled: {}", pending.join(", "))]
  Stalled { pending: Vec<String> },
}
