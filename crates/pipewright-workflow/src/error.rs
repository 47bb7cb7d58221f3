use pipewright_expr::ExpressionError;
use thiserror::Error;

/// Errors found while locking a workflow or composite action.
///
/// Every variant names the offending location as a `/`-separated path, e.g.
/// `deploy` for a job or `deploy/2` for its third step.
#[derive(Debug, Error)]
pub enum WorkflowError {
  #[error("workflow has no jobs")]
  NoJobs,

  #[error("invalid {kind} id '{id}': use letters, digits, '-' and '_'")]
  InvalidIdentifier { kind: &'static str, id: String },

  #[error("job '{job}' needs unknown job '{needs}'")]
  UnknownDependency { job: String, needs: String },

  #[error("cyclic dependency: {}", cycle.join(" -> "))]
  CyclicDependency { cycle: Vec<String> },

  #[error("invalid job '{job}': {message}")]
  InvalidJob { job: String, message: String },

  #[error("invalid step '{path}': {message}")]
  InvalidStep { path: String, message: String },

  #[error("duplicate step id '{id}' in '{path}'")]
  DuplicateStepId { path: String, id: String },

  #[error("{path}: {source}")]
  InvalidExpression {
    path: String,
    #[source]
    source: ExpressionError,
  },

  #[error("{path}: reference '{reference}' is not declared")]
  UndeclaredReference { path: String, reference: String },
}
