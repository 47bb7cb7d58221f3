use pipewright_runtime::{ComposeError, RuntimeError};
use pipewright_secrets::SecretError;
use pipewright_store::StoreError;
use pipewright_workflow::WorkflowError;
use thiserror::Error;

/// Errors that prevent a run from starting, or from being recorded.
#[derive(Debug, Error)]
pub enum RunError {
  #[error(transparent)]
  Workflow(#[from] WorkflowError),

  #[error(transparent)]
  Compose(#[from] ComposeError),

  #[error("workflow '{workflow}' does not handle event '{event}'")]
  EventNotHandled { workflow: String, event: String },

  #[error("missing required input '{name}'")]
  MissingRequiredInput { name: String },

  #[error("unknown input '{name}'")]
  UnknownInput { name: String },

  #[error("input '{name}' must be a string, number or boolean")]
  InvalidInput { name: String },

  #[error("missing required secret '{name}'")]
  MissingSecret { name: String },

  #[error(transparent)]
  Secret(#[from] SecretError),

  #[error(transparent)]
  Runtime(#[from] RuntimeError),

  #[error(transparent)]
  Store(#[from] StoreError),

  #[error("workflow runner channel closed")]
  ChannelClosed,
}
