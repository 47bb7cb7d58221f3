use async_trait::async_trait;
use pipewright_config::{ActionDef, UsesRef, WorkflowDef};

use crate::error::RegistryError;

/// A definition a `uses:` reference can point at.
#[derive(Debug, Clone, PartialEq)]
pub enum Callable {
  Workflow(WorkflowDef),
  Action(ActionDef),
}

impl Callable {
  pub fn kind(&self) -> &'static str {
    match self {
      Callable::Workflow(_) => "workflow",
      Callable::Action(_) => "action",
    }
  }
}

/// Source of reusable definitions.
#[async_trait]
pub trait Registry: Send + Sync {
  /// Look up a reference. A reference without a version resolves to the
  /// latest available one. Returns `None` when nothing matches.
  async fn get(&self, reference: &UsesRef) -> Result<Option<Callable>, RegistryError>;
}
