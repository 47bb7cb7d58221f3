use std::collections::HashMap;

use async_trait::async_trait;
use pipewright_config::{ActionDef, UsesRef, WorkflowDef};

use crate::error::RegistryError;
use crate::registry::{Callable, Registry};

/// In-memory registry keyed by reference string (`name` or `name@version`).
///
/// Suitable for embedding and testing.
#[derive(Debug, Default, Clone)]
pub struct MemoryRegistry {
  entries: HashMap<String, Callable>,
}

impl MemoryRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_workflow(mut self, reference: &str, def: WorkflowDef) -> Self {
    self.insert(reference, Callable::Workflow(def));
    self
  }

  pub fn with_action(mut self, reference: &str, def: ActionDef) -> Self {
    self.insert(reference, Callable::Action(def));
    self
  }

  pub fn insert(&mut self, reference: &str, callable: Callable) {
    self.entries.insert(reference.to_string(), callable);
  }
}

#[async_trait]
impl Registry for MemoryRegistry {
  async fn get(&self, reference: &UsesRef) -> Result<Option<Callable>, RegistryError> {
    if let Some(found) = self.entries.get(&reference.to_string()) {
      return Ok(Some(found.clone()));
    }
    if reference.version.is_some() {
      return Ok(None);
    }

    // Unversioned: pick the latest `name@version` entry
    let prefix = format!("{}@", reference.name);
    let latest = self
      .entries
      .iter()
      .filter(|(key, _)| key.starts_with(&prefix))
      .max_by(|a, b| a.0.cmp(b.0))
      .map(|(_, callable)| callable.clone());
    Ok(latest)
  }
}
