use std::sync::Arc;

use async_trait::async_trait;

use crate::error::SecretError;
use crate::vault::{SecretScope, SecretValue, SecretVault};

/// Tries each vault in order; the first one holding the secret wins.
///
/// Errors other than [`SecretError::NotFound`] stop the lookup.
#[derive(Default, Clone)]
pub struct LayeredVault {
  layers: Vec<Arc<dyn SecretVault>>,
}

impl LayeredVault {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_layer(mut self, vault: Arc<dyn SecretVault>) -> Self {
    self.layers.push(vault);
    self
  }

  pub fn len(&self) -> usize {
    self.layers.len()
  }

  pub fn is_empty(&self) -> bool {
    self.layers.is_empty()
  }
}

#[async_trait]
impl SecretVault for LayeredVault {
  async fn resolve(&self, name: &str, scope: &SecretScope) -> Result<SecretValue, SecretError> {
    for layer in &self.layers {
      match layer.resolve(name, scope).await {
        Err(SecretError::NotFound { .. }) => continue,
        other => return other,
      }
    }
    Err(SecretError::NotFound {
      name: name.to_string(),
    })
  }
}
