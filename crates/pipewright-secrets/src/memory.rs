use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use tracing::debug;

use crate::error::SecretError;
use crate::vault::{SecretScope, SecretValue, SecretVault};

/// In-memory vault with global and per-environment values.
///
/// An environment-specific value wins over the global value of the same
/// name. Suitable for local runs and testing.
#[derive(Debug, Default, Clone)]
pub struct MemoryVault {
  global: HashMap<String, SecretValue>,
  environments: HashMap<String, HashMap<String, SecretValue>>,
}

impl MemoryVault {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_secret(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.insert(name, value);
    self
  }

  pub fn with_environment_secret(
    mut self,
    environment: impl Into<String>,
    name: impl Into<String>,
    value: impl Into<String>,
  ) -> Self {
    self
      .environments
      .entry(environment.into())
      .or_default()
      .insert(name.into(), SecretValue::new(value));
    self
  }

  pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
    self.global.insert(name.into(), SecretValue::new(value));
  }

  /// Load global secrets from a dotenv file.
  pub fn load_dotenv(mut self, path: &Path) -> Result<Self, SecretError> {
    let load_error = |message: String| SecretError::Load {
      source_name: path.display().to_string(),
      message,
    };

    let entries = dotenvy::from_path_iter(path).map_err(|e| load_error(e.to_string()))?;
    let mut count = 0usize;
    for entry in entries {
      let (name, value) = entry.map_err(|e| load_error(e.to_string()))?;
      self.insert(name, value);
      count += 1;
    }

    debug!(path = %path.display(), count, "loaded secrets from dotenv file");
    Ok(self)
  }
}

#[async_trait]
impl SecretVault for MemoryVault {
  async fn resolve(&self, name: &str, scope: &SecretScope) -> Result<SecretValue, SecretError> {
    let scoped = scope
      .environment
      .as_ref()
      .and_then(|environment| self.environments.get(environment))
      .and_then(|secrets| secrets.get(name));

    scoped
      .or_else(|| self.global.get(name))
      .cloned()
      .ok_or_else(|| SecretError::NotFound {
        name: name.to_string(),
      })
  }
}
