use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::SecretError;
use crate::vault::{SecretScope, SecretValue, SecretVault};

/// Default variable prefix for [`EnvVault`].
pub const DEFAULT_PREFIX: &str = "PIPEWRIGHT_SECRET_";

/// Vault backed by environment variables.
///
/// `deploy-key` requested by a job targeting `production` is looked up as
/// `PIPEWRIGHT_SECRET_PRODUCTION_DEPLOY_KEY` first, then as
/// `PIPEWRIGHT_SECRET_DEPLOY_KEY`.
#[derive(Debug, Clone)]
pub struct EnvVault {
  prefix: String,
  vars: HashMap<String, String>,
}

impl EnvVault {
  /// Snapshot the current process environment.
  pub fn from_process() -> Self {
    Self::from_vars(std::env::vars())
  }

  pub fn from_vars<I>(vars: I) -> Self
  where
    I: IntoIterator<Item = (String, String)>,
  {
    Self {
      prefix: DEFAULT_PREFIX.to_string(),
      vars: vars.into_iter().collect(),
    }
  }

  pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
    self.prefix = prefix.into();
    self
  }

  fn key(&self, parts: &[&str]) -> String {
    let mut key = self.prefix.clone();
    key.push_str(
      &parts
        .iter()
        .map(|part| normalize(part))
        .collect::<Vec<_>>()
        .join("_"),
    );
    key
  }
}

fn normalize(part: &str) -> String {
  part
    .chars()
    .map(|c| match c {
      '-' | '.' | ' ' => '_',
      c => c.to_ascii_uppercase(),
    })
    .collect()
}

#[async_trait]
impl SecretVault for EnvVault {
  async fn resolve(&self, name: &str, scope: &SecretScope) -> Result<SecretValue, SecretError> {
    if let Some(environment) = &scope.environment
      && let Some(value) = self.vars.get(&self.key(&[environment, name]))
    {
      return Ok(SecretValue::new(value.clone()));
    }

    self
      .vars
      .get(&self.key(&[name]))
      .map(|value| SecretValue::new(value.clone()))
      .ok_or_else(|| SecretError::NotFound {
        name: name.to_string(),
      })
  }
}
