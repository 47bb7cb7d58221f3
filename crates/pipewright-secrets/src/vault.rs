use std::fmt;

use async_trait::async_trait;

use crate::error::SecretError;

/// Who is asking for a secret.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecretScope {
  /// Deployment environment of the job, if any.
  pub environment: Option<String>,
  /// Path of the job (or nested call) resolving the secret.
  pub job: String,
}

impl SecretScope {
  pub fn new(job: impl Into<String>, environment: Option<String>) -> Self {
    Self {
      environment,
      job: job.into(),
    }
  }
}

/// A resolved secret value.
///
/// `Debug` and `Display` never print the value; call [`SecretValue::expose`]
/// where the plain text is actually needed.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretValue(String);

impl SecretValue {
  pub fn new(value: impl Into<String>) -> Self {
    Self(value.into())
  }

  pub fn expose(&self) -> &str {
    &self.0
  }
}

impl fmt::Debug for SecretValue {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str("SecretValue(***)")
  }
}

impl fmt::Display for SecretValue {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str("***")
  }
}

/// Secret resolution boundary.
///
/// Implementations may be networked, so resolution is async.
#[async_trait]
pub trait SecretVault: Send + Sync {
  /// Resolve a named secret for the given scope.
  ///
  /// Returns [`SecretError::NotFound`] when the secret does not exist.
  async fn resolve(&self, name: &str, scope: &SecretScope) -> Result<SecretValue, SecretError>;
}
