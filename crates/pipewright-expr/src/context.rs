//! Evaluation context: named scopes plus the job status used by
//! `success()`, `failure()` and `cancelled()`.

use serde_json::{Map, Value};

/// Mask substituted for secret values in snapshots and logs.
pub const REDACTED: &str = "***";

/// Well-known scope names.
pub mod scopes {
  pub const INPUTS: &str = "inputs";
  pub const SECRETS: &str = "secrets";
  pub const ENV: &str = "env";
  pub const NEEDS: &str = "needs";
  pub const STEPS: &str = "steps";
  pub const JOBS: &str = "jobs";
  pub const GITHUB: &str = "github";
}

/// Status of the preceding work as seen by the status-check functions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CheckStatus {
  /// A prior step (or a needed job) failed.
  pub failed: bool,
  /// The run was cancelled.
  pub cancelled: bool,
  /// A needed job was skipped, so its result is not available.
  pub incomplete: bool,
}

impl CheckStatus {
  pub fn is_success(&self) -> bool {
    !self.failed && !self.cancelled && !self.incomplete
  }
}

/// An immutable set of scopes. Builders consume and return the context so a
/// context handed to an evaluation is never mutated underneath it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Context {
  scopes: Map<String, Value>,
  status: CheckStatus,
}

impl Context {
  pub fn new() -> Self {
    Self::default()
  }

  /// Add or replace a scope.
  pub fn with_scope(mut self, name: impl Into<String>, value: Value) -> Self {
    self.scopes.insert(name.into(), value);
    self
  }

  pub fn with_status(mut self, status: CheckStatus) -> Self {
    self.status = status;
    self
  }

  pub fn scope(&self, name: &str) -> Option<&Value> {
    self.scopes.get(name)
  }

  pub fn status(&self) -> CheckStatus {
    self.status
  }

  pub(crate) fn scopes(&self) -> &Map<String, Value> {
    &self.scopes
  }

  /// A JSON view of the context with every value in the `secrets` scope
  /// replaced by [`REDACTED`].
  pub fn redacted_snapshot(&self) -> Value {
    let mut snapshot = self.scopes.clone();
    if let Some(Value::Object(secrets)) = snapshot.get_mut(scopes::SECRETS) {
      for value in secrets.values_mut() {
        *value = Value::String(REDACTED.to_string());
      }
    }
    Value::Object(snapshot)
  }
}
