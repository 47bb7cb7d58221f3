use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::enums::RetryBackoff;
use crate::input::InputValue;
use crate::uses::UsesRef;

/// A single step of a job or composite action.
///
/// Exactly one of `run` (a shell command) or `uses` (a composite action call)
/// must be set; the locker rejects anything else.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct StepDef {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub id: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,
  #[serde(default, rename = "if", skip_serializing_if = "Option::is_none")]
  pub condition: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub run: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub shell: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub working_directory: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub uses: Option<UsesRef>,
  #[serde(
    default,
    deserialize_with = "crate::scalar::scalar_map",
    skip_serializing_if = "IndexMap::is_empty"
  )]
  pub with: IndexMap<String, InputValue>,
  #[serde(
    default,
    deserialize_with = "crate::scalar::secret_bindings",
    skip_serializing_if = "IndexMap::is_empty"
  )]
  pub secrets: IndexMap<String, InputValue>,
  #[serde(
    default,
    deserialize_with = "crate::scalar::scalar_map",
    skip_serializing_if = "IndexMap::is_empty"
  )]
  pub env: IndexMap<String, InputValue>,
  /// A failing non-blocking step does not stop the remaining steps.
  #[serde(default)]
  pub continue_on_error: bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub timeout_ms: Option<u64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub max_retry_attempts: Option<u32>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub retry_backoff: Option<RetryBackoff>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub retry_initial_delay_ms: Option<u64>,
}
