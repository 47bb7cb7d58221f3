use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::input::InputValue;
use crate::step::StepDef;
use crate::uses::UsesRef;

/// A job definition.
///
/// A job either lists its own `steps` or calls a reusable workflow with
/// `uses`, binding the callee's inputs through `with` and its secrets through
/// `secrets`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct JobDef {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,
  /// Jobs that must reach a terminal state before this one starts.
  #[serde(
    default,
    deserialize_with = "crate::scalar::one_or_many",
    skip_serializing_if = "Vec::is_empty"
  )]
  pub needs: Vec<String>,
  #[serde(default, rename = "if", skip_serializing_if = "Option::is_none")]
  pub condition: Option<String>,
  /// Deployment environment; selects environment-scoped secrets.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub environment: Option<String>,
  #[serde(
    default,
    deserialize_with = "crate::scalar::scalar_map",
    skip_serializing_if = "IndexMap::is_empty"
  )]
  pub env: IndexMap<String, InputValue>,
  #[serde(
    default,
    deserialize_with = "crate::scalar::scalar_map",
    skip_serializing_if = "IndexMap::is_empty"
  )]
  pub outputs: IndexMap<String, InputValue>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub steps: Vec<StepDef>,
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
  /// A failing job with this flag does not fail the workflow.
  #[serde(default)]
  pub continue_on_error: bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub timeout_ms: Option<u64>,
}
