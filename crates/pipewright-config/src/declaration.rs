use serde::{Deserialize, Serialize};

/// Type tag of a declared input. Only strings are modelled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputType {
  #[default]
  String,
}

/// An input declared by a workflow or composite action.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputDecl {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  #[serde(default)]
  pub required: bool,
  /// Used when the caller does not bind the input.
  #[serde(
    default,
    deserialize_with = "crate::scalar::optional_scalar",
    skip_serializing_if = "Option::is_none"
  )]
  pub default: Option<String>,
  #[serde(default, rename = "type")]
  pub input_type: InputType,
}

/// A secret declared by a workflow or composite action.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretDecl {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  #[serde(default)]
  pub required: bool,
}

/// An output declared by a workflow or composite action.
///
/// `value` is an expression template evaluated once the callee has finished,
/// e.g. `${{ jobs.build.outputs.version }}` or `${{ steps.pack.outputs.path }}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputDecl {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  pub value: String,
}
