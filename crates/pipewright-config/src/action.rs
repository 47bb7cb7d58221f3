use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::declaration::{InputDecl, OutputDecl, SecretDecl};
use crate::step::StepDef;

/// A composite action: a reusable sequence of steps callable from a single
/// step slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionDef {
  pub name: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  #[serde(default)]
  pub inputs: IndexMap<String, InputDecl>,
  #[serde(default)]
  pub secrets: IndexMap<String, SecretDecl>,
  #[serde(default)]
  pub outputs: IndexMap<String, OutputDecl>,
  pub steps: Vec<StepDef>,
}
