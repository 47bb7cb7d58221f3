use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::declaration::{InputDecl, OutputDecl, SecretDecl};
use crate::enums::RetryBackoff;
use crate::input::InputValue;
use crate::job::JobDef;

/// Event name that marks a workflow as callable from another workflow's job.
pub const WORKFLOW_CALL_EVENT: &str = "workflow_call";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct WorkflowDef {
  pub name: String,
  /// Events that trigger this workflow. Empty accepts every event.
  #[serde(
    default,
    deserialize_with = "crate::scalar::event_list",
    skip_serializing_if = "Vec::is_empty"
  )]
  pub on: Vec<String>,
  #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
  pub inputs: IndexMap<String, InputDecl>,
  #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
  pub secrets: IndexMap<String, SecretDecl>,
  #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
  pub outputs: IndexMap<String, OutputDecl>,
  #[serde(
    default,
    deserialize_with = "crate::scalar::scalar_map",
    skip_serializing_if = "IndexMap::is_empty"
  )]
  pub env: IndexMap<String, InputValue>,
  pub jobs: IndexMap<String, JobDef>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub max_retry_attempts: Option<u32>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub retry_backoff: Option<RetryBackoff>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub retry_initial_delay_ms: Option<u64>,
}
