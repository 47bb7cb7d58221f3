use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An event asking for a workflow run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerEvent {
  /// Event type matched against the workflow's `on` list, e.g. `push`.
  pub event_type: String,
  /// The git ref being built, e.g. `refs/heads/main`.
  #[serde(rename = "ref")]
  pub git_ref: String,
  /// Raw event payload. Root inputs are read from `payload.inputs`.
  #[serde(default)]
  pub payload: Value,
}

impl TriggerEvent {
  pub fn new(event_type: impl Into<String>, git_ref: impl Into<String>) -> Self {
    Self {
      event_type: event_type.into(),
      git_ref: git_ref.into(),
      payload: Value::Object(Default::default()),
    }
  }

  pub fn with_payload(mut self, payload: Value) -> Self {
    self.payload = payload;
    self
  }

  /// The short ref name: `refs/heads/main` -> `main`, `refs/tags/v1` -> `v1`.
  pub fn ref_name(&self) -> &str {
    ["refs/heads/", "refs/tags/", "refs/"]
      .iter()
      .find_map(|prefix| self.git_ref.strip_prefix(prefix))
      .unwrap_or(&self.git_ref)
  }
}
