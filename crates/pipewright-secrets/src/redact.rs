use std::collections::BTreeSet;
use std::sync::{Arc, RwLock};

/// Replacement text for redacted values.
pub const MASK: &str = "***";

/// Shared set of values that must never appear in logs or results.
///
/// Cloning shares the underlying set.
#[derive(Debug, Clone, Default)]
pub struct Redactor {
  values: Arc<RwLock<BTreeSet<String>>>,
}

impl Redactor {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register a value to mask. Multi-line values are also masked line by
  /// line.
  pub fn add(&self, value: &str) {
    let mut values = self
      .values
      .write()
      .unwrap_or_else(|poisoned| poisoned.into_inner());
    for candidate in std::iter::once(value).chain(value.lines()) {
      let candidate = candidate.trim();
      if !candidate.is_empty() {
        values.insert(candidate.to_string());
      }
    }
  }

  pub fn is_empty(&self) -> bool {
    self
      .values
      .read()
      .unwrap_or_else(|poisoned| poisoned.into_inner())
      .is_empty()
  }

  /// Mask every registered value in `text`. Longer values are replaced
  /// first so a secret containing another secret is masked whole.
  pub fn redact(&self, text: &str) -> String {
    let values = self
      .values
      .read()
      .unwrap_or_else(|poisoned| poisoned.into_inner());
    if values.is_empty() {
      return text.to_string();
    }

    let mut ordered: Vec<&String> = values.iter().collect();
    ordered.sort_by(|a, b| b.len().cmp(&a.len()));

    let mut out = text.to_string();
    for value in ordered {
      if out.contains(value.as_str()) {
        out = out.replace(value.as_str(), MASK);
      }
    }
    out
  }

  /// Mask every string inside a JSON value, including object keys.
  pub fn redact_value(&self, value: &serde_json::Value) -> serde_json::Value {
    match value {
      serde_json::Value::String(s) => serde_json::Value::String(self.redact(s)),
      serde_json::Value::Array(items) => {
        serde_json::Value::Array(items.iter().map(|item| self.redact_value(item)).collect())
      }
      serde_json::Value::Object(map) => serde_json::Value::Object(
        map
          .iter()
          .map(|(k, v)| (self.redact(k), self.redact_value(v)))
          .collect(),
      ),
      other => other.clone(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_redact_registered_values() {
    let redactor = Redactor::new();
    redactor.add("hunter2");
    assert_eq!(
      redactor.redact("login with hunter2 now"),
      "login with *** now"
    );
    assert_eq!(redactor.redact("nothing here"), "nothing here");
  }

  #[test]
  fn test_longest_value_first() {
    let redactor = Redactor::new();
    redactor.add("abc");
    redactor.add("abcdef");
    assert_eq!(redactor.redact("token=abcdef"), "token=***");
  }

  #[test]
  fn test_short_values_are_masked() {
    let redactor = Redactor::new();
    redactor.add("q7");
    redactor.add("   ");
    assert_eq!(redactor.redact("pin=q7"), "pin=***");
    assert_eq!(redactor.redact("v1.0"), "v1.0");

    let blank = Redactor::new();
    blank.add("   ");
    assert!(blank.is_empty());
  }

  #[test]
  fn test_multiline_values() {
    let redactor = Redactor::new();
    redactor.add("-----BEGIN KEY-----\nMIIBOgIBAAJBAK\n-----END KEY-----");
    assert_eq!(redactor.redact("line: MIIBOgIBAAJBAK"), "line: ***");
  }

  #[test]
  fn test_clones_share_values() {
    let redactor = Redactor::new();
    let clone = redactor.clone();
    clone.add("shared-secret");
    assert_eq!(redactor.redact("shared-secret"), "***");
  }

  #[test]
  fn test_redact_value() {
    let redactor = Redactor::new();
    redactor.add("s3cr3t");
    let value = json!({"outputs": {"token": "s3cr3t", "count": 2}, "log": ["ok", "got s3cr3t"]});
    assert_eq!(
      redactor.redact_value(&value),
      json!({"outputs": {"token": "***", "count": 2}, "log": ["ok", "got ***"]})
    );
  }
}
