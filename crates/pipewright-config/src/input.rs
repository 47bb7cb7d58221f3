//! Value types for `with:`, `env:` and `outputs:` tables.
//!
//! All values are template strings that get resolved by the expression
//! evaluator at runtime. Scalars written without quotes in YAML (numbers and
//! booleans) are accepted and stored in their string form.
//!
//! # Examples
//!
//! ```yaml
//! with:
//!   node-version: 20
//!   registry: "${{ inputs.registry || 'https://registry.npmjs.org' }}"
//!   message: "Deploying ${{ github.ref_name }}"
//! ```
//!
//! After loading, every value is a string:
//! - `node-version` -> `"20"`
//! - `registry` -> resolved at runtime against the caller's context
//! - `message` -> resolved at runtime, the literal text is kept as-is

/// An input value is a template string that gets resolved at runtime.
pub type InputValue = String;

/// Convert a scalar JSON value into its template string form.
///
/// Returns `None` for arrays and objects, which are not valid input values.
pub fn scalar_to_string(value: &serde_json::Value) -> Option<String> {
  match value {
    serde_json::Value::String(s) => Some(s.clone()),
    serde_json::Value::Number(n) => Some(n.to_string()),
    serde_json::Value::Bool(b) => Some(b.to_string()),
    serde_json::Value::Null => Some(String::new()),
    serde_json::Value::Array(_) | serde_json::Value::Object(_) => None,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_scalar_to_string() {
    assert_eq!(scalar_to_string(&json!("x")), Some("x".to_string()));
    assert_eq!(scalar_to_string(&json!(20)), Some("20".to_string()));
    assert_eq!(scalar_to_string(&json!(1.5)), Some("1.5".to_string()));
    assert_eq!(scalar_to_string(&json!(true)), Some("true".to_string()));
    assert_eq!(scalar_to_string(&json!(null)), Some(String::new()));
    assert_eq!(scalar_to_string(&json!([1])), None);
  }
}
