//! Coercion rules shared by comparisons and functions.

use std::cmp::Ordering;

use serde_json::Value;

/// Truthiness: `false`, `0`, `""`, `null` and `NaN` are falsy, everything
/// else (including empty arrays and objects) is truthy.
pub fn is_truthy(value: &Value) -> bool {
  match value {
    Value::Null => false,
    Value::Bool(b) => *b,
    Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
    Value::String(s) => !s.is_empty(),
    Value::Array(_) | Value::Object(_) => true,
  }
}

/// Render a value the way it is substituted into a template.
pub fn to_display_string(value: &Value) -> String {
  match value {
    Value::Null => String::new(),
    Value::String(s) => s.clone(),
    Value::Bool(b) => b.to_string(),
    Value::Number(n) => n.to_string(),
    Value::Array(_) | Value::Object(_) => value.to_string(),
  }
}

/// Loose equality.
///
/// Strings compare case-insensitively. Values of different primitive types
/// are coerced to numbers. Arrays and objects are only equal to themselves
/// structurally.
pub fn loose_eq(left: &Value, right: &Value) -> bool {
  match (left, right) {
    (Value::String(a), Value::String(b)) => a.to_lowercase() == b.to_lowercase(),
    (Value::Null, Value::Null) => true,
    (Value::Bool(a), Value::Bool(b)) => a == b,
    (Value::Array(_) | Value::Object(_), _) | (_, Value::Array(_) | Value::Object(_)) => {
      left == right
    }
    _ => {
      let (a, b) = (to_number(left), to_number(right));
      !a.is_nan() && !b.is_nan() && a == b
    }
  }
}

/// Ordering for `<`, `<=`, `>` and `>=`. `None` when the values are not
/// comparable, which makes every ordering operator false.
pub(crate) fn loose_cmp(left: &Value, right: &Value) -> Option<Ordering> {
  match (left, right) {
    (Value::String(a), Value::String(b)) => Some(a.to_lowercase().cmp(&b.to_lowercase())),
    (Value::Array(_) | Value::Object(_), _) | (_, Value::Array(_) | Value::Object(_)) => None,
    _ => to_number(left).partial_cmp(&to_number(right)),
  }
}

/// Numeric coercion. Empty strings and null are zero, unparseable strings
/// are `NaN`.
pub(crate) fn to_number(value: &Value) -> f64 {
  match value {
    Value::Null => 0.0,
    Value::Bool(true) => 1.0,
    Value::Bool(false) => 0.0,
    Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
    Value::String(s) => {
      let trimmed = s.trim();
      if trimmed.is_empty() {
        0.0
      } else if let Some(hex) = trimmed.strip_prefix("0x") {
        i64::from_str_radix(hex, 16)
          .map(|n| n as f64)
          .unwrap_or(f64::NAN)
      } else {
        trimmed.parse::<f64>().unwrap_or(f64::NAN)
      }
    }
    Value::Array(_) | Value::Object(_) => f64::NAN,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_truthiness() {
    for falsy in [json!(false), json!(0), json!(""), json!(null), json!(0.0)] {
      assert!(!is_truthy(&falsy), "{} should be falsy", falsy);
    }
    for truthy in [json!(true), json!(1), json!("false"), json!([]), json!({})] {
      assert!(is_truthy(&truthy), "{} should be truthy", truthy);
    }
  }

  #[test]
  fn test_loose_eq_strings_ignore_case() {
    assert!(loose_eq(&json!("Push"), &json!("push")));
    assert!(!loose_eq(&json!("push"), &json!("pull_request")));
  }

  #[test]
  fn test_loose_eq_coerces_mixed_types() {
    assert!(loose_eq(&json!("1"), &json!(1)));
    assert!(loose_eq(&json!(true), &json!(1)));
    assert!(loose_eq(&json!(""), &json!(0)));
    assert!(loose_eq(&json!(null), &json!(0)));
    assert!(!loose_eq(&json!("abc"), &json!(0)));
  }

  #[test]
  fn test_loose_cmp() {
    assert_eq!(loose_cmp(&json!(2), &json!("10")), Some(Ordering::Less));
    assert_eq!(loose_cmp(&json!("b"), &json!("A")), Some(Ordering::Greater));
    assert_eq!(loose_cmp(&json!("x"), &json!(1)), None);
    assert_eq!(loose_cmp(&json!([1]), &json!(1)), None);
  }

  #[test]
  fn test_display_string() {
    assert_eq!(to_display_string(&json!(null)), "");
    assert_eq!(to_display_string(&json!("v1.2")), "v1.2");
    assert_eq!(to_display_string(&json!(3)), "3");
    assert_eq!(to_display_string(&json!(["a", 1])), r#"["a",1]"#);
  }
}
