//! `${{ ... }}` interpolation.

use crate::ast::Path;
use crate::context::Context;
use crate::error::ExpressionError;
use crate::eval::evaluate;
use crate::parser::parse;
use crate::value::to_display_string;

const OPEN: &str = "${{";
const CLOSE: &str = "}}";

/// A piece of a template: literal text or an embedded expression.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Piece<'a> {
  Text(&'a str),
  Expression(&'a str),
}

/// Split a template into literal text and expression bodies. Closing braces
/// inside single-quoted strings do not end an expression.
fn split(template: &str) -> Result<Vec<Piece<'_>>, ExpressionError> {
  let mut pieces = Vec::new();
  let mut rest = template;

  while let Some(start) = rest.find(OPEN) {
    if start > 0 {
      pieces.push(Piece::Text(&rest[..start]));
    }
    let body_start = start + OPEN.len();
    let end = find_close(&rest[body_start..]).ok_or_else(|| ExpressionError::Syntax {
      expression: template.to_string(),
      message: "unterminated '${{'".to_string(),
    })?;
    pieces.push(Piece::Expression(rest[body_start..body_start + end].trim()));
    rest = &rest[body_start + end + CLOSE.len()..];
  }

  if !rest.is_empty() {
    pieces.push(Piece::Text(rest));
  }
  Ok(pieces)
}

fn find_close(body: &str) -> Option<usize> {
  let bytes = body.as_bytes();
  let mut in_string = false;
  let mut i = 0;
  while i < bytes.len() {
    match bytes[i] {
      b'\'' => in_string = !in_string,
      b'}' if !in_string && bytes.get(i + 1) == Some(&b'}') => return Some(i),
      _ => {}
    }
    i += 1;
  }
  None
}

/// The bodies of every `${{ ... }}` in a template, trimmed.
pub fn extract_expressions(template: &str) -> Result<Vec<&str>, ExpressionError> {
  Ok(
    split(template)?
      .into_iter()
      .filter_map(|piece| match piece {
        Piece::Expression(body) => Some(body),
        Piece::Text(_) => None,
      })
      .collect(),
  )
}

/// Substitute every expression in the template with its display string.
pub fn interpolate(template: &str, ctx: &Context) -> Result<String, ExpressionError> {
  let mut out = String::with_capacity(template.len());
  for piece in split(template)? {
    match piece {
      Piece::Text(text) => out.push_str(text),
      Piece::Expression(body) => {
        let value = evaluate(&parse(body)?, ctx)?;
        out.push_str(&to_display_string(&value));
      }
    }
  }
  Ok(out)
}

/// Strip an optional `${{ }}` wrapper from an `if:` condition.
pub fn normalize_condition(condition: &str) -> &str {
  let trimmed = condition.trim();
  match trimmed
    .strip_prefix(OPEN)
    .and_then(|inner| inner.strip_suffix(CLOSE))
  {
    // `${{ a }} && ${{ b }}` is not a single wrapped expression
    Some(inner) if !inner.contains(OPEN) => inner.trim(),
    _ => trimmed,
  }
}

/// Every context path referenced by the template's expressions.
pub fn template_references(template: &str) -> Result<Vec<Path>, ExpressionError> {
  let mut paths = Vec::new();
  for body in extract_expressions(template)? {
    let expr = parse(body)?;
    paths.extend(expr.references().into_iter().cloned());
  }
  Ok(paths)
}

/// Check that every expression in a template parses.
pub fn validate_template(template: &str) -> Result<(), ExpressionError> {
  for body in extract_expressions(template)? {
    parse(body)?;
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::context::scopes;
  use serde_json::json;

  #[test]
  fn test_interpolate_mixed_text() {
    let ctx = Context::new().with_scope(scopes::GITHUB, json!({"ref_name": "main", "run_id": 7}));
    assert_eq!(
      interpolate("Deploying ${{ github.ref_name }} (#${{github.run_id}})", &ctx).unwrap(),
      "Deploying main (#7)"
    );
  }

  #[test]
  fn test_interpolate_without_expressions() {
    assert_eq!(
      interpolate("echo plain", &Context::new()).unwrap(),
      "echo plain"
    );
  }

  #[test]
  fn test_braces_inside_string_literal() {
    let exprs = extract_expressions("${{ format('{{0}}', 'x') }}").unwrap();
    assert_eq!(exprs, vec!["format('{{0}}', 'x')"]);
  }

  #[test]
  fn test_unterminated_expression() {
    assert!(extract_expressions("echo ${{ inputs.x").is_err());
  }

  #[test]
  fn test_interpolate_propagates_unresolved() {
    assert!(matches!(
      interpolate("${{ inputs.missing }}", &Context::new()),
      Err(ExpressionError::UnresolvedReference { .. })
    ));
  }

  #[test]
  fn test_normalize_condition() {
    assert_eq!(normalize_condition("${{ success() }}"), "success()");
    assert_eq!(normalize_condition("  always() "), "always()");
    assert_eq!(
      normalize_condition("${{ a }} && ${{ b }}"),
      "${{ a }} && ${{ b }}"
    );
  }

  #[test]
  fn test_template_references() {
    let refs = template_references("${{ secrets.TOKEN }} ${{ inputs.a || env.B }}").unwrap();
    let names: Vec<String> = refs.iter().map(ToString::to_string).collect();
    assert_eq!(names, vec!["secrets.TOKEN", "inputs.a", "env.B"]);
  }

  #[test]
  fn test_validate_template() {
    assert!(validate_template("${{ inputs.a == 'x' }}").is_ok());
    assert!(validate_template("${{ inputs.a = 'x' }}").is_err());
  }
}
