use serde_json::Value;

use crate::ast::{BinaryOp, Expr, Function, Path, Segment};
use crate::context::Context;
use crate::error::ExpressionError;
use crate::parser::parse;
use crate::template::normalize_condition;
use crate::value::{is_truthy, loose_cmp, loose_eq, to_display_string};

/// Evaluate a parsed expression against a context.
pub fn evaluate(expr: &Expr, ctx: &Context) -> Result<Value, ExpressionError> {
  match expr {
    Expr::Literal(value) => Ok(value.clone()),
    Expr::Path(path) => lookup(path, ctx).cloned(),
    Expr::Not(inner) => Ok(Value::Bool(!is_truthy(&evaluate(inner, ctx)?))),
    Expr::Binary { op, left, right } => {
      let left = evaluate(left, ctx)?;
      let right = evaluate(right, ctx)?;
      let result = match op {
        BinaryOp::Eq => loose_eq(&left, &right),
        BinaryOp::Ne => !loose_eq(&left, &right),
        BinaryOp::Lt => loose_cmp(&left, &right).is_some_and(|o| o.is_lt()),
        BinaryOp::Le => loose_cmp(&left, &right).is_some_and(|o| o.is_le()),
        BinaryOp::Gt => loose_cmp(&left, &right).is_some_and(|o| o.is_gt()),
        BinaryOp::Ge => loose_cmp(&left, &right).is_some_and(|o| o.is_ge()),
      };
      Ok(Value::Bool(result))
    }
    Expr::And(left, right) => {
      let left = evaluate(left, ctx)?;
      if !is_truthy(&left) {
        return Ok(left);
      }
      evaluate(right, ctx)
    }
    Expr::Or(left, right) => {
      // An unresolved left operand takes the right operand as its default.
      let left = match evaluate(left, ctx) {
        Ok(value) => value,
        Err(ExpressionError::UnresolvedReference { .. }) => Value::Null,
        Err(e) => return Err(e),
      };
      if is_truthy(&left) {
        return Ok(left);
      }
      evaluate(right, ctx)
    }
    Expr::Call { function, args } => call(*function, args, ctx),
  }
}

/// Evaluate an `if:` predicate.
///
/// Accepts both `${{ expr }}` and bare forms. When the expression does not
/// call a status function it only runs if the preceding work succeeded
/// (an implicit `success() &&`).
pub fn evaluate_condition(condition: &str, ctx: &Context) -> Result<bool, ExpressionError> {
  let expr = parse(normalize_condition(condition))?;
  if !expr.uses_status_function() && !ctx.status().is_success() {
    return Ok(false);
  }
  Ok(is_truthy(&evaluate(&expr, ctx)?))
}

fn lookup<'a>(path: &Path, ctx: &'a Context) -> Result<&'a Value, ExpressionError> {
  let unresolved = || ExpressionError::UnresolvedReference {
    path: path.to_string(),
  };

  let mut current = get_key(ctx.scopes(), &path.root).ok_or_else(unresolved)?;
  for segment in &path.segments {
    current = match (segment, current) {
      (Segment::Key(key), Value::Object(map)) => get_key(map, key),
      (Segment::Index(index), Value::Array(items)) => items.get(*index),
      _ => None,
    }
    .ok_or_else(unresolved)?;
  }
  Ok(current)
}

/// Exact key first, then a case-insensitive match.
fn get_key<'a>(map: &'a serde_json::Map<String, Value>, key: &str) -> Option<&'a Value> {
  map.get(key).or_else(|| {
    map
      .iter()
      .find(|(candidate, _)| candidate.eq_ignore_ascii_case(key))
      .map(|(_, value)| value)
  })
}

fn call(function: Function, args: &[Expr], ctx: &Context) -> Result<Value, ExpressionError> {
  let status = ctx.status();
  let values = args
    .iter()
    .map(|arg| evaluate(arg, ctx))
    .collect::<Result<Vec<_>, _>>()?;

  match function {
    Function::Contains => match &values[0] {
      Value::Array(items) => Ok(Value::Bool(
        items.iter().any(|item| loose_eq(item, &values[1])),
      )),
      haystack => Ok(Value::Bool(
        to_display_string(haystack)
          .to_lowercase()
          .contains(&to_display_string(&values[1]).to_lowercase()),
      )),
    },
    Function::StartsWith => Ok(Value::Bool(
      to_display_string(&values[0])
        .to_lowercase()
        .starts_with(&to_display_string(&values[1]).to_lowercase()),
    )),
    Function::EndsWith => Ok(Value::Bool(
      to_display_string(&values[0])
        .to_lowercase()
        .ends_with(&to_display_string(&values[1]).to_lowercase()),
    )),
    Function::Format => format(&values).map(Value::String),
    Function::Join => {
      let separator = values
        .get(1)
        .map(to_display_string)
        .unwrap_or_else(|| ",".to_string());
      let joined = match &values[0] {
        Value::Array(items) => items
          .iter()
          .map(to_display_string)
          .collect::<Vec<_>>()
          .join(&separator),
        other => to_display_string(other),
      };
      Ok(Value::String(joined))
    }
    Function::ToJson => serde_json::to_string_pretty(&values[0])
      .map(Value::String)
      .map_err(|e| ExpressionError::InvalidArgument {
        function: function.name().to_string(),
        message: e.to_string(),
      }),
    Function::Success => Ok(Value::Bool(status.is_success())),
    Function::Failure => Ok(Value::Bool(status.failed)),
    Function::Always => Ok(Value::Bool(true)),
    Function::Cancelled => Ok(Value::Bool(status.cancelled)),
  }
}

/// `format('{0} and {1}', a, b)` with `{{` / `}}` escapes.
fn format(values: &[Value]) -> Result<String, ExpressionError> {
  let invalid = |message: String| ExpressionError::InvalidArgument {
    function: Function::Format.name().to_string(),
    message,
  };

  let template = to_display_string(&values[0]);
  let args = &values[1..];
  let mut out = String::new();
  let mut chars = template.chars().peekable();

  while let Some(c) = chars.next() {
    match c {
      '{' if chars.peek() == Some(&'{') => {
        chars.next();
        out.push('{');
      }
      '}' if chars.peek() == Some(&'}') => {
        chars.next();
        out.push('}');
      }
      '{' => {
        let mut digits = String::new();
        loop {
          match chars.next() {
            Some('}') => break,
            Some(d) if d.is_ascii_digit() => digits.push(d),
            _ => return Err(invalid(format!("malformed placeholder in '{}'", template))),
          }
        }
        let index: usize = digits
          .parse()
          .map_err(|_| invalid(format!("malformed placeholder in '{}'", template)))?;
        let arg = args
          .get(index)
          .ok_or_else(|| invalid(format!("placeholder {{{}}} has no argument", index)))?;
        out.push_str(&to_display_string(arg));
      }
      '}' => return Err(invalid(format!("unmatched '}}' in '{}'", template))),
      other => out.push(other),
    }
  }

  Ok(out)
}
