//! Expression and reference checks shared by workflow and action locking.

use indexmap::IndexMap;
use pipewright_config::{InputDecl, SecretDecl};
use pipewright_expr::{Path, normalize_condition, parse, scopes, template_references};

use crate::error::WorkflowError;

/// What a template at a given location may reference.
#[derive(Clone, Copy)]
pub(crate) struct Rules<'a> {
  pub roots: &'a [&'static str],
  pub inputs: &'a IndexMap<String, InputDecl>,
  pub secrets: &'a IndexMap<String, SecretDecl>,
  /// Jobs listed in `needs`.
  pub needs: &'a [String],
  /// Step ids visible at this location.
  pub steps: &'a [String],
  /// All job ids, for workflow outputs.
  pub jobs: &'a [String],
}

/// Check every `${{ }}` in a template.
pub(crate) fn check_template(path: &str, template: &str, rules: &Rules) -> Result<(), WorkflowError> {
  let references = template_references(template).map_err(|source| WorkflowError::InvalidExpression {
    path: path.to_string(),
    source,
  })?;
  check_references(path, &references, rules)
}

/// Check an `if:` condition, bare or wrapped.
pub(crate) fn check_condition(
  path: &str,
  condition: &str,
  rules: &Rules,
) -> Result<(), WorkflowError> {
  let expr = parse(normalize_condition(condition)).map_err(|source| {
    WorkflowError::InvalidExpression {
      path: path.to_string(),
      source,
    }
  })?;
  let references: Vec<Path> = expr.references().into_iter().cloned().collect();
  check_references(path, &references, rules)
}

fn check_references(path: &str, references: &[Path], rules: &Rules) -> Result<(), WorkflowError> {
  for reference in references {
    let root = reference.root.to_ascii_lowercase();
    let undeclared = || WorkflowError::UndeclaredReference {
      path: path.to_string(),
      reference: reference.to_string(),
    };

    if !rules.roots.contains(&root.as_str()) {
      return Err(undeclared());
    }

    // A bare scope reference such as `toJSON(inputs)` is always fine
    let Some(key) = reference.first_key() else {
      continue;
    };

    let declared = match root.as_str() {
      scopes::INPUTS => contains(rules.inputs.keys(), key),
      scopes::SECRETS => contains(rules.secrets.keys(), key),
      scopes::NEEDS => contains(rules.needs.iter(), key),
      scopes::STEPS => contains(rules.steps.iter(), key),
      scopes::JOBS => contains(rules.jobs.iter(), key),
      _ => true,
    };
    if !declared {
      return Err(undeclared());
    }
  }
  Ok(())
}

fn contains<'a>(mut names: impl Iterator<Item = &'a String>, key: &str) -> bool {
  names.any(|name| name.eq_ignore_ascii_case(key))
}

/// Job and step ids: a letter or `_` followed by letters, digits, `-` or `_`.
pub(crate) fn is_identifier(id: &str) -> bool {
  let mut chars = id.chars();
  chars
    .next()
    .is_some_and(|first| first.is_ascii_alphabetic() || first == '_')
    && chars.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
