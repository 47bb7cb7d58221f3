//! Per-workflow execution state and just-in-time secret resolution.

use std::collections::BTreeSet;
use std::sync::Arc;

use indexmap::IndexMap;
use pipewright_config::InputDecl;
use pipewright_expr::{Context, Path, interpolate, normalize_condition, parse, scopes, template_references};
use pipewright_secrets::{SecretError, SecretScope, SecretValue};
use pipewright_workflow::{RetryPolicy, Workflow};
use serde_json::{Map, Value};

use crate::result::{FailureKind, FailureReport};
use crate::runtime::Runtime;

/// Where a secret visible to a workflow or action comes from.
#[derive(Debug, Clone)]
pub(crate) enum SecretSource {
  /// A root workflow secret, looked up in the vault on first use.
  Vault { name: String, required: bool },
  /// A value forwarded by a call binding.
  Bound(SecretValue),
}

/// Secrets visible in one workflow or action, by declared name.
pub(crate) type SecretBindings = Arc<IndexMap<String, SecretSource>>;

/// One executing workflow: the root run or a called reusable workflow.
pub(crate) struct WorkflowFrame {
  /// Location of the calling job; empty for the root workflow.
  pub path: String,
  pub workflow: Arc<Workflow>,
  pub inputs: Value,
  pub github: Value,
  pub secrets: SecretBindings,
  /// Environment inherited by jobs that do not select one.
  pub environment: Option<String>,
  pub retry: RetryPolicy,
  pub depth: usize,
}

impl WorkflowFrame {
  pub fn child_path(&self, segment: &str) -> String {
    join_path(&self.path, segment)
  }
}

pub(crate) fn join_path(prefix: &str, segment: &str) -> String {
  if prefix.is_empty() {
    segment.to_string()
  } else {
    format!("{}/{}", prefix, segment)
  }
}

/// Paths referenced by a `${{ }}` template. Templates were validated when
/// the workflow was locked.
pub(crate) fn template_paths(template: &str) -> Vec<Path> {
  template_references(template).unwrap_or_default()
}

/// Paths referenced by an `if:` condition.
pub(crate) fn condition_paths(condition: &str) -> Vec<Path> {
  parse(normalize_condition(condition))
    .map(|expr| expr.references().into_iter().cloned().collect())
    .unwrap_or_default()
}

/// Names referenced under `secrets`. A reference to the whole scope yields
/// `None`, meaning every binding.
pub(crate) fn secret_names(paths: &[Path]) -> Option<BTreeSet<String>> {
  let mut names = BTreeSet::new();
  for path in paths {
    if !path.root.eq_ignore_ascii_case(scopes::SECRETS) {
      continue;
    }
    match path.first_key() {
      Some(name) => names.insert(name.to_string()),
      None => return None,
    };
  }
  Some(names)
}

/// Whether a template's value derives from a secret, either directly or
/// through an `env` entry in `secret_env`.
pub(crate) fn derives_from_secret(template: &str, secret_env: &BTreeSet<String>) -> bool {
  template_paths(template).iter().any(|path| {
    if path.root.eq_ignore_ascii_case(scopes::SECRETS) {
      return true;
    }
    path.root.eq_ignore_ascii_case(scopes::ENV)
      && match path.first_key() {
        Some(key) => secret_env.contains(key),
        None => !secret_env.is_empty(),
      }
  })
}

/// Resolve the referenced secrets into a `secrets` scope.
///
/// Only names bound in `bindings` are looked up. A referenced but unbound
/// secret stays absent, so the expression fails with an unresolved
/// reference unless it supplies a default. Every resolved value is
/// registered with the runtime's redactor.
pub(crate) async fn resolve_secrets(
  rt: &Runtime,
  bindings: &SecretBindings,
  paths: &[Path],
  scope: &SecretScope,
  path: &str,
) -> Result<Value, FailureReport> {
  let wanted = secret_names(paths);
  let mut resolved = Map::new();

  for (name, source) in bindings.iter() {
    let referenced = match &wanted {
      Some(names) => names.iter().any(|n| n.eq_ignore_ascii_case(name)),
      None => true,
    };
    if !referenced {
      continue;
    }

    let value = match source {
      SecretSource::Bound(value) => value.clone(),
      SecretSource::Vault {
        name: vault_name,
        required,
      } => match rt.vault().resolve(vault_name, scope).await {
        Ok(value) => value,
        Err(SecretError::NotFound { .. }) if !required => continue,
        Err(e) => {
          return Err(FailureReport::new(
            FailureKind::SecretNotFound,
            path,
            format!("secret '{}': {}", name, e),
          ));
        }
      },
    };

    rt.redactor().add(value.expose());
    resolved.insert(name.clone(), Value::String(value.expose().to_string()));
  }

  Ok(Value::Object(resolved))
}

/// Bind a callee's declared inputs from a call's `with:` templates,
/// evaluated in the caller's context. Unbound optional inputs without a
/// default stay absent.
pub(crate) fn bind_inputs(
  declared: &IndexMap<String, InputDecl>,
  with: &IndexMap<String, String>,
  ctx: &Context,
  path: &str,
) -> Result<Map<String, Value>, FailureReport> {
  let mut inputs = Map::new();
  for (name, decl) in declared {
    let bound = with
      .iter()
      .find(|(key, _)| key.eq_ignore_ascii_case(name))
      .map(|(_, template)| template);
    let value = match (bound, &decl.default) {
      (Some(template), _) => interpolate(template, ctx).map_err(|e| {
        FailureReport::expression(path, &e).with_context(ctx.redacted_snapshot())
      })?,
      (None, Some(default)) => default.clone(),
      (None, None) if decl.required => {
        return Err(FailureReport::new(
          FailureKind::MissingRequiredInput,
          path,
          format!("required input '{}' is not bound", name),
        ));
      }
      (None, None) => continue,
    };
    inputs.insert(name.clone(), Value::String(value));
  }
  Ok(inputs)
}

/// Evaluate a call's `secrets:` templates into bindings for the callee.
/// The caller's secrets are never inherited.
pub(crate) fn bind_secrets(
  rt: &Runtime,
  with: &IndexMap<String, String>,
  ctx: &Context,
  path: &str,
) -> Result<SecretBindings, FailureReport> {
  let mut bindings = IndexMap::new();
  for (name, template) in with {
    let value = interpolate(template, ctx)
      .map_err(|e| FailureReport::expression(path, &e).with_context(ctx.redacted_snapshot()))?;
    rt.redactor().add(&value);
    bindings.insert(name.clone(), SecretSource::Bound(SecretValue::new(value)));
  }
  Ok(Arc::new(bindings))
}

/// Render string values of a JSON object map for a command environment.
pub(crate) fn env_strings(env: &Map<String, Value>) -> IndexMap<String, String> {
  env
    .iter()
    .map(|(k, v)| (k.clone(), pipewright_expr::to_display_string(v)))
    .collect()
}
