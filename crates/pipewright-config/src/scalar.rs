//! Deserialization helpers for the loose shapes CI definitions allow.

use indexmap::IndexMap;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer};

use crate::input::{InputValue, scalar_to_string};

/// Deserialize a map whose values are scalars into template strings.
pub(crate) fn scalar_map<'de, D>(deserializer: D) -> Result<IndexMap<String, InputValue>, D::Error>
where
  D: Deserializer<'de>,
{
  let raw: IndexMap<String, serde_json::Value> = IndexMap::deserialize(deserializer)?;
  raw
    .into_iter()
    .map(|(key, value)| match scalar_to_string(&value) {
      Some(s) => Ok((key, s)),
      None => Err(D::Error::custom(format!(
        "value for '{}' must be a string, number or boolean",
        key
      ))),
    })
    .collect()
}

/// Deserialize an optional scalar into its string form.
pub(crate) fn optional_scalar<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
  D: Deserializer<'de>,
{
  let raw: Option<serde_json::Value> = Option::deserialize(deserializer)?;
  match raw {
    None => Ok(None),
    Some(value) => scalar_to_string(&value)
      .map(Some)
      .ok_or_else(|| D::Error::custom("expected a string, number or boolean")),
  }
}

/// Deserialize either a single string or a list of strings.
pub(crate) fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
  D: Deserializer<'de>,
{
  #[derive(Deserialize)]
  #[serde(untagged)]
  enum OneOrMany {
    One(String),
    Many(Vec<String>),
  }

  Ok(match OneOrMany::deserialize(deserializer)? {
    OneOrMany::One(s) => vec![s],
    OneOrMany::Many(v) => v,
  })
}

/// Deserialize the `on:` key: a single event, a list of events, or a map
/// keyed by event name (the per-event configuration is ignored).
pub(crate) fn event_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
  D: Deserializer<'de>,
{
  let raw = serde_json::Value::deserialize(deserializer)?;
  match raw {
    serde_json::Value::Null => Ok(Vec::new()),
    serde_json::Value::String(s) => Ok(vec![s]),
    serde_json::Value::Array(items) => items
      .into_iter()
      .map(|item| match item {
        serde_json::Value::String(s) => Ok(s),
        other => Err(D::Error::custom(format!("invalid event name: {}", other))),
      })
      .collect(),
    serde_json::Value::Object(map) => Ok(map.into_iter().map(|(k, _)| k).collect()),
    other => Err(D::Error::custom(format!("invalid 'on' value: {}", other))),
  }
}

/// Deserialize a `secrets:` binding table.
///
/// The `inherit` shorthand is rejected: every secret crossing a call boundary
/// must be forwarded by name.
pub(crate) fn secret_bindings<'de, D>(
  deserializer: D,
) -> Result<IndexMap<String, InputValue>, D::Error>
where
  D: Deserializer<'de>,
{
  #[derive(Deserialize)]
  #[serde(untagged)]
  enum Bindings {
    Keyword(String),
    Table(IndexMap<String, serde_json::Value>),
  }

  match Option::<Bindings>::deserialize(deserializer)? {
    None => Ok(IndexMap::new()),
    Some(Bindings::Keyword(keyword)) if keyword == "inherit" => Err(D::Error::custom(
      "'secrets: inherit' is not supported; forward each secret explicitly",
    )),
    Some(Bindings::Keyword(other)) => Err(D::Error::custom(format!(
      "invalid secrets binding '{}'",
      other
    ))),
    Some(Bindings::Table(map)) => map
      .into_iter()
      .map(|(key, value)| match scalar_to_string(&value) {
        Some(s) => Ok((key, s)),
        None => Err(D::Error::custom(format!(
          "secret binding '{}' must be a string",
          key
        ))),
      })
      .collect(),
  }
}
