//! Loading definitions from JSON or YAML text.

use std::fmt;
use std::path::Path;

use serde::de::{self, Deserialize, Deserializer, MapAccess, SeqAccess, Visitor};
use serde_json::{Map, Number, Value};

use crate::action::ActionDef;
use crate::error::ConfigError;
use crate::workflow::WorkflowDef;

/// Serialization format of a definition file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
  Json,
  Yaml,
}

impl Format {
  /// Pick the format from a file extension. Anything but `.json` is YAML.
  pub fn from_path(path: &Path) -> Self {
    match path.extension().and_then(|e| e.to_str()) {
      Some(ext) if ext.eq_ignore_ascii_case("json") => Format::Json,
      _ => Format::Yaml,
    }
  }

  fn name(self) -> &'static str {
    match self {
      Format::Json => "JSON",
      Format::Yaml => "YAML",
    }
  }
}

/// A parsed definition file.
#[derive(Debug, Clone, PartialEq)]
pub enum Document {
  Workflow(WorkflowDef),
  Action(ActionDef),
}

impl Document {
  /// Parse a document, classifying it by its top-level keys.
  pub fn parse(content: &str, format: Format) -> Result<Self, ConfigError> {
    let value = parse_value(content, format)?;

    let is_workflow = value.get("jobs").is_some();
    let is_action = value.get("steps").is_some();

    if is_workflow {
      serde_json::from_value(value)
        .map(Document::Workflow)
        .map_err(|source| ConfigError::Schema {
          kind: "workflow",
          source,
        })
    } else if is_action {
      serde_json::from_value(value)
        .map(Document::Action)
        .map_err(|source| ConfigError::Schema {
          kind: "action",
          source,
        })
    } else {
      Err(ConfigError::UnknownDocument)
    }
  }

  /// Parse a document that must be a workflow.
  pub fn parse_workflow(content: &str, format: Format) -> Result<WorkflowDef, ConfigError> {
    match Self::parse(content, format)? {
      Document::Workflow(def) => Ok(def),
      Document::Action(_) => Err(ConfigError::UnexpectedDocument {
        expected: "workflow",
      }),
    }
  }
}

fn parse_value(content: &str, format: Format) -> Result<Value, ConfigError> {
  let parse_error = |message: String| ConfigError::Parse {
    format: format.name().to_string(),
    message,
  };

  let parsed = match format {
    Format::Json => serde_json::from_str::<UniqueKeys>(content).map_err(|e| parse_error(e.to_string())),
    Format::Yaml => serde_yaml::from_str::<UniqueKeys>(content).map_err(|e| parse_error(e.to_string())),
  };
  parsed.map(|UniqueKeys(value)| value)
}

/// A JSON value that fails to deserialize when any mapping repeats a key.
struct UniqueKeys(Value);

impl<'de> Deserialize<'de> for UniqueKeys {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    deserializer.deserialize_any(UniqueKeysVisitor).map(UniqueKeys)
  }
}

struct UniqueKeysVisitor;

impl<'de> Visitor<'de> for UniqueKeysVisitor {
  type Value = Value;

  fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
    f.write_str("a definition document")
  }

  fn visit_bool<E: de::Error>(self, v: bool) -> Result<Value, E> {
    Ok(Value::Bool(v))
  }

  fn visit_i64<E: de::Error>(self, v: i64) -> Result<Value, E> {
    Ok(Value::from(v))
  }

  fn visit_u64<E: de::Error>(self, v: u64) -> Result<Value, E> {
    Ok(Value::from(v))
  }

  fn visit_f64<E: de::Error>(self, v: f64) -> Result<Value, E> {
    Ok(Number::from_f64(v).map_or(Value::Null, Value::Number))
  }

  fn visit_str<E: de::Error>(self, v: &str) -> Result<Value, E> {
    Ok(Value::String(v.to_string()))
  }

  fn visit_string<E: de::Error>(self, v: String) -> Result<Value, E> {
    Ok(Value::String(v))
  }

  fn visit_unit<E: de::Error>(self) -> Result<Value, E> {
    Ok(Value::Null)
  }

  fn visit_none<E: de::Error>(self) -> Result<Value, E> {
    Ok(Value::Null)
  }

  fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<Value, D::Error> {
    UniqueKeys::deserialize(deserializer).map(|UniqueKeys(value)| value)
  }

  fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Value, A::Error> {
    let mut items = Vec::new();
    while let Some(UniqueKeys(item)) = seq.next_element()? {
      items.push(item);
    }
    Ok(Value::Array(items))
  }

  fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Value, A::Error> {
    let mut entries = Map::new();
    while let Some(key) = map.next_key::<String>()? {
      if entries.contains_key(&key) {
        return Err(de::Error::custom(format!("duplicate key '{}'", key)));
      }
      let UniqueKeys(value) = map.next_value()?;
      entries.insert(key, value);
    }
    Ok(Value::Object(entries))
  }
}
