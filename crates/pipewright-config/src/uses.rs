use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Reference to a reusable workflow or composite action.
///
/// Two forms are accepted:
/// - local references relative to the registry root, e.g. `./actions/setup-node`
/// - named references with an optional version, e.g. `acme/deploy@v2`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UsesRef {
  /// Reference name, e.g. "acme/deploy" or "./actions/setup-node"
  pub name: String,

  /// Optional version, e.g. "v2".
  /// If not specified, the registry uses the latest available version.
  pub version: Option<String>,
}

impl UsesRef {
  /// Parse a `uses:` string.
  pub fn parse(raw: &str) -> Result<Self, ConfigError> {
    let raw = raw.trim();
    if raw.is_empty() {
      return Err(ConfigError::InvalidReference {
        reference: raw.to_string(),
        message: "reference cannot be empty".to_string(),
      });
    }

    if raw.starts_with("./") {
      if raw.contains('@') {
        return Err(ConfigError::InvalidReference {
          reference: raw.to_string(),
          message: "local references cannot carry a version".to_string(),
        });
      }
      return Ok(Self {
        name: raw.to_string(),
        version: None,
      });
    }

    let (name, version) = match raw.rsplit_once('@') {
      Some((name, version)) => (name, Some(version)),
      None => (raw, None),
    };

    if name.is_empty() || version.is_some_and(str::is_empty) {
      return Err(ConfigError::InvalidReference {
        reference: raw.to_string(),
        message: "expected 'name' or 'name@version'".to_string(),
      });
    }

    Ok(Self {
      name: name.to_string(),
      version: version.map(str::to_string),
    })
  }

  /// Whether this reference points into the registry root directly.
  pub fn is_local(&self) -> bool {
    self.name.starts_with("./")
  }
}

impl fmt::Display for UsesRef {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &self.version {
      Some(version) => write!(f, "{}@{}", self.name, version),
      None => write!(f, "{}", self.name),
    }
  }
}

impl FromStr for UsesRef {
  type Err = ConfigError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Self::parse(s)
  }
}

impl TryFrom<String> for UsesRef {
  type Error = ConfigError;

  fn try_from(value: String) -> Result<Self, Self::Error> {
    Self::parse(&value)
  }
}

impl From<UsesRef> for String {
  fn from(value: UsesRef) -> Self {
    value.to_string()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_parse_named_with_version() {
    let r = UsesRef::parse("acme/deploy@v2").unwrap();
    assert_eq!(r.name, "acme/deploy");
    assert_eq!(r.version.as_deref(), Some("v2"));
    assert!(!r.is_local());
    assert_eq!(r.to_string(), "acme/deploy@v2");
  }

  #[test]
  fn test_parse_named_without_version() {
    let r = UsesRef::parse("setup-node").unwrap();
    assert_eq!(r.name, "setup-node");
    assert_eq!(r.version, None);
  }

  #[test]
  fn test_parse_local() {
    let r = UsesRef::parse("./actions/setup-node").unwrap();
    assert!(r.is_local());
    assert_eq!(r.to_string(), "./actions/setup-node");
  }

  #[test]
  fn test_parse_invalid() {
    assert!(UsesRef::parse("").is_err());
    assert!(UsesRef::parse("acme/deploy@").is_err());
    assert!(UsesRef::parse("@v1").is_err());
    assert!(UsesRef::parse("./local@v1").is_err());
  }
}
