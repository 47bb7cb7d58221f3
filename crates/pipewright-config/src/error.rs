use thiserror::Error;

/// Errors that can occur while loading definitions.
#[derive(Debug, Error)]
pub enum ConfigError {
  /// The document is neither valid JSON nor valid YAML.
  #[error("failed to parse {format} document: {message}")]
  Parse { format: String, message: String },

  /// The document parsed but does not match the definition schema.
  #[error("invalid {kind} definition: {source}")]
  Schema {
    kind: &'static str,
    #[source]
    source: serde_json::Error,
  },

  /// The document has neither `jobs` nor `steps`.
  #[error("document is neither a workflow (no 'jobs') nor an action (no 'steps')")]
  UnknownDocument,

  /// The document has the wrong shape for where it is used.
  #[error("expected a {expected} document")]
  UnexpectedDocument { expected: &'static str },

  /// A `uses:` reference could not be parsed.
  #[error("invalid reference '{reference}': {message}")]
  InvalidReference { reference: String, message: String },
}
