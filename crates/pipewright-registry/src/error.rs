use std::path::PathBuf;

use pipewright_config::ConfigError;
use thiserror::Error;

/// Errors that can occur during registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
  /// I/O error reading from the registry.
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  /// A definition file exists but could not be loaded.
  #[error("failed to load {}: {source}", path.display())]
  Definition {
    path: PathBuf,
    #[source]
    source: ConfigError,
  },

  /// The reference cannot be resolved inside the registry root.
  #[error("invalid reference '{reference}': {message}")]
  InvalidReference { reference: String, message: String },
}
