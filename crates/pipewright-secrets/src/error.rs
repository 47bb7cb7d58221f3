use thiserror::Error;

/// Errors returned by a [`SecretVault`](crate::SecretVault).
#[derive(Debug, Error)]
pub enum SecretError {
  /// The secret does not exist in the requested scope.
  #[error("secret not found: {name}")]
  NotFound { name: String },

  /// The backing store could not be read.
  #[error("failed to load secrets from {source_name}: {message}")]
  Load {
    source_name: String,
    message: String,
  },
}
