use thiserror::Error;

/// Errors produced while parsing or evaluating an expression.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExpressionError {
  /// The expression text does not follow the grammar.
  #[error("invalid expression '{expression}': {message}")]
  Syntax { expression: String, message: String },

  /// A referenced scope or key is absent and no default was given.
  #[error("unresolved reference '{path}'")]
  UnresolvedReference { path: String },

  /// A function was called with the wrong number of arguments.
  #[error("function '{function}' expects {expected} argument(s), got {actual}")]
  Arity {
    function: String,
    expected: String,
    actual: usize,
  },

  /// An unknown function name was used.
  #[error("unknown function '{0}'")]
  UnknownFunction(String),

  /// A function rejected its arguments.
  #[error("invalid argument to '{function}': {message}")]
  InvalidArgument { function: String, message: String },
}
