use std::fmt;

use crate::lexer::is_identifier_character;

/// A parsed expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
  Literal(serde_json::Value),
  Path(Path),
  Not(Box<Expr>),
  Binary {
    op: BinaryOp,
    left: Box<Expr>,
    right: Box<Expr>,
  },
  And(Box<Expr>, Box<Expr>),
  Or(Box<Expr>, Box<Expr>),
  Call {
    function: Function,
    args: Vec<Expr>,
  },
}

impl Expr {
  /// Whether the expression calls `success()`, `failure()`, `always()` or
  /// `cancelled()` anywhere.
  pub fn uses_status_function(&self) -> bool {
    match self {
      Expr::Literal(_) | Expr::Path(_) => false,
      Expr::Not(inner) => inner.uses_status_function(),
      Expr::Binary { left, right, .. } | Expr::And(left, right) | Expr::Or(left, right) => {
        left.uses_status_function() || right.uses_status_function()
      }
      Expr::Call { function, args } => {
        function.is_status_check() || args.iter().any(Expr::uses_status_function)
      }
    }
  }

  /// All context paths referenced by the expression, in source order.
  pub fn references(&self) -> Vec<&Path> {
    let mut paths = Vec::new();
    self.collect_references(&mut paths);
    paths
  }

  fn collect_references<'a>(&'a self, paths: &mut Vec<&'a Path>) {
    match self {
      Expr::Literal(_) => {}
      Expr::Path(path) => paths.push(path),
      Expr::Not(inner) => inner.collect_references(paths),
      Expr::Binary { left, right, .. } | Expr::And(left, right) | Expr::Or(left, right) => {
        left.collect_references(paths);
        right.collect_references(paths);
      }
      Expr::Call { args, .. } => {
        for arg in args {
          arg.collect_references(paths);
        }
      }
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
  Eq,
  Ne,
  Lt,
  Le,
  Gt,
  Ge,
}

/// The fixed set of callable functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
  Contains,
  StartsWith,
  EndsWith,
  Format,
  Join,
  ToJson,
  Success,
  Failure,
  Always,
  Cancelled,
}

impl Function {
  /// Look up a function by name. Names are case-insensitive.
  pub fn from_name(name: &str) -> Option<Self> {
    let function = match name.to_ascii_lowercase().as_str() {
      "contains" => Function::Contains,
      "startswith" => Function::StartsWith,
      "endswith" => Function::EndsWith,
      "format" => Function::Format,
      "join" => Function::Join,
      "tojson" => Function::ToJson,
      "success" => Function::Success,
      "failure" => Function::Failure,
      "always" => Function::Always,
      "cancelled" => Function::Cancelled,
      _ => return None,
    };
    Some(function)
  }

  pub fn name(self) -> &'static str {
    match self {
      Function::Contains => "contains",
      Function::StartsWith => "startsWith",
      Function::EndsWith => "endsWith",
      Function::Format => "format",
      Function::Join => "join",
      Function::ToJson => "toJSON",
      Function::Success => "success",
      Function::Failure => "failure",
      Function::Always => "always",
      Function::Cancelled => "cancelled",
    }
  }

  /// Accepted argument counts as (min, max).
  pub(crate) fn arity(self) -> (usize, usize) {
    match self {
      Function::Contains | Function::StartsWith | Function::EndsWith => (2, 2),
      Function::Format => (1, usize::MAX),
      Function::Join => (1, 2),
      Function::ToJson => (1, 1),
      Function::Success | Function::Failure | Function::Always | Function::Cancelled => (0, 0),
    }
  }

  pub fn is_status_check(self) -> bool {
    matches!(
      self,
      Function::Success | Function::Failure | Function::Always | Function::Cancelled
    )
  }
}

/// A dotted context path such as `needs.build.outputs.version`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Path {
  pub root: String,
  pub segments: Vec<Segment>,
}

impl Path {
  /// The first key below the root, e.g. `TOKEN` for `secrets.TOKEN`.
  pub fn first_key(&self) -> Option<&str> {
    match self.segments.first() {
      Some(Segment::Key(key)) => Some(key),
      _ => None,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
  Key(String),
  Index(usize),
}

impl fmt::Display for Path {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.root)?;
    for segment in &self.segments {
      match segment {
        Segment::Key(key) if !key.is_empty() && key.chars().all(is_identifier_character) => {
          write!(f, ".{}", key)?
        }
        Segment::Key(key) => write!(f, "['{}']", key.replace('\'', "''"))?,
        Segment::Index(index) => write!(f, "[{}]", index)?,
      }
    }
    Ok(())
  }
}
