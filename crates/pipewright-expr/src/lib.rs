//! Pipewright Expressions
//!
//! A small, side-effect-free expression language for `${{ ... }}`
//! interpolation and `if:` predicates. The grammar is deliberately
//! restricted: literals, dotted context paths, `!`, comparisons, `&&`, `||`,
//! parentheses and a fixed set of functions. There is no assignment, no
//! arithmetic and no user-defined code.
//!
//! ```text
//! expression := or
//! or         := and ( "||" and )*
//! and        := compare ( "&&" compare )*
//! compare    := unary ( ( "==" | "!=" | "<" | "<=" | ">" | ">=" ) unary )?
//! unary      := "!" unary | primary
//! primary    := literal | path | call | "(" expression ")"
//! path       := ident ( "." ident | "[" ( string | integer ) "]" )*
//! call       := ident "(" ( expression ( "," expression )* )? ")"
//! ```
//!
//! Evaluation is a pure function of an immutable [`Context`] and the
//! expression. Referencing an absent scope or key fails with
//! [`ExpressionError::UnresolvedReference`] unless the reference is the left
//! operand of `||`, which supplies the default.

mod ast;
mod context;
mod error;
mod eval;
mod lexer;
mod parser;
mod template;
mod value;

pub use ast::{BinaryOp, Expr, Function, Path, Segment};
pub use context::{CheckStatus, Context, REDACTED, scopes};
pub use error::ExpressionError;
pub use eval::{evaluate, evaluate_condition};
pub use parser::parse;
pub use template::{
  extract_expressions, interpolate, normalize_condition, template_references, validate_template,
};
pub use value::{is_truthy, loose_eq, to_display_string};
