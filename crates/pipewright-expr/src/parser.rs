//! Recursive-descent parser producing an [`Expr`].

use crate::ast::{BinaryOp, Expr, Function, Path, Segment};
use crate::error::ExpressionError;
use crate::lexer::{Token, tokenize};

/// Maximum nesting of parentheses, negations and calls.
const MAX_DEPTH: usize = 64;

/// Parse a bare expression (without the `${{ }}` wrapper).
pub fn parse(expression: &str) -> Result<Expr, ExpressionError> {
  let tokens = tokenize(expression)?;
  if tokens.is_empty() {
    return Err(ExpressionError::Syntax {
      expression: expression.to_string(),
      message: "expression cannot be empty".to_string(),
    });
  }

  let mut parser = Parser {
    source: expression,
    tokens,
    position: 0,
    depth: 0,
  };
  let expr = parser.parse_or()?;
  if let Some(token) = parser.peek() {
    return Err(parser.error(format!("unexpected token {:?}", token)));
  }
  Ok(expr)
}

struct Parser<'a> {
  source: &'a str,
  tokens: Vec<Token>,
  position: usize,
  depth: usize,
}

impl Parser<'_> {
  fn peek(&self) -> Option<&Token> {
    self.tokens.get(self.position)
  }

  fn advance(&mut self) -> Option<Token> {
    let token = self.tokens.get(self.position).cloned();
    if token.is_some() {
      self.position += 1;
    }
    token
  }

  fn eat(&mut self, expected: &Token) -> bool {
    if self.peek() == Some(expected) {
      self.position += 1;
      true
    } else {
      false
    }
  }

  fn expect(&mut self, expected: Token) -> Result<(), ExpressionError> {
    if self.eat(&expected) {
      Ok(())
    } else {
      Err(self.error(format!(
        "expected {:?}, found {:?}",
        expected,
        self.peek()
      )))
    }
  }

  fn error(&self, message: String) -> ExpressionError {
    ExpressionError::Syntax {
      expression: self.source.to_string(),
      message,
    }
  }

  fn enter(&mut self) -> Result<(), ExpressionError> {
    self.depth += 1;
    if self.depth > MAX_DEPTH {
      return Err(self.error("expression is nested too deeply".to_string()));
    }
    Ok(())
  }

  fn parse_or(&mut self) -> Result<Expr, ExpressionError> {
    let mut left = self.parse_and()?;
    while self.eat(&Token::Or) {
      let right = self.parse_and()?;
      left = Expr::Or(Box::new(left), Box::new(right));
    }
    Ok(left)
  }

  fn parse_and(&mut self) -> Result<Expr, ExpressionError> {
    let mut left = self.parse_compare()?;
    while self.eat(&Token::And) {
      let right = self.parse_compare()?;
      left = Expr::And(Box::new(left), Box::new(right));
    }
    Ok(left)
  }

  fn parse_compare(&mut self) -> Result<Expr, ExpressionError> {
    let left = self.parse_unary()?;
    let op = match self.peek() {
      Some(Token::Eq) => BinaryOp::Eq,
      Some(Token::Ne) => BinaryOp::Ne,
      Some(Token::Lt) => BinaryOp::Lt,
      Some(Token::Le) => BinaryOp::Le,
      Some(Token::Gt) => BinaryOp::Gt,
      Some(Token::Ge) => BinaryOp::Ge,
      _ => return Ok(left),
    };
    self.position += 1;
    let right = self.parse_unary()?;
    Ok(Expr::Binary {
      op,
      left: Box::new(left),
      right: Box::new(right),
    })
  }

  fn parse_unary(&mut self) -> Result<Expr, ExpressionError> {
    if self.eat(&Token::Not) {
      self.enter()?;
      let inner = self.parse_unary()?;
      self.depth -= 1;
      return Ok(Expr::Not(Box::new(inner)));
    }
    self.parse_primary()
  }

  fn parse_primary(&mut self) -> Result<Expr, ExpressionError> {
    match self.advance() {
      Some(Token::Str(s)) => Ok(Expr::Literal(serde_json::Value::String(s))),
      Some(Token::Number(n)) => Ok(Expr::Literal(serde_json::Value::Number(n))),
      Some(Token::LParen) => {
        self.enter()?;
        let inner = self.parse_or()?;
        self.expect(Token::RParen)?;
        self.depth -= 1;
        Ok(inner)
      }
      Some(Token::Ident(name)) => match name.as_str() {
        "true" => Ok(Expr::Literal(serde_json::Value::Bool(true))),
        "false" => Ok(Expr::Literal(serde_json::Value::Bool(false))),
        "null" => Ok(Expr::Literal(serde_json::Value::Null)),
        _ if self.peek() == Some(&Token::LParen) => self.parse_call(name),
        _ => self.parse_path(name),
      },
      Some(other) => Err(self.error(format!("unexpected token {:?}", other))),
      None => Err(self.error("unexpected end of expression".to_string())),
    }
  }

  fn parse_call(&mut self, name: String) -> Result<Expr, ExpressionError> {
    let function =
      Function::from_name(&name).ok_or_else(|| ExpressionError::UnknownFunction(name.clone()))?;
    self.expect(Token::LParen)?;
    self.enter()?;

    let mut args = Vec::new();
    if !self.eat(&Token::RParen) {
      loop {
        args.push(self.parse_or()?);
        if self.eat(&Token::Comma) {
          continue;
        }
        self.expect(Token::RParen)?;
        break;
      }
    }
    self.depth -= 1;

    let (min, max) = function.arity();
    if args.len() < min || args.len() > max {
      let expected = match (min, max) {
        (min, max) if min == max => min.to_string(),
        (min, usize::MAX) => format!("at least {}", min),
        (min, max) => format!("{} to {}", min, max),
      };
      return Err(ExpressionError::Arity {
        function: function.name().to_string(),
        expected,
        actual: args.len(),
      });
    }

    Ok(Expr::Call { function, args })
  }

  fn parse_path(&mut self, root: String) -> Result<Expr, ExpressionError> {
    let mut segments = Vec::new();
    loop {
      if self.eat(&Token::Dot) {
        match self.advance() {
          Some(Token::Ident(key)) => segments.push(Segment::Key(key)),
          // `steps.build.outputs.0` style numeric segments
          Some(Token::Number(n)) => match n.as_u64() {
            Some(index) => segments.push(Segment::Index(index as usize)),
            None => return Err(self.error(format!("invalid path segment '{}'", n))),
          },
          other => return Err(self.error(format!("expected property name, found {:?}", other))),
        }
      } else if self.eat(&Token::LBracket) {
        match self.advance() {
          Some(Token::Str(key)) => segments.push(Segment::Key(key)),
          Some(Token::Number(n)) => match n.as_u64() {
            Some(index) => segments.push(Segment::Index(index as usize)),
            None => return Err(self.error(format!("invalid index '{}'", n))),
          },
          other => return Err(self.error(format!("expected index, found {:?}", other))),
        }
        self.expect(Token::RBracket)?;
      } else {
        break;
      }
    }
    Ok(Expr::Path(Path { root, segments }))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn path(root: &str, keys: &[&str]) -> Expr {
    Expr::Path(Path {
      root: root.to_string(),
      segments: keys.iter().map(|k| Segment::Key(k.to_string())).collect(),
    })
  }

  #[test]
  fn test_parse_dotted_path() {
    assert_eq!(
      parse("needs.build.outputs.version").unwrap(),
      path("needs", &["build", "outputs", "version"])
    );
  }

  #[test]
  fn test_parse_bracket_segments() {
    let expr = parse("steps['my step'].outputs[0]").unwrap();
    assert_eq!(
      expr,
      Expr::Path(Path {
        root: "steps".to_string(),
        segments: vec![
          Segment::Key("my step".to_string()),
          Segment::Key("outputs".to_string()),
          Segment::Index(0),
        ],
      })
    );
  }

  #[test]
  fn test_precedence_and_binds_tighter_than_or() {
    let expr = parse("a || b && c").unwrap();
    assert_eq!(
      expr,
      Expr::Or(
        Box::new(path("a", &[])),
        Box::new(Expr::And(Box::new(path("b", &[])), Box::new(path("c", &[]))))
      )
    );
  }

  #[test]
  fn test_parse_comparison_with_literal() {
    let expr = parse("github.event_name != 'push'").unwrap();
    assert_eq!(
      expr,
      Expr::Binary {
        op: BinaryOp::Ne,
        left: Box::new(path("github", &["event_name"])),
        right: Box::new(Expr::Literal(json!("push"))),
      }
    );
  }

  #[test]
  fn test_parse_call_case_insensitive() {
    let expr = parse("startswith(github.ref, 'refs/tags/')").unwrap();
    assert!(matches!(
      expr,
      Expr::Call {
        function: Function::StartsWith,
        ..
      }
    ));
  }

  #[test]
  fn test_status_function_detection() {
    assert!(parse("always()").unwrap().uses_status_function());
    assert!(parse("failure() && inputs.x == 'y'").unwrap().uses_status_function());
    assert!(!parse("inputs.x == 'y'").unwrap().uses_status_function());
  }

  #[test]
  fn test_references_in_order() {
    let expr = parse("contains(inputs.targets, env.TARGET) || secrets.TOKEN").unwrap();
    let refs: Vec<String> = expr.references().iter().map(|p| p.to_string()).collect();
    assert_eq!(refs, vec!["inputs.targets", "env.TARGET", "secrets.TOKEN"]);
  }

  #[test]
  fn test_parse_errors() {
    assert!(parse("").is_err());
    assert!(parse("a ==").is_err());
    assert!(parse("(a").is_err());
    assert!(parse("a b").is_err());
    assert!(matches!(
      parse("eval('x')"),
      Err(ExpressionError::UnknownFunction(_))
    ));
    assert!(matches!(
      parse("contains('a')"),
      Err(ExpressionError::Arity { .. })
    ));
  }
}
