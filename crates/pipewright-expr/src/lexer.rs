//! Tokenizer for the expression grammar.

use crate::error::ExpressionError;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
  Ident(String),
  Str(String),
  Number(serde_json::Number),
  LParen,
  RParen,
  LBracket,
  RBracket,
  Dot,
  Comma,
  Not,
  Eq,
  Ne,
  Lt,
  Le,
  Gt,
  Ge,
  And,
  Or,
}

/// Split an expression into tokens.
pub(crate) fn tokenize(expression: &str) -> Result<Vec<Token>, ExpressionError> {
  let syntax = |message: String| ExpressionError::Syntax {
    expression: expression.to_string(),
    message,
  };

  let chars: Vec<char> = expression.chars().collect();
  let mut tokens = Vec::new();
  let mut i = 0usize;

  while i < chars.len() {
    let c = chars[i];
    let next = chars.get(i + 1).copied();

    match c {
      c if c.is_whitespace() => {
        i += 1;
      }
      '(' => {
        tokens.push(Token::LParen);
        i += 1;
      }
      ')' => {
        tokens.push(Token::RParen);
        i += 1;
      }
      '[' => {
        tokens.push(Token::LBracket);
        i += 1;
      }
      ']' => {
        tokens.push(Token::RBracket);
        i += 1;
      }
      '.' => {
        tokens.push(Token::Dot);
        i += 1;
      }
      ',' => {
        tokens.push(Token::Comma);
        i += 1;
      }
      '!' if next == Some('=') => {
        tokens.push(Token::Ne);
        i += 2;
      }
      '!' => {
        tokens.push(Token::Not);
        i += 1;
      }
      '=' if next == Some('=') => {
        tokens.push(Token::Eq);
        i += 2;
      }
      '<' if next == Some('=') => {
        tokens.push(Token::Le);
        i += 2;
      }
      '<' => {
        tokens.push(Token::Lt);
        i += 1;
      }
      '>' if next == Some('=') => {
        tokens.push(Token::Ge);
        i += 2;
      }
      '>' => {
        tokens.push(Token::Gt);
        i += 1;
      }
      '&' if next == Some('&') => {
        tokens.push(Token::And);
        i += 2;
      }
      '|' if next == Some('|') => {
        tokens.push(Token::Or);
        i += 2;
      }
      '\'' => {
        // Single-quoted string; a doubled quote escapes a quote.
        let mut literal = String::new();
        i += 1;
        loop {
          match chars.get(i) {
            None => return Err(syntax("unterminated string literal".to_string())),
            Some('\'') if chars.get(i + 1) == Some(&'\'') => {
              literal.push('\'');
              i += 2;
            }
            Some('\'') => {
              i += 1;
              break;
            }
            Some(ch) => {
              literal.push(*ch);
              i += 1;
            }
          }
        }
        tokens.push(Token::Str(literal));
      }
      c if c.is_ascii_digit() || (c == '-' && next.is_some_and(|n| n.is_ascii_digit())) => {
        let start = i;
        i += 1;
        while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '.') {
          i += 1;
        }
        let text: String = chars[start..i].iter().collect();
        tokens.push(Token::Number(parse_number(&text).ok_or_else(|| {
          syntax(format!("invalid number literal '{}'", text))
        })?));
      }
      c if c.is_ascii_alphabetic() || c == '_' => {
        let start = i;
        while i < chars.len() && is_identifier_character(chars[i]) {
          i += 1;
        }
        tokens.push(Token::Ident(chars[start..i].iter().collect()));
      }
      other => {
        return Err(syntax(format!("unexpected character '{}'", other)));
      }
    }
  }

  Ok(tokens)
}

pub(crate) fn is_identifier_character(character: char) -> bool {
  character.is_ascii_alphanumeric() || character == '_' || character == '-'
}

fn parse_number(text: &str) -> Option<serde_json::Number> {
  if let Ok(n) = text.parse::<i64>() {
    return Some(n.into());
  }
  if let Some(hex) = text.strip_prefix("0x") {
    return i64::from_str_radix(hex, 16).ok().map(Into::into);
  }
  text
    .parse::<f64>()
    .ok()
    .and_then(serde_json::Number::from_f64)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_tokenize_comparison() {
    let tokens = tokenize("github.ref == 'refs/heads/main'").unwrap();
    assert_eq!(
      tokens,
      vec![
        Token::Ident("github".to_string()),
        Token::Dot,
        Token::Ident("ref".to_string()),
        Token::Eq,
        Token::Str("refs/heads/main".to_string()),
      ]
    );
  }

  #[test]
  fn test_tokenize_hyphenated_identifier() {
    let tokens = tokenize("inputs.node-version").unwrap();
    assert_eq!(tokens[2], Token::Ident("node-version".to_string()));
  }

  #[test]
  fn test_tokenize_escaped_quote() {
    let tokens = tokenize("'it''s'").unwrap();
    assert_eq!(tokens, vec![Token::Str("it's".to_string())]);
  }

  #[test]
  fn test_tokenize_numbers() {
    let tokens = tokenize("-1 2.5 0xff").unwrap();
    assert_eq!(
      tokens,
      vec![
        Token::Number((-1).into()),
        Token::Number(serde_json::Number::from_f64(2.5).unwrap()),
        Token::Number(255.into()),
      ]
    );
  }

  #[test]
  fn test_tokenize_rejects_unterminated_string() {
    assert!(tokenize("'open").is_err());
  }

  #[test]
  fn test_tokenize_rejects_single_equals() {
    assert!(tokenize("a = b").is_err());
  }
}
