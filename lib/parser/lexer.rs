//! Splits one line of MuASM into tokens.

use crate::error::ParseError;
use std::fmt;

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TokenKind {
    Identifier(String),
    Integer(i64),
    Arrow,
    Comma,
    LParen,
    RParen,
    Plus,
    Minus,
    Star,
    Amp,
    Question,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TokenKind::Identifier(name) => write!(f, "{}", name),
            TokenKind::Integer(value) => write!(f, "{}", value),
            TokenKind::Arrow => write!(f, "<-"),
            TokenKind::Comma => write!(f, ","),
            TokenKind::LParen => write!(f, "("),
            TokenKind::RParen => write!(f, ")"),
            TokenKind::Plus => write!(f, "+"),
            TokenKind::Minus => write!(f, "-"),
            TokenKind::Star => write!(f, "*"),
            TokenKind::Amp => write!(f, "&"),
            TokenKind::Question => write!(f, "?"),
        }
    }
}

/// A token, and the column it starts at.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Token {
    kind: TokenKind,
    column: usize,
}

impl Token {
    pub fn new(kind: TokenKind, column: usize) -> Token {
        Token { kind, column }
    }

    pub fn kind(&self) -> &TokenKind {
        &self.kind
    }

    pub fn column(&self) -> usize {
        self.column
    }
}

pub(crate) fn is_identifier_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

pub(crate) fn is_identifier_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Returns true if the whole of `text` is a single identifier.
pub fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(c) if is_identifier_start(c) => chars.all(is_identifier_char),
        _ => false,
    }
}

/// Tokenize a line of source. `offset` is added to every column, so callers
/// can tokenize the remainder of a line after a label prefix.
pub fn tokenize(text: &str, offset: usize) -> Result<Vec<Token>, ParseError> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let column = offset + i;

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        if is_identifier_start(c) {
            let start = i;
            while i < chars.len() && is_identifier_char(chars[i]) {
                i += 1;
            }
            let name: String = chars[start..i].iter().collect();
            tokens.push(Token::new(TokenKind::Identifier(name), column));
            continue;
        }

        if c.is_ascii_digit() {
            let start = i;
            let value = if c == '0' && chars.get(i + 1).map_or(false, |x| *x == 'x' || *x == 'X')
            {
                i += 2;
                let digits_start = i;
                while i < chars.len() && chars[i].is_ascii_hexdigit() {
                    i += 1;
                }
                let digits: String = chars[digits_start..i].iter().collect();
                i64::from_str_radix(&digits, 16)
            } else {
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
                chars[start..i].iter().collect::<String>().parse::<i64>()
            };
            if i < chars.len() && is_identifier_char(chars[i]) {
                return Err(ParseError::new(format!(
                    "Invalid token `{}`",
                    chars[start..=i].iter().collect::<String>()
                ))
                .with_column(column));
            }
            let value = value.map_err(|_| {
                ParseError::new(format!(
                    "Invalid integer `{}`",
                    chars[start..i].iter().collect::<String>()
                ))
                .with_column(column)
            })?;
            tokens.push(Token::new(TokenKind::Integer(value), column));
            continue;
        }

        let kind = match c {
            '<' => {
                if chars.get(i + 1) == Some(&'-') {
                    i += 1;
                    TokenKind::Arrow
                } else {
                    return Err(ParseError::new("Expected `<-`").with_column(column));
                }
            }
            ',' => TokenKind::Comma,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' => TokenKind::Star,
            '&' => TokenKind::Amp,
            '?' => TokenKind::Question,
            _ => {
                return Err(ParseError::new(format!("Unexpected character `{}`", c))
                    .with_column(column))
            }
        };
        tokens.push(Token::new(kind, column));
        i += 1;
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(text: &str) -> Vec<TokenKind> {
        tokenize(text, 0)
            .unwrap()
            .into_iter()
            .map(|token| token.kind)
            .collect()
    }

    #[test]
    fn assignment_tokens() {
        assert_eq!(
            kinds("x <- y+0x10 ? c"),
            vec![
                TokenKind::Identifier("x".to_string()),
                TokenKind::Arrow,
                TokenKind::Identifier("y".to_string()),
                TokenKind::Plus,
                TokenKind::Integer(16),
                TokenKind::Question,
                TokenKind::Identifier("c".to_string()),
            ]
        );
    }

    #[test]
    fn minus_is_always_a_symbol() {
        assert_eq!(
            kinds("a - -5"),
            vec![
                TokenKind::Identifier("a".to_string()),
                TokenKind::Minus,
                TokenKind::Minus,
                TokenKind::Integer(5),
            ]
        );
    }

    #[test]
    fn columns_include_offset() {
        let tokens = tokenize("skip", 4).unwrap();
        assert_eq!(tokens[0].column(), 4);
    }

    #[test]
    fn bad_characters() {
        assert_eq!(tokenize("x <= 1", 0).unwrap_err().at(), Some(2));
        assert!(tokenize("x <- $1", 0).is_err());
        assert!(tokenize("x <- 12ab", 0).is_err());
    }

    #[test]
    fn identifiers() {
        assert!(is_identifier("loop_1"));
        assert!(is_identifier("_x"));
        assert!(!is_identifier("1x"));
        assert!(!is_identifier("a b"));
        assert!(!is_identifier(""));
    }
}
