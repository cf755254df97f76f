//! Tokenizer for filter expressions

use crate::error::PredicateError;

/// Token kinds of the filter language
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    Ident(String),
    Str(String),
    True,
    False,
    And,
    Or,
    Not,
    In,
    EqEq,
    NotEq,
    Dot,
    Comma,
    LParen,
    RParen,
    LBracket,
    RBracket,
}

impl TokenKind {
    /// Spelling used in error messages
    pub fn describe(&self) -> String {
        match self {
            Self::Ident(name) => name.clone(),
            Self::Str(value) => format!("\"{}\"", value),
            Self::True => "true".to_string(),
            Self::False => "false".to_string(),
            Self::And => "and".to_string(),
            Self::Or => "or".to_string(),
            Self::Not => "not".to_string(),
            Self::In => "in".to_string(),
            Self::EqEq => "==".to_string(),
            Self::NotEq => "!=".to_string(),
            Self::Dot => ".".to_string(),
            Self::Comma => ",".to_string(),
            Self::LParen => "(".to_string(),
            Self::RParen => ")".to_string(),
            Self::LBracket => "[".to_string(),
            Self::RBracket => "]".to_string(),
        }
    }
}

/// A token and the byte offset it starts at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub offset: usize,
}

/// Split an expression into tokens
pub fn tokenize(expr: &str) -> Result<Vec<Token>, PredicateError> {
    let mut tokens = Vec::new();
    let mut chars = expr.char_indices().peekable();

    while let Some(&(offset, ch)) = chars.peek() {
        if ch.is_whitespace() {
            chars.next();
            continue;
        }

        let kind = match ch {
            '.' => single(&mut chars, TokenKind::Dot),
            ',' => single(&mut chars, TokenKind::Comma),
            '(' => single(&mut chars, TokenKind::LParen),
            ')' => single(&mut chars, TokenKind::RParen),
            '[' => single(&mut chars, TokenKind::LBracket),
            ']' => single(&mut chars, TokenKind::RBracket),
            '=' | '!' => {
                chars.next();
                match chars.peek() {
                    Some(&(_, '=')) => {
                        chars.next();
                        if ch == '=' {
                            TokenKind::EqEq
                        } else {
                            TokenKind::NotEq
                        }
                    }
                    _ => {
                        return Err(PredicateError::UnexpectedChar {
                            expr: expr.to_string(),
                            ch,
                            offset,
                        })
                    }
                }
            }
            '"' | '\'' => {
                chars.next();
                let mut value = String::new();
                let mut closed = false;
                while let Some((_, c)) = chars.next() {
                    match c {
                        '\\' => match chars.next() {
                            Some((_, escaped)) => value.push(escaped),
                            None => break,
                        },
                        c if c == ch => {
                            closed = true;
                            break;
                        }
                        c => value.push(c),
                    }
                }
                if !closed {
                    return Err(PredicateError::UnterminatedString {
                        expr: expr.to_string(),
                        offset,
                    });
                }
                TokenKind::Str(value)
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut word = String::new();
                while let Some(&(_, c)) = chars.peek() {
                    if c.is_ascii_alphanumeric() || c == '_' {
                        word.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                keyword(word)
            }
            _ => {
                return Err(PredicateError::UnexpectedChar {
                    expr: expr.to_string(),
                    ch,
                    offset,
                })
            }
        };

        tokens.push(Token { kind, offset });
    }

    Ok(tokens)
}

fn single<I: Iterator<Item = (usize, char)>>(
    chars: &mut std::iter::Peekable<I>,
    kind: TokenKind,
) -> TokenKind {
    chars.next();
    kind
}

fn keyword(word: String) -> TokenKind {
    match word.as_str() {
        "and" => TokenKind::And,
        "or" => TokenKind::Or,
        "not" => TokenKind::Not,
        "in" => TokenKind::In,
        "true" | "True" => TokenKind::True,
        "false" | "False" => TokenKind::False,
        _ => TokenKind::Ident(word),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(expr: &str) -> Vec<TokenKind> {
        tokenize(expr).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_tokenize_comparison() {
        assert_eq!(
            kinds(r#"path == "Alamofire""#),
            vec![
                TokenKind::Ident("path".to_string()),
                TokenKind::EqEq,
                TokenKind::Str("Alamofire".to_string()),
            ]
        );
    }

    #[test]
    fn test_tokenize_method_call_single_quotes() {
        assert_eq!(
            kinds("action.startswith('Build')"),
            vec![
                TokenKind::Ident("action".to_string()),
                TokenKind::Dot,
                TokenKind::Ident("startswith".to_string()),
                TokenKind::LParen,
                TokenKind::Str("Build".to_string()),
                TokenKind::RParen,
            ]
        );
    }

    #[test]
    fn test_tokenize_keywords_and_escapes() {
        assert_eq!(
            kinds(r#"not True or x != 'it\'s'"#),
            vec![
                TokenKind::Not,
                TokenKind::True,
                TokenKind::Or,
                TokenKind::Ident("x".to_string()),
                TokenKind::NotEq,
                TokenKind::Str("it's".to_string()),
            ]
        );
    }

    #[test]
    fn test_tokenize_records_offsets() {
        let tokens = tokenize("a  == b").unwrap();
        let offsets: Vec<_> = tokens.iter().map(|t| t.offset).collect();
        assert_eq!(offsets, vec![0, 3, 6]);
    }

    #[test]
    fn test_tokenize_rejects_single_equals() {
        let err = tokenize("path = 'x'").unwrap_err();
        assert!(matches!(err, PredicateError::UnexpectedChar { ch: '=', offset: 5, .. }));
    }

    #[test]
    fn test_tokenize_rejects_unterminated_string() {
        let err = tokenize("path == 'x").unwrap_err();
        assert!(matches!(err, PredicateError::UnterminatedString { offset: 8, .. }));
    }

    #[test]
    fn test_tokenize_rejects_host_syntax() {
        assert!(tokenize("__import__('os').system('rm')").is_ok());
        assert!(tokenize("path; rm -rf /").is_err());
    }
}
