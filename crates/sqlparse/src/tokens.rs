//! Statement tokenizer.

use std::fmt;

use crate::errors::{ParseError, Result};
use crate::keywords::{keyword_from_str, Keyword};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// Identifier or keyword.
    Word(Word),
    /// String literal; value holds the inner text with quote escapes left
    /// doubled so the original literal can be reproduced verbatim.
    SingleQuotedString(String),
    /// Numeric literal, kept as written.
    Number(String),
    Comma,
    LeftParen,
    RightParen,
    Period,
    Semicolon,
    /// Comparison/arithmetic operator (`=`, `<>`, `<=`, `+`, ...).
    Operator(String),
    Whitespace,
}

impl Token {
    /// Render the token as SQL text.
    pub fn sql_text(&self) -> String {
        match self {
            Token::Word(w) => w.value.clone(),
            Token::SingleQuotedString(s) => format!("'{s}'"),
            Token::Number(n) => n.clone(),
            Token::Comma => ",".to_string(),
            Token::LeftParen => "(".to_string(),
            Token::RightParen => ")".to_string(),
            Token::Period => ".".to_string(),
            Token::Semicolon => ";".to_string(),
            Token::Operator(op) => op.clone(),
            Token::Whitespace => " ".to_string(),
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.sql_text())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Word {
    pub value: String,
    pub keyword: Option<Keyword>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenWithLocation {
    pub token: Token,
    /// Byte offset of the token in the source text.
    pub offset: usize,
}

impl TokenWithLocation {
    pub fn is_keyword(&self, keyword: Keyword) -> bool {
        matches!(&self.token, Token::Word(w) if w.keyword == Some(keyword))
    }
}

/// Tokenize a statement with a single left-to-right scan.
pub fn tokenize(sql: &str) -> Result<Vec<TokenWithLocation>> {
    let mut toks = Vec::new();
    let mut chars = sql.char_indices().peekable();

    while let Some(&(offset, c)) = chars.peek() {
        let token = match c {
            c if c.is_whitespace() => {
                while chars.next_if(|(_, c)| c.is_whitespace()).is_some() {}
                Token::Whitespace
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut value = String::new();
                while let Some((_, c)) =
                    chars.next_if(|(_, c)| c.is_alphanumeric() || *c == '_' || *c == '$')
                {
                    value.push(c);
                }
                let keyword = keyword_from_str(&value);
                Token::Word(Word { value, keyword })
            }
            c if c.is_ascii_digit() => {
                let mut value = String::new();
                while let Some((_, c)) = chars.next_if(|(_, c)| c.is_ascii_digit()) {
                    value.push(c);
                }
                if chars.next_if(|(_, c)| *c == '.').is_some() {
                    value.push('.');
                    while let Some((_, c)) = chars.next_if(|(_, c)| c.is_ascii_digit()) {
                        value.push(c);
                    }
                }
                Token::Number(value)
            }
            '\'' => {
                chars.next();
                let mut value = String::new();
                let mut terminated = false;
                while let Some((_, c)) = chars.next() {
                    if c == '\'' {
                        // A doubled quote is an escaped quote; keep it
                        // doubled so the literal round-trips.
                        if chars.next_if(|(_, c)| *c == '\'').is_some() {
                            value.push_str("''");
                            continue;
                        }
                        terminated = true;
                        break;
                    }
                    value.push(c);
                }
                if !terminated {
                    return Err(ParseError::UnterminatedString(offset));
                }
                Token::SingleQuotedString(value)
            }
            ',' => {
                chars.next();
                Token::Comma
            }
            '(' => {
                chars.next();
                Token::LeftParen
            }
            ')' => {
                chars.next();
                Token::RightParen
            }
            '.' => {
                chars.next();
                Token::Period
            }
            ';' => {
                chars.next();
                Token::Semicolon
            }
            '<' => {
                chars.next();
                if chars.next_if(|(_, c)| *c == '=').is_some() {
                    Token::Operator("<=".to_string())
                } else if chars.next_if(|(_, c)| *c == '>').is_some() {
                    Token::Operator("<>".to_string())
                } else {
                    Token::Operator("<".to_string())
                }
            }
            '>' => {
                chars.next();
                if chars.next_if(|(_, c)| *c == '=').is_some() {
                    Token::Operator(">=".to_string())
                } else {
                    Token::Operator(">".to_string())
                }
            }
            '!' => {
                chars.next();
                if chars.next_if(|(_, c)| *c == '=').is_some() {
                    Token::Operator("!=".to_string())
                } else {
                    return Err(ParseError::UnexpectedChar { c: '!', offset });
                }
            }
            '=' | '+' | '-' | '*' | '/' | '%' => {
                chars.next();
                Token::Operator(c.to_string())
            }
            '?' => {
                chars.next();
                Token::Operator("?".to_string())
            }
            other => return Err(ParseError::UnexpectedChar { c: other, offset }),
        };

        toks.push(TokenWithLocation { token, offset });
    }

    Ok(toks)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(sql: &str) -> Vec<Token> {
        tokenize(sql)
            .unwrap()
            .into_iter()
            .map(|t| t.token)
            .filter(|t| !matches!(t, Token::Whitespace))
            .collect()
    }

    #[test]
    fn words_and_operators() {
        let toks = tokens("SELECT id FROM t WHERE a <= 5");
        assert_eq!(toks.len(), 8);
        assert!(matches!(&toks[0], Token::Word(w) if w.keyword == Some(Keyword::SELECT)));
        assert!(matches!(&toks[5], Token::Word(w) if w.value == "a" && w.keyword.is_none()));
        assert_eq!(toks[6], Token::Operator("<=".to_string()));
        assert_eq!(toks[7], Token::Number("5".to_string()));
    }

    #[test]
    fn string_with_escaped_quote() {
        let toks = tokens("'O''Brien'");
        assert_eq!(toks, vec![Token::SingleQuotedString("O''Brien".to_string())]);
        assert_eq!(toks[0].sql_text(), "'O''Brien'");
    }

    #[test]
    fn unterminated_string_errors() {
        assert!(matches!(
            tokenize("WHERE name = 'abc"),
            Err(ParseError::UnterminatedString(_))
        ));
    }

    #[test]
    fn qualified_name() {
        let toks = tokens("app.customer");
        assert_eq!(toks.len(), 3);
        assert_eq!(toks[1], Token::Period);
    }

    #[test]
    fn decimal_number() {
        let toks = tokens("12.5");
        assert_eq!(toks, vec![Token::Number("12.5".to_string())]);
    }
}
