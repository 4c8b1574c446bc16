#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("Unexpected character '{c}' at offset {offset}")]
    UnexpectedChar { c: char, offset: usize },

    #[error("Unterminated string literal starting at offset {0}")]
    UnterminatedString(usize),

    #[error("Unexpected end of statement")]
    UnexpectedEof,

    #[error("Unexpected token '{token}' at offset {offset}")]
    UnexpectedToken { token: String, offset: usize },

    #[error("Expected {expected}, found '{found}' at offset {offset}")]
    Expected {
        expected: String,
        found: String,
        offset: usize,
    },

    #[error("Unsupported syntax: {0}")]
    Unsupported(String),

    #[error("Unknown table '{0}'")]
    UnknownTable(String),

    #[error("Unknown column '{0}'")]
    UnknownColumn(String),

    #[error("Malformed statement: {0}")]
    Malformed(String),
}

pub type Result<T, E = ParseError> = std::result::Result<T, E>;
