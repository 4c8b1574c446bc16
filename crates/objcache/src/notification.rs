//! Parsed change notifications.

use sqlparse::statement::ParsedStatement;

/// One committed DML statement delivered by a notification source, tagged
/// with where it came from and its position in that source's stream.
#[derive(Debug, Clone)]
pub struct ChangeNotification {
    pub statement: ParsedStatement,
    pub source: String,
    pub sequence: u64,
}

impl ChangeNotification {
    pub fn new(statement: ParsedStatement, source: impl Into<String>, sequence: u64) -> Self {
        ChangeNotification {
            statement,
            source: source.into(),
            sequence,
        }
    }
}
