//! Decomposed statement representation.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use sqlrepr::column::TableColumn;
use sqlrepr::ident::TableIdentity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
    Truncate,
    Drop,
}

impl StatementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatementKind::Select => "SELECT",
            StatementKind::Insert => "INSERT",
            StatementKind::Update => "UPDATE",
            StatementKind::Delete => "DELETE",
            StatementKind::Truncate => "TRUNCATE",
            StatementKind::Drop => "DROP",
        }
    }
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One decomposed DML/DDL statement.
///
/// Immutable once constructed; composition produces a new statement, so a
/// statement cached by one component can safely serve as a base for another.
/// Clause strings are shared (`Arc<str>`), making clones cheap.
#[derive(Debug, Clone)]
pub struct ParsedStatement {
    pub(crate) kind: StatementKind,
    pub(crate) distinct: bool,
    /// Involved tables, in statement order.
    pub(crate) tables: Vec<TableIdentity>,
    /// Referenced columns, in statement order, deduplicated.
    pub(crate) columns: Vec<TableColumn>,
    /// Column name -> literal text for columns whose value the statement
    /// pins (INSERT VALUES, UPDATE SET, conjunctive WHERE equality).
    pub(crate) pinned: HashMap<String, String>,
    /// Whether the whole WHERE clause was consumed as an AND-joined list of
    /// `column = literal` terms. False when an opaque remainder was kept.
    pub(crate) pinned_complete: bool,
    /// Columns modified by an UPDATE's SET list.
    pub(crate) modified: Vec<String>,
    pub(crate) where_clause: Option<Arc<str>>,
    /// WHERE text with key columns qualified by table name, reusable when
    /// correlating this statement's predicate with another statement.
    pub(crate) correlated_where: Option<Arc<str>>,
    pub(crate) group_by: Option<Arc<str>>,
    pub(crate) having: Option<Arc<str>>,
    pub(crate) order_by: Option<Arc<str>>,
}

impl ParsedStatement {
    pub fn kind(&self) -> StatementKind {
        self.kind
    }

    pub fn is_distinct(&self) -> bool {
        self.distinct
    }

    pub fn tables(&self) -> &[TableIdentity] {
        &self.tables
    }

    /// First (target) table of the statement.
    pub fn target_table(&self) -> &TableIdentity {
        &self.tables[0]
    }

    pub fn columns(&self) -> &[TableColumn] {
        &self.columns
    }

    pub fn pinned_values(&self) -> &HashMap<String, String> {
        &self.pinned
    }

    pub fn pinned_value(&self, column: &str) -> Option<&str> {
        self.pinned
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(column))
            .map(|(_, v)| v.as_str())
    }

    /// True when the WHERE clause was nothing but AND-joined key equality.
    pub fn pinned_complete(&self) -> bool {
        self.pinned_complete
    }

    /// Whether the statement pins a value for every one of `columns`.
    pub fn pins_all(&self, columns: &[String]) -> bool {
        columns.iter().all(|c| self.pinned_value(c).is_some())
    }

    pub fn modified_columns(&self) -> &[String] {
        &self.modified
    }

    pub fn modifies_column(&self, column: &str) -> bool {
        self.modified.iter().any(|m| m.eq_ignore_ascii_case(column))
    }

    pub fn where_clause(&self) -> Option<&str> {
        self.where_clause.as_deref()
    }

    pub fn correlated_where(&self) -> Option<&str> {
        self.correlated_where.as_deref()
    }

    pub fn group_by(&self) -> Option<&str> {
        self.group_by.as_deref()
    }

    pub fn having(&self) -> Option<&str> {
        self.having.as_deref()
    }

    pub fn order_by(&self) -> Option<&str> {
        self.order_by.as_deref()
    }

    pub fn references_table(&self, table: &TableIdentity) -> bool {
        self.tables.iter().any(|t| t.same_table(table))
    }

    /// Render the statement as executable SQL text.
    ///
    /// Only SELECTs are recomposed; other kinds are consumed from
    /// notifications and never re-executed.
    pub fn sql_text(&self) -> String {
        debug_assert_eq!(self.kind, StatementKind::Select);

        let mut out = String::from("SELECT ");
        if self.distinct {
            out.push_str("DISTINCT ");
        }

        let qualify = self.tables.len() > 1;
        for (idx, col) in self.columns.iter().enumerate() {
            if idx > 0 {
                out.push_str(", ");
            }
            if qualify {
                out.push_str(&col.qualified());
            } else {
                out.push_str(&col.name);
            }
        }

        out.push_str(" FROM ");
        for (idx, table) in self.tables.iter().enumerate() {
            if idx > 0 {
                out.push_str(", ");
            }
            out.push_str(&table.sql_reference());
        }

        if let Some(where_clause) = self.where_clause() {
            out.push_str(" WHERE ");
            out.push_str(where_clause);
        }
        if let Some(group_by) = self.group_by() {
            out.push_str(" GROUP BY ");
            out.push_str(group_by);
        }
        if let Some(having) = self.having() {
            out.push_str(" HAVING ");
            out.push_str(having);
        }
        if let Some(order_by) = self.order_by() {
            out.push_str(" ORDER BY ");
            out.push_str(order_by);
        }

        out
    }
}

impl fmt::Display for ParsedStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.kind == StatementKind::Select {
            write!(f, "{}", self.sql_text())
        } else {
            write!(f, "{} {}", self.kind, self.target_table())
        }
    }
}
